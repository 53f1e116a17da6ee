//! Token-bucket rate limiter with a global throttle pause
//!
//! Every RPC call made by the pipeline goes through one shared
//! [`RateLimiter`]. The bucket refills continuously, concurrency is bounded
//! by a semaphore, and a provider 429 pauses every caller at once.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::rpc_errors::RpcError;
use crate::metrics::metrics;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Bucket size; also the burst allowance
    pub capacity: u32,
    pub refill_per_second: f64,
    pub max_in_flight: usize,
    /// Pause applied on every reported throttle
    pub throttle_backoff: Duration,
    /// Upper bound of the random extra pause
    pub throttle_jitter_max: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_per_second: 10.0,
            max_in_flight: 5,
            throttle_backoff: Duration::from_millis(2000),
            throttle_jitter_max: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    paused_until: Option<Instant>,
}

impl BucketState {
    fn refill(&mut self, now: Instant, capacity: f64, rate: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * rate).min(capacity);
            self.last_refill = now;
        }
    }
}

/// Permission to make one RPC call; dropping it releases the in-flight slot
#[derive(Debug)]
pub struct RatePermit {
    _permit: OwnedSemaphorePermit,
}

impl Drop for RatePermit {
    fn drop(&mut self) {
        metrics().rpc_in_flight.dec();
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    bucket: Mutex<BucketState>,
    in_flight: Arc<Semaphore>,
    closed: watch::Sender<bool>,
}

impl RateLimiter {
    /// The bucket starts full
    pub fn new(config: RateLimiterConfig) -> Self {
        let bucket = BucketState {
            tokens: config.capacity as f64,
            last_refill: Instant::now(),
            paused_until: None,
        };
        let (closed, _) = watch::channel(false);
        Self {
            in_flight: Arc::new(Semaphore::new(config.max_in_flight)),
            bucket: Mutex::new(bucket),
            closed,
            config,
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Wait for an in-flight slot and a token
    ///
    /// Returns [`RpcError::LimiterClosed`] once [`close`](Self::close) has
    /// been called, including for callers already waiting.
    pub async fn acquire(&self) -> Result<RatePermit, RpcError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(RpcError::LimiterClosed);
        }

        let permit = self
            .in_flight
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RpcError::LimiterClosed)?;

        loop {
            let wake_at = match self.try_take_token(Instant::now()) {
                None => {
                    metrics().rpc_in_flight.inc();
                    return Ok(RatePermit { _permit: permit });
                }
                Some(wake_at) => wake_at,
            };

            tokio::select! {
                _ = tokio::time::sleep_until(wake_at) => {}
                _ = closed.wait_for(|c| *c) => return Err(RpcError::LimiterClosed),
            }
        }
    }

    /// Take a token, or return the instant worth waking up at
    fn try_take_token(&self, now: Instant) -> Option<Instant> {
        let mut bucket = self.bucket.lock();
        if let Some(until) = bucket.paused_until {
            if until > now {
                return Some(until);
            }
            bucket.paused_until = None;
        }

        let rate = self.config.refill_per_second.max(f64::EPSILON);
        bucket.refill(now, self.config.capacity as f64, rate);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return None;
        }
        let deficit = 1.0 - bucket.tokens;
        Some(now + Duration::from_secs_f64(deficit / rate))
    }

    /// Zero the bucket and pause every caller for backoff plus jitter
    ///
    /// An existing later deadline is kept. Refill resumes from the deadline.
    pub fn report_throttled(&self) -> Instant {
        let jitter_ms = self.config.throttle_jitter_max.as_millis() as u64;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        let proposed = Instant::now() + self.config.throttle_backoff + jitter;

        let mut bucket = self.bucket.lock();
        let deadline = match bucket.paused_until {
            Some(existing) if existing > proposed => existing,
            _ => proposed,
        };
        bucket.tokens = 0.0;
        bucket.paused_until = Some(deadline);
        bucket.last_refill = deadline;
        drop(bucket);

        metrics().rpc_throttled.inc();
        warn!(
            pause_ms = deadline.saturating_duration_since(Instant::now()).as_millis() as u64,
            "Provider throttled, pausing all RPC calls"
        );
        deadline
    }

    /// Fail all current and future acquirers
    pub fn close(&self) {
        self.closed.send_replace(true);
        self.in_flight.close();
        debug!("Rate limiter closed");
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Slots currently held
    pub fn in_flight(&self) -> usize {
        self.config
            .max_in_flight
            .saturating_sub(self.in_flight.available_permits())
    }

    /// Tokens available right now
    pub fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        let now = Instant::now();
        if bucket.paused_until.map_or(false, |until| until > now) {
            return 0.0;
        }
        bucket.refill(now, self.config.capacity as f64, self.config.refill_per_second);
        bucket.tokens
    }

    pub fn paused_until(&self) -> Option<Instant> {
        let bucket = self.bucket.lock();
        bucket.paused_until.filter(|until| *until > Instant::now())
    }
}
