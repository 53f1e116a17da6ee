//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Log stream
    pub notifications_total: IntCounter,
    pub duplicate_signatures: IntCounter,
    pub failed_tx_skipped: IntCounter,
    pub creation_matches: IntCounter,
    pub stream_reconnects: IntCounter,

    // Retrieval
    pub queue_evictions: IntCounter,
    pub fetch_attempts: IntCounter,
    pub fetch_outcomes: IntCounterVec,
    pub rpc_throttled: IntCounter,
    pub rpc_errors: IntCounterVec,

    // Decoding
    pub decodes: IntCounterVec,
    pub decode_rejects: IntCounterVec,
    pub reserves_unavailable: IntCounter,

    // Quarantine
    pub quarantine_admitted: IntCounter,
    pub quarantine_evictions: IntCounter,
    pub candidates_emitted: IntCounter,
    pub candidates_dropped_thin: IntCounter,

    // Gauges
    pub queue_depth: IntGauge,
    pub quarantine_depth: IntGauge,
    pub rpc_in_flight: IntGauge,

    // Histograms
    pub rpc_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let notifications_total = IntCounter::with_opts(Opts::new(
            "notifications_total",
            "Log notifications received from the stream",
        ))?;

        let duplicate_signatures = IntCounter::with_opts(Opts::new(
            "duplicate_signatures_total",
            "Notifications discarded because the signature was already seen",
        ))?;

        let failed_tx_skipped = IntCounter::with_opts(Opts::new(
            "failed_tx_skipped_total",
            "Notifications for transactions that failed on-chain",
        ))?;

        let creation_matches = IntCounter::with_opts(Opts::new(
            "creation_matches_total",
            "Notifications classified as token creation",
        ))?;

        let stream_reconnects = IntCounter::with_opts(Opts::new(
            "stream_reconnects_total",
            "Log stream reconnect attempts",
        ))?;

        let queue_evictions = IntCounter::with_opts(Opts::new(
            "retrieval_queue_evictions_total",
            "Pending transactions evicted because the queue was full",
        ))?;

        let fetch_attempts = IntCounter::with_opts(Opts::new(
            "fetch_attempts_total",
            "getTransaction attempts made by the retrieval queue",
        ))?;

        let fetch_outcomes = IntCounterVec::new(
            Opts::new("fetch_outcomes_total", "Retrieval outcomes by kind"),
            &["outcome"],
        )?;

        let rpc_throttled = IntCounter::with_opts(Opts::new(
            "rpc_throttled_total",
            "RPC responses that reported rate limiting",
        ))?;

        let rpc_errors = IntCounterVec::new(
            Opts::new("rpc_errors_total", "RPC errors by method"),
            &["method"],
        )?;

        let decodes = IntCounterVec::new(
            Opts::new("decodes_total", "Successful metadata decodes by decoder"),
            &["decoder"],
        )?;

        let decode_rejects = IntCounterVec::new(
            Opts::new("decode_rejects_total", "Decoded records rejected by the post-filter"),
            &["reason"],
        )?;

        let reserves_unavailable = IntCounter::with_opts(Opts::new(
            "reserves_unavailable_total",
            "Bonding-curve reads that returned nothing after retries",
        ))?;

        let quarantine_admitted = IntCounter::with_opts(Opts::new(
            "quarantine_admitted_total",
            "Candidates admitted to quarantine",
        ))?;

        let quarantine_evictions = IntCounter::with_opts(Opts::new(
            "quarantine_evictions_total",
            "Candidates removed by quarantine garbage collection",
        ))?;

        let candidates_emitted = IntCounter::with_opts(Opts::new(
            "candidates_emitted_total",
            "Enriched candidates emitted downstream",
        ))?;

        let candidates_dropped_thin = IntCounter::with_opts(Opts::new(
            "candidates_dropped_thin_total",
            "Candidates dropped at quarantine exit without usable metadata",
        ))?;

        let queue_depth =
            IntGauge::with_opts(Opts::new("retrieval_queue_depth", "Pending transactions"))?;

        let quarantine_depth =
            IntGauge::with_opts(Opts::new("quarantine_depth", "Candidates in quarantine"))?;

        let rpc_in_flight =
            IntGauge::with_opts(Opts::new("rpc_in_flight", "RPC calls currently holding a permit"))?;

        let rpc_latency = Histogram::with_opts(
            HistogramOpts::new("rpc_latency_seconds", "RPC call latency")
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(notifications_total.clone()))?;
        registry.register(Box::new(duplicate_signatures.clone()))?;
        registry.register(Box::new(failed_tx_skipped.clone()))?;
        registry.register(Box::new(creation_matches.clone()))?;
        registry.register(Box::new(stream_reconnects.clone()))?;
        registry.register(Box::new(queue_evictions.clone()))?;
        registry.register(Box::new(fetch_attempts.clone()))?;
        registry.register(Box::new(fetch_outcomes.clone()))?;
        registry.register(Box::new(rpc_throttled.clone()))?;
        registry.register(Box::new(rpc_errors.clone()))?;
        registry.register(Box::new(decodes.clone()))?;
        registry.register(Box::new(decode_rejects.clone()))?;
        registry.register(Box::new(reserves_unavailable.clone()))?;
        registry.register(Box::new(quarantine_admitted.clone()))?;
        registry.register(Box::new(quarantine_evictions.clone()))?;
        registry.register(Box::new(candidates_emitted.clone()))?;
        registry.register(Box::new(candidates_dropped_thin.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(quarantine_depth.clone()))?;
        registry.register(Box::new(rpc_in_flight.clone()))?;
        registry.register(Box::new(rpc_latency.clone()))?;

        Ok(Self {
            registry,
            notifications_total,
            duplicate_signatures,
            failed_tx_skipped,
            creation_matches,
            stream_reconnects,
            queue_evictions,
            fetch_attempts,
            fetch_outcomes,
            rpc_throttled,
            rpc_errors,
            decodes,
            decode_rejects,
            reserves_unavailable,
            quarantine_admitted,
            quarantine_evictions,
            candidates_emitted,
            candidates_dropped_thin,
            queue_depth,
            quarantine_depth,
            rpc_in_flight,
            rpc_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn encode_text(&self) -> anyhow::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_and_encode() {
        let m = Metrics::new().unwrap();
        m.notifications_total.inc();
        m.decodes.with_label_values(&["legacy"]).inc();
        m.queue_depth.set(3);

        let text = m.encode_text().unwrap();
        assert!(text.contains("notifications_total 1"));
        assert!(text.contains("decodes_total{decoder=\"legacy\"} 1"));
        assert!(text.contains("retrieval_queue_depth 3"));
    }
}
