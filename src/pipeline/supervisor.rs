//! Lifecycle state and worker bookkeeping for the pipeline

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl From<u8> for PipelineState {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

pub struct WorkerHandle {
    pub name: &'static str,
    pub handle: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn new(name: &'static str, handle: JoinHandle<()>) -> Self {
        Self { name, handle }
    }
}

/// Owns the shutdown signal and the spawned workers of one run
pub struct Supervisor {
    state: AtomicU8,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    workers: Mutex<Vec<WorkerHandle>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(PipelineState::Stopped as u8),
            shutdown: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: PipelineState) {
        self.state.store(state as u8, Ordering::Release);
        debug!(?state, "Pipeline state changed");
    }

    /// Move Stopped -> Starting and hand out a fresh shutdown receiver
    ///
    /// Returns `None` if the pipeline is not stopped.
    pub fn begin_start(&self) -> Option<watch::Receiver<bool>> {
        self.state
            .compare_exchange(
                PipelineState::Stopped as u8,
                PipelineState::Starting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()?;
        let (tx, rx) = watch::channel(false);
        *self.shutdown.lock() = Some(tx);
        Some(rx)
    }

    pub fn register(&self, worker: WorkerHandle) {
        debug!(worker = worker.name, "Worker registered");
        self.workers.lock().push(worker);
    }

    pub fn mark_running(&self) {
        self.set_state(PipelineState::Running);
    }

    /// Signal shutdown and wait for workers, aborting stragglers at the deadline
    pub async fn stop(&self, timeout: Duration) {
        let current = self.state();
        if current == PipelineState::Stopped || current == PipelineState::Stopping {
            return;
        }
        info!(timeout_ms = timeout.as_millis() as u64, "Stopping pipeline");
        self.set_state(PipelineState::Stopping);

        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(true);
        }

        let workers: Vec<WorkerHandle> = self.workers.lock().drain(..).collect();
        let deadline = tokio::time::Instant::now() + timeout;

        for mut worker in workers {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, &mut worker.handle).await {
                Ok(Ok(())) => debug!(worker = worker.name, "Worker stopped"),
                Ok(Err(e)) if e.is_cancelled() => debug!(worker = worker.name, "Worker cancelled"),
                Ok(Err(e)) => error!(worker = worker.name, error = %e, "Worker panicked"),
                Err(_) => {
                    warn!(worker = worker.name, "Worker did not stop in time, aborting");
                    worker.handle.abort();
                }
            }
        }

        self.set_state(PipelineState::Stopped);
        info!("Pipeline stopped");
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
