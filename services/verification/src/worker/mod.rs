//! Periodic sweep workers: the matcher (profile polling) and the
//! dispatcher (notification mail). Both run as independent loops over the
//! registration store and are started/stopped by the daemon.

pub mod dispatcher;
pub mod matcher;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle to a running sweep worker. `stop()` signals shutdown and waits
/// for the loop to drain its in-flight work, so every lease is released
/// before it returns.
pub struct WorkerHandle {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub(crate) fn new(
        name: &'static str,
        shutdown: watch::Sender<bool>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            name,
            shutdown,
            task,
        }
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(error) = self.task.await {
            tracing::error!(worker = self.name, %error, "worker task panicked");
        }
        tracing::info!(worker = self.name, "worker stopped");
    }
}

/// `base · 2^(n-1)` for the n-th consecutive failure, capped at `max`.
pub(crate) fn backoff(base: Duration, max: Duration, failures: i32) -> Duration {
    let shift = failures.saturating_sub(1).clamp(0, 16) as u32;
    let scaled = base * (1 << shift);
    if scaled > max { max } else { scaled }
}

/// Shared sweep counters, read by the stats surface while the worker runs.
#[derive(Clone, Default)]
pub struct SweepStats(Arc<Mutex<SweepStatsInner>>);

#[derive(Default)]
struct SweepStatsInner {
    sweeps: u64,
    dispatched_total: u64,
    last_backlog: u64,
    last_sweep_at: Option<DateTime<Utc>>,
    last_sweep_ms: u64,
}

impl SweepStats {
    fn lock(&self) -> MutexGuard<'_, SweepStatsInner> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn record_sweep(&self, backlog: usize, dispatched: usize, elapsed: StdDuration) {
        let mut inner = self.lock();
        inner.sweeps += 1;
        inner.dispatched_total += dispatched as u64;
        inner.last_backlog = backlog as u64;
        inner.last_sweep_at = Some(Utc::now());
        inner.last_sweep_ms = elapsed.as_millis() as u64;
    }

    pub fn snapshot(&self) -> SweepSnapshot {
        let inner = self.lock();
        SweepSnapshot {
            sweeps: inner.sweeps,
            dispatched_total: inner.dispatched_total,
            last_backlog: inner.last_backlog,
            last_sweep_at: inner.last_sweep_at,
            last_sweep_ms: inner.last_sweep_ms,
        }
    }
}

/// Point-in-time view of a worker's sweep counters.
#[derive(Debug, Clone, Serialize)]
pub struct SweepSnapshot {
    pub sweeps: u64,
    pub dispatched_total: u64,
    pub last_backlog: u64,
    pub last_sweep_at: Option<DateTime<Utc>>,
    pub last_sweep_ms: u64,
}
