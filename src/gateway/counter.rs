//! Throughput accounting for handled requests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

/// Monotonic counter of handled requests, incremented once per dequeued
/// message regardless of outcome.
pub struct RequestCounter {
    handled: AtomicU64,
}

impl RequestCounter {
    pub fn new() -> Self {
        Self {
            handled: AtomicU64::new(0),
        }
    }

    pub fn increment(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }

    /// Atomically reads the current count and resets it to zero.
    pub fn sample_and_reset(&self) -> u64 {
        self.handled.swap(0, Ordering::Relaxed)
    }
}

impl Default for RequestCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the periodic logger task. It samples and resets the counter on
/// every interval and exits when the shutdown signal fires.
pub fn spawn_logger(
    counter: Arc<RequestCounter>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // First tick after one full period, not immediately.
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Request counter logger stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let count = counter.sample_and_reset();
                    info!("📈 Requests handled in the last {}s: {}", period.as_secs(), count);
                }
            }
        }
    })
}
