//! Periodic sweep daemon.
//!
//! Runs a [`Sweepable`] target's cleanup on a fixed interval until the
//! shutdown token is cancelled.
//!
//! # Example
//!
//! ```ignore
//! use tilestream::engine::SweepDaemon;
//!
//! let daemon = SweepDaemon::new(Arc::clone(&engine))
//!     .with_interval(Duration::from_millis(250));
//!
//! tokio::spawn(daemon.run(shutdown.clone()));
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::Sweepable;

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// Background task sweeping a shared target.
pub struct SweepDaemon<T> {
    target: Arc<Mutex<T>>,
    interval: Duration,
}

impl<T: Sweepable + 'static> SweepDaemon<T> {
    pub fn new(target: Arc<Mutex<T>>) -> Self {
        Self {
            target,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Sets the sweep interval. Zero is raised to one millisecond.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sweeps until `shutdown` is cancelled; returns the total released.
    pub async fn run(self, shutdown: CancellationToken) -> usize {
        info!(interval_ms = self.interval.as_millis() as u64, "Sweep daemon starting");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the first immediate tick
        interval.tick().await;

        let mut total = 0;
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!(released = total, "Sweep daemon shutting down");
                    break;
                }

                _ = interval.tick() => {
                    let now = tokio::time::Instant::now().into_std();
                    let released = self.target.lock().await.sweep(now);
                    if released > 0 {
                        debug!(released, "Sweep released content");
                    }
                    total += released;
                }
            }
        }

        total
    }
}
