//! Bounded concurrency for transport calls.
//!
//! A semaphore-based limiter capping how many transport requests run at once.
//! Tokio's semaphore is fair, so waiting requests are admitted in FIFO order.
//!
//! ```ignore
//! let limiter = Arc::new(ConcurrencyLimiter::new(16, "http"));
//! let _permit = limiter.acquire().await?;
//! // transport call; the permit is released on drop
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Default cap on concurrent transport requests.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Semaphore-based limiter with in-flight and peak counters.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_permits: usize,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: AtomicUsize,
    /// Label for logs (e.g. "http")
    label: String,
}

impl ConcurrencyLimiter {
    /// Creates a limiter allowing `max_concurrent` operations at once.
    ///
    /// A cap of 0 is raised to 1.
    pub fn new(max_concurrent: usize, label: impl Into<String>) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_permits: max_concurrent,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: AtomicUsize::new(0),
            label: label.into(),
        }
    }

    /// Waits for a permit. The permit is released when dropped.
    pub async fn acquire(&self) -> Result<ConcurrencyPermit, AcquireError> {
        let permit = self.semaphore.clone().acquire_owned().await?;

        let current = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.update_peak(current);

        Ok(ConcurrencyPermit {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Takes a permit without waiting, if one is free.
    pub fn try_acquire(&self) -> Option<ConcurrencyPermit> {
        let permit = self.semaphore.clone().try_acquire_owned().ok()?;

        let current = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.update_peak(current);

        Some(ConcurrencyPermit {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    fn update_peak(&self, current: usize) {
        self.peak_in_flight.fetch_max(current, Ordering::Relaxed);
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_permits
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Highest number of concurrent operations observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Relaxed)
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IN_FLIGHT, "http")
    }
}

/// Permit for one operation, counted against the limiter's cap while held.
pub struct ConcurrencyPermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for ConcurrencyPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
