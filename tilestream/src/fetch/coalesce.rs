//! Request coalescing for tile loads.
//!
//! When several requests resolve to the same effective address while a load
//! for it is in flight, only one load runs; every waiter receives the same
//! result.
//!
//! ```text
//! fetch(5/10/3) ─┐
//!                │                               detached
//! fetch(6/20/6) ─┼──► RequestCoalescer ──────►  load task
//!                │     (effective 5/10/3)           │
//! fetch(7/41/13)─┘          │                       │
//!                           ▼                       ▼
//!                    [all receive the  ◄──── complete()
//!                     same payload]
//! ```
//!
//! The map holds a `broadcast::Sender` per in-flight address. The first
//! registration creates it; later ones subscribe. `complete` removes the
//! entry and sends the result to every subscriber.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use super::error::FetchError;
use crate::coord::TileAddress;
use crate::decode::ContentPayload;

/// Result shared by every waiter of one load.
pub(crate) type SharedResult = Result<Arc<ContentPayload>, FetchError>;

/// Tracks in-flight loads by effective address.
pub struct RequestCoalescer {
    in_flight: Mutex<HashMap<TileAddress, broadcast::Sender<SharedResult>>>,
    stats: Mutex<CoalescerStats>,
}

/// Statistics for monitoring coalescing effectiveness.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CoalescerStats {
    /// Total requests received
    pub total_requests: u64,
    /// Requests that waited for an existing load
    pub coalesced_requests: u64,
    /// Requests that started a load
    pub new_requests: u64,
}

impl CoalescerStats {
    /// Returns the coalescing ratio (0.0 to 1.0)
    pub fn coalescing_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.coalesced_requests as f64 / self.total_requests as f64
        }
    }
}

/// Outcome of registering a request.
pub(crate) enum CoalesceResult {
    /// No load is in flight: the caller starts one and calls `complete()`
    NewRequest {
        receiver: broadcast::Receiver<SharedResult>,
    },
    /// A load is in flight: wait on the receiver
    Coalesced(broadcast::Receiver<SharedResult>),
}

impl CoalesceResult {
    pub fn is_new_request(&self) -> bool {
        matches!(self, Self::NewRequest { .. })
    }

    pub fn into_receiver(self) -> broadcast::Receiver<SharedResult> {
        match self {
            Self::NewRequest { receiver } | Self::Coalesced(receiver) => receiver,
        }
    }
}

impl RequestCoalescer {
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
            stats: Mutex::new(CoalescerStats::default()),
        }
    }

    /// Registers a request for `address`.
    ///
    /// Both variants carry a receiver subscribed before the entry can be
    /// completed, so no result is missed.
    pub(crate) async fn register(&self, address: TileAddress) -> CoalesceResult {
        let mut in_flight = self.in_flight.lock().await;
        let mut stats = self.stats.lock().await;

        stats.total_requests += 1;

        if let Some(tx) = in_flight.get(&address) {
            stats.coalesced_requests += 1;
            debug!(
                address = %address,
                waiters = tx.receiver_count() + 1,
                "Coalescing request onto in-flight load"
            );
            CoalesceResult::Coalesced(tx.subscribe())
        } else {
            // One message per load, so a single slot is enough.
            let (tx, rx) = broadcast::channel(1);
            in_flight.insert(address, tx);
            stats.new_requests += 1;
            debug!(
                address = %address,
                in_flight_count = in_flight.len(),
                "New load"
            );
            CoalesceResult::NewRequest { receiver: rx }
        }
    }

    /// Completes the load for `address`, broadcasting to all waiters.
    pub(crate) async fn complete(&self, address: TileAddress, result: SharedResult) {
        let mut in_flight = self.in_flight.lock().await;

        if let Some(tx) = in_flight.remove(&address) {
            let waiters = tx.receiver_count();
            // Receivers may all have been dropped; the result is still final.
            let _ = tx.send(result);
            debug!(address = %address, waiters, "Load result broadcast");
        }
    }

    /// Returns a snapshot of the current statistics.
    pub async fn stats(&self) -> CoalescerStats {
        *self.stats.lock().await
    }

    /// Returns the number of loads currently in flight.
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// Logs current statistics.
    pub async fn log_stats(&self) {
        let stats = self.stats().await;
        let in_flight = self.in_flight_count().await;

        info!(
            total_requests = stats.total_requests,
            coalesced = stats.coalesced_requests,
            new_requests = stats.new_requests,
            in_flight,
            coalescing_ratio = format!("{:.1}%", stats.coalescing_ratio() * 100.0),
            "Request coalescing statistics"
        );
    }
}

impl Default for RequestCoalescer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::CrsId;
    use crate::decode::MeshContent;
    use std::time::Duration;
    use tokio::time::sleep;

    fn tile(row: u32, col: u32) -> TileAddress {
        TileAddress::new(16, row, col, CrsId::Epsg3857).unwrap()
    }

    fn payload() -> SharedResult {
        Ok(Arc::new(ContentPayload::Mesh(MeshContent {
            gltf: vec![0x67, 0x6C, 0x54, 0x46],
            rtc_center: None,
            batch_length: 0,
            semantic: None,
        })))
    }

    #[tokio::test]
    async fn test_first_request_is_new() {
        let coalescer = RequestCoalescer::new();
        assert!(coalescer.register(tile(100, 200)).await.is_new_request());
    }

    #[tokio::test]
    async fn test_second_request_is_coalesced() {
        let coalescer = RequestCoalescer::new();

        let first = coalescer.register(tile(100, 200)).await;
        let second = coalescer.register(tile(100, 200)).await;

        assert!(first.is_new_request());
        assert!(!second.is_new_request());
    }

    #[tokio::test]
    async fn test_different_tiles_not_coalesced() {
        let coalescer = RequestCoalescer::new();

        assert!(coalescer.register(tile(100, 200)).await.is_new_request());
        assert!(coalescer.register(tile(100, 201)).await.is_new_request());
    }

    #[tokio::test]
    async fn test_all_waiters_receive_result() {
        let coalescer = Arc::new(RequestCoalescer::new());
        let address = tile(100, 200);

        let receivers: Vec<_> = vec![
            coalescer.register(address).await,
            coalescer.register(address).await,
            coalescer.register(address).await,
        ]
        .into_iter()
        .map(CoalesceResult::into_receiver)
        .collect();

        let handles: Vec<_> = receivers
            .into_iter()
            .map(|mut rx| tokio::spawn(async move { rx.recv().await.ok() }))
            .collect();

        coalescer.complete(address, payload()).await;

        let mut payloads = Vec::new();
        for handle in handles {
            payloads.push(handle.await.unwrap().unwrap().unwrap());
        }
        assert!(payloads.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_errors_are_shared() {
        let coalescer = RequestCoalescer::new();
        let address = tile(1, 1);

        let mut first = coalescer.register(address).await.into_receiver();
        let mut second = coalescer.register(address).await.into_receiver();

        let error = FetchError::Abandoned {
            address,
            reason: "test".to_string(),
        };
        coalescer.complete(address, Err(error.clone())).await;

        assert_eq!(first.recv().await.unwrap().unwrap_err(), error);
        assert_eq!(second.recv().await.unwrap().unwrap_err(), error);
    }

    #[tokio::test]
    async fn test_completion_removes_from_in_flight() {
        let coalescer = RequestCoalescer::new();
        let address = tile(100, 200);

        let _first = coalescer.register(address).await;
        assert_eq!(coalescer.in_flight_count().await, 1);

        coalescer.complete(address, payload()).await;
        assert_eq!(coalescer.in_flight_count().await, 0);

        assert!(coalescer.register(address).await.is_new_request());
    }

    #[tokio::test]
    async fn test_stats_tracking() {
        let coalescer = RequestCoalescer::new();
        let address = tile(100, 200);

        let _first = coalescer.register(address).await;
        let _c1 = coalescer.register(address).await;
        let _c2 = coalescer.register(address).await;
        let _c3 = coalescer.register(address).await;

        let stats = coalescer.stats().await;
        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.new_requests, 1);
        assert_eq!(stats.coalesced_requests, 3);
        assert!((stats.coalescing_ratio() - 0.75).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_concurrent_registration() {
        let coalescer = Arc::new(RequestCoalescer::new());
        let address = tile(100, 200);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let c = Arc::clone(&coalescer);
                tokio::spawn(async move { c.register(address).await.is_new_request() })
            })
            .collect();

        let results: Vec<bool> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|new| **new).count(), 1);
    }

    #[tokio::test]
    async fn test_waiter_receives_delayed_completion() {
        let coalescer = Arc::new(RequestCoalescer::new());
        let address = tile(100, 200);

        let _first = coalescer.register(address).await;
        let mut second = coalescer.register(address).await.into_receiver();

        let c = Arc::clone(&coalescer);
        tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            c.complete(address, payload()).await;
        });

        let result = second.recv().await.unwrap().unwrap();
        assert_eq!(result.kind(), "mesh");
    }
}
