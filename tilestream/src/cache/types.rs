//! Core types for the content cache.

use std::time::{Duration, Instant};

use crate::coord::TileAddress;
use crate::fetch::FetchError;

/// Default grace period before invisible content is released.
pub const DEFAULT_CLEANUP_DELAY: Duration = Duration::from_millis(1000);

/// Default capacity of the cache event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Content cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a node must stay invisible before its content is released
    pub cleanup_delay: Duration,
    /// Events buffered per subscriber before slow subscribers lag
    pub event_capacity: usize,
}

impl CacheConfig {
    pub fn with_cleanup_delay(mut self, delay: Duration) -> Self {
        self.cleanup_delay = delay;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cleanup_delay: DEFAULT_CLEANUP_DELAY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Notification of a node state change.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    /// Content became available for a node
    Ready {
        address: TileAddress,
        source_address: TileAddress,
    },
    /// A node's fetch failed
    Errored {
        address: TileAddress,
        error: FetchError,
    },
    /// A node's content was released after it stayed invisible
    Evicted { address: TileAddress },
}

impl CacheEvent {
    pub fn address(&self) -> TileAddress {
        match self {
            CacheEvent::Ready { address, .. }
            | CacheEvent::Errored { address, .. }
            | CacheEvent::Evicted { address } => *address,
        }
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub nodes: usize,
    pub ready: usize,
    pub loading: usize,
    pub errored: usize,
    pub visible: usize,
    /// Invisible nodes waiting for the cleanup delay
    pub tracked: usize,
    /// Payload bytes held by ready nodes
    pub content_bytes: usize,
    /// Evictions since the cache was created
    pub evictions: u64,
}

/// Something with delayed cleanup driven by an external clock.
pub trait Sweepable: Send {
    /// Releases everything whose grace period ended at `now`; returns how
    /// many nodes were released.
    fn sweep(&mut self, now: Instant) -> usize;
}
