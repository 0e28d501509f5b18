//! Content cache with delayed eviction.
//!
//! The cache owns the tile tree and is the only component that changes node
//! state. Nodes that become invisible keep their content for
//! `cleanup_delay`; a sweep after that releases it. Becoming visible again
//! before the sweep cancels the eviction.

use std::collections::HashSet;
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use super::tree::{NodeState, TileTree, TreeError};
use super::types::{CacheConfig, CacheEvent, CacheStats, Sweepable};
use crate::coord::TileAddress;
use crate::fetch::{ContentHandle, FetchError};

/// Loaded tile content plus visibility bookkeeping.
pub struct ContentCache {
    tree: TileTree,
    config: CacheConfig,
    /// Invisible nodes with a running eviction clock
    tracked: HashSet<TileAddress>,
    events: broadcast::Sender<CacheEvent>,
    evictions: u64,
}

impl ContentCache {
    /// Creates a cache over an empty tree.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_tree(TileTree::new(), config)
    }

    /// Creates a cache over an existing topology (e.g. a loaded tileset).
    pub fn with_tree(tree: TileTree, config: CacheConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            tree,
            config,
            tracked: HashSet::new(),
            events,
            evictions: 0,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn tree(&self) -> &TileTree {
        &self.tree
    }

    /// Subscribes to node state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: CacheEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Adds a pyramid address (and its path from the root) to the tree.
    pub fn ensure_node(&mut self, address: &TileAddress) -> Result<(), TreeError> {
        self.tree.ensure(address)
    }

    /// Grows the tree below `address`, returning its children.
    pub fn materialize_children(
        &mut self,
        address: &TileAddress,
    ) -> Result<Vec<TileAddress>, TreeError> {
        self.tree.materialize_children(address)
    }

    /// Marks a node as loading.
    ///
    /// Returns false (and changes nothing) unless the node is `Empty` or
    /// `Errored`, so at most one fetch per node is started.
    pub fn begin_fetch(&mut self, address: &TileAddress) -> bool {
        let Some(node) = self.tree.get_mut(address) else {
            return false;
        };
        match node.state {
            NodeState::Empty | NodeState::Errored(_) => {
                node.state = NodeState::Loading;
                trace!(address = %address, "Fetch started");
                true
            }
            _ => false,
        }
    }

    /// Records the outcome of a fetch started with [`begin_fetch`].
    ///
    /// A result for a node that is not currently visible is kept but not
    /// surfaced, and starts the node's eviction clock. Returns false if the
    /// node was not loading.
    ///
    /// [`begin_fetch`]: ContentCache::begin_fetch
    pub fn complete_fetch(
        &mut self,
        address: &TileAddress,
        result: Result<ContentHandle, FetchError>,
        now: Instant,
    ) -> bool {
        let Some(node) = self.tree.get_mut(address) else {
            warn!(address = %address, "Completion for unknown node dropped");
            return false;
        };
        if !node.state.is_loading() {
            debug!(
                address = %address,
                state = node.state.name(),
                "Completion for node that is not loading dropped"
            );
            return false;
        }

        let event = match result {
            Ok(handle) => {
                let event = CacheEvent::Ready {
                    address: *address,
                    source_address: handle.source_address,
                };
                node.state = NodeState::Ready(handle);
                event
            }
            Err(error) => {
                warn!(address = %address, error = %error, "Tile fetch failed");
                node.state = NodeState::Errored(error.clone());
                CacheEvent::Errored {
                    address: *address,
                    error,
                }
            }
        };

        if !node.visible && node.last_visible_at.is_none() {
            node.last_visible_at = Some(now);
            self.tracked.insert(*address);
        }

        self.emit(event);
        true
    }

    /// Marks a node visible, cancelling any pending eviction.
    pub fn mark_visible(&mut self, address: &TileAddress) {
        if let Some(node) = self.tree.get_mut(address) {
            node.visible = true;
            node.last_visible_at = None;
            self.tracked.remove(address);
        }
    }

    /// Marks a node invisible, starting its eviction clock if not running.
    pub fn mark_invisible(&mut self, address: &TileAddress, now: Instant) {
        if let Some(node) = self.tree.get_mut(address) {
            node.visible = false;
            if node.last_visible_at.is_none() {
                node.last_visible_at = Some(now);
            }
            self.tracked.insert(*address);
        }
    }

    /// Releases content of nodes invisible for at least `cleanup_delay`.
    ///
    /// Loading nodes stay tracked until their fetch completes. Errored nodes
    /// are reset to `Empty` so a later visibility retries them. Topology is
    /// never removed. Returns the addresses whose content was released.
    pub fn sweep(&mut self, now: Instant) -> Vec<TileAddress> {
        let delay = self.config.cleanup_delay;
        let mut released = Vec::new();
        let mut expired = Vec::new();

        for address in &self.tracked {
            let Some(node) = self.tree.get(address) else {
                expired.push(*address);
                continue;
            };
            let Some(since) = node.last_visible_at else {
                expired.push(*address);
                continue;
            };
            if node.state.is_loading() {
                continue;
            }
            if now.saturating_duration_since(since) >= delay {
                expired.push(*address);
            }
        }

        for address in expired {
            self.tracked.remove(&address);
            let Some(node) = self.tree.get_mut(&address) else {
                continue;
            };
            node.last_visible_at = None;
            let previous = std::mem::take(&mut node.state);
            match previous {
                NodeState::Ready(_) => {
                    released.push(address);
                }
                NodeState::Errored(_) => {
                    trace!(address = %address, "Errored node reset");
                }
                other => node.state = other,
            }
        }

        for address in &released {
            self.evictions += 1;
            self.emit(CacheEvent::Evicted { address: *address });
        }
        if !released.is_empty() {
            debug!(evicted = released.len(), tracked = self.tracked.len(), "Cache sweep");
        }

        released
    }

    /// Content to display for a node: only when ready and visible.
    pub fn displayable(&self, address: &TileAddress) -> Option<&ContentHandle> {
        self.tree
            .get(address)
            .filter(|node| node.is_visible())
            .and_then(|node| node.content())
    }

    /// Content held for a node, visible or not.
    pub fn content(&self, address: &TileAddress) -> Option<&ContentHandle> {
        self.tree.get(address).and_then(|node| node.content())
    }

    pub fn state(&self, address: &TileAddress) -> Option<&NodeState> {
        self.tree.get(address).map(|node| node.state())
    }

    pub fn is_tracked(&self, address: &TileAddress) -> bool {
        self.tracked.contains(address)
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            nodes: self.tree.len(),
            tracked: self.tracked.len(),
            evictions: self.evictions,
            ..Default::default()
        };
        for node in self.tree.nodes() {
            if node.is_visible() {
                stats.visible += 1;
            }
            match node.state() {
                NodeState::Ready(handle) => {
                    stats.ready += 1;
                    stats.content_bytes += handle.payload.byte_size();
                }
                NodeState::Loading => stats.loading += 1,
                NodeState::Errored(_) => stats.errored += 1,
                NodeState::Empty => {}
            }
        }
        stats
    }
}

impl Default for ContentCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl Sweepable for ContentCache {
    fn sweep(&mut self, now: Instant) -> usize {
        ContentCache::sweep(self, now).len()
    }
}
