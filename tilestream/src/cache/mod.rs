//! Tile tree and content cache.
//!
//! [`TileTree`] is an arena of nodes keyed by address. [`ContentCache`] owns
//! the tree, drives node state (`Empty → Loading → Ready | Errored`), tracks
//! visibility and releases content of nodes that stay invisible longer than
//! the cleanup delay. State changes are published as [`CacheEvent`]s.

mod content;
mod tree;
mod types;

pub use content::ContentCache;
pub use tree::{NodeState, TileNode, TileTree, TreeError};
pub use types::{
    CacheConfig, CacheEvent, CacheStats, Sweepable, DEFAULT_CLEANUP_DELAY, DEFAULT_EVENT_CAPACITY,
};
