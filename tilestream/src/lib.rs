//! TileStream - hierarchical level-of-detail tile streaming
//!
//! This library decides which tiles of a quadtree pyramid (or an explicit
//! tileset tree) to display, fetches their content over HTTP with request
//! coalescing and bounded concurrency, decodes it, and caches it with
//! delayed eviction of tiles that drop out of view. Feature metadata carried
//! by mesh tiles can be looked up for picking.
//!
//! # High-Level API
//!
//! [`engine::TileEngine`] ties the pieces together:
//!
//! ```ignore
//! use tilestream::cache::{CacheConfig, ContentCache};
//! use tilestream::decode::AutoDecoder;
//! use tilestream::engine::{Candidate, TileEngine};
//! use tilestream::fetch::FetchPipeline;
//! use tilestream::provider::AsyncReqwestClient;
//!
//! let pipeline = FetchPipeline::new(AsyncReqwestClient::new()?, decoder, layer)?;
//! let mut engine = TileEngine::new(pipeline, ContentCache::new(config), policy, handle);
//!
//! let report = engine.update(&candidates, Instant::now());
//! engine.apply_completions(Instant::now());
//! ```

pub mod cache;
pub mod config;
pub mod coord;
pub mod decode;
pub mod engine;
pub mod extension;
pub mod fetch;
pub mod layer;
pub mod logging;
pub mod provider;
pub mod refine;
pub mod semantic;
pub mod tileset;

/// Version of the TileStream library and CLI.
///
/// This is synchronized across all components in the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
