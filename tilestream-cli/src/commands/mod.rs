//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`config`] - Engine configuration (show, path, init)
//! - [`feature`] - Feature metadata of a b3dm tile
//! - [`fetch`] - Fetch one tile through the pipeline
//! - [`resolve`] - Effective address and offset of a tile
//! - [`stream`] - Refinement cycles over a tileset
//! - [`tileset`] - Load and summarize a tileset

pub mod common;
pub mod config;
pub mod feature;
pub mod fetch;
pub mod resolve;
pub mod stream;
pub mod tileset;
