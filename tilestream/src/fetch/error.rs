//! Fetch error types.

use thiserror::Error;

use crate::coord::TileAddress;
use crate::decode::DecodeError;
use crate::provider::TransportError;

/// Errors locating a tile's content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorError {
    /// The node exists but has no content to fetch
    #[error("Tile {address} has no content")]
    NoContent { address: TileAddress },

    /// The address is not part of the dataset
    #[error("Tile {address} is not part of the dataset")]
    UnknownTile { address: TileAddress },

    /// A content URI could not be resolved to a URL
    #[error("Invalid content URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },
}

/// Per-tile fetch failure.
///
/// A failure affects only the requested node, which becomes errored. `Clone`
/// so a coalesced failure reaches every waiter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// Transport failed to retrieve the bytes
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The bytes could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The layer holds no data for the tile at any usable level
    #[error("Tile {address} is outside the layer's range (zoom {min}..={max})")]
    OutOfRange {
        address: TileAddress,
        min: u32,
        max: u32,
    },

    /// No URL could be built for the tile
    #[error("Locator error: {0}")]
    Locator(#[from] LocatorError),

    /// The load ended without producing a result
    #[error("Fetch of {address} was abandoned: {reason}")]
    Abandoned { address: TileAddress, reason: String },
}

impl FetchError {
    /// Returns true for failures where a later attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(e) => e.is_transient(),
            FetchError::Abandoned { .. } => true,
            _ => false,
        }
    }
}
