//! Content URLs of tileset nodes.

use std::collections::HashMap;

use reqwest::Url;

use crate::coord::TileAddress;
use crate::fetch::{LocatorError, TileLocator};

/// Resolves node content URIs against the tileset's base URL.
#[derive(Debug, Clone)]
pub struct TilesetLocator {
    base: Url,
    uris: HashMap<TileAddress, Option<String>>,
}

impl TilesetLocator {
    /// Creates a locator from `(address, content uri)` pairs.
    pub fn new(base: Url, uris: impl IntoIterator<Item = (TileAddress, Option<String>)>) -> Self {
        Self {
            base,
            uris: uris.into_iter().collect(),
        }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }
}

impl TileLocator for TilesetLocator {
    fn locate(&self, address: &TileAddress) -> Result<String, LocatorError> {
        let uri = self
            .uris
            .get(address)
            .ok_or(LocatorError::UnknownTile { address: *address })?
            .as_deref()
            .ok_or(LocatorError::NoContent { address: *address })?;

        self.base
            .join(uri)
            .map(String::from)
            .map_err(|e| LocatorError::InvalidUri {
                uri: uri.to_string(),
                reason: e.to_string(),
            })
    }
}
