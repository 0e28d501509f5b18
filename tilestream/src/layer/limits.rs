//! Queries answering whether a layer holds data for a tile.

use super::config::LayerConfig;
use crate::coord::TileAddress;

/// Returns true if the layer holds data for `address` once it has fallen back
/// to at most `target_level`.
///
/// The effective level is `min(address.level, target_level)`; it must lie in
/// the layer's zoom range, and when the layer declares row/column limits for
/// that level the effective row and column must lie within them.
pub fn tile_inside_limit(address: &TileAddress, layer: &LayerConfig, target_level: u32) -> bool {
    let effective = address.parent_at(target_level);

    if !layer.zoom.contains(effective.level) {
        return false;
    }

    match layer.level_limits.get(&effective.level) {
        Some(limits) => limits.contains(effective.row, effective.col),
        None => true,
    }
}

/// Number of content units this layer contributes to a tile: 0 or 1.
///
/// A tile receives at most one effective fetch from a layer, at the layer's
/// deepest level that covers it.
pub fn tile_texture_count(address: &TileAddress, layer: &LayerConfig) -> u8 {
    if address.crs == layer.crs() && tile_inside_limit(address, layer, layer.zoom.max) {
        1
    } else {
        0
    }
}
