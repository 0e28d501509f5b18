//! Refinement decisions.
//!
//! [`RefinementPolicy`] classifies a candidate tile from its address, an
//! externally computed error metric (typically projected screen-space error)
//! and the layer configuration. It never touches node state.

use crate::coord::TileAddress;
use crate::layer::LayerConfig;

/// Default metric above which a tile is subdivided.
pub const DEFAULT_THRESHOLD: f64 = 16.0;

/// Outcome of classifying one candidate tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Refinement {
    /// Display the children instead of this tile
    Subdivide,
    /// Display this tile, using content fetched at `effective`
    Display { effective: TileAddress },
    /// Nothing to request for this tile
    OutOfRange,
}

impl Refinement {
    pub fn is_subdivide(&self) -> bool {
        matches!(self, Refinement::Subdivide)
    }

    /// The address to fetch, for `Display` decisions.
    pub fn effective(&self) -> Option<TileAddress> {
        match self {
            Refinement::Display { effective } => Some(*effective),
            _ => None,
        }
    }
}

/// Classification rule for candidate tiles.
///
/// # Example
///
/// ```
/// use tilestream::coord::{CrsId, TileAddress};
/// use tilestream::layer::{web_mercator_layer, ZoomRange};
/// use tilestream::refine::{Refinement, RefinementPolicy};
///
/// let layer = web_mercator_layer("osm", ZoomRange::new(0, 18), "{z}/{x}/{y}").unwrap();
/// let policy = RefinementPolicy::new(16.0);
/// let tile = TileAddress::new(4, 3, 3, CrsId::Epsg3857).unwrap();
///
/// assert_eq!(policy.classify(&tile, 40.0, &layer), Refinement::Subdivide);
/// assert_eq!(
///     policy.classify(&tile, 2.0, &layer),
///     Refinement::Display { effective: tile }
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefinementPolicy {
    threshold: f64,
    max_depth: Option<u32>,
}

impl RefinementPolicy {
    /// Creates a policy subdividing tiles whose metric exceeds `threshold`.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            max_depth: None,
        }
    }

    /// Sets the deepest level the tree may be subdivided to.
    ///
    /// Without it the layer's `zoom.max` is the deepest level. Candidates
    /// below `zoom.min` that cannot subdivide further are out of range.
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// The configured depth limit, if any.
    pub fn explicit_max_depth(&self) -> Option<u32> {
        self.max_depth
    }

    /// Deepest subdividable level for `layer`.
    pub fn max_depth(&self, layer: &LayerConfig) -> u32 {
        self.max_depth.unwrap_or(layer.zoom.max)
    }

    /// Classifies one candidate tile.
    pub fn classify(&self, address: &TileAddress, metric: f64, layer: &LayerConfig) -> Refinement {
        let zoom = layer.zoom;
        let max_depth = self.max_depth(layer);

        if address.level < zoom.min {
            return if address.level < max_depth {
                Refinement::Subdivide
            } else {
                Refinement::OutOfRange
            };
        }

        if address.level > zoom.max {
            return Refinement::Display {
                effective: address.parent_at(zoom.max),
            };
        }

        if metric > self.threshold && address.level < max_depth {
            Refinement::Subdivide
        } else {
            Refinement::Display {
                effective: *address,
            }
        }
    }
}

impl Default for RefinementPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::CrsId;
    use crate::layer::{web_mercator_layer, ZoomRange};

    fn layer(min: u32, max: u32) -> LayerConfig {
        web_mercator_layer("test", ZoomRange::new(min, max), "{z}/{x}/{y}").unwrap()
    }

    fn addr(level: u32, row: u32, col: u32) -> TileAddress {
        TileAddress::new(level, row, col, CrsId::Epsg3857).unwrap()
    }

    #[test]
    fn test_below_min_always_refines() {
        let policy = RefinementPolicy::new(16.0);
        let layer = layer(3, 10);

        // Even a tile that needs no refinement cannot be displayed below min.
        assert_eq!(
            policy.classify(&addr(1, 0, 0), 0.0, &layer),
            Refinement::Subdivide
        );
    }

    #[test]
    fn test_below_min_without_children_is_out_of_range() {
        let policy = RefinementPolicy::new(16.0).with_max_depth(2);
        let layer = layer(3, 10);

        assert_eq!(
            policy.classify(&addr(2, 1, 1), 100.0, &layer),
            Refinement::OutOfRange
        );
    }

    #[test]
    fn test_above_max_clamps_to_ancestor() {
        let policy = RefinementPolicy::new(16.0).with_max_depth(22);
        let layer = layer(0, 18);
        let deep = addr(20, 4000, 9000);

        let decision = policy.classify(&deep, 100.0, &layer);
        assert_eq!(
            decision,
            Refinement::Display {
                effective: deep.parent_at(18)
            }
        );
        assert_eq!(decision.effective().map(|a| a.level), Some(18));
    }

    #[test]
    fn test_metric_above_threshold_subdivides() {
        let policy = RefinementPolicy::new(16.0);
        let layer = layer(0, 18);

        assert!(policy.classify(&addr(5, 1, 1), 16.5, &layer).is_subdivide());
        // Equal to the threshold is not above it.
        assert!(!policy.classify(&addr(5, 1, 1), 16.0, &layer).is_subdivide());
    }

    #[test]
    fn test_max_depth_stops_subdivision() {
        let policy = RefinementPolicy::new(16.0);
        let layer = layer(0, 18);
        let leaf = addr(18, 100, 100);

        assert_eq!(
            policy.classify(&leaf, 1_000.0, &layer),
            Refinement::Display { effective: leaf }
        );
    }

    #[test]
    fn test_classification_is_deterministic() {
        let policy = RefinementPolicy::default();
        let layer = layer(2, 14);
        let a = addr(9, 200, 301);

        let first = policy.classify(&a, 20.0, &layer);
        for _ in 0..10 {
            assert_eq!(policy.classify(&a, 20.0, &layer), first);
        }
    }
}
