//! Layer configuration types.
//!
//! [`LayerOptions`] is the raw, user-supplied description of a dataset as
//! found in a layer JSON file. [`preprocess_data_layer`](super::preprocess_data_layer)
//! validates it into a [`LayerConfig`], which is what the rest of the engine
//! consumes.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::template::UrlTemplate;
use crate::coord::CrsId;

/// Default zoom range applied when a layer does not declare one.
pub const DEFAULT_ZOOM_RANGE: ZoomRange = ZoomRange { min: 0, max: 18 };

/// Inclusive range of pyramid levels a source provides data for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoomRange {
    pub min: u32,
    pub max: u32,
}

impl ZoomRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Returns true if `level` lies within the range.
    #[inline]
    pub fn contains(&self, level: u32) -> bool {
        (self.min..=self.max).contains(&level)
    }
}

impl Default for ZoomRange {
    fn default() -> Self {
        DEFAULT_ZOOM_RANGE
    }
}

/// Direction the row axis runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Row 0 is the northernmost row (XYZ, WMTS)
    Top,
    /// Row 0 is the southernmost row (TMS)
    Bottom,
}

/// Tiling convention of the remote source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TilingScheme {
    #[default]
    Xyz,
    Tms,
    Wmts,
}

impl TilingScheme {
    /// Row origin used when a layer does not state one.
    pub fn default_origin(&self) -> Origin {
        match self {
            TilingScheme::Xyz | TilingScheme::Wmts => Origin::Top,
            TilingScheme::Tms => Origin::Bottom,
        }
    }
}

/// Bounds of a dataset, expressed in its coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub crs: CrsId,
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

/// Raw extent bounds as written in a layer file (CRS comes from `projection`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtentOptions {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

/// Row/column window that holds data at one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileLimits {
    pub min_row: u32,
    pub max_row: u32,
    pub min_col: u32,
    pub max_col: u32,
}

impl TileLimits {
    /// Returns true if the row/column pair lies within the window.
    #[inline]
    pub fn contains(&self, row: u32, col: u32) -> bool {
        (self.min_row..=self.max_row).contains(&row) && (self.min_col..=self.max_col).contains(&col)
    }
}

/// Options handed to the transport with every request of a layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkOptions {
    /// Extra request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Per-request timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl NetworkOptions {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Raw layer description as deserialized from JSON.
///
/// # Example
///
/// ```
/// use tilestream::layer::LayerOptions;
///
/// let json = r#"{
///     "id": "ortho",
///     "projection": "EPSG:3857",
///     "extent": { "west": -20037508.34, "south": -20037508.34,
///                 "east": 20037508.34, "north": 20037508.34 },
///     "url": "https://tiles.example.com/{z}/{x}/{y}.png"
/// }"#;
/// let options: LayerOptions = serde_json::from_str(json).unwrap();
/// assert_eq!(options.id, "ortho");
/// assert!(options.zoom.is_none());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerOptions {
    pub id: String,
    #[serde(default)]
    pub extent: Option<ExtentOptions>,
    #[serde(default)]
    pub projection: Option<String>,
    #[serde(default)]
    pub zoom: Option<ZoomRange>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub scheme: Option<TilingScheme>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub transparent: bool,
    #[serde(default)]
    pub network_options: NetworkOptions,
    #[serde(default)]
    pub tile_matrix_set_limits: BTreeMap<u32, TileLimits>,
}

/// Validated, normalized per-dataset configuration.
#[derive(Debug, Clone)]
pub struct LayerConfig {
    /// Layer identifier, used in errors and logs
    pub id: String,
    /// Dataset bounds
    pub extent: Extent,
    /// Levels the source provides data for
    pub zoom: ZoomRange,
    /// Row axis direction
    pub origin: Origin,
    /// Tiling convention of the source
    pub scheme: TilingScheme,
    /// Source locator pattern, absent for layers fed by a tileset
    pub url_template: Option<UrlTemplate>,
    /// Whether the consumer should premultiply alpha
    pub is_transparent: bool,
    /// Transport options
    pub network: NetworkOptions,
    /// Optional per-level row/column windows
    pub level_limits: BTreeMap<u32, TileLimits>,
}

impl LayerConfig {
    /// Coordinate reference system of the layer's pyramid.
    pub fn crs(&self) -> CrsId {
        self.extent.crs
    }
}
