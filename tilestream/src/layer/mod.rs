//! Per-dataset layer configuration.
//!
//! A layer describes one tiled source: its extent and projection, the zoom
//! range it serves, the row origin and the URL template tiles are fetched
//! from. Raw [`LayerOptions`] are validated by [`preprocess_data_layer`],
//! which fails fast on missing extent or projection.

mod config;
mod limits;
mod preprocess;
mod template;

pub use config::{
    Extent, ExtentOptions, LayerConfig, LayerOptions, NetworkOptions, Origin, TileLimits,
    TilingScheme, ZoomRange, DEFAULT_ZOOM_RANGE,
};
pub use limits::{tile_inside_limit, tile_texture_count};
pub use preprocess::{preprocess_data_layer, web_mercator_layer, ConfigurationError};
pub use template::{TemplateError, UrlTemplate};
