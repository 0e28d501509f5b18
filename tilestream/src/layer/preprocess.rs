//! Layer setup: validation and normalization of raw layer options.

use thiserror::Error;
use tracing::debug;

use super::config::{
    Extent, LayerConfig, LayerOptions, Origin, TilingScheme, ZoomRange, DEFAULT_ZOOM_RANGE,
};
use super::template::{TemplateError, UrlTemplate};
use crate::coord::CrsId;

/// Fatal layer configuration errors, raised at layer setup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    /// The layer declares no extent
    #[error("layer '{layer}': an extent is required")]
    MissingExtent { layer: String },

    /// The layer declares no projection
    #[error("layer '{layer}': a projection (coordinate reference system) is required")]
    MissingProjection { layer: String },

    /// Projection string could not be understood
    #[error("layer '{layer}': invalid projection '{projection}'")]
    InvalidCrs { layer: String, projection: String },

    /// Zoom range is inverted
    #[error("layer '{layer}': zoom min {min} is greater than zoom max {max}")]
    InvalidZoomRange { layer: String, min: u32, max: u32 },

    /// Origin string is not one of the known values
    #[error("layer '{layer}': invalid origin '{origin}' (expected top or bottom)")]
    InvalidOrigin { layer: String, origin: String },

    /// Extent bounds are inverted or not finite
    #[error("layer '{layer}': invalid extent ({reason})")]
    InvalidExtent { layer: String, reason: String },

    /// URL template could not be parsed
    #[error("layer '{layer}': {source}")]
    InvalidUrlTemplate {
        layer: String,
        #[source]
        source: TemplateError,
    },

    /// A URL template is needed but the layer has none
    #[error("layer '{layer}': a URL template is required to fetch tiles")]
    MissingUrlTemplate { layer: String },
}

/// Validates and normalizes a raw layer description.
///
/// - extent and projection must both be present; the error names the layer
/// - `origin` is normalized (`top`/`topleft`, `bottom`/`bottomleft`), and
///   defaults from the tiling scheme
/// - `zoom` defaults to `{ min: 0, max: 18 }`
///
/// # Example
///
/// ```
/// use tilestream::layer::{preprocess_data_layer, ExtentOptions, LayerOptions, ZoomRange};
///
/// let options = LayerOptions {
///     id: "ortho".into(),
///     projection: Some("EPSG:3857".into()),
///     extent: Some(ExtentOptions { west: -1.0, south: -1.0, east: 1.0, north: 1.0 }),
///     ..Default::default()
/// };
/// let layer = preprocess_data_layer(options).unwrap();
/// assert_eq!(layer.zoom, ZoomRange::new(0, 18));
/// ```
pub fn preprocess_data_layer(options: LayerOptions) -> Result<LayerConfig, ConfigurationError> {
    let layer = options.id.clone();

    let bounds = options
        .extent
        .ok_or_else(|| ConfigurationError::MissingExtent {
            layer: layer.clone(),
        })?;
    let projection =
        options
            .projection
            .as_deref()
            .ok_or_else(|| ConfigurationError::MissingProjection {
                layer: layer.clone(),
            })?;
    let crs: CrsId = projection
        .parse()
        .map_err(|_| ConfigurationError::InvalidCrs {
            layer: layer.clone(),
            projection: projection.to_string(),
        })?;

    let finite = [bounds.west, bounds.south, bounds.east, bounds.north]
        .iter()
        .all(|v| v.is_finite());
    if !finite || bounds.west > bounds.east || bounds.south > bounds.north {
        return Err(ConfigurationError::InvalidExtent {
            layer,
            reason: format!(
                "west={} south={} east={} north={}",
                bounds.west, bounds.south, bounds.east, bounds.north
            ),
        });
    }

    let zoom = options.zoom.unwrap_or(DEFAULT_ZOOM_RANGE);
    if zoom.min > zoom.max {
        return Err(ConfigurationError::InvalidZoomRange {
            layer,
            min: zoom.min,
            max: zoom.max,
        });
    }

    let scheme = options.scheme.unwrap_or_default();
    let origin = match options.origin.as_deref() {
        Some(text) => normalize_origin(text).ok_or_else(|| ConfigurationError::InvalidOrigin {
            layer: layer.clone(),
            origin: text.to_string(),
        })?,
        None => scheme.default_origin(),
    };

    let url_template = options
        .url
        .as_deref()
        .map(UrlTemplate::parse)
        .transpose()
        .map_err(|source| ConfigurationError::InvalidUrlTemplate {
            layer: layer.clone(),
            source,
        })?;

    debug!(
        layer = %layer,
        crs = %crs,
        zoom_min = zoom.min,
        zoom_max = zoom.max,
        origin = ?origin,
        "Layer preprocessed"
    );

    Ok(LayerConfig {
        id: options.id,
        extent: Extent {
            crs,
            west: bounds.west,
            south: bounds.south,
            east: bounds.east,
            north: bounds.north,
        },
        zoom,
        origin,
        scheme,
        url_template,
        is_transparent: options.transparent,
        network: options.network_options,
        level_limits: options.tile_matrix_set_limits,
    })
}

fn normalize_origin(text: &str) -> Option<Origin> {
    match text.trim().to_ascii_lowercase().as_str() {
        "top" | "topleft" | "top-left" => Some(Origin::Top),
        "bottom" | "bottomleft" | "bottom-left" => Some(Origin::Bottom),
        _ => None,
    }
}

impl LayerConfig {
    /// Returns the layer's URL template, or the error naming this layer.
    pub fn require_url_template(&self) -> Result<&UrlTemplate, ConfigurationError> {
        self.url_template
            .as_ref()
            .ok_or_else(|| ConfigurationError::MissingUrlTemplate {
                layer: self.id.clone(),
            })
    }
}

/// Convenience constructor used by tests and tools: a Web Mercator layer
/// covering the whole world with the given zoom range and template.
pub fn web_mercator_layer(
    id: &str,
    zoom: ZoomRange,
    url: &str,
) -> Result<LayerConfig, ConfigurationError> {
    const HALF_WORLD: f64 = 20_037_508.342_789_244;
    preprocess_data_layer(LayerOptions {
        id: id.to_string(),
        projection: Some(CrsId::Epsg3857.to_string()),
        extent: Some(super::config::ExtentOptions {
            west: -HALF_WORLD,
            south: -HALF_WORLD,
            east: HALF_WORLD,
            north: HALF_WORLD,
        }),
        zoom: Some(zoom),
        scheme: Some(TilingScheme::Xyz),
        url: Some(url.to_string()),
        ..Default::default()
    })
}
