//! Mapping tile addresses to content URLs.

use super::error::LocatorError;
use crate::coord::TileAddress;
use crate::layer::{ConfigurationError, LayerConfig, Origin, UrlTemplate};

/// Maps a tile address to the URL its content is fetched from.
pub trait TileLocator: Send + Sync {
    fn locate(&self, address: &TileAddress) -> Result<String, LocatorError>;
}

/// Locator expanding a layer's URL template.
#[derive(Debug, Clone)]
pub struct TemplateLocator {
    template: UrlTemplate,
    origin: Origin,
}

impl TemplateLocator {
    pub fn new(template: UrlTemplate, origin: Origin) -> Self {
        Self { template, origin }
    }

    /// Builds the locator for `layer`; fails if the layer has no template.
    pub fn from_layer(layer: &LayerConfig) -> Result<Self, ConfigurationError> {
        Ok(Self::new(layer.require_url_template()?.clone(), layer.origin))
    }
}

impl TileLocator for TemplateLocator {
    fn locate(&self, address: &TileAddress) -> Result<String, LocatorError> {
        Ok(self.template.expand(address, self.origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::CrsId;
    use crate::layer::{web_mercator_layer, ZoomRange};

    #[test]
    fn test_template_locator_from_layer() {
        let layer =
            web_mercator_layer("osm", ZoomRange::new(0, 18), "https://t/{z}/{x}/{y}.png").unwrap();
        let locator = TemplateLocator::from_layer(&layer).unwrap();
        let address = TileAddress::new(2, 1, 3, CrsId::Epsg3857).unwrap();

        assert_eq!(locator.locate(&address).unwrap(), "https://t/2/3/1.png");
    }

    #[test]
    fn test_bottom_origin_flips_rows() {
        let template = UrlTemplate::parse("https://t/{TileMatrix}/{TileRow}/{TileCol}").unwrap();
        let locator = TemplateLocator::new(template, Origin::Bottom);
        let address = TileAddress::new(2, 0, 3, CrsId::Epsg3857).unwrap();

        assert_eq!(locator.locate(&address).unwrap(), "https://t/2/3/3");
    }
}
