//! Raster tiles via the `image` crate.

use image::ImageReader;
use std::io::Cursor;
use tracing::trace;

use super::{ContentDecoder, ContentPayload, DecodeError, RasterImage};
use crate::coord::TileAddress;

/// Decodes PNG and JPEG tiles to RGBA8.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterDecoder;

impl ContentDecoder for RasterDecoder {
    fn decode(&self, address: &TileAddress, bytes: &[u8]) -> Result<ContentPayload, DecodeError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| DecodeError::Image(e.to_string()))?;
        let format = reader
            .format()
            .ok_or_else(|| DecodeError::Image("unrecognized image format".to_string()))?;
        let image = reader
            .decode()
            .map_err(|e| DecodeError::Image(e.to_string()))?
            .to_rgba8();

        trace!(
            address = %address,
            width = image.width(),
            height = image.height(),
            format = ?format,
            "Raster tile decoded"
        );

        Ok(ContentPayload::Raster(RasterImage { image, format }))
    }

    fn name(&self) -> &str {
        "raster"
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::coord::CrsId;
    use image::{ImageFormat, Rgba, RgbaImage};

    pub(crate) fn encode_png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 128]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let payload = RasterDecoder
            .decode(&TileAddress::root(CrsId::Epsg3857), &encode_png(4, 3))
            .unwrap();

        match payload {
            ContentPayload::Raster(raster) => {
                assert_eq!((raster.width(), raster.height()), (4, 3));
                assert_eq!(raster.format, ImageFormat::Png);
                assert_eq!(raster.image.get_pixel(0, 0), &Rgba([10, 20, 30, 128]));
            }
            other => panic!("expected raster, got {}", other.kind()),
        }
    }

    #[test]
    fn test_decode_truncated_png() {
        let mut bytes = encode_png(8, 8);
        bytes.truncate(bytes.len() / 2);

        assert!(matches!(
            RasterDecoder.decode(&TileAddress::root(CrsId::Epsg3857), &bytes),
            Err(DecodeError::Image(_))
        ));
    }
}
