//! Content decoding.
//!
//! The fetch pipeline hands raw tile bytes to a [`ContentDecoder`] on a
//! blocking thread. Decoders produce a [`ContentPayload`]: either a raster
//! image or mesh content whose glTF body stays opaque.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tilestream::decode::{AutoDecoder, ContentDecoder};
//! use tilestream::extension::ExtensionRegistry;
//!
//! let decoder: Arc<dyn ContentDecoder> =
//!     Arc::new(AutoDecoder::new(Arc::new(ExtensionRegistry::with_builtin())));
//! assert_eq!(decoder.name(), "auto");
//! ```

mod b3dm;
mod raster;

pub use b3dm::{B3dmDecoder, B3dmHeader, B3DM_HEADER_LEN, B3DM_MAGIC};
pub use raster::RasterDecoder;

use std::sync::Arc;

use image::{ImageFormat, RgbaImage};
use thiserror::Error;

use crate::coord::TileAddress;
use crate::extension::ExtensionRegistry;
use crate::semantic::{SemanticError, SemanticTable};

/// Decoding errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// Image data could not be decoded
    #[error("Image decode failed: {0}")]
    Image(String),

    /// Input is shorter than its header declares
    #[error("Truncated content: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Input does not start with the expected magic bytes
    #[error("Invalid magic: {found:?}")]
    InvalidMagic { found: [u8; 4] },

    /// Container version is not supported
    #[error("Unsupported version {0}")]
    UnsupportedVersion(u32),

    /// Feature table is missing or malformed
    #[error("Invalid feature table: {0}")]
    FeatureTable(String),

    /// Batch table could not be interpreted
    #[error("Invalid batch table: {0}")]
    Semantic(#[from] SemanticError),
}

/// Decoded raster tile, always RGBA8.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pub image: RgbaImage,
    /// Encoding the tile was delivered in
    pub format: ImageFormat,
}

impl RasterImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Decoded mesh tile.
#[derive(Debug, Clone)]
pub struct MeshContent {
    /// Embedded glTF body, passed through untouched
    pub gltf: Vec<u8>,
    /// Relative-to-center origin of the mesh coordinates
    pub rtc_center: Option<[f64; 3]>,
    /// Number of features in the mesh
    pub batch_length: u32,
    /// Per-feature metadata, when the tile carries a batch table
    pub semantic: Option<Arc<SemanticTable>>,
}

/// Decoded tile content.
#[derive(Debug, Clone)]
pub enum ContentPayload {
    Raster(RasterImage),
    Mesh(MeshContent),
}

impl ContentPayload {
    /// Short content kind for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ContentPayload::Raster(_) => "raster",
            ContentPayload::Mesh(_) => "mesh",
        }
    }

    /// Approximate memory held by the payload.
    pub fn byte_size(&self) -> usize {
        match self {
            ContentPayload::Raster(raster) => raster.image.as_raw().len(),
            ContentPayload::Mesh(mesh) => mesh.gltf.len(),
        }
    }

    pub fn semantic_table(&self) -> Option<Arc<SemanticTable>> {
        match self {
            ContentPayload::Mesh(mesh) => mesh.semantic.clone(),
            ContentPayload::Raster(_) => None,
        }
    }
}

/// Trait for tile content decoders.
///
/// Implementations must be thread-safe; decoding runs on tokio's blocking
/// pool.
pub trait ContentDecoder: Send + Sync + 'static {
    /// Decodes the bytes fetched for `address`.
    fn decode(&self, address: &TileAddress, bytes: &[u8]) -> Result<ContentPayload, DecodeError>;

    /// Decoder name for logs.
    fn name(&self) -> &str;
}

impl<T: ContentDecoder + ?Sized> ContentDecoder for Arc<T> {
    fn decode(&self, address: &TileAddress, bytes: &[u8]) -> Result<ContentPayload, DecodeError> {
        (**self).decode(address, bytes)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Picks the decoder from the content's leading bytes: `b3dm` containers go
/// to [`B3dmDecoder`], everything else to [`RasterDecoder`].
#[derive(Debug, Clone)]
pub struct AutoDecoder {
    raster: RasterDecoder,
    b3dm: B3dmDecoder,
}

impl AutoDecoder {
    pub fn new(registry: Arc<ExtensionRegistry>) -> Self {
        Self {
            raster: RasterDecoder,
            b3dm: B3dmDecoder::new(registry),
        }
    }
}

impl ContentDecoder for AutoDecoder {
    fn decode(&self, address: &TileAddress, bytes: &[u8]) -> Result<ContentPayload, DecodeError> {
        if bytes.starts_with(B3DM_MAGIC) {
            self.b3dm.decode(address, bytes)
        } else {
            self.raster.decode(address, bytes)
        }
    }

    fn name(&self) -> &str {
        "auto"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::CrsId;

    #[test]
    fn test_auto_decoder_dispatch() {
        let decoder = AutoDecoder::new(Arc::new(ExtensionRegistry::new()));
        let address = TileAddress::root(CrsId::Local);

        let mesh = b3dm::tests::build_b3dm(r#"{"BATCH_LENGTH":0}"#, b"", b"", b"", b"glTF");
        let payload = decoder.decode(&address, &mesh).unwrap();
        assert_eq!(payload.kind(), "mesh");
        assert!(payload.semantic_table().is_none());

        let png = raster::tests::encode_png(2, 2);
        let payload = decoder.decode(&address, &png).unwrap();
        assert_eq!(payload.kind(), "raster");
        assert_eq!(payload.byte_size(), 2 * 2 * 4);
    }

    #[test]
    fn test_auto_decoder_rejects_garbage() {
        let decoder = AutoDecoder::new(Arc::new(ExtensionRegistry::new()));
        let result = decoder.decode(&TileAddress::root(CrsId::Epsg3857), b"not an image");
        assert!(matches!(result, Err(DecodeError::Image(_))));
    }
}
