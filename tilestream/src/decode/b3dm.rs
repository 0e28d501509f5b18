//! Batched 3D model (`b3dm`) container.
//!
//! Layout: a 28-byte little-endian header, the feature table (JSON + binary),
//! the batch table (JSON + binary), then the glTF body. Only the tables are
//! interpreted; the glTF is passed through.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::{ContentDecoder, ContentPayload, DecodeError, MeshContent};
use crate::coord::TileAddress;
use crate::extension::ExtensionRegistry;
use crate::semantic::{SemanticError, SemanticTable};

/// Container magic.
pub const B3DM_MAGIC: &[u8; 4] = b"b3dm";

/// Header size in bytes.
pub const B3DM_HEADER_LEN: usize = 28;

/// Parsed container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct B3dmHeader {
    pub version: u32,
    pub byte_length: u32,
    pub feature_table_json_len: u32,
    pub feature_table_binary_len: u32,
    pub batch_table_json_len: u32,
    pub batch_table_binary_len: u32,
}

impl B3dmHeader {
    /// Parses and validates the header against the buffer length.
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < B3DM_HEADER_LEN {
            return Err(DecodeError::Truncated {
                expected: B3DM_HEADER_LEN,
                actual: bytes.len(),
            });
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        if &magic != B3DM_MAGIC {
            return Err(DecodeError::InvalidMagic { found: magic });
        }

        let word = |index: usize| {
            let start = 4 + index * 4;
            u32::from_le_bytes([
                bytes[start],
                bytes[start + 1],
                bytes[start + 2],
                bytes[start + 3],
            ])
        };

        let header = Self {
            version: word(0),
            byte_length: word(1),
            feature_table_json_len: word(2),
            feature_table_binary_len: word(3),
            batch_table_json_len: word(4),
            batch_table_binary_len: word(5),
        };

        if header.version != 1 {
            return Err(DecodeError::UnsupportedVersion(header.version));
        }
        let required = header.body_offset();
        if (header.byte_length as usize) < required || bytes.len() < header.byte_length as usize {
            return Err(DecodeError::Truncated {
                expected: required.max(header.byte_length as usize),
                actual: bytes.len(),
            });
        }

        Ok(header)
    }

    /// Offset of the glTF body.
    pub fn body_offset(&self) -> usize {
        B3DM_HEADER_LEN
            + self.feature_table_json_len as usize
            + self.feature_table_binary_len as usize
            + self.batch_table_json_len as usize
            + self.batch_table_binary_len as usize
    }
}

/// Splits off the next `len` bytes.
fn take<'a>(bytes: &'a [u8], cursor: &mut usize, len: u32) -> &'a [u8] {
    let start = *cursor;
    *cursor += len as usize;
    &bytes[start..*cursor]
}

/// Parses a JSON chunk, tolerating the space/NUL padding writers add.
fn parse_json_chunk(chunk: &[u8]) -> Result<Value, String> {
    let end = chunk
        .iter()
        .rposition(|b| !matches!(b, b' ' | 0))
        .map_or(0, |i| i + 1);
    if end == 0 {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&chunk[..end]).map_err(|e| e.to_string())
}

/// Reads `RTC_CENTER`, either inline or as a FLOAT VEC3 in the binary body.
fn rtc_center(feature_table: &Value, binary: &[u8]) -> Result<Option<[f64; 3]>, DecodeError> {
    let Some(value) = feature_table.get("RTC_CENTER") else {
        return Ok(None);
    };

    if let Some(items) = value.as_array() {
        let coords: Option<Vec<f64>> = items.iter().map(Value::as_f64).collect();
        return match coords.as_deref() {
            Some([x, y, z]) => Ok(Some([*x, *y, *z])),
            _ => Err(DecodeError::FeatureTable(
                "RTC_CENTER must hold three numbers".to_string(),
            )),
        };
    }

    let offset = value
        .get("byteOffset")
        .and_then(Value::as_u64)
        .ok_or_else(|| DecodeError::FeatureTable("invalid RTC_CENTER".to_string()))?
        as usize;
    let outside = || DecodeError::FeatureTable("RTC_CENTER is outside the binary body".to_string());
    let end = offset.checked_add(12).ok_or_else(outside)?;
    let raw = binary.get(offset..end).ok_or_else(outside)?;
    let component = |i: usize| {
        f64::from(f32::from_le_bytes([
            raw[i * 4],
            raw[i * 4 + 1],
            raw[i * 4 + 2],
            raw[i * 4 + 3],
        ]))
    };
    Ok(Some([component(0), component(1), component(2)]))
}

/// Decodes `b3dm` tiles, building a semantic table from the batch table.
#[derive(Debug, Clone)]
pub struct B3dmDecoder {
    registry: Arc<ExtensionRegistry>,
}

impl B3dmDecoder {
    pub fn new(registry: Arc<ExtensionRegistry>) -> Self {
        Self { registry }
    }
}

impl ContentDecoder for B3dmDecoder {
    fn decode(&self, address: &TileAddress, bytes: &[u8]) -> Result<ContentPayload, DecodeError> {
        let header = B3dmHeader::parse(bytes)?;
        let mut cursor = B3DM_HEADER_LEN;

        let feature_json = take(bytes, &mut cursor, header.feature_table_json_len);
        let feature_binary = take(bytes, &mut cursor, header.feature_table_binary_len);
        let batch_json = take(bytes, &mut cursor, header.batch_table_json_len);
        let batch_binary = take(bytes, &mut cursor, header.batch_table_binary_len);
        let gltf = &bytes[cursor..header.byte_length as usize];

        let feature_table = parse_json_chunk(feature_json).map_err(DecodeError::FeatureTable)?;
        let batch_length = feature_table
            .get("BATCH_LENGTH")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| DecodeError::FeatureTable("BATCH_LENGTH is required".to_string()))?;
        let rtc_center = rtc_center(&feature_table, feature_binary)?;

        let semantic = if header.batch_table_json_len > 0 {
            let batch_table = parse_json_chunk(batch_json).map_err(SemanticError::InvalidTable)?;
            let table = SemanticTable::from_batch_table(
                &batch_table,
                batch_binary,
                batch_length,
                &self.registry,
            )?;
            Some(Arc::new(table))
        } else {
            None
        };

        debug!(
            address = %address,
            batch_length,
            gltf_bytes = gltf.len(),
            has_batch_table = semantic.is_some(),
            "b3dm tile decoded"
        );

        Ok(ContentPayload::Mesh(MeshContent {
            gltf: gltf.to_vec(),
            rtc_center,
            batch_length,
            semantic,
        }))
    }

    fn name(&self) -> &str {
        "b3dm"
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::coord::CrsId;
    use crate::extension::BATCH_TABLE_HIERARCHY;
    use serde_json::json;

    /// Assembles a b3dm container from its parts.
    pub(crate) fn build_b3dm(
        feature_json: &str,
        feature_binary: &[u8],
        batch_json: &[u8],
        batch_binary: &[u8],
        gltf: &[u8],
    ) -> Vec<u8> {
        let total = B3DM_HEADER_LEN
            + feature_json.len()
            + feature_binary.len()
            + batch_json.len()
            + batch_binary.len()
            + gltf.len();

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(B3DM_MAGIC);
        for word in [
            1,
            total,
            feature_json.len(),
            feature_binary.len(),
            batch_json.len(),
            batch_binary.len(),
        ] {
            out.extend_from_slice(&(word as u32).to_le_bytes());
        }
        out.extend_from_slice(feature_json.as_bytes());
        out.extend_from_slice(feature_binary);
        out.extend_from_slice(batch_json);
        out.extend_from_slice(batch_binary);
        out.extend_from_slice(gltf);
        out
    }

    fn decode(bytes: &[u8]) -> Result<MeshContent, DecodeError> {
        let decoder = B3dmDecoder::new(Arc::new(ExtensionRegistry::with_builtin()));
        match decoder.decode(&TileAddress::root(CrsId::Local), bytes)? {
            ContentPayload::Mesh(mesh) => Ok(mesh),
            other => panic!("expected mesh, got {}", other.kind()),
        }
    }

    #[test]
    fn test_decode_with_batch_table() {
        let batch = json!({"name": ["door", "window"], "height": [2.1, 1.2]}).to_string();
        let bytes = build_b3dm(
            r#"{"BATCH_LENGTH":2,"RTC_CENTER":[1.0,2.0,3.0]}  "#,
            b"",
            batch.as_bytes(),
            b"",
            b"glTF-body",
        );

        let mesh = decode(&bytes).unwrap();
        assert_eq!(mesh.batch_length, 2);
        assert_eq!(mesh.rtc_center, Some([1.0, 2.0, 3.0]));
        assert_eq!(mesh.gltf, b"glTF-body");

        let table = mesh.semantic.unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.property(1, "name").unwrap(), Some(&json!("window")));
    }

    #[test]
    fn test_decode_binary_rtc_center() {
        let mut binary = Vec::new();
        for v in [10.0f32, 20.0, 30.0] {
            binary.extend_from_slice(&v.to_le_bytes());
        }
        let bytes = build_b3dm(
            r#"{"BATCH_LENGTH":0,"RTC_CENTER":{"byteOffset":0}}"#,
            &binary,
            b"",
            b"",
            b"",
        );

        let mesh = decode(&bytes).unwrap();
        assert_eq!(mesh.rtc_center, Some([10.0, 20.0, 30.0]));
        assert!(mesh.semantic.is_none());
    }

    #[test]
    fn test_rtc_center_offset_out_of_range() {
        for offset in [u64::MAX, 4] {
            let feature = format!(
                r#"{{"BATCH_LENGTH":0,"RTC_CENTER":{{"byteOffset":{}}}}}"#,
                offset
            );
            let bytes = build_b3dm(&feature, &[0u8; 12], b"", b"", b"glTF");

            let err = decode(&bytes).unwrap_err();
            assert!(matches!(err, DecodeError::FeatureTable(_)));
        }
    }

    #[test]
    fn test_decode_hierarchy_extension() {
        let batch = json!({
            "extensions": {
                BATCH_TABLE_HIERARCHY: {
                    "classes": [{"name": "Roof", "length": 1, "instances": {"material": ["slate"]}}],
                    "instancesLength": 1,
                    "classIds": [0]
                }
            }
        })
        .to_string();
        let bytes = build_b3dm(r#"{"BATCH_LENGTH":1}"#, b"", batch.as_bytes(), b"", b"");

        let table = decode(&bytes).unwrap().semantic.unwrap();
        let info = table.extension_info(0).unwrap();
        assert_eq!(info[BATCH_TABLE_HIERARCHY]["class"], json!("Roof"));
    }

    #[test]
    fn test_missing_batch_length() {
        let bytes = build_b3dm("{}", b"", b"", b"", b"");
        assert!(matches!(decode(&bytes), Err(DecodeError::FeatureTable(_))));
    }

    #[test]
    fn test_header_errors() {
        assert!(matches!(
            B3dmHeader::parse(b"b3dm"),
            Err(DecodeError::Truncated { .. })
        ));

        let mut bytes = build_b3dm(r#"{"BATCH_LENGTH":0}"#, b"", b"", b"", b"");
        bytes[..4].copy_from_slice(b"i3dm");
        assert!(matches!(
            B3dmHeader::parse(&bytes),
            Err(DecodeError::InvalidMagic { .. })
        ));

        let mut bytes = build_b3dm(r#"{"BATCH_LENGTH":0}"#, b"", b"", b"", b"");
        bytes[4] = 2;
        assert_eq!(
            B3dmHeader::parse(&bytes),
            Err(DecodeError::UnsupportedVersion(2))
        );

        let mut bytes = build_b3dm(r#"{"BATCH_LENGTH":0}"#, b"", b"", b"", b"body");
        bytes.truncate(bytes.len() - 2);
        assert!(matches!(
            B3dmHeader::parse(&bytes),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_header_body_offset() {
        let bytes = build_b3dm(r#"{"BATCH_LENGTH":0}"#, b"abcd", b"{}", b"", b"gl");
        let header = B3dmHeader::parse(&bytes).unwrap();
        assert_eq!(header.body_offset(), bytes.len() - 2);
    }
}
