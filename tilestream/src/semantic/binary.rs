//! Batch table column decoding.
//!
//! A column is either a JSON array with one entry per feature, or a reference
//! into the binary body: `{ "byteOffset": n, "componentType": "FLOAT", "type":
//! "VEC3" }`. Binary values are little-endian and tightly packed.

use serde_json::{Number, Value};

use super::SemanticError;

/// Scalar element type of a binary column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    Byte,
    UnsignedByte,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Float,
    Double,
}

impl ComponentType {
    fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "BYTE" => ComponentType::Byte,
            "UNSIGNED_BYTE" => ComponentType::UnsignedByte,
            "SHORT" => ComponentType::Short,
            "UNSIGNED_SHORT" => ComponentType::UnsignedShort,
            "INT" => ComponentType::Int,
            "UNSIGNED_INT" => ComponentType::UnsignedInt,
            "FLOAT" => ComponentType::Float,
            "DOUBLE" => ComponentType::Double,
            _ => return None,
        })
    }

    pub fn size(&self) -> usize {
        match self {
            ComponentType::Byte | ComponentType::UnsignedByte => 1,
            ComponentType::Short | ComponentType::UnsignedShort => 2,
            ComponentType::Int | ComponentType::UnsignedInt | ComponentType::Float => 4,
            ComponentType::Double => 8,
        }
    }

    fn read(&self, bytes: &[u8]) -> Value {
        match self {
            ComponentType::Byte => Value::from(bytes[0] as i8),
            ComponentType::UnsignedByte => Value::from(bytes[0]),
            ComponentType::Short => Value::from(i16::from_le_bytes([bytes[0], bytes[1]])),
            ComponentType::UnsignedShort => Value::from(u16::from_le_bytes([bytes[0], bytes[1]])),
            ComponentType::Int => Value::from(i32::from_le_bytes(le4(bytes))),
            ComponentType::UnsignedInt => Value::from(u32::from_le_bytes(le4(bytes))),
            ComponentType::Float => float(f64::from(f32::from_le_bytes(le4(bytes)))),
            ComponentType::Double => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[..8]);
                float(f64::from_le_bytes(raw))
            }
        }
    }
}

fn le4(bytes: &[u8]) -> [u8; 4] {
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

/// Number of components per element for a `type` string.
fn component_count(text: &str) -> Option<usize> {
    match text {
        "SCALAR" => Some(1),
        "VEC2" => Some(2),
        "VEC3" => Some(3),
        "VEC4" => Some(4),
        _ => None,
    }
}

/// Decodes a column definition into exactly `count` values.
pub(crate) fn column_values(
    name: &str,
    definition: &Value,
    binary: &[u8],
    count: usize,
) -> Result<Vec<Value>, SemanticError> {
    match definition {
        Value::Array(values) => {
            if values.len() < count {
                return Err(SemanticError::ColumnLength {
                    column: name.to_string(),
                    expected: count,
                    actual: values.len(),
                });
            }
            Ok(values[..count].to_vec())
        }
        Value::Object(map) if map.contains_key("byteOffset") => {
            read_binary_column(name, definition, binary, count)
        }
        _ => Err(SemanticError::InvalidColumn {
            column: name.to_string(),
            reason: "expected an array or a binary body reference".to_string(),
        }),
    }
}

fn read_binary_column(
    name: &str,
    reference: &Value,
    binary: &[u8],
    count: usize,
) -> Result<Vec<Value>, SemanticError> {
    let invalid = |reason: &str| SemanticError::InvalidColumn {
        column: name.to_string(),
        reason: reason.to_string(),
    };

    let offset = reference
        .get("byteOffset")
        .and_then(Value::as_u64)
        .ok_or_else(|| invalid("byteOffset must be a non-negative integer"))?
        as usize;
    let component = reference
        .get("componentType")
        .and_then(Value::as_str)
        .and_then(ComponentType::parse)
        .ok_or_else(|| invalid("unknown componentType"))?;
    let components = reference
        .get("type")
        .and_then(Value::as_str)
        .and_then(component_count)
        .ok_or_else(|| invalid("unknown type"))?;

    let stride = component.size() * components;
    let end = offset
        .checked_add(stride.saturating_mul(count))
        .filter(|end| *end <= binary.len())
        .ok_or_else(|| SemanticError::BinaryOutOfBounds {
            column: name.to_string(),
            offset,
            length: stride.saturating_mul(count),
            available: binary.len(),
        })?;

    let values = binary[offset..end]
        .chunks_exact(stride)
        .map(|element| {
            let mut parts = element
                .chunks_exact(component.size())
                .map(|bytes| component.read(bytes));
            if components == 1 {
                parts.next().unwrap_or(Value::Null)
            } else {
                Value::Array(parts.collect())
            }
        })
        .collect();

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_column() {
        let values = column_values("height", &json!([1, 2, 3]), &[], 3).unwrap();
        assert_eq!(values, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn test_short_json_column_is_rejected() {
        let err = column_values("height", &json!([1]), &[], 2).unwrap_err();
        assert!(matches!(
            err,
            SemanticError::ColumnLength {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_binary_scalar_column() {
        let mut binary = vec![0xFF, 0xFF]; // padding before the column
        binary.extend_from_slice(&7u16.to_le_bytes());
        binary.extend_from_slice(&300u16.to_le_bytes());

        let reference = json!({"byteOffset": 2, "componentType": "UNSIGNED_SHORT", "type": "SCALAR"});
        let values = column_values("id", &reference, &binary, 2).unwrap();
        assert_eq!(values, vec![json!(7), json!(300)]);
    }

    #[test]
    fn test_binary_vector_column() {
        let mut binary = Vec::new();
        for v in [1.5f32, -2.0, 0.25, 4.0, 5.0, 6.0] {
            binary.extend_from_slice(&v.to_le_bytes());
        }

        let reference = json!({"byteOffset": 0, "componentType": "FLOAT", "type": "VEC3"});
        let values = column_values("position", &reference, &binary, 2).unwrap();
        assert_eq!(values[0], json!([1.5, -2.0, 0.25]));
        assert_eq!(values[1], json!([4.0, 5.0, 6.0]));
    }

    #[test]
    fn test_binary_column_out_of_bounds() {
        let reference = json!({"byteOffset": 4, "componentType": "DOUBLE", "type": "SCALAR"});
        let err = column_values("area", &reference, &[0u8; 8], 1).unwrap_err();
        assert!(matches!(err, SemanticError::BinaryOutOfBounds { .. }));
    }

    #[test]
    fn test_unknown_component_type() {
        let reference = json!({"byteOffset": 0, "componentType": "HALF", "type": "SCALAR"});
        assert!(matches!(
            column_values("x", &reference, &[0u8; 8], 1),
            Err(SemanticError::InvalidColumn { .. })
        ));
    }
}
