//! `tileset.json` model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Column-major 4x4 identity.
pub const IDENTITY_TRANSFORM: [f64; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Root descriptor of a tileset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TilesetDescriptor {
    pub asset: Asset,
    pub geometric_error: f64,
    pub root: TileDescriptor,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions_used: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions_required: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tileset_version: Option<String>,
}

/// One node of the descriptor tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileDescriptor {
    pub bounding_volume: BoundingVolume,
    pub geometric_error: f64,
    /// Inherited from the parent when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refine: Option<Refine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TileDescriptor>,
    /// Column-major local transform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<[f64; 16]>,
}

/// Refinement mode of a node's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Refine {
    #[serde(rename = "ADD", alias = "add")]
    Add,
    #[default]
    #[serde(rename = "REPLACE", alias = "replace")]
    Replace,
}

/// Content reference of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDescriptor {
    /// Relative to the tileset's base URL; legacy tilesets call it `url`
    #[serde(alias = "url")]
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_volume: Option<BoundingVolume>,
}

/// Bounding volume: exactly one of box, region or sphere is expected.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingVolume {
    /// Center followed by three half-axis vectors
    #[serde(rename = "box", default, skip_serializing_if = "Option::is_none")]
    pub oriented_box: Option<[f64; 12]>,
    /// west, south, east, north (radians), min height, max height
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<[f64; 6]>,
    /// Center and radius
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sphere: Option<[f64; 4]>,
}

impl BoundingVolume {
    pub fn is_defined(&self) -> bool {
        self.oriented_box.is_some() || self.region.is_some() || self.sphere.is_some()
    }

    /// Axis-aligned horizontal bounds `(west, south, east, north)`.
    ///
    /// Regions give their angular bounds; boxes and spheres their x/y
    /// extent around the center.
    pub fn horizontal_bounds(&self) -> Option<(f64, f64, f64, f64)> {
        if let Some([west, south, east, north, _, _]) = self.region {
            return Some((west, south, east, north));
        }
        if let Some(b) = self.oriented_box {
            let half_x = b[3].abs() + b[6].abs() + b[9].abs();
            let half_y = b[4].abs() + b[7].abs() + b[10].abs();
            return Some((b[0] - half_x, b[1] - half_y, b[0] + half_x, b[1] + half_y));
        }
        self.sphere
            .map(|[x, y, _, r]| (x - r, y - r, x + r, y + r))
    }
}

/// Composes column-major transforms: `parent * local`.
pub fn compose(parent: &[f64; 16], local: &[f64; 16]) -> [f64; 16] {
    let mut out = [0.0; 16];
    for col in 0..4 {
        for row in 0..4 {
            out[col * 4 + row] = (0..4)
                .map(|k| parent[k * 4 + row] * local[col * 4 + k])
                .sum();
        }
    }
    out
}
