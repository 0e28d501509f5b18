//! Coordinate type definitions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Deepest pyramid level an address may carry.
///
/// Row and column indices are `u32`, so a level beyond 31 could not be
/// represented.
pub const MAX_LEVEL: u32 = 31;

/// Coordinate reference system a tile pyramid is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CrsId {
    /// Web Mercator (`EPSG:3857`)
    Epsg3857,
    /// Geographic WGS84 (`EPSG:4326`)
    Epsg4326,
    /// Any other EPSG code
    Epsg(u32),
    /// Node of an explicit tileset tree, not part of a global pyramid
    Local,
}

impl fmt::Display for CrsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrsId::Epsg3857 => write!(f, "EPSG:3857"),
            CrsId::Epsg4326 => write!(f, "EPSG:4326"),
            CrsId::Epsg(code) => write!(f, "EPSG:{}", code),
            CrsId::Local => write!(f, "local"),
        }
    }
}

impl FromStr for CrsId {
    type Err = CoordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("local") {
            return Ok(CrsId::Local);
        }

        let code = trimmed
            .strip_prefix("EPSG:")
            .or_else(|| trimmed.strip_prefix("epsg:"))
            .ok_or_else(|| CoordError::InvalidCrs(s.to_string()))?;

        match code.parse::<u32>() {
            Ok(3857) => Ok(CrsId::Epsg3857),
            Ok(4326) => Ok(CrsId::Epsg4326),
            Ok(other) => Ok(CrsId::Epsg(other)),
            Err(_) => Err(CoordError::InvalidCrs(s.to_string())),
        }
    }
}

impl Serialize for CrsId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CrsId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Address of one cell in a tiled pyramid.
///
/// Each level doubles the row and column count of the level above it, so a
/// valid address satisfies `row, col < 2^level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileAddress {
    /// Pyramid level (0 is the coarsest)
    pub level: u32,
    /// Row index, counted from the layer's origin
    pub row: u32,
    /// Column index, counted from the west
    pub col: u32,
    /// Reference system of the pyramid
    pub crs: CrsId,
}

impl TileAddress {
    /// Creates an address, validating the row and column against the level.
    pub fn new(level: u32, row: u32, col: u32, crs: CrsId) -> Result<Self, CoordError> {
        if level > MAX_LEVEL {
            return Err(CoordError::InvalidLevel(level));
        }
        // Explicit tileset trees number their nodes freely within a level.
        if crs != CrsId::Local {
            let size = 1u64 << level;
            if u64::from(row) >= size || u64::from(col) >= size {
                return Err(CoordError::OutOfBounds { level, row, col });
            }
        }
        Ok(Self {
            level,
            row,
            col,
            crs,
        })
    }

    /// The root tile of a pyramid.
    pub const fn root(crs: CrsId) -> Self {
        Self {
            level: 0,
            row: 0,
            col: 0,
            crs,
        }
    }

    /// Returns the ancestor at `target_level`.
    ///
    /// Row and column are halved once per level step. When `target_level` is
    /// not above this address the address itself is returned.
    #[inline]
    pub fn parent_at(&self, target_level: u32) -> TileAddress {
        if target_level >= self.level {
            return *self;
        }
        let shift = self.level - target_level;
        TileAddress {
            level: target_level,
            row: self.row >> shift,
            col: self.col >> shift,
            crs: self.crs,
        }
    }

    /// Returns the direct parent, or `None` at level 0.
    pub fn parent(&self) -> Option<TileAddress> {
        if self.level == 0 {
            None
        } else {
            Some(self.parent_at(self.level - 1))
        }
    }

    /// Returns the four children in quadrant order: NW, NE, SW, SE.
    pub fn children(&self) -> [TileAddress; 4] {
        let level = self.level + 1;
        let (row, col) = (self.row * 2, self.col * 2);
        let crs = self.crs;
        [
            TileAddress { level, row, col, crs },
            TileAddress { level, row, col: col + 1, crs },
            TileAddress { level, row: row + 1, col, crs },
            TileAddress { level, row: row + 1, col: col + 1, crs },
        ]
    }

    /// Returns the other three children of this address's parent.
    pub fn siblings(&self) -> Vec<TileAddress> {
        match self.parent() {
            Some(parent) => parent
                .children()
                .into_iter()
                .filter(|child| child != self)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Returns true if repeated parent derivation from `other` reaches `self`.
    pub fn is_ancestor_of(&self, other: &TileAddress) -> bool {
        self.crs == other.crs && self.level < other.level && other.parent_at(self.level) == *self
    }

    /// Returns where this tile's footprint lies inside `parent`'s footprint.
    ///
    /// The rectangle is normalized to the parent's extent, with `x` growing
    /// with the column and `y` growing with the row.
    pub fn offset_to_parent(&self, parent: &TileAddress) -> Result<OffsetRect, CoordError> {
        if parent == self {
            return Ok(OffsetRect::IDENTITY);
        }
        if !parent.is_ancestor_of(self) {
            return Err(CoordError::NotAnAncestor {
                address: *self,
                parent: *parent,
            });
        }

        let depth = self.level - parent.level;
        let scale = 1.0 / (1u64 << depth) as f64;
        let mask = (1u64 << depth) - 1;
        let col_in_parent = (u64::from(self.col) & mask) as f64;
        let row_in_parent = (u64::from(self.row) & mask) as f64;

        Ok(OffsetRect {
            x: col_in_parent * scale,
            y: row_in_parent * scale,
            width: scale,
            height: scale,
        })
    }

    /// Number of rows (and columns) at this address's level.
    pub fn level_size(&self) -> u64 {
        1u64 << self.level
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}@{}", self.level, self.row, self.col, self.crs)
    }
}

/// Normalized sub-rectangle of a parent tile's footprint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffsetRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl OffsetRect {
    /// The whole footprint: no fallback took place.
    pub const IDENTITY: OffsetRect = OffsetRect {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for OffsetRect {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Errors that can occur when building or relating addresses.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    /// Level is deeper than the addressable range
    #[error("Invalid level: {0} (must be at most {MAX_LEVEL})")]
    InvalidLevel(u32),

    /// Row or column does not exist at the given level
    #[error("Tile ({row}, {col}) does not exist at level {level}")]
    OutOfBounds { level: u32, row: u32, col: u32 },

    /// The given parent is not an ancestor of the address
    #[error("{parent} is not an ancestor of {address}")]
    NotAnAncestor {
        address: TileAddress,
        parent: TileAddress,
    },

    /// CRS identifier could not be parsed
    #[error("Invalid coordinate reference system: '{0}'")]
    InvalidCrs(String),
}
