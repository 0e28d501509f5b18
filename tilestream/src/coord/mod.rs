//! Tile addressing for hierarchical pyramids.
//!
//! A pyramid subdivides a spatial extent into levels; every level doubles the
//! row and column count of its parent. [`TileAddress`] identifies one cell
//! and derives its parent, children and its footprint inside an ancestor.

mod types;

pub use types::{CoordError, CrsId, OffsetRect, TileAddress, MAX_LEVEL};

/// Iterator over the ancestors of an address, nearest first.
///
/// Stops after the root (level 0) has been yielded.
#[derive(Debug, Clone)]
pub struct Ancestors {
    current: Option<TileAddress>,
}

impl Iterator for Ancestors {
    type Item = TileAddress;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.current?.parent();
        self.current = next;
        next
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.current.map(|a| a.level as usize).unwrap_or(0);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Ancestors {}

/// Returns an iterator over the pyramid ancestors of `address`.
#[inline]
pub fn ancestors(address: TileAddress) -> Ancestors {
    Ancestors {
        current: Some(address),
    }
}

/// Returns true if one address is an ancestor of the other (or they are equal).
pub fn ancestor_related(a: &TileAddress, b: &TileAddress) -> bool {
    a == b || a.is_ancestor_of(b) || b.is_ancestor_of(a)
}
