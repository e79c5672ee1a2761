//! World coordinates, neighbor offsets and section addressing.
//!
//! The world is partitioned into cubic sections of [`SECTION_SIZE`] cells per
//! axis. Cells inside a section are addressed by a dense index in
//! `[0, CELLS_PER_SECTION)` laid out as `(y * 16 + z) * 16 + x`.

use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Number of cells along each axis of a section.
pub const SECTION_SIZE: i32 = 16;

/// Number of cells in a section.
pub const CELLS_PER_SECTION: usize = 4096;

const SECTION_SHIFT: u32 = 4;
const SECTION_MASK: i32 = SECTION_SIZE - 1;

/// Relative displacement from a cell to one of its neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Offset {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Offset {
    /// The zero displacement.
    pub const SELF: Offset = Offset::new(0, 0, 0);

    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Chebyshev distance from the origin.
    pub fn radius(&self) -> i32 {
        self.x.abs().max(self.y.abs()).max(self.z.abs())
    }

    /// Offset pointing the other way.
    pub fn inverse(&self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}, {}, {}}}", self.x, self.y, self.z)
    }
}

/// Absolute cell position in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl CellPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Section containing this cell.
    pub fn section(&self) -> SectionPos {
        SectionPos::new(
            self.x >> SECTION_SHIFT,
            self.y >> SECTION_SHIFT,
            self.z >> SECTION_SHIFT,
        )
    }

    /// Dense index of this cell inside its section.
    pub fn local_index(&self) -> usize {
        local_index(
            self.x & SECTION_MASK,
            self.y & SECTION_MASK,
            self.z & SECTION_MASK,
        )
    }

    /// Displace this position by `offset`.
    pub fn offset(&self, offset: Offset) -> Self {
        Self::new(
            self.x.wrapping_add(offset.x),
            self.y.wrapping_add(offset.y),
            self.z.wrapping_add(offset.z),
        )
    }

    /// Whether the cell touches a face of its section.
    pub fn on_section_boundary(&self) -> bool {
        let (x, y, z) = (
            self.x & SECTION_MASK,
            self.y & SECTION_MASK,
            self.z & SECTION_MASK,
        );
        [x, y, z]
            .iter()
            .any(|&v| v == 0 || v == SECTION_MASK)
    }
}

impl Add<Offset> for CellPos {
    type Output = CellPos;

    fn add(self, rhs: Offset) -> Self::Output {
        self.offset(rhs)
    }
}

impl fmt::Display for CellPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Position of a section, in section units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectionPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl SectionPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// World position of the cell with local index `index`.
    pub fn cell(&self, index: usize) -> CellPos {
        let (x, y, z) = local_coords(index);
        CellPos::new(
            (self.x << SECTION_SHIFT) + x,
            (self.y << SECTION_SHIFT) + y,
            (self.z << SECTION_SHIFT) + z,
        )
    }

    /// Minimum corner of the section in world coordinates.
    pub fn origin(&self) -> CellPos {
        self.cell(0)
    }

    /// Pack the section position into a single key, 21 bits per axis.
    pub fn packed(&self) -> u64 {
        const MASK: u64 = (1 << 21) - 1;
        ((self.x as u64) & MASK) << 42 | ((self.y as u64) & MASK) << 21 | ((self.z as u64) & MASK)
    }
}

impl fmt::Display for SectionPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.x, self.y, self.z)
    }
}

/// Dense index for local coordinates in `[0, 16)`.
pub fn local_index(x: i32, y: i32, z: i32) -> usize {
    (((y * SECTION_SIZE + z) * SECTION_SIZE) + x) as usize
}

/// Inverse of [`local_index`].
pub fn local_coords(index: usize) -> (i32, i32, i32) {
    let index = index as i32;
    let x = index & SECTION_MASK;
    let z = (index >> SECTION_SHIFT) & SECTION_MASK;
    let y = index >> (2 * SECTION_SHIFT);
    (x, y, z)
}

/// Encode a primitive change for a host-side bulk section update.
///
/// Layout: `value << 12 | x << 8 | z << 4 | y` with local coordinates.
pub fn encode_change(pos: CellPos, value: i64) -> i64 {
    let x = (pos.x & SECTION_MASK) as i64;
    let y = (pos.y & SECTION_MASK) as i64;
    let z = (pos.z & SECTION_MASK) as i64;
    (value << 12) | (x << 8) | (z << 4) | y
}

/// Split a change record into local `(x, y, z)` and the value.
pub fn decode_change(record: i64) -> ((i32, i32, i32), i64) {
    let x = ((record >> 8) & 0xF) as i32;
    let z = ((record >> 4) & 0xF) as i32;
    let y = (record & 0xF) as i32;
    ((x, y, z), record >> 12)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_index_layout() {
        assert_eq!(local_index(0, 0, 0), 0);
        assert_eq!(local_index(1, 0, 0), 1);
        assert_eq!(local_index(0, 0, 1), 16);
        assert_eq!(local_index(0, 1, 0), 256);
        assert_eq!(local_index(15, 15, 15), CELLS_PER_SECTION - 1);
        assert_eq!(local_coords(local_index(3, 7, 11)), (3, 7, 11));
    }

    #[test]
    fn test_negative_positions_map_into_sections() {
        let pos = CellPos::new(-1, 0, -17);
        assert_eq!(pos.section(), SectionPos::new(-1, 0, -2));
        assert_eq!(pos.section().cell(pos.local_index()), pos);
    }

    #[test]
    fn test_change_record_encoding() {
        let pos = CellPos::new(18, 35, 7);
        let record = encode_change(pos, 42);
        assert_eq!(record, (42 << 12) | (2 << 8) | (7 << 4) | 3);
        assert_eq!(decode_change(record), ((2, 3, 7), 42));
    }

    #[test]
    fn test_section_boundary() {
        assert!(CellPos::new(0, 5, 5).on_section_boundary());
        assert!(CellPos::new(31, 5, 5).on_section_boundary());
        assert!(!CellPos::new(5, 5, 5).on_section_boundary());
    }
}
