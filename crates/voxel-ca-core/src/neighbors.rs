//! Named neighbor offset sets usable from rule source.

use crate::coords::Offset;

pub const SELF: &[Offset] = &[Offset::SELF];
pub const UP: &[Offset] = &[Offset::new(0, 1, 0)];
pub const DOWN: &[Offset] = &[Offset::new(0, -1, 0)];
pub const NORTH: &[Offset] = &[Offset::new(0, 0, -1)];
pub const EAST: &[Offset] = &[Offset::new(1, 0, 0)];
pub const SOUTH: &[Offset] = &[Offset::new(0, 0, 1)];
pub const WEST: &[Offset] = &[Offset::new(-1, 0, 0)];
pub const NORTH_EAST: &[Offset] = &[Offset::new(1, 0, -1)];
pub const SOUTH_EAST: &[Offset] = &[Offset::new(1, 0, 1)];
pub const NORTH_WEST: &[Offset] = &[Offset::new(-1, 0, -1)];
pub const SOUTH_WEST: &[Offset] = &[Offset::new(-1, 0, 1)];

/// Horizontal 3x3 ring around the cell (x-z plane).
pub const MOORE_2D: &[Offset] = &[
    Offset::new(-1, 0, -1),
    Offset::new(-1, 0, 0),
    Offset::new(-1, 0, 1),
    Offset::new(0, 0, -1),
    Offset::new(0, 0, 1),
    Offset::new(1, 0, -1),
    Offset::new(1, 0, 0),
    Offset::new(1, 0, 1),
];

pub const MOORE_2D_SELF: &[Offset] = &[
    Offset::new(-1, 0, -1),
    Offset::new(-1, 0, 0),
    Offset::new(-1, 0, 1),
    Offset::new(0, 0, -1),
    Offset::new(0, 0, 0),
    Offset::new(0, 0, 1),
    Offset::new(1, 0, -1),
    Offset::new(1, 0, 0),
    Offset::new(1, 0, 1),
];

/// Full 3x3x3 cube minus the center, x outermost and z innermost.
pub const MOORE_3D: &[Offset] = &moore_3d::<26>(false);

/// Full 3x3x3 cube including the center.
pub const MOORE_3D_SELF: &[Offset] = &moore_3d::<27>(true);

pub const NEUMANN_2D: &[Offset] = &[
    Offset::new(0, 0, -1),
    Offset::new(0, 0, 1),
    Offset::new(1, 0, 0),
    Offset::new(-1, 0, 0),
];

pub const NEUMANN_2D_SELF: &[Offset] = &[
    Offset::new(0, 0, 0),
    Offset::new(0, 0, -1),
    Offset::new(0, 0, 1),
    Offset::new(1, 0, 0),
    Offset::new(-1, 0, 0),
];

pub const NEUMANN_3D: &[Offset] = &[
    Offset::new(0, 1, 0),
    Offset::new(0, -1, 0),
    Offset::new(0, 0, -1),
    Offset::new(0, 0, 1),
    Offset::new(1, 0, 0),
    Offset::new(-1, 0, 0),
];

pub const NEUMANN_3D_SELF: &[Offset] = &[
    Offset::new(0, 0, 0),
    Offset::new(0, 1, 0),
    Offset::new(0, -1, 0),
    Offset::new(0, 0, -1),
    Offset::new(0, 0, 1),
    Offset::new(1, 0, 0),
    Offset::new(-1, 0, 0),
];

const fn moore_3d<const N: usize>(include_self: bool) -> [Offset; N] {
    let mut out = [Offset::SELF; N];
    let mut i = 0;
    let mut x = -1;
    while x <= 1 {
        let mut y = -1;
        while y <= 1 {
            let mut z = -1;
            while z <= 1 {
                if include_self || x != 0 || y != 0 || z != 0 {
                    out[i] = Offset::new(x, y, z);
                    i += 1;
                }
                z += 1;
            }
            y += 1;
        }
        x += 1;
    }
    out
}

/// Every name accepted by [`named`], in documentation order.
pub const NAMES: &[&str] = &[
    "self",
    "up",
    "down",
    "north",
    "east",
    "south",
    "west",
    "northeast",
    "southeast",
    "northwest",
    "southwest",
    "moore2d",
    "moore2dself",
    "moore3d",
    "moore3dself",
    "neumann2d",
    "neumann2dself",
    "neumann3d",
    "neumann3dself",
];

/// Resolve a neighborhood identifier to its offsets.
pub fn named(name: &str) -> Option<&'static [Offset]> {
    let offsets = match name {
        "self" => SELF,
        "up" => UP,
        "down" => DOWN,
        "north" => NORTH,
        "east" => EAST,
        "south" => SOUTH,
        "west" => WEST,
        "northeast" => NORTH_EAST,
        "southeast" => SOUTH_EAST,
        "northwest" => NORTH_WEST,
        "southwest" => SOUTH_WEST,
        "moore2d" => MOORE_2D,
        "moore2dself" => MOORE_2D_SELF,
        "moore3d" => MOORE_3D,
        "moore3dself" => MOORE_3D_SELF,
        "neumann2d" => NEUMANN_2D,
        "neumann2dself" => NEUMANN_2D_SELF,
        "neumann3d" => NEUMANN_3D,
        "neumann3dself" => NEUMANN_3D_SELF,
        _ => return None,
    };
    Some(offsets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_moore_3d_sizes() {
        assert_eq!(MOORE_3D.len(), 26);
        assert_eq!(MOORE_3D_SELF.len(), 27);
        assert!(!MOORE_3D.contains(&Offset::SELF));
        assert!(MOORE_3D_SELF.contains(&Offset::SELF));
        assert_eq!(MOORE_3D_SELF[0], Offset::new(-1, -1, -1));
        assert_eq!(MOORE_3D_SELF[1], Offset::new(-1, -1, 0));
    }

    #[test]
    fn test_sets_have_unique_offsets() {
        for name in NAMES {
            let offsets = named(name).unwrap();
            let unique: HashSet<_> = offsets.iter().collect();
            assert_eq!(unique.len(), offsets.len(), "duplicate offset in {name}");
        }
    }

    #[test]
    fn test_unknown_name() {
        assert!(named("diagonal").is_none());
        assert_eq!(named("up"), Some(UP));
    }
}
