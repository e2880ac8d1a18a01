//! Coordinate systems for the patch grid.
//!
//! Grid coordinates are measured in patch units: one level-0 patch spans one
//! unit along each axis, and a level-`n` patch spans `2^n` units. World units
//! are patch units multiplied by the configured patch world size.

use bytemuck::{Pod, Zeroable};
use glam::{IVec2, Vec2};
use serde::{Deserialize, Serialize};

/// Scale factor of a resolution level (`2^level`).
#[inline]
pub const fn level_factor(level: u32) -> i32 {
    1 << level
}

/// Round `value` down to a multiple of `mult`.
///
/// `mult` must be positive. Works for negative values (`-0.5` with
/// multiple `2` yields `-2`).
#[inline]
pub fn floor_mult(value: f32, mult: i32) -> i32 {
    debug_assert!(mult > 0);
    ((value / mult as f32).floor() as i32) * mult
}

/// Integer variant of [`floor_mult`].
#[inline]
pub const fn floor_mult_i32(value: i32, mult: i32) -> i32 {
    value.div_euclid(mult) * mult
}

/// Origin of a patch in patch units.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable, Serialize,
    Deserialize,
)]
#[repr(C)]
pub struct GridCoord {
    pub x: i32,
    pub y: i32,
}

impl GridCoord {
    /// Create a new grid coordinate
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Snap to the origin of the level-`level` patch containing this coordinate.
    #[inline]
    pub const fn snapped(self, level: u32) -> Self {
        let f = level_factor(level);
        Self::new(floor_mult_i32(self.x, f), floor_mult_i32(self.y, f))
    }

    /// Whether this coordinate is a valid origin for a level-`level` patch.
    #[inline]
    pub const fn is_aligned(self, level: u32) -> bool {
        let f = level_factor(level);
        self.x.rem_euclid(f) == 0 && self.y.rem_euclid(f) == 0
    }

    /// The four level-`level - 1` patches covering this level-`level` patch.
    pub fn children(self, level: u32) -> [Self; 4] {
        debug_assert!(level > 0);
        let half = level_factor(level) / 2;
        [
            Self::new(self.x, self.y),
            Self::new(self.x + half, self.y),
            Self::new(self.x, self.y + half),
            Self::new(self.x + half, self.y + half),
        ]
    }

    /// Convert to floating point Vec2
    #[inline]
    pub fn to_vec2(self) -> Vec2 {
        Vec2::new(self.x as f32, self.y as f32)
    }

    /// Convert to glam IVec2
    #[inline]
    pub const fn to_ivec2(self) -> IVec2 {
        IVec2::new(self.x, self.y)
    }
}

impl From<IVec2> for GridCoord {
    fn from(v: IVec2) -> Self {
        Self::new(v.x, v.y)
    }
}

/// Unique key of a patch across the whole level chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatchKey {
    pub level: u32,
    pub coord: GridCoord,
}

impl PatchKey {
    /// Create a new patch key
    #[inline]
    pub const fn new(level: u32, coord: GridCoord) -> Self {
        Self { level, coord }
    }

    /// Scale factor of this key's level.
    #[inline]
    pub const fn level_factor(self) -> i32 {
        level_factor(self.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_mult_rounds_towards_negative_infinity() {
        assert_eq!(floor_mult(5.5, 2), 4);
        assert_eq!(floor_mult(4.0, 2), 4);
        assert_eq!(floor_mult(-0.5, 2), -2);
        assert_eq!(floor_mult(-4.0, 4), -4);
        assert_eq!(floor_mult(-4.1, 4), -8);
    }

    #[test]
    fn floor_mult_integer_matches_float() {
        for value in -40..40 {
            for mult in [1, 2, 4, 8] {
                assert_eq!(floor_mult_i32(value, mult), floor_mult(value as f32, mult));
            }
        }
    }

    #[test]
    fn snapping_collapses_same_origin() {
        let a = GridCoord::new(5, -3).snapped(2);
        let b = GridCoord::new(7, -1).snapped(2);
        assert_eq!(a, GridCoord::new(4, -4));
        assert_eq!(a, b);
        assert!(a.is_aligned(2));
        assert!(!GridCoord::new(6, 0).is_aligned(2));
    }

    #[test]
    fn children_tile_parent() {
        let parent = GridCoord::new(-8, 4);
        let children = parent.children(3);
        assert_eq!(children[0], GridCoord::new(-8, 4));
        assert_eq!(children[3], GridCoord::new(-4, 8));
        assert!(children.iter().all(|c| c.is_aligned(2)));
    }
}
