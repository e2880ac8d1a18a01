//! Math utilities and helpers.

use glam::{Vec2, Vec3};

/// Axis-aligned rectangle on the ground plane (patch units).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    /// Minimum corner
    pub min: Vec2,
    /// Maximum corner
    pub max: Vec2,
}

impl Rect {
    /// Create a new rect from min and max corners
    #[inline]
    pub const fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Rect covering a square patch of edge `size` at `origin`
    #[inline]
    pub fn square(origin: Vec2, size: f32) -> Self {
        Self {
            min: origin,
            max: origin + Vec2::splat(size),
        }
    }

    /// Get the center of the rect
    #[inline]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Get the size of the rect
    #[inline]
    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    /// The four corners, counter-clockwise from `min`
    #[inline]
    pub fn corners(&self) -> [Vec2; 4] {
        [
            self.min,
            Vec2::new(self.max.x, self.min.y),
            self.max,
            Vec2::new(self.min.x, self.max.y),
        ]
    }

    /// Check if a point is inside the rect (half-open on the max side)
    #[inline]
    pub fn contains_point(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x < self.max.x && point.y >= self.min.y && point.y < self.max.y
    }

    /// Check if the interiors of two rects overlap
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }

    /// Distance from a point to the nearest point of the rect (0 inside)
    #[inline]
    pub fn distance_to_point(&self, point: Vec2) -> f32 {
        let clamped = point.clamp(self.min, self.max);
        point.distance(clamped)
    }
}

/// Cheap "roughly in front of the camera" test on the ground plane.
///
/// Not a frustum: a point passes when the angle between the heading and the
/// direction from the apex to the point has a cosine above `threshold`.
#[derive(Clone, Copy, Debug)]
pub struct ViewCone {
    /// Cone apex (patch units)
    pub apex: Vec2,
    /// Normalized ground-plane heading, zero when looking straight up/down
    pub heading: Vec2,
    /// Cosine threshold
    pub threshold: f32,
}

impl ViewCone {
    /// Build a cone from a 3D viewer, projecting onto the x/z plane.
    ///
    /// `setback` moves the apex behind the viewer along the heading, widening
    /// what counts as "in front" near the viewer.
    pub fn from_viewer(position: Vec2, heading: Vec3, threshold: f32, setback: f32) -> Self {
        let heading = Vec2::new(heading.x, heading.z).normalize_or_zero();
        Self {
            apex: position - heading * setback,
            heading,
            threshold,
        }
    }

    /// A heading with no horizontal component sees everything.
    #[inline]
    pub fn is_unbounded(&self) -> bool {
        self.heading == Vec2::ZERO
    }

    /// Cosine between the heading and the direction to `point`.
    #[inline]
    pub fn facing(&self, point: Vec2) -> f32 {
        self.heading.dot((point - self.apex).normalize_or_zero())
    }

    /// Check if a point passes the cone test
    #[inline]
    pub fn admits_point(&self, point: Vec2) -> bool {
        self.is_unbounded() || self.facing(point) > self.threshold
    }

    /// Check if at least one corner of `rect` passes the cone test
    #[inline]
    pub fn admits_any_corner(&self, rect: &Rect) -> bool {
        self.is_unbounded() || rect.corners().iter().any(|&c| self.facing(c) > self.threshold)
    }
}
