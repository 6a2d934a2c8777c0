//! Axis-aligned bounding box

use crate::core::types::Vec3;
use super::{BoundingSphere, Containment};

/// Axis-aligned bounding box defined by min and max corners
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create AABB from center and half-extents
    pub fn from_center_half_extent(center: Vec3, half_extent: Vec3) -> Self {
        Self {
            min: center - half_extent,
            max: center + half_extent,
        }
    }

    /// Get center point
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get size (max - min)
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Get half-extents
    pub fn half_extent(&self) -> Vec3 {
        self.size() * 0.5
    }

    /// A box whose corners coincide carries no usable bounds.
    pub fn is_empty(&self) -> bool {
        self.min == self.max
    }

    /// Zero or negative extent on some axis.
    pub fn is_degenerate(&self) -> bool {
        let size = self.size();
        size.x <= 0.0 || size.y <= 0.0 || size.z <= 0.0
    }

    /// Check if point is inside AABB (boundary included)
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x && p.x <= self.max.x &&
        p.y >= self.min.y && p.y <= self.max.y &&
        p.z >= self.min.z && p.z <= self.max.z
    }

    /// Check if two AABBs intersect
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Classify `other` against this box.
    pub fn contains_aabb(&self, other: &Aabb) -> Containment {
        if !self.intersects(other) {
            Containment::Disjoint
        } else if self.contains_point(other.min) && self.contains_point(other.max) {
            Containment::Contains
        } else {
            Containment::Intersects
        }
    }

    /// Classify `sphere` against this box.
    pub fn contains_sphere(&self, sphere: &BoundingSphere) -> Containment {
        let closest = sphere.center.clamp(self.min, self.max);
        if closest.distance_squared(sphere.center) > sphere.radius * sphere.radius {
            return Containment::Disjoint;
        }

        let r = Vec3::splat(sphere.radius);
        if self.contains_point(sphere.center - r) && self.contains_point(sphere.center + r) {
            Containment::Contains
        } else {
            Containment::Intersects
        }
    }

    /// Squared distance from `p` to the nearest point of the box (0 inside).
    pub fn distance_squared_to_point(&self, p: Vec3) -> f32 {
        p.clamp(self.min, self.max).distance_squared(p)
    }

    /// Return merged AABB containing both
    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Get child octant AABB for octree subdivision
    /// index: 0-7 representing xyz octant (bit 0=x, bit 1=y, bit 2=z)
    pub fn child_octant(&self, index: u8) -> Aabb {
        let center = self.center();
        let half = self.half_extent() * 0.5;

        let offset = Vec3::new(
            if index & 1 != 0 { half.x } else { -half.x },
            if index & 2 != 0 { half.y } else { -half.y },
            if index & 4 != 0 { half.z } else { -half.z },
        );

        Aabb::from_center_half_extent(center + offset, half)
    }
}
