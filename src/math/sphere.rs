//! Bounding sphere

use crate::core::types::Vec3;
use super::{Aabb, Containment};

/// Sphere defined by center and radius
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// A zero-radius sphere carries no usable bounds.
    pub fn is_empty(&self) -> bool {
        self.radius == 0.0
    }

    /// Smallest box enclosing the sphere
    pub fn bounding_box(&self) -> Aabb {
        Aabb::from_center_half_extent(self.center, Vec3::splat(self.radius))
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        self.center.distance_squared(p) <= self.radius * self.radius
    }

    /// Check if the sphere touches or overlaps `aabb`
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        aabb.distance_squared_to_point(self.center) <= self.radius * self.radius
    }

    /// Classify `aabb` against this sphere.
    pub fn contains_aabb(&self, aabb: &Aabb) -> Containment {
        if !self.intersects_aabb(aabb) {
            return Containment::Disjoint;
        }

        // The farthest corner decides full containment.
        let far = Vec3::new(
            if self.center.x - aabb.min.x > aabb.max.x - self.center.x { aabb.min.x } else { aabb.max.x },
            if self.center.y - aabb.min.y > aabb.max.y - self.center.y { aabb.min.y } else { aabb.max.y },
            if self.center.z - aabb.min.z > aabb.max.z - self.center.z { aabb.min.z } else { aabb.max.z },
        );
        if self.contains_point(far) {
            Containment::Contains
        } else {
            Containment::Intersects
        }
    }

    /// Classify `other` against this sphere.
    pub fn contains_sphere(&self, other: &BoundingSphere) -> Containment {
        let dist = self.center.distance(other.center);
        if dist > self.radius + other.radius {
            Containment::Disjoint
        } else if dist + other.radius <= self.radius {
            Containment::Contains
        } else {
            Containment::Intersects
        }
    }

    pub fn intersects_sphere(&self, other: &BoundingSphere) -> bool {
        self.contains_sphere(other).overlaps()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert!(BoundingSphere::new(Vec3::ONE, 0.0).is_empty());
        assert!(!BoundingSphere::new(Vec3::ONE, 0.5).is_empty());
    }

    #[test]
    fn test_bounding_box() {
        let s = BoundingSphere::new(Vec3::new(1.0, 2.0, 3.0), 2.0);
        let b = s.bounding_box();
        assert_eq!(b.min, Vec3::new(-1.0, 0.0, 1.0));
        assert_eq!(b.max, Vec3::new(3.0, 4.0, 5.0));
    }

    #[test]
    fn test_contains_aabb() {
        let s = BoundingSphere::new(Vec3::ZERO, 2.0);
        let small = Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5));
        let edge = Aabb::new(Vec3::ZERO, Vec3::splat(2.0));
        let far = Aabb::new(Vec3::splat(3.0), Vec3::splat(4.0));
        assert_eq!(s.contains_aabb(&small), Containment::Contains);
        assert_eq!(s.contains_aabb(&edge), Containment::Intersects);
        assert_eq!(s.contains_aabb(&far), Containment::Disjoint);
    }

    #[test]
    fn test_touching_aabb_intersects() {
        let s = BoundingSphere::new(Vec3::ZERO, 1.0);
        let touching = Aabb::new(Vec3::new(1.0, -1.0, -1.0), Vec3::new(2.0, 1.0, 1.0));
        assert!(s.intersects_aabb(&touching));
    }

    #[test]
    fn test_contains_sphere() {
        let big = BoundingSphere::new(Vec3::ZERO, 5.0);
        assert_eq!(big.contains_sphere(&BoundingSphere::new(Vec3::X, 1.0)), Containment::Contains);
        assert_eq!(big.contains_sphere(&BoundingSphere::new(Vec3::X * 5.0, 1.0)), Containment::Intersects);
        assert_eq!(big.contains_sphere(&BoundingSphere::new(Vec3::X * 7.0, 1.0)), Containment::Disjoint);
    }
}
