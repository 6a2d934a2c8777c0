//! Bounding volumes of octree objects

use crate::math::{Aabb, BoundingSphere, Containment, Frustum, Ray};

/// The bounding volume of one indexed object: a box or a sphere, never both.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Bounds {
    Box(Aabb),
    Sphere(BoundingSphere),
}

impl Bounds {
    /// Zero-size volumes cannot be placed in a tree.
    pub fn is_empty(&self) -> bool {
        match self {
            Bounds::Box(b) => b.is_empty(),
            Bounds::Sphere(s) => s.is_empty(),
        }
    }

    /// Axis-aligned box enclosing the volume
    pub fn bounding_box(&self) -> Aabb {
        match self {
            Bounds::Box(b) => *b,
            Bounds::Sphere(s) => s.bounding_box(),
        }
    }

    /// Whether the volume lies entirely inside `region` (boundary included).
    pub fn fits_in(&self, region: &Aabb) -> bool {
        let containment = match self {
            Bounds::Box(b) => region.contains_aabb(b),
            Bounds::Sphere(s) => region.contains_sphere(s),
        };
        containment == Containment::Contains
    }

    /// Distance along `ray` to the first hit
    pub fn intersects_ray(&self, ray: &Ray) -> Option<f32> {
        match self {
            Bounds::Box(b) => ray.intersects_aabb(b).map(|(t_near, _)| t_near),
            Bounds::Sphere(s) => ray.intersects_sphere(s),
        }
    }

    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        match self {
            Bounds::Box(b) => b.intersects(aabb),
            Bounds::Sphere(s) => s.intersects_aabb(aabb),
        }
    }

    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        match self {
            Bounds::Box(b) => sphere.intersects_aabb(b),
            Bounds::Sphere(s) => s.intersects_sphere(sphere),
        }
    }

    pub fn intersects_frustum(&self, frustum: &Frustum) -> bool {
        let containment = match self {
            Bounds::Box(b) => frustum.contains_aabb(b),
            Bounds::Sphere(s) => frustum.contains_sphere(s),
        };
        containment.overlaps()
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        match other {
            Bounds::Box(b) => self.intersects_aabb(b),
            Bounds::Sphere(s) => self.intersects_sphere(s),
        }
    }
}

impl From<Aabb> for Bounds {
    fn from(aabb: Aabb) -> Self {
        Bounds::Box(aabb)
    }
}

impl From<BoundingSphere> for Bounds {
    fn from(sphere: BoundingSphere) -> Self {
        Bounds::Sphere(sphere)
    }
}

/// Anything that can be stored in an [`Octree`](super::Octree).
///
/// Only [`Bounded::bounds`] is required; the intersection tests default to the
/// exact test against that volume.
pub trait Bounded {
    fn bounds(&self) -> Bounds;

    fn intersects_ray(&self, ray: &Ray) -> Option<f32> {
        self.bounds().intersects_ray(ray)
    }

    fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.bounds().intersects_aabb(aabb)
    }

    fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.bounds().intersects_sphere(sphere)
    }

    fn intersects_frustum(&self, frustum: &Frustum) -> bool {
        self.bounds().intersects_frustum(frustum)
    }

    fn intersects_bounds(&self, other: &Bounds) -> bool {
        self.bounds().intersects(other)
    }
}

impl Bounded for Bounds {
    fn bounds(&self) -> Bounds {
        *self
    }
}

impl Bounded for Aabb {
    fn bounds(&self) -> Bounds {
        Bounds::Box(*self)
    }
}

impl Bounded for BoundingSphere {
    fn bounds(&self) -> Bounds {
        Bounds::Sphere(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vec3;

    #[test]
    fn test_empty_volumes() {
        assert!(Bounds::Box(Aabb::new(Vec3::ONE, Vec3::ONE)).is_empty());
        assert!(Bounds::Sphere(BoundingSphere::new(Vec3::ZERO, 0.0)).is_empty());
        assert!(!Bounds::Box(Aabb::new(Vec3::ZERO, Vec3::ONE)).is_empty());
    }

    #[test]
    fn test_fits_in_exact_region() {
        let region = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert!(Bounds::Box(region).fits_in(&region));
        assert!(Bounds::Sphere(BoundingSphere::new(Vec3::splat(0.5), 0.5)).fits_in(&region));
        assert!(!Bounds::Sphere(BoundingSphere::new(Vec3::splat(0.5), 0.6)).fits_in(&region));
    }

    #[test]
    fn test_box_against_sphere() {
        let cube: Bounds = Aabb::new(Vec3::ZERO, Vec3::ONE).into();
        assert!(cube.intersects_sphere(&BoundingSphere::new(Vec3::new(2.0, 0.5, 0.5), 1.0)));
        assert!(!cube.intersects_sphere(&BoundingSphere::new(Vec3::splat(2.0), 1.0)));
    }

    #[test]
    fn test_ray_distance() {
        let cube: Bounds = Aabb::new(Vec3::splat(2.0), Vec3::splat(3.0)).into();
        let t = cube.intersects_ray(&Ray::new(Vec3::ZERO, Vec3::ONE)).unwrap();
        assert_eq!(t, 2.0);
    }
}
