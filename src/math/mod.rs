//! Geometry primitives used for chunk selection

pub mod aabb;
pub mod sphere;
pub mod ray;
pub mod frustum;

pub use aabb::Aabb;
pub use sphere::BoundingSphere;
pub use ray::Ray;
pub use frustum::{Plane, Frustum};

/// How one volume relates to another. Intervals are closed: touching counts as intersecting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Containment {
    Disjoint,
    Intersects,
    Contains,
}

impl Containment {
    /// True for anything but [`Containment::Disjoint`].
    pub fn overlaps(self) -> bool {
        self != Containment::Disjoint
    }
}
