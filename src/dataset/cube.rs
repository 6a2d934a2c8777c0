//! One grid cell of a detail level

use std::sync::Arc;

use crate::core::{Error, Result};
use crate::core::types::{IVec3, Vec3};
use crate::math::Aabb;
use crate::octree::{Bounded, Bounds};

/// A cube-space cell stored in a detail level's octree.
#[derive(Clone, Debug, PartialEq)]
pub struct CubeBounds {
    bounds: Bounds,
    /// Detail level this cell was loaded for
    lod: Arc<str>,
    /// Reported identity. Defaults to the floored min corner of the bounds.
    coord: Option<IVec3>,
}

impl CubeBounds {
    /// Cell with explicit bounds. Empty bounds are rejected.
    pub fn new(bounds: Bounds, lod: Arc<str>, coord: Option<IVec3>) -> Result<Self> {
        if bounds.is_empty() {
            return Err(Error::InvalidBounds(format!("cube {:?} in {} has no extent", coord, lod)));
        }
        Ok(Self { bounds, lod, coord })
    }

    /// The unit cube whose min corner is `coord`
    pub fn unit(coord: IVec3, lod: Arc<str>) -> Self {
        Self::scaled(coord, Vec3::ONE, lod)
    }

    /// Cell at `coord` spanning `size` cube units per axis (min corner at `coord * size`)
    pub fn scaled(coord: IVec3, size: Vec3, lod: Arc<str>) -> Self {
        let min = coord.as_vec3() * size;
        Self {
            bounds: Bounds::Box(Aabb::new(min, min + size)),
            lod,
            coord: Some(coord),
        }
    }

    /// Bounding volume in cube space
    pub fn volume(&self) -> &Bounds {
        &self.bounds
    }

    pub fn lod(&self) -> &str {
        &self.lod
    }

    /// Stored coordinate, if any
    pub fn coord(&self) -> Option<IVec3> {
        self.coord
    }

    /// Integer cell identity reported to callers
    pub fn grid_coordinate(&self) -> IVec3 {
        self.coord
            .unwrap_or_else(|| self.bounds.bounding_box().min.floor().as_ivec3())
    }
}

impl Bounded for CubeBounds {
    fn bounds(&self) -> Bounds {
        self.bounds
    }
}
