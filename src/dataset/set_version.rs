//! A content set at one version, and the three query shapes over it

use std::time::SystemTime;

use serde::Serialize;

use crate::core::{Error, Result};
use crate::core::types::{IVec3, Vec3};
use crate::math::Aabb;
use super::{allocate_radii, parse_profile, LevelOfDetail, NameMap};

/// Cells hit in one detail level
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetailHits {
    pub name: String,
    pub cubes: Vec<IVec3>,
}

/// One version of a named set with its detail levels
#[derive(Clone, Debug)]
pub struct SetVersion {
    name: String,
    version: String,
    source_uri: String,
    material_uri: String,
    loaded_at: SystemTime,
    detail_levels: NameMap<LevelOfDetail>,
}

impl SetVersion {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            source_uri: String::new(),
            material_uri: String::new(),
            loaded_at: SystemTime::now(),
            detail_levels: NameMap::new(),
        }
    }

    pub fn with_sources(mut self, source_uri: impl Into<String>, material_uri: impl Into<String>) -> Self {
        self.source_uri = source_uri.into();
        self.material_uri = material_uri.into();
        self
    }

    pub fn with_loaded_at(mut self, loaded_at: SystemTime) -> Self {
        self.loaded_at = loaded_at;
        self
    }

    /// Add or replace a level, keyed by its name
    pub fn add_detail_level(&mut self, lod: LevelOfDetail) {
        let name = lod.name().to_string();
        self.detail_levels.insert(name, lod);
    }

    pub fn with_detail_level(mut self, lod: LevelOfDetail) -> Self {
        self.add_detail_level(lod);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn source_uri(&self) -> &str {
        &self.source_uri
    }

    pub fn material_uri(&self) -> &str {
        &self.material_uri
    }

    pub fn loaded_at(&self) -> SystemTime {
        self.loaded_at
    }

    pub fn detail_levels(&self) -> &NameMap<LevelOfDetail> {
        &self.detail_levels
    }

    /// Level by case-insensitive name
    pub fn detail_level(&self, name: &str) -> Result<&LevelOfDetail> {
        self.detail_levels.get(name).ok_or_else(|| {
            Error::not_found(format!("detail level '{}' in {}/{}", name, self.name, self.version))
        })
    }

    /// Grid coordinates of the cells of `lod` touching a world-space box
    pub fn query_box(&self, lod: &str, world: &Aabb) -> Result<Vec<IVec3>> {
        Ok(self.detail_level(lod)?.query_box(world))
    }

    /// Multi-resolution sphere query. Each profile entry is queried out to its
    /// cumulative share of `radius`; entries naming unknown levels fail the query.
    pub fn query_sphere_profile(&self, profile: &str, center: Vec3, radius: f32) -> Result<Vec<DetailHits>> {
        let entries = parse_profile(profile);
        allocate_radii(&entries, radius)
            .into_iter()
            .map(|(name, sub_radius)| {
                let lod = self.detail_level(name)?;
                Ok(DetailHits {
                    name: lod.name().to_string(),
                    cubes: lod.query_sphere(center, sub_radius),
                })
            })
            .collect()
    }

    /// 3x3x3 neighborhood around `point` in every level.
    ///
    /// With a `reference` level, `point` is first snapped to the center of that
    /// level's cell so all levels share one grid-aligned anchor.
    pub fn query_neighborhood(&self, reference: Option<&str>, point: Vec3) -> Result<Vec<DetailHits>> {
        let anchor = match reference.map(str::trim).filter(|r| !r.is_empty()) {
            Some(name) => self.detail_level(name)?.snap_to_cell_center(point),
            None => point,
        };

        Ok(self
            .detail_levels
            .values()
            .map(|lod| DetailHits {
                name: lod.name().to_string(),
                cubes: lod.query_neighborhood(anchor),
            })
            .collect())
    }
}
