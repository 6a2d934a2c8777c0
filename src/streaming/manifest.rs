//! Remote manifest documents
//!
//! Field names are camelCase; the PascalCase spellings written by older
//! publishing tools are accepted as aliases.

use serde::{Deserialize, Serialize};

use crate::core::types::{IVec3, Vec2, Vec3};
use crate::math::Aabb;

/// Relative path of a level's cube grid under a set version's metadata directory
pub fn detail_level_path(number: i32) -> String {
    format!("{}/metadata.json", detail_level_name(number))
}

/// Level name for a level number, e.g. `L3`
pub fn detail_level_name(number: i32) -> String {
    format!("L{}", number)
}

/// Texture template, relative to a level's metadata document
pub const TEXTURE_TEMPLATE: &str = "texture/{x}_{y}.jpg";
/// Model template, relative to a level's metadata document
pub const MODEL_TEMPLATE: &str = "{x}_{y}_{z}.{format}";

/// One entry of the root manifest
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetEntry {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Versions", default)]
    pub versions: Vec<VersionEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    #[serde(alias = "Name")]
    pub name: String,
    /// Set metadata location, relative to the manifest
    #[serde(alias = "Url")]
    pub url: String,
}

/// Per-version set metadata
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetMetadata {
    /// Material file, relative to the set metadata
    #[serde(alias = "Mtl", default)]
    pub mtl: String,
    #[serde(alias = "MinimumLod")]
    pub minimum_lod: i32,
    #[serde(alias = "MaximumLod")]
    pub maximum_lod: i32,
}

impl SetMetadata {
    /// Level numbers to load, inclusive. Empty when the range is inverted.
    pub fn detail_levels(&self) -> std::ops::RangeInclusive<i32> {
        self.minimum_lod..=self.maximum_lod
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GridSize {
    #[serde(alias = "X")]
    pub x: f32,
    #[serde(alias = "Y")]
    pub y: f32,
    #[serde(alias = "Z")]
    pub z: f32,
}

impl From<GridSize> for Vec3 {
    fn from(g: GridSize) -> Self {
        Vec3::new(g.x, g.y, g.z)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TextureSize {
    #[serde(alias = "X")]
    pub x: f32,
    #[serde(alias = "Y")]
    pub y: f32,
}

impl From<TextureSize> for Vec2 {
    fn from(t: TextureSize) -> Self {
        Vec2::new(t.x, t.y)
    }
}

/// Axis extents of a world-space box
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extents {
    #[serde(alias = "XMin")]
    pub x_min: f32,
    #[serde(alias = "XMax")]
    pub x_max: f32,
    #[serde(alias = "YMin")]
    pub y_min: f32,
    #[serde(alias = "YMax")]
    pub y_max: f32,
    #[serde(alias = "ZMin")]
    pub z_min: f32,
    #[serde(alias = "ZMax")]
    pub z_max: f32,
}

impl From<Extents> for Aabb {
    fn from(e: Extents) -> Self {
        Aabb::new(
            Vec3::new(e.x_min, e.y_min, e.z_min),
            Vec3::new(e.x_max, e.y_max, e.z_max),
        )
    }
}

impl From<Aabb> for Extents {
    fn from(b: Aabb) -> Self {
        Self {
            x_min: b.min.x,
            x_max: b.max.x,
            y_min: b.min.y,
            y_max: b.max.y,
            z_min: b.min.z,
            z_max: b.max.z,
        }
    }
}

/// Cube-existence grid and extents of one detail level
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CubeMetadata {
    /// Dense `[x][y][z]` grid; `true` where a cube exists
    #[serde(alias = "CubeExists", default)]
    pub cube_exists: Vec<Vec<Vec<bool>>>,
    #[serde(alias = "SetSize")]
    pub set_size: GridSize,
    #[serde(alias = "WorldBounds")]
    pub world_bounds: Extents,
    /// World extent the grid maps onto; falls back to `world_bounds`
    #[serde(alias = "VirtualWorldBounds", default)]
    pub virtual_world_bounds: Option<Extents>,
    #[serde(alias = "VertexCount", default)]
    pub vertex_count: u64,
    #[serde(alias = "TextureSetSize", default)]
    pub texture_set_size: TextureSize,
}

impl CubeMetadata {
    /// Grid coordinates of every existing cube, x-major
    pub fn cells(&self) -> impl Iterator<Item = IVec3> + '_ {
        self.cube_exists.iter().enumerate().flat_map(|(x, plane)| {
            plane.iter().enumerate().flat_map(move |(y, column)| {
                column
                    .iter()
                    .enumerate()
                    .filter(|(_, exists)| **exists)
                    .map(move |(z, _)| IVec3::new(x as i32, y as i32, z as i32))
            })
        })
    }

    /// Extent the level's transform maps onto
    pub fn effective_world_bounds(&self) -> Aabb {
        self.virtual_world_bounds.unwrap_or(self.world_bounds).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_parse() {
        let json = r#"[
            { "name": "alpha", "versions": [ { "name": "v1", "url": "alpha/v1/metadata.json" } ] },
            { "Name": "beta", "Versions": [] }
        ]"#;
        let sets: Vec<SetEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].versions[0].url, "alpha/v1/metadata.json");
        assert!(sets[1].versions.is_empty());
    }

    #[test]
    fn test_set_metadata_pascal_case() {
        let meta: SetMetadata =
            serde_json::from_str(r#"{ "Mtl": "model.mtl", "MinimumLod": 1, "MaximumLod": 3 }"#).unwrap();
        assert_eq!(meta.mtl, "model.mtl");
        assert_eq!(meta.detail_levels().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_cube_metadata() {
        let json = r#"{
            "CubeExists": [[[true, false], [false, false]], [[false, false], [false, true]]],
            "SetSize": { "X": 2, "Y": 2, "Z": 2 },
            "WorldBounds": { "XMin": 0, "XMax": 10, "YMin": 0, "YMax": 10, "ZMin": 0, "ZMax": 5 },
            "VertexCount": 1200,
            "TextureSetSize": { "X": 4, "Y": 4 }
        }"#;
        let meta: CubeMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.cells().collect::<Vec<_>>(), vec![IVec3::ZERO, IVec3::ONE]);
        assert_eq!(Vec3::from(meta.set_size), Vec3::splat(2.0));
        assert_eq!(meta.effective_world_bounds().max, Vec3::new(10.0, 10.0, 5.0));
        assert_eq!(meta.vertex_count, 1200);
    }

    #[test]
    fn test_virtual_bounds_preferred() {
        let json = r#"{
            "cubeExists": [],
            "setSize": { "x": 1, "y": 1, "z": 1 },
            "worldBounds": { "xMin": 0, "xMax": 1, "yMin": 0, "yMax": 1, "zMin": 0, "zMax": 1 },
            "virtualWorldBounds": { "xMin": -8, "xMax": 8, "yMin": -8, "yMax": 8, "zMin": -8, "zMax": 8 }
        }"#;
        let meta: CubeMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.effective_world_bounds().min, Vec3::splat(-8.0));
        assert_eq!(meta.cells().count(), 0);
    }

    #[test]
    fn test_level_paths() {
        assert_eq!(detail_level_name(2), "L2");
        assert_eq!(detail_level_path(0), "L0/metadata.json");
    }
}
