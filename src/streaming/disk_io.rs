//! Last-known-good snapshot serialization and disk I/O

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rkyv::{Archive, Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::core::types::{IVec3, Vec2, Vec3};
use crate::dataset::{CubeBounds, LevelOfDetail, SetVersion, Snapshot};
use crate::math::{Aabb, BoundingSphere};
use crate::octree::{Bounds, Octree};

/// Bumped whenever the archived layout changes
pub const SNAPSHOT_FORMAT: u32 = 1;

/// File name used when the configured snapshot path is a directory
pub const SNAPSHOT_FILE_NAME: &str = "cubeserve_lkg.rks";

#[derive(Debug, Clone, Copy, PartialEq, Archive, Deserialize, Serialize)]
pub struct AabbData {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl From<Aabb> for AabbData {
    fn from(b: Aabb) -> Self {
        Self { min: b.min.to_array(), max: b.max.to_array() }
    }
}

impl From<AabbData> for Aabb {
    fn from(b: AabbData) -> Self {
        Aabb::new(Vec3::from_array(b.min), Vec3::from_array(b.max))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Archive, Deserialize, Serialize)]
pub enum BoundsData {
    Cuboid(AabbData),
    Sphere { center: [f32; 3], radius: f32 },
}

impl From<&Bounds> for BoundsData {
    fn from(bounds: &Bounds) -> Self {
        match bounds {
            Bounds::Box(b) => BoundsData::Cuboid((*b).into()),
            Bounds::Sphere(s) => BoundsData::Sphere { center: s.center.to_array(), radius: s.radius },
        }
    }
}

impl From<BoundsData> for Bounds {
    fn from(data: BoundsData) -> Self {
        match data {
            BoundsData::Cuboid(b) => Bounds::Box(b.into()),
            BoundsData::Sphere { center, radius } => {
                Bounds::Sphere(BoundingSphere::new(Vec3::from_array(center), radius))
            }
        }
    }
}

/// One stored cell
#[derive(Debug, Clone, Archive, Deserialize, Serialize)]
pub struct CubeData {
    pub bounds: BoundsData,
    pub coord: Option<[i32; 3]>,
}

/// One stored detail level with every cell of its octree
#[derive(Debug, Clone, Archive, Deserialize, Serialize)]
pub struct DetailLevelData {
    pub name: String,
    pub number: i32,
    pub set_size: [f32; 3],
    pub world_bounds: AabbData,
    pub model_bounds: AabbData,
    pub texture_set_size: [f32; 2],
    pub vertex_count: u64,
    pub metadata_uri: String,
    pub texture_template: String,
    pub model_template: String,
    pub minimum_size: f32,
    pub cubes: Vec<CubeData>,
}

#[derive(Debug, Clone, Archive, Deserialize, Serialize)]
pub struct SetVersionData {
    pub name: String,
    pub version: String,
    pub source_uri: String,
    pub material_uri: String,
    /// Milliseconds since the Unix epoch
    pub loaded_at_ms: u64,
    pub detail_levels: Vec<DetailLevelData>,
}

/// Serializable snapshot. Load errors are never stored.
#[derive(Debug, Clone, Archive, Deserialize, Serialize)]
pub struct SnapshotData {
    pub format: u32,
    pub versions: Vec<SetVersionData>,
}

impl From<&LevelOfDetail> for DetailLevelData {
    fn from(lod: &LevelOfDetail) -> Self {
        Self {
            name: lod.name().to_string(),
            number: lod.number(),
            set_size: lod.set_size().to_array(),
            world_bounds: lod.world_bounds().into(),
            model_bounds: lod.model_bounds().into(),
            texture_set_size: lod.texture_set_size().to_array(),
            vertex_count: lod.vertex_count(),
            metadata_uri: lod.metadata_uri().to_string(),
            texture_template: lod.texture_template().to_string(),
            model_template: lod.model_template().to_string(),
            minimum_size: lod.cubes().minimum_size(),
            cubes: lod
                .cubes()
                .objects()
                .map(|cube| CubeData {
                    bounds: cube.volume().into(),
                    coord: cube.coord().map(|c| c.to_array()),
                })
                .collect(),
        }
    }
}

impl From<&SetVersion> for SetVersionData {
    fn from(version: &SetVersion) -> Self {
        let loaded_at_ms = version
            .loaded_at()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            name: version.name().to_string(),
            version: version.version().to_string(),
            source_uri: version.source_uri().to_string(),
            material_uri: version.material_uri().to_string(),
            loaded_at_ms,
            detail_levels: version.detail_levels().values().map(DetailLevelData::from).collect(),
        }
    }
}

impl From<&Snapshot> for SnapshotData {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            format: SNAPSHOT_FORMAT,
            versions: snapshot.set_versions().map(SetVersionData::from).collect(),
        }
    }
}

impl DetailLevelData {
    /// Rebuild the level, octree included
    pub fn into_detail_level(self) -> Result<LevelOfDetail> {
        let lod_name: Arc<str> = Arc::from(self.name.as_str());
        let mut cubes = Octree::new(Aabb::default(), self.minimum_size);
        for cube in self.cubes {
            let coord = cube.coord.map(IVec3::from_array);
            cubes.add(CubeBounds::new(cube.bounds.into(), lod_name.clone(), coord)?)?;
        }
        cubes.update_tree();

        Ok(LevelOfDetail::new(
            self.name,
            self.number,
            cubes,
            Vec3::from_array(self.set_size),
            self.world_bounds.into(),
        )
        .with_model_bounds(self.model_bounds.into())
        .with_texture_set_size(Vec2::from_array(self.texture_set_size))
        .with_vertex_count(self.vertex_count)
        .with_sources(self.metadata_uri, self.texture_template, self.model_template))
    }
}

impl SetVersionData {
    pub fn into_set_version(self) -> Result<SetVersion> {
        let loaded_at = SystemTime::UNIX_EPOCH + Duration::from_millis(self.loaded_at_ms);
        let mut version = SetVersion::new(self.name, self.version)
            .with_sources(self.source_uri, self.material_uri)
            .with_loaded_at(loaded_at);
        for lod in self.detail_levels {
            version.add_detail_level(lod.into_detail_level()?);
        }
        Ok(version)
    }
}

impl SnapshotData {
    pub fn into_snapshot(self) -> Result<Snapshot> {
        if self.format != SNAPSHOT_FORMAT {
            return Err(Error::Encoding(format!(
                "snapshot format {} (expected {})",
                self.format, SNAPSHOT_FORMAT
            )));
        }
        let versions = self
            .versions
            .into_iter()
            .map(SetVersionData::into_set_version)
            .collect::<Result<Vec<_>>>()?;
        Ok(Snapshot::from_versions(versions, Vec::new()))
    }
}

/// Serialize a snapshot to bytes (uncompressed)
pub fn serialize_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>> {
    let data = SnapshotData::from(snapshot);
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&data)
        .map_err(|e| Error::Encoding(e.to_string()))?;
    Ok(bytes.to_vec())
}

/// Deserialize a snapshot from bytes (uncompressed), rebuilding every octree
pub fn deserialize_snapshot(data: &[u8]) -> Result<Snapshot> {
    // Archived data must be aligned; a plain Vec<u8> gives no such guarantee.
    let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(data.len());
    aligned.extend_from_slice(data);

    let archived = rkyv::access::<ArchivedSnapshotData, rkyv::rancor::Error>(&aligned)
        .map_err(|e| Error::Encoding(e.to_string()))?;
    let snapshot_data: SnapshotData = rkyv::deserialize::<SnapshotData, rkyv::rancor::Error>(archived)
        .map_err(|e| Error::Encoding(e.to_string()))?;

    snapshot_data.into_snapshot()
}

/// Serialize and LZ4-compress a snapshot
pub fn compress_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>> {
    let serialized = serialize_snapshot(snapshot)?;
    Ok(lz4_flex::compress_prepend_size(&serialized))
}

/// Decompress and deserialize a snapshot
pub fn decompress_snapshot(data: &[u8]) -> Result<Snapshot> {
    let decompressed = lz4_flex::decompress_size_prepended(data)
        .map_err(|e| Error::Encoding(format!("LZ4 decompression failed: {}", e)))?;
    deserialize_snapshot(&decompressed)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write a snapshot to disk (compressed). The file is replaced atomically.
pub async fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let compressed = compress_snapshot(snapshot)?;
    let tmp = temp_path(path);
    tokio::fs::write(&tmp, compressed).await?;
    tokio::fs::rename(&tmp, path).await?;

    Ok(())
}

/// Read a snapshot from disk (if it exists)
pub async fn load_snapshot(path: &Path) -> Result<Option<Snapshot>> {
    let compressed = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    decompress_snapshot(&compressed).map(Some)
}
