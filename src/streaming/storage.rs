//! Query facade over the currently published snapshot
//!
//! [`Storage`] owns the background loader and answers every read against
//! whichever snapshot is published at call time. A single call never mixes
//! two snapshots.

use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;
use tokio::sync::watch;

use crate::core::{Result, StorageConfig};
use crate::core::types::{IVec3, Vec2, Vec3};
use crate::dataset::{DetailHits, LevelOfDetail, ModelFormat, SetVersion, Snapshot};
use crate::math::Aabb;
use super::loader::{BackgroundLoader, LoadStatus, MetadataLoader, SnapshotSlots};
use super::manifest::Extents;
use super::source::{Payload, ResourceSource, UriSource};

/// One set in [`Storage::enumerate_sets`]
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSummary {
    pub name: String,
    /// Load time of the set's oldest version
    pub created_at: SystemTime,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VersionSummary {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailLevelDescription {
    pub name: String,
    pub set_size: Vec3,
    pub world_bounds: Extents,
    pub model_bounds: Extents,
    /// World units per cube unit, per axis
    pub world_cube_scale: Vec3,
    pub texture_set_size: Vec2,
    pub vertex_count: u64,
}

impl From<&LevelOfDetail> for DetailLevelDescription {
    fn from(lod: &LevelOfDetail) -> Self {
        Self {
            name: lod.name().to_string(),
            set_size: lod.set_size(),
            world_bounds: lod.world_bounds().into(),
            model_bounds: lod.model_bounds().into(),
            world_cube_scale: lod.world_to_cube_ratio(),
            texture_set_size: lod.texture_set_size(),
            vertex_count: lod.vertex_count(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVersionDescription {
    pub set: String,
    pub version: String,
    pub detail_levels: Vec<DetailLevelDescription>,
}

impl From<&SetVersion> for SetVersionDescription {
    fn from(version: &SetVersion) -> Self {
        Self {
            set: version.name().to_string(),
            version: version.version().to_string(),
            detail_levels: version.detail_levels().values().map(DetailLevelDescription::from).collect(),
        }
    }
}

/// The dataset as seen by request handlers
pub struct Storage<S = UriSource> {
    source: Arc<S>,
    slots: SnapshotSlots,
    loader: Option<BackgroundLoader>,
    status: watch::Receiver<LoadStatus>,
}

impl Storage<UriSource> {
    /// Validate `config` and start loading over the scheme-dispatching transport
    pub fn start(config: StorageConfig) -> Result<Self> {
        Self::with_source(config, UriSource::new())
    }
}

impl<S: ResourceSource> Storage<S> {
    /// Validate `config` and start the background loader over `source`
    pub fn with_source(config: StorageConfig, source: S) -> Result<Self> {
        config.validate()?;

        let source = Arc::new(source);
        let slots = SnapshotSlots::default();
        let loader = BackgroundLoader::spawn(
            MetadataLoader::new(source.clone(), &config),
            &config,
            slots.clone(),
        )?;
        let status = loader.subscribe();

        Ok(Self {
            source,
            slots,
            loader: Some(loader),
            status,
        })
    }

    /// Serve a fixed snapshot without a loader. Payloads are still read from `source`.
    pub fn with_snapshot(snapshot: Snapshot, source: S) -> Self {
        let slots = SnapshotSlots::default();
        slots.current.set(Arc::new(snapshot));
        let (_, status) = watch::channel(LoadStatus {
            cycles: 0,
            published: 1,
            last_cycle_ok: true,
        });

        Self {
            source: Arc::new(source),
            slots,
            loader: None,
            status,
        }
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.slots.current.get().unwrap_or_default()
    }

    /// Every loaded set. Empty before the first successful load.
    pub fn enumerate_sets(&self) -> Vec<SetSummary> {
        let snapshot = self.snapshot();
        snapshot
            .sets()
            .iter()
            .map(|(name, versions)| SetSummary {
                name: name.to_string(),
                created_at: versions
                    .values()
                    .map(SetVersion::loaded_at)
                    .min()
                    .unwrap_or(SystemTime::UNIX_EPOCH),
            })
            .collect()
    }

    pub fn enumerate_versions(&self, set: &str) -> Result<Vec<VersionSummary>> {
        let snapshot = self.snapshot();
        Ok(snapshot
            .find_set(set)?
            .names()
            .map(|name| VersionSummary { name: name.to_string() })
            .collect())
    }

    pub fn get_set_version(&self, set: &str, version: &str) -> Result<SetVersionDescription> {
        let snapshot = self.snapshot();
        Ok(snapshot.find_set_version(set, version)?.into())
    }

    /// Cells of `lod` touching a world-space box
    pub fn query_box(&self, set: &str, version: &str, lod: &str, world: &Aabb) -> Result<Vec<IVec3>> {
        let snapshot = self.snapshot();
        snapshot.find_set_version(set, version)?.query_box(lod, world)
    }

    /// Sphere query split across levels by a `"L1=1,L2=2"` profile
    pub fn query_sphere_profile(
        &self,
        set: &str,
        version: &str,
        profile: &str,
        center: Vec3,
        radius: f32,
    ) -> Result<Vec<DetailHits>> {
        let snapshot = self.snapshot();
        snapshot
            .find_set_version(set, version)?
            .query_sphere_profile(profile, center, radius)
    }

    /// 3x3x3 neighborhood per level, optionally anchored to a reference level's cell
    pub fn query_neighborhood(
        &self,
        set: &str,
        version: &str,
        reference: Option<&str>,
        point: Vec3,
    ) -> Result<Vec<DetailHits>> {
        let snapshot = self.snapshot();
        snapshot
            .find_set_version(set, version)?
            .query_neighborhood(reference, point)
    }

    /// Texture for cell column (x, y) of a level
    pub async fn texture_stream(&self, set: &str, version: &str, lod: &str, x: i32, y: i32) -> Result<Payload> {
        let uri = {
            let snapshot = self.snapshot();
            snapshot.find_set_version(set, version)?.detail_level(lod)?.texture_uri(x, y)
        };
        self.source.fetch(&uri).await
    }

    /// Model for cell (x, y, z) of a level. `format` is `obj`, `ebo` (default) or `ctm`.
    #[allow(clippy::too_many_arguments)]
    pub async fn model_stream(
        &self,
        set: &str,
        version: &str,
        lod: &str,
        x: i32,
        y: i32,
        z: i32,
        format: Option<&str>,
    ) -> Result<Payload> {
        let format = ModelFormat::parse_or_default(format)?;
        let uri = {
            let snapshot = self.snapshot();
            snapshot.find_set_version(set, version)?.detail_level(lod)?.model_uri(x, y, z, format)
        };
        self.source.fetch(&uri).await
    }

    /// Currently published snapshot
    pub fn last_known_good(&self) -> Option<Arc<Snapshot>> {
        self.slots.current.get()
    }

    /// Most recent failed cycle, kept for diagnostics
    pub fn last_loader_results(&self) -> Option<Arc<Snapshot>> {
        self.slots.last_results.get()
    }

    pub fn status(&self) -> LoadStatus {
        *self.status.borrow()
    }

    /// Receiver updated after every load cycle
    pub fn subscribe(&self) -> watch::Receiver<LoadStatus> {
        self.status.clone()
    }

    /// Ask the loader for an immediate cycle. No-op without a loader.
    pub fn reload_now(&self) {
        if let Some(loader) = &self.loader {
            loader.reload_now();
        }
    }

    /// Stop the loader thread. Queries keep answering from the last snapshot.
    pub fn shutdown(&mut self) {
        if let Some(mut loader) = self.loader.take() {
            loader.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;
    use crate::streaming::loader::fixtures::{memory_tree, MANIFEST};
    use crate::streaming::source::MemorySource;
    use std::time::Duration;

    type MemoryStorage = Storage<Arc<MemorySource>>;

    async fn wait_for_cycles(storage: &MemoryStorage, cycles: u64) -> LoadStatus {
        let mut rx = storage.subscribe();
        let status = tokio::time::timeout(Duration::from_secs(10), rx.wait_for(|s| s.cycles >= cycles))
            .await
            .expect("timed out waiting for the loader")
            .expect("loader stopped");
        *status
    }

    fn start(source: &Arc<MemorySource>, config: StorageConfig) -> MemoryStorage {
        Storage::with_source(config, source.clone()).unwrap()
    }

    #[test]
    fn test_missing_manifest_url_rejected() {
        let err = Storage::with_source(StorageConfig::default(), MemorySource::new()).err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_empty_before_first_load() {
        let storage = Storage::with_snapshot(Snapshot::new(), MemorySource::new());
        assert!(storage.enumerate_sets().is_empty());
        assert!(storage.enumerate_versions("alpha").unwrap_err().is_not_found());
        assert!(storage.last_loader_results().is_none());
    }

    #[tokio::test]
    async fn test_queries_after_first_cycle() {
        let source = Arc::new(memory_tree());
        let storage = start(&source, StorageConfig::for_manifest(MANIFEST));
        let status = wait_for_cycles(&storage, 1).await;
        assert!(status.last_cycle_ok);
        assert_eq!(status.published, 1);

        let sets = storage.enumerate_sets();
        assert_eq!(sets.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), vec!["Alpha", "Beta"]);
        assert_eq!(storage.enumerate_versions("ALPHA").unwrap()[0].name, "v1");

        let description = storage.get_set_version("alpha", "v1").unwrap();
        assert_eq!(description.detail_levels.len(), 2);
        assert_eq!(description.detail_levels[0].world_cube_scale, Vec3::splat(10.0));
        assert_eq!(description.detail_levels[0].vertex_count, 4000);
        assert!(storage.get_set_version("alpha", "v2").unwrap_err().is_not_found());

        let cubes = storage
            .query_box("alpha", "v1", "L1", &Aabb::new(Vec3::splat(10.0), Vec3::splat(20.0)))
            .unwrap();
        assert_eq!(cubes, vec![IVec3::ZERO, IVec3::ONE, IVec3::splat(2)]);

        let profile = storage
            .query_sphere_profile("alpha", "v1", "L1=1,L2=2", Vec3::splat(5.0), 30.0)
            .unwrap();
        assert_eq!(profile.len(), 2);
        assert_eq!(profile[1].cubes.len(), 3);

        let neighborhood = storage.query_neighborhood("alpha", "v1", Some(""), Vec3::splat(15.0)).unwrap();
        assert_eq!(neighborhood[0].cubes, vec![IVec3::ZERO, IVec3::ONE, IVec3::splat(2)]);
    }

    #[tokio::test]
    async fn test_payload_streams() {
        let source = Arc::new(memory_tree());
        source.insert(
            "mem://blob/alpha/v1/L1/texture/0_0.jpg",
            Payload::new(vec![0xff, 0xd8], "image/jpeg"),
        );
        source.insert(
            "mem://blob/alpha/v1/L1/1_1_1.obj",
            Payload::for_uri(b"v 0 0 0".to_vec(), "1_1_1.obj"),
        );
        let storage = start(&source, StorageConfig::for_manifest(MANIFEST));
        wait_for_cycles(&storage, 1).await;

        let texture = storage.texture_stream("alpha", "v1", "l1", 0, 0).await.unwrap();
        assert_eq!(texture.content_type, "image/jpeg");

        let model = storage.model_stream("alpha", "v1", "L1", 1, 1, 1, Some("OBJ")).await.unwrap();
        assert_eq!(model.bytes, b"v 0 0 0".to_vec());

        let missing = storage.model_stream("alpha", "v1", "L1", 1, 1, 1, None).await;
        assert!(missing.unwrap_err().is_not_found());
        let bad_format = storage.model_stream("alpha", "v1", "L1", 1, 1, 1, Some("fbx")).await;
        assert!(bad_format.unwrap_err().is_not_found());
        let bad_lod = storage.texture_stream("alpha", "v1", "L7", 0, 0).await;
        assert!(bad_lod.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_previous_snapshot() {
        let source = Arc::new(memory_tree());
        let storage = start(&source, StorageConfig::for_manifest(MANIFEST));
        wait_for_cycles(&storage, 1).await;
        let published = storage.last_known_good().unwrap();
        let sets_before = storage.enumerate_sets();

        source.remove("mem://blob/beta/v1/metadata.json");
        storage.reload_now();
        let status = wait_for_cycles(&storage, 2).await;

        assert!(!status.last_cycle_ok);
        assert_eq!(status.published, 1);
        assert_eq!(storage.enumerate_sets(), sets_before);
        assert!(Arc::ptr_eq(&storage.last_known_good().unwrap(), &published));

        let failed = storage.last_loader_results().unwrap();
        assert_eq!(failed.errors().len(), 1);
        assert_eq!(failed.errors()[0].uri, "mem://blob/beta/v1/metadata.json");
    }

    #[tokio::test]
    async fn test_last_known_good_restored_at_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StorageConfig::for_manifest(MANIFEST);
        config.snapshot_path = Some(dir.path().join("lkg.rks"));

        let source = Arc::new(memory_tree());
        let mut storage = start(&source, config.clone());
        wait_for_cycles(&storage, 1).await;
        storage.shutdown();
        assert!(dir.path().join("lkg.rks").exists());

        // Remote source gone: the restored snapshot keeps serving.
        let empty = Arc::new(MemorySource::new());
        let storage = start(&empty, config);
        let status = wait_for_cycles(&storage, 1).await;
        assert!(!status.last_cycle_ok);
        assert_eq!(status.published, 1);
        assert_eq!(storage.enumerate_sets().len(), 2);
        assert_eq!(
            storage
                .query_box("beta", "v1", "L2", &Aabb::new(Vec3::ZERO, Vec3::splat(5.0)))
                .unwrap(),
            vec![IVec3::ZERO]
        );
    }
}
