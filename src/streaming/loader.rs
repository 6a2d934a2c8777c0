//! Metadata loading and the background reload thread
//!
//! A load cycle walks manifest -> set metadata -> per-level cube grids and
//! assembles a fresh [`Snapshot`]. Failures are recorded per stage and never
//! abort the cycle. The [`BackgroundLoader`] runs cycles on a dedicated thread
//! and publishes only snapshots whose error list is empty.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use rayon::prelude::*;
use tokio::runtime::Runtime;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;

use crate::core::{Result, StorageConfig};
use crate::dataset::{CubeBounds, LevelOfDetail, LoadStage, LoaderError, SetVersion, Snapshot};
use crate::math::Aabb;
use crate::octree::Octree;
use super::disk_io;
use super::manifest::{
    detail_level_name, detail_level_path, CubeMetadata, SetEntry, SetMetadata, VersionEntry,
    MODEL_TEMPLATE, TEXTURE_TEMPLATE,
};
use super::revolving::RevolvingState;
use super::source::{fetch_json, resolve_uri, ResourceSource};

/// Progress of the background loader, broadcast after every cycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadStatus {
    /// Network cycles run so far
    pub cycles: u64,
    /// Snapshots published, the restored last-known-good one included
    pub published: u64,
    /// Whether the most recent cycle was published
    pub last_cycle_ok: bool,
}

/// Builds snapshots from the remote manifest tree
#[derive(Debug)]
pub struct MetadataLoader<S> {
    source: Arc<S>,
    manifest_url: String,
    minimum_leaf_size: f32,
}

impl<S: ResourceSource> MetadataLoader<S> {
    pub fn new(source: Arc<S>, config: &StorageConfig) -> Self {
        Self {
            source,
            manifest_url: config.manifest_url.clone(),
            minimum_leaf_size: config.minimum_leaf_size,
        }
    }

    pub fn manifest_url(&self) -> &str {
        &self.manifest_url
    }

    /// Run one load cycle. Never fails; errors are collected in the snapshot.
    pub async fn load(&self) -> Snapshot {
        log::info!("Load cycle started: {}", self.manifest_url);

        let sets: Vec<SetEntry> = match fetch_json(&*self.source, &self.manifest_url).await {
            Ok(sets) => sets,
            Err(e) => {
                let error = LoaderError::new(LoadStage::Sets, self.manifest_url.clone(), e);
                log::warn!("{}", error);
                return Snapshot::from_versions(Vec::new(), vec![error]);
            }
        };

        let mut snapshot = Snapshot::new();
        for set in &sets {
            for entry in &set.versions {
                log::info!("Loading set '{}' version '{}'", set.name, entry.name);
                match self.load_version(&set.name, entry).await {
                    Ok(version) => snapshot.insert(version),
                    Err(error) => {
                        log::warn!("{}", error);
                        snapshot.push_error(error);
                    }
                }
            }
        }

        log::info!(
            "Load cycle finished: {} sets, {} cubes, {} errors",
            snapshot.sets().len(),
            snapshot.cube_count(),
            snapshot.errors().len()
        );
        snapshot
    }

    async fn load_version(&self, set: &str, entry: &VersionEntry) -> std::result::Result<SetVersion, LoaderError> {
        let version_uri = resolve_uri(&self.manifest_url, &entry.url);
        let metadata: SetMetadata = fetch_json(&*self.source, &version_uri)
            .await
            .map_err(|e| LoaderError::new(LoadStage::Set, version_uri.clone(), e))?;

        let mut grids = Vec::new();
        for number in metadata.detail_levels() {
            let uri = resolve_uri(&version_uri, &detail_level_path(number));
            let grid: CubeMetadata = fetch_json(&*self.source, &uri)
                .await
                .map_err(|e| LoaderError::new(LoadStage::DetailLevel(detail_level_name(number)), uri.clone(), e))?;
            grids.push((number, uri, grid));
        }

        let minimum_leaf_size = self.minimum_leaf_size;
        let levels = grids
            .into_par_iter()
            .map(|(number, uri, grid)| {
                build_detail_level(number, &uri, &grid, minimum_leaf_size)
                    .map_err(|e| LoaderError::new(LoadStage::DetailLevel(detail_level_name(number)), uri, e))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let material_uri = if metadata.mtl.is_empty() {
            String::new()
        } else {
            resolve_uri(&version_uri, &metadata.mtl)
        };
        let mut version = SetVersion::new(set, entry.name.clone()).with_sources(version_uri, material_uri);
        for lod in levels {
            version.add_detail_level(lod);
        }
        Ok(version)
    }
}

/// Turn one cube grid into a detail level with a freshly built octree
pub fn build_detail_level(number: i32, metadata_uri: &str, grid: &CubeMetadata, minimum_leaf_size: f32) -> Result<LevelOfDetail> {
    let name = detail_level_name(number);
    let lod_name: Arc<str> = Arc::from(name.as_str());

    let mut cubes = Octree::new(Aabb::default(), minimum_leaf_size);
    cubes.add_all(grid.cells().map(|cell| CubeBounds::unit(cell, lod_name.clone())))?;
    cubes.update_tree();

    Ok(LevelOfDetail::new(
        name,
        number,
        cubes,
        grid.set_size.into(),
        grid.effective_world_bounds(),
    )
    .with_model_bounds(grid.world_bounds.into())
    .with_texture_set_size(grid.texture_set_size.into())
    .with_vertex_count(grid.vertex_count)
    .with_sources(
        metadata_uri,
        resolve_uri(metadata_uri, TEXTURE_TEMPLATE),
        resolve_uri(metadata_uri, MODEL_TEMPLATE),
    ))
}

/// Where published and failed snapshots go
#[derive(Clone, Debug, Default)]
pub struct SnapshotSlots {
    pub current: Arc<RevolvingState<Snapshot>>,
    pub last_results: Arc<RevolvingState<Snapshot>>,
}

/// Reloads the manifest tree on a dedicated thread
pub struct BackgroundLoader {
    shutdown_tx: watch::Sender<bool>,
    reload: Arc<Notify>,
    status_rx: watch::Receiver<LoadStatus>,
    thread: Option<JoinHandle<()>>,
}

struct LoaderContext<S> {
    loader: MetadataLoader<S>,
    slots: SnapshotSlots,
    interval: Duration,
    snapshot_path: Option<PathBuf>,
    reload: Arc<Notify>,
    status_tx: watch::Sender<LoadStatus>,
}

impl BackgroundLoader {
    /// Start the loader thread. The first cycle runs immediately, after the
    /// last-known-good snapshot (if any) has been restored.
    ///
    /// # Arguments
    /// * `loader` - Cycle implementation
    /// * `config` - Reload interval and snapshot path
    /// * `slots` - Published snapshot and last failed cycle
    pub fn spawn<S: ResourceSource>(loader: MetadataLoader<S>, config: &StorageConfig, slots: SnapshotSlots) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(LoadStatus::default());
        let reload = Arc::new(Notify::new());

        // Current-thread runtime owned by the loader thread
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

        let context = LoaderContext {
            loader,
            slots,
            interval: config.reload_interval(),
            snapshot_path: config.snapshot_file(),
            reload: reload.clone(),
            status_tx,
        };

        let thread = std::thread::Builder::new()
            .name("cubeserve-loader".to_string())
            .spawn(move || run_thread(runtime, context, shutdown_rx))?;

        Ok(Self {
            shutdown_tx,
            reload,
            status_rx,
            thread: Some(thread),
        })
    }

    /// Run a cycle now instead of waiting for the deadline
    pub fn reload_now(&self) {
        self.reload.notify_one();
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadStatus> {
        self.status_rx.clone()
    }

    pub fn status(&self) -> LoadStatus {
        *self.status_rx.borrow()
    }

    /// Stop the thread and wait for it. A cycle in flight finishes first.
    pub fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Loader thread panicked");
            }
        }
    }
}

impl Drop for BackgroundLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_thread<S: ResourceSource>(runtime: Runtime, context: LoaderContext<S>, shutdown_rx: watch::Receiver<bool>) {
    runtime.block_on(run_loop(context, shutdown_rx));
}

async fn run_loop<S: ResourceSource>(context: LoaderContext<S>, mut shutdown_rx: watch::Receiver<bool>) {
    log::info!("Loader thread started (reload every {:?})", context.interval);
    let mut status = LoadStatus::default();

    if let Some(path) = &context.snapshot_path {
        match disk_io::load_snapshot(path).await {
            Ok(Some(snapshot)) => {
                log::info!(
                    "Restored last-known-good snapshot from {}: {} sets",
                    path.display(),
                    snapshot.sets().len()
                );
                context.slots.current.set(Arc::new(snapshot));
                status.published += 1;
                context.status_tx.send_replace(status);
            }
            Ok(None) => log::debug!("No last-known-good snapshot at {}", path.display()),
            Err(e) => log::warn!("Ignoring unreadable snapshot {}: {}", path.display(), e),
        }
    }

    let mut deadline = Instant::now();
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            _ = context.reload.notified() => {}
            _ = tokio::time::sleep_until(deadline) => {}
        }

        run_cycle(&context, &mut status).await;
        context.status_tx.send_replace(status);
        deadline = Instant::now() + context.interval;
    }

    log::info!("Loader thread stopped after {} cycles", status.cycles);
}

async fn run_cycle<S: ResourceSource>(context: &LoaderContext<S>, status: &mut LoadStatus) {
    let snapshot = context.loader.load().await;
    status.cycles += 1;

    if !snapshot.is_success() {
        log::warn!(
            "Load cycle failed with {} errors; keeping the previous snapshot",
            snapshot.errors().len()
        );
        context.slots.last_results.set(Arc::new(snapshot));
        status.last_cycle_ok = false;
        return;
    }

    let snapshot = Arc::new(snapshot);
    if let Some(path) = &context.snapshot_path {
        match disk_io::save_snapshot(path, &snapshot).await {
            Ok(()) => log::info!("Saved last-known-good snapshot to {}", path.display()),
            Err(e) => log::warn!("Failed to save snapshot to {}: {}", path.display(), e),
        }
    }

    log::info!("Published snapshot: {} sets", snapshot.sets().len());
    context.slots.current.set(snapshot);
    status.published += 1;
    status.last_cycle_ok = true;
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::streaming::source::MemorySource;

    pub const MANIFEST: &str = "mem://blob/sets.json";

    /// Two sets, one version each, with levels L1 and L2
    pub fn memory_tree() -> MemorySource {
        let source = MemorySource::new();
        source.insert_json(
            MANIFEST,
            r#"[
                { "name": "Alpha", "versions": [ { "name": "v1", "url": "alpha/v1/metadata.json" } ] },
                { "name": "Beta", "versions": [ { "name": "v1", "url": "beta/v1/metadata.json" } ] }
            ]"#,
        );
        for set in ["alpha", "beta"] {
            source.insert_json(
                format!("mem://blob/{}/v1/metadata.json", set),
                r#"{ "mtl": "model.mtl", "minimumLod": 1, "maximumLod": 2 }"#,
            );
            for lod in ["L1", "L2"] {
                source.insert_json(format!("mem://blob/{}/v1/{}/metadata.json", set, lod), diagonal_grid());
            }
        }
        source
    }

    /// 4x4x4 grid with cubes on the diagonal, 10 world units per cell
    pub fn diagonal_grid() -> String {
        let mut grid = vec![vec![vec![false; 4]; 4]; 4];
        for i in 0..4 {
            grid[i][i][i] = true;
        }
        serde_json::json!({
            "cubeExists": grid,
            "setSize": { "x": 4, "y": 4, "z": 4 },
            "worldBounds": { "xMin": 0, "xMax": 40, "yMin": 0, "yMax": 40, "zMin": 0, "zMax": 40 },
            "vertexCount": 4000,
            "textureSetSize": { "x": 4, "y": 4 }
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::core::types::{IVec3, Vec3};
    use crate::streaming::source::MemorySource;

    fn loader(source: MemorySource) -> MetadataLoader<MemorySource> {
        MetadataLoader::new(Arc::new(source), &StorageConfig::for_manifest(MANIFEST))
    }

    #[tokio::test]
    async fn test_load_cycle() {
        let snapshot = loader(memory_tree()).load().await;
        assert!(snapshot.is_success());
        assert_eq!(snapshot.sets().len(), 2);

        let version = snapshot.find_set_version("alpha", "v1").unwrap();
        assert_eq!(version.source_uri(), "mem://blob/alpha/v1/metadata.json");
        assert_eq!(version.material_uri(), "mem://blob/alpha/v1/model.mtl");
        assert_eq!(version.detail_levels().names().collect::<Vec<_>>(), vec!["L1", "L2"]);

        let lod = version.detail_level("L2").unwrap();
        assert_eq!(lod.number(), 2);
        assert_eq!(lod.cubes().object_count(), 4);
        assert_eq!(lod.world_to_cube_ratio(), Vec3::splat(10.0));
        assert_eq!(lod.texture_uri(1, 2), "mem://blob/alpha/v1/L2/texture/1_2.jpg");
        assert_eq!(
            version.query_box("L1", &Aabb::new(Vec3::splat(10.0), Vec3::splat(20.0))).unwrap()[0],
            IVec3::ZERO
        );
    }

    #[tokio::test]
    async fn test_missing_manifest_is_sets_error() {
        let source = memory_tree();
        source.remove(MANIFEST);
        let snapshot = loader(source).load().await;
        assert!(snapshot.sets().is_empty());
        assert_eq!(snapshot.errors().len(), 1);
        assert_eq!(snapshot.errors()[0].stage, LoadStage::Sets);
        assert!(snapshot.errors()[0].source.is_not_found());
    }

    #[tokio::test]
    async fn test_failed_set_is_isolated() {
        let source = memory_tree();
        source.remove("mem://blob/beta/v1/metadata.json");
        let snapshot = loader(source).load().await;

        assert!(!snapshot.is_success());
        assert_eq!(snapshot.errors().len(), 1);
        assert_eq!(snapshot.errors()[0].stage, LoadStage::Set);
        assert_eq!(snapshot.errors()[0].uri, "mem://blob/beta/v1/metadata.json");
        assert!(snapshot.find_set_version("alpha", "v1").is_ok());
        assert!(snapshot.find_set("beta").is_err());
    }

    #[tokio::test]
    async fn test_failed_level_names_the_level() {
        let source = memory_tree();
        source.insert_json("mem://blob/alpha/v1/L2/metadata.json", "{ not json");
        let snapshot = loader(source).load().await;

        assert_eq!(snapshot.errors().len(), 1);
        assert_eq!(snapshot.errors()[0].stage, LoadStage::DetailLevel("L2".to_string()));
        assert!(snapshot.find_set("alpha").is_err());
        assert!(snapshot.find_set("beta").is_ok());
    }

    #[test]
    fn test_build_detail_level_prefers_virtual_bounds() {
        let grid: CubeMetadata = serde_json::from_str(
            r#"{
                "cubeExists": [[[true]]],
                "setSize": { "x": 1, "y": 1, "z": 1 },
                "worldBounds": { "xMin": 0, "xMax": 5, "yMin": 0, "yMax": 5, "zMin": 0, "zMax": 5 },
                "virtualWorldBounds": { "xMin": 0, "xMax": 10, "yMin": 0, "yMax": 10, "zMin": 0, "zMax": 10 }
            }"#,
        )
        .unwrap();
        let lod = build_detail_level(0, "mem://x/L0/metadata.json", &grid, 1.0).unwrap();
        assert_eq!(lod.name(), "L0");
        assert_eq!(lod.world_bounds().max, Vec3::splat(10.0));
        assert_eq!(lod.model_bounds().max, Vec3::splat(5.0));
        assert_eq!(lod.model_uri(0, 0, 0, crate::dataset::ModelFormat::Obj), "mem://x/L0/0_0_0.obj");
    }
}
