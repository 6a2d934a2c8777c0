//! Storage and loader configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::streaming::SNAPSHOT_FILE_NAME;

/// Environment variable overriding [`StorageConfig::manifest_url`].
pub const ENV_MANIFEST_URL: &str = "CUBESERVE_MANIFEST_URL";
/// Environment variable overriding [`StorageConfig::reload_interval_secs`].
pub const ENV_RELOAD_SECS: &str = "CUBESERVE_RELOAD_SECS";
/// Environment variable overriding [`StorageConfig::snapshot_path`].
pub const ENV_SNAPSHOT_PATH: &str = "CUBESERVE_SNAPSHOT_PATH";

/// Configuration for the storage facade and its background loader.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// URL of the root manifest listing every set and its versions. Required.
    pub manifest_url: String,
    /// Seconds between scheduled reloads. Default 1800 (30 minutes).
    pub reload_interval_secs: u64,
    /// Minimum octree leaf edge, in cube units.
    pub minimum_leaf_size: f32,
    /// Where the last-known-good snapshot is persisted. `None` disables persistence.
    pub snapshot_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            manifest_url: String::new(),
            reload_interval_secs: 30 * 60,
            minimum_leaf_size: 1.0,
            snapshot_path: None,
        }
    }
}

impl StorageConfig {
    /// Config for a manifest URL with every other field defaulted.
    pub fn for_manifest(manifest_url: impl Into<String>) -> Self {
        Self {
            manifest_url: manifest_url.into(),
            ..Default::default()
        }
    }

    /// Load from a JSON file (sync)
    pub fn load_sync(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_process_env(&mut self) -> Result<()> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by the `CUBESERVE_*` variable names.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_MANIFEST_URL) {
            self.manifest_url = url;
        }
        if let Some(secs) = lookup(ENV_RELOAD_SECS) {
            self.reload_interval_secs = secs.trim().parse().map_err(|_| {
                Error::Configuration(format!("{} is not a number of seconds: {:?}", ENV_RELOAD_SECS, secs))
            })?;
        }
        if let Some(path) = lookup(ENV_SNAPSHOT_PATH) {
            self.snapshot_path = if path.is_empty() { None } else { Some(PathBuf::from(path)) };
        }
        Ok(())
    }

    /// Reject configurations the loader cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.manifest_url.trim().is_empty() {
            return Err(Error::Configuration("no manifest URL configured".to_string()));
        }
        if self.reload_interval_secs == 0 {
            return Err(Error::Configuration("reload interval must be at least one second".to_string()));
        }
        if !(self.minimum_leaf_size > 0.0) {
            return Err(Error::Configuration(format!(
                "minimum leaf size must be positive, got {}",
                self.minimum_leaf_size
            )));
        }
        Ok(())
    }

    /// Reload period as a [`Duration`].
    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_secs)
    }

    /// Snapshot file to read and write. A configured directory gets
    /// [`SNAPSHOT_FILE_NAME`] appended.
    pub fn snapshot_file(&self) -> Option<PathBuf> {
        let path = self.snapshot_path.as_ref()?;
        if path.is_dir() {
            Some(path.join(SNAPSHOT_FILE_NAME))
        } else {
            Some(path.clone())
        }
    }
}
