//! Immutable result of one load cycle

use std::fmt;

use thiserror::Error;

use crate::core::{Error, Result};
use super::{NameMap, SetVersion};

/// Pipeline stage a load failure happened in
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadStage {
    /// Fetching or parsing the root manifest
    Sets,
    /// Fetching or parsing one set version's metadata
    Set,
    /// Fetching or parsing one detail level's cube grid
    DetailLevel(String),
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStage::Sets => f.write_str("Sets"),
            LoadStage::Set => f.write_str("Set"),
            LoadStage::DetailLevel(name) => write!(f, "DetailLevel({})", name),
        }
    }
}

/// A failure recorded during a load cycle. Collected, never thrown out of the loader.
#[derive(Debug, Error)]
#[error("{stage} stage failed for {uri}: {source}")]
pub struct LoaderError {
    pub stage: LoadStage,
    pub uri: String,
    #[source]
    pub source: Error,
}

impl LoaderError {
    pub fn new(stage: LoadStage, uri: impl Into<String>, source: Error) -> Self {
        Self { stage, uri: uri.into(), source }
    }
}

/// Every set version loaded in one cycle, keyed set name -> version name
/// (both case-insensitive), plus the errors met on the way.
#[derive(Debug, Default)]
pub struct Snapshot {
    sets: NameMap<NameMap<SetVersion>>,
    errors: Vec<LoaderError>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group `versions` by set name
    pub fn from_versions(versions: impl IntoIterator<Item = SetVersion>, errors: Vec<LoaderError>) -> Self {
        let mut snapshot = Self { sets: NameMap::new(), errors };
        for version in versions {
            snapshot.insert(version);
        }
        snapshot
    }

    pub fn insert(&mut self, version: SetVersion) {
        let set = self.sets.entry_or_insert_with(version.name(), NameMap::new);
        set.insert(version.version().to_string(), version);
    }

    pub fn push_error(&mut self, error: LoaderError) {
        self.errors.push(error);
    }

    pub fn sets(&self) -> &NameMap<NameMap<SetVersion>> {
        &self.sets
    }

    pub fn errors(&self) -> &[LoaderError] {
        &self.errors
    }

    /// A cycle is publishable only when nothing failed
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn find_set(&self, set: &str) -> Result<&NameMap<SetVersion>> {
        self.sets
            .get(set)
            .ok_or_else(|| Error::not_found(format!("set '{}'", set)))
    }

    pub fn find_set_version(&self, set: &str, version: &str) -> Result<&SetVersion> {
        self.find_set(set)?
            .get(version)
            .ok_or_else(|| Error::not_found(format!("version '{}' of set '{}'", version, set)))
    }

    /// All set versions, set by set
    pub fn set_versions(&self) -> impl Iterator<Item = &SetVersion> {
        self.sets.values().flat_map(|versions| versions.values())
    }

    /// Cells across every level of every version
    pub fn cube_count(&self) -> usize {
        self.set_versions()
            .flat_map(|v| v.detail_levels().values())
            .map(|lod| lod.cubes().object_count())
            .sum()
    }
}
