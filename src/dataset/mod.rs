//! Loaded content sets and the multi-LOD query layer

pub mod cube;
pub mod lod;
pub mod profile;
pub mod set_version;
pub mod snapshot;

pub use cube::CubeBounds;
pub use lod::{LevelOfDetail, ModelFormat};
pub use profile::{allocate_radii, parse_profile, ProfileEntry};
pub use set_version::{DetailHits, SetVersion};
pub use snapshot::{LoadStage, LoaderError, Snapshot};

use std::collections::BTreeMap;

/// Map keyed by case-insensitive name that keeps the name as last inserted.
///
/// Iteration is ordered by the lowercased name.
#[derive(Clone, Debug)]
pub struct NameMap<V> {
    entries: BTreeMap<String, (String, V)>,
}

impl<V> Default for NameMap<V> {
    fn default() -> Self {
        Self { entries: BTreeMap::new() }
    }
}

impl<V> NameMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str) -> String {
        name.to_lowercase()
    }

    /// Insert, replacing any entry whose name differs only in case.
    pub fn insert(&mut self, name: impl Into<String>, value: V) -> Option<V> {
        let name = name.into();
        self.entries
            .insert(Self::key(&name), (name, value))
            .map(|(_, old)| old)
    }

    pub fn get(&self, name: &str) -> Option<&V> {
        self.entries.get(&Self::key(name)).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut V> {
        self.entries.get_mut(&Self::key(name)).map(|(_, v)| v)
    }

    /// Get or insert with `make`
    pub fn entry_or_insert_with(&mut self, name: &str, make: impl FnOnce() -> V) -> &mut V {
        &mut self
            .entries
            .entry(Self::key(name))
            .or_insert_with(|| (name.to_string(), make()))
            .1
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&Self::key(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (display name, value) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.values().map(|(name, v)| (name.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values().map(|(_, v)| v)
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for NameMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = NameMap::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}
