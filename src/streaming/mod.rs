//! Remote metadata loading, snapshot publishing and the storage facade

pub mod disk_io;
pub mod loader;
pub mod manifest;
pub mod revolving;
pub mod source;
pub mod storage;

pub use disk_io::{
    compress_snapshot, decompress_snapshot,
    serialize_snapshot, deserialize_snapshot,
    save_snapshot, load_snapshot,
    SnapshotData, SNAPSHOT_FILE_NAME,
};
pub use loader::{build_detail_level, BackgroundLoader, LoadStatus, MetadataLoader, SnapshotSlots};
pub use manifest::{CubeMetadata, Extents, SetEntry, SetMetadata, VersionEntry};
pub use revolving::RevolvingState;
pub use source::{fetch_json, resolve_uri, FileSource, MemorySource, Payload, ResourceSource, UriSource};
#[cfg(feature = "http")]
pub use source::HttpSource;
pub use storage::{
    DetailLevelDescription, SetSummary, SetVersionDescription, Storage, VersionSummary,
};
