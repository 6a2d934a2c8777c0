//! Cubeserve - hot-reloadable multi-LOD spatial index for cube-partitioned scenes

pub mod core;
pub mod math;
pub mod octree;
pub mod dataset;
pub mod streaming;
