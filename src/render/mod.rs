//! The GPU side of the terrain.
//!
//! Every terrain uploads its shared geometry, the per patch heights and normals and its normal
//! map once through a [`TerrainDevice`]. Each frame the patches selected for a view are turned
//! into an instance buffer of [`PatchUniform`](crate::terrain_data::PatchUniform)s, which places
//! the shared template of each patch in the world. Materials, pipelines and draw commands are
//! up to the application.

pub mod device;
pub mod gpu_terrain;
pub mod gpu_terrain_view;

pub use crate::render::{
    device::{RenderTerrainDevice, TerrainDevice},
    gpu_terrain::{GpuPatch, GpuTerrain, RebuildableResource},
    gpu_terrain_view::GpuTerrainView,
};
