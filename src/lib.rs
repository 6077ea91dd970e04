//! This crate renders large height-field terrains with a continuous level of detail.
//!
//! # Background
//! Even a small terrain with a height map of 1000x1000 pixels would require 1 million vertices
//! to be rendered each frame per view, with a naive approach without any lod strategy.
//!
//! This crate tessellates the height field into a [`Quadtree`](terrain_data::Quadtree) of
//! patches that all share the same vertex and index layout and only differ in the spacing of
//! their samples. Every patch knows how much its surface deviates from the patches below it.
//! Projected onto the screen this error yields a camera distance, below which the patch is
//! replaced by its four children. Each frame the quadtree is traversed per view, culled against
//! the view frustum and the coarsest patches that are still accurate enough are selected.
//! See the [`terrain_data`] module for more information.
//!
//! The selected patches are uploaded as instance data, while the geometry of all patches is
//! uploaded only once. See the [`render`] module for more information.

pub mod config;
pub mod debug;
pub mod formats;
pub mod math;
pub mod plugin;
pub mod render;
pub mod spawn;
pub mod terrain;
pub mod terrain_data;
pub mod terrain_view;

pub mod prelude {
    //! `use bevy_clod_terrain::prelude::*;` to import common components, bundles, and plugins.

    pub use crate::{
        config::TerrainConfig,
        debug::{DebugTerrain, TerrainDebugPlugin},
        formats::Heightmap,
        plugin::{TerrainPlugin, TerrainPluginConfig},
        render::{GpuTerrain, GpuTerrainView},
        spawn::SpawnTerrainCommandsExt,
        terrain::{Terrain, TerrainBuildFailed, TerrainComponents},
        terrain_data::{
            CullCamera, PatchSelection, Quadtree, QuadtreeDescriptor, TerrainError, TerrainPatch,
        },
        terrain_view::{TerrainViewComponents, TerrainViewConfig},
    };
}
