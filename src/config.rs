//! The configuration of a terrain, loaded as an asset from `*.terrain.ron` files.

use crate::{
    formats::Heightmap,
    terrain_data::{Quadtree, QuadtreeDescriptor, TerrainError},
};
use anyhow::{Context, Result};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Describes how a terrain is built from its heightmap.
///
/// ```ron
/// (
///     heightmap: "terrains/valley.png",
///     patch_size: 33,
///     scale: (2.0, 120.0, 2.0),
/// )
/// ```
#[derive(Asset, TypePath, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TerrainConfig {
    /// The asset path of the heightmap image.
    pub heightmap: String,
    /// The number of samples along each side of a patch, a power of two plus one.
    pub patch_size: u32,
    /// The number of vertices the post transform cache of the target GPU holds.
    pub vertex_cache_size: u32,
    /// The sample spacing in x and z and the height of a fully white heightmap pixel in y.
    pub scale: Vec3,
    /// The local position of the first heightmap sample.
    pub offset: Vec3,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            heightmap: String::new(),
            patch_size: 33,
            vertex_cache_size: QuadtreeDescriptor::DEFAULT_VERTEX_CACHE_SIZE,
            scale: Vec3::ONE,
            offset: Vec3::ZERO,
        }
    }
}

impl TerrainConfig {
    /// Reads a configuration from a RON file outside of the asset system.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read the terrain config {}.", path.display()))?;

        ron::from_str(&source)
            .with_context(|| format!("Failed to parse the terrain config {}.", path.display()))
    }

    pub fn descriptor(&self, size_x: u32, size_z: u32) -> QuadtreeDescriptor {
        QuadtreeDescriptor {
            patch_size: self.patch_size,
            size_x,
            size_z,
            scale: self.scale,
            offset: self.offset,
            vertex_cache_size: self.vertex_cache_size,
        }
    }

    /// Builds the quadtree of the terrain from its decoded heightmap.
    pub fn build_quadtree(&self, heightmap: &Heightmap) -> Result<Quadtree, TerrainError> {
        Quadtree::build(
            &self.descriptor(heightmap.size_x, heightmap.size_z),
            &heightmap.heights,
        )
    }
}
