//! The CPU side data structures of the terrain.
//!
//! A [`HeightField`] stores the elevation samples of the source grid together with a
//! [`HeightFieldBBoxTree`] over them. The [`Quadtree`] tessellates the height field into
//! [`TerrainPatch`]es of identical topology, which only differ in the spacing (`step`) of their
//! samples. Each patch knows its geometric error, which is converted into a camera distance at
//! which the patch has to be replaced by its four children. All patches share the vertex
//! template and index lists of the [`SharedGeometry`], while cracks between patches of different
//! detail levels are hidden by a lowered skirt around every patch.

use bevy::math::Vec3;
use derive_more::derive::{Display, Error};

pub mod bbox_tree;
pub mod height_field;
pub mod mesh;
pub mod patch;
pub mod quadtree;

pub use crate::terrain_data::{
    bbox_tree::{BBoxNode, GridRect, HeightFieldBBoxTree},
    height_field::{encode_normal, HeightField, NormalMap},
    mesh::SharedGeometry,
    patch::{PatchGeometry, PatchId, PatchMesh, PatchUniform, Quadrant, TerrainPatch},
    quadtree::{
        CullCamera, LodDistances, NodeId, PatchSelection, Quadtree, QuadtreeDescriptor,
        QuadtreeNode, SelectedPatch,
    },
};

/// Errors that prevent a terrain from being built.
///
/// A failed build never leaves a partially constructed quadtree behind.
#[derive(Clone, Debug, PartialEq, Display, Error)]
pub enum TerrainError {
    #[display("The patch size {patch_size} is invalid, it has to be a power of two plus one.")]
    InvalidPatchSize { patch_size: u32 },
    #[display(
        "The grid of {size_x}x{size_z} samples does not align with patches of {patch_size} samples."
    )]
    MisalignedExtents {
        size_x: u32,
        size_z: u32,
        patch_size: u32,
    },
    #[display("The grid of {size_x}x{size_z} samples is too small, at least 2x2 are required.")]
    GridTooSmall { size_x: u32, size_z: u32 },
    #[display("Expected {expected} elevation samples, but got {actual}.")]
    ElevationCountMismatch { expected: usize, actual: usize },
    #[display("The horizontal scale of {scale} has to be positive.")]
    InvalidScale { scale: Vec3 },
    #[display("The vertex cache size {vertex_cache_size} is too small, at least 4 are required.")]
    InvalidVertexCacheSize { vertex_cache_size: u32 },
    #[display("The heightmap format {format} is not supported.")]
    UnsupportedHeightmapFormat { format: String },
}
