use crate::{
    render::device::{RenderTerrainDevice, TerrainDevice},
    terrain::{Terrain, TerrainComponents},
    terrain_data::{NormalMap, Quadtree},
};
use bevy::{
    math::UVec2,
    prelude::*,
    render::{
        renderer::{RenderDevice, RenderQueue},
        Extract,
    },
};
use bytemuck::cast_slice;

/// The maximum number of texel rows uploaded with a single texture write.
const TEXTURE_UPLOAD_ROWS: u32 = 256;

/// A GPU object that can be recreated purely from the CPU data it was created from,
/// for example after the device was lost.
pub trait RebuildableResource<D: TerrainDevice> {
    type Source;

    fn rebuild(&mut self, device: &D, source: &Self::Source);
}

/// The GPU buffers of one patch.
pub struct GpuPatch<D: TerrainDevice = RenderTerrainDevice> {
    /// One height per template vertex.
    pub heights: D::Buffer,
    /// One normal per template vertex.
    pub normals: D::Buffer,
}

/// Stores the GPU representation of a [`Quadtree`].
///
/// All patches share the template vertices and the index buffers, only the heights and
/// normals are stored per patch, indexed by [`PatchId`](crate::terrain_data::PatchId).
pub struct GpuTerrain<D: TerrainDevice = RenderTerrainDevice> {
    pub template: D::Buffer,
    pub vertex_count: u32,
    pub strip_indices: D::Buffer,
    pub strip_index_count: u32,
    pub wireframe_indices: D::Buffer,
    pub wireframe_index_count: u32,
    pub patches: Vec<GpuPatch<D>>,
    pub normal_map: D::Texture,
}

impl<D: TerrainDevice> GpuTerrain<D> {
    pub fn new(device: &D, quadtree: &Quadtree) -> Self {
        let geometry = quadtree.geometry();

        let patches = quadtree
            .rendered_patches()
            .filter_map(|patch| patch.mesh())
            .map(|mesh| GpuPatch {
                heights: device.create_vertex_buffer(
                    &format!("{}_heights", mesh.id),
                    cast_slice(&mesh.heights),
                ),
                normals: device.create_vertex_buffer(
                    &format!("{}_normals", mesh.id),
                    cast_slice(&mesh.normals),
                ),
            })
            .collect();

        let normal_map = device.create_texture("terrain_normal_map", quadtree.normal_map().size);
        upload_normal_map(device, &normal_map, quadtree.normal_map());

        Self {
            template: device
                .create_vertex_buffer("terrain_template", cast_slice(&geometry.template)),
            vertex_count: geometry.vertex_count() as u32,
            strip_indices: device
                .create_index_buffer("terrain_strip_indices", &geometry.strip_indices),
            strip_index_count: geometry.strip_indices.len() as u32,
            wireframe_indices: device
                .create_index_buffer("terrain_wireframe_indices", &geometry.wireframe_indices),
            wireframe_index_count: geometry.wireframe_indices.len() as u32,
            patches,
            normal_map,
        }
    }

    /// The index buffer and index count to draw with.
    pub fn indices(&self, wireframe: bool) -> (&D::Buffer, u32) {
        if wireframe {
            (&self.wireframe_indices, self.wireframe_index_count)
        } else {
            (&self.strip_indices, self.strip_index_count)
        }
    }
}

impl<D: TerrainDevice> RebuildableResource<D> for GpuTerrain<D> {
    type Source = Quadtree;

    fn rebuild(&mut self, device: &D, source: &Quadtree) {
        *self = Self::new(device, source);
    }
}

/// Uploads the normal map in bands of rows, so that no single write gets too large.
fn upload_normal_map<D: TerrainDevice>(device: &D, texture: &D::Texture, normal_map: &NormalMap) {
    let width = normal_map.size.x as usize;

    for start in (0..normal_map.size.y).step_by(TEXTURE_UPLOAD_ROWS as usize) {
        let rows = TEXTURE_UPLOAD_ROWS.min(normal_map.size.y - start);
        let texels = &normal_map.texels[start as usize * width..(start + rows) as usize * width];

        device.write_texture(
            texture,
            UVec2::new(0, start),
            UVec2::new(normal_map.size.x, rows),
            texels,
        );
    }
}

impl GpuTerrain {
    /// Creates the [`GpuTerrain`] of new terrains and drops the ones of despawned terrains.
    pub(crate) fn initialize(
        device: Res<RenderDevice>,
        queue: Res<RenderQueue>,
        mut gpu_terrains: ResMut<TerrainComponents<GpuTerrain>>,
        terrains: Extract<Query<(Entity, &Terrain)>>,
    ) {
        gpu_terrains.retain(|&terrain, _| terrains.contains(terrain));

        let device = RenderTerrainDevice::new(&device, &queue);

        for (terrain, quadtree) in terrains.iter() {
            if gpu_terrains.contains_key(&terrain) {
                continue;
            }

            info!(
                "Uploading terrain {terrain} with {} patches to the GPU.",
                quadtree.patch_count()
            );

            gpu_terrains.insert(terrain, GpuTerrain::new(&device, quadtree));
        }
    }
}
