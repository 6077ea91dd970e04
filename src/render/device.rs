use bevy::{
    math::UVec2,
    render::{
        render_resource::*,
        renderer::{RenderDevice, RenderQueue},
    },
};
use bytemuck::cast_slice;

/// Creates the GPU objects of a terrain from plain CPU arrays.
///
/// The terrain only talks to the GPU through this trait, which keeps every GPU object
/// reproducible from the data retained by the [`Quadtree`](crate::terrain_data::Quadtree).
pub trait TerrainDevice {
    type Buffer;
    type Texture;

    fn create_vertex_buffer(&self, label: &str, contents: &[u8]) -> Self::Buffer;

    fn create_index_buffer(&self, label: &str, indices: &[u32]) -> Self::Buffer;

    /// Creates an uninitialized vertex buffer of `size` bytes, filled with `write_buffer`.
    fn create_buffer(&self, label: &str, size: u64) -> Self::Buffer;

    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, bytes: &[u8]);

    /// Creates an uninitialized RGBA8 texture.
    fn create_texture(&self, label: &str, size: UVec2) -> Self::Texture;

    /// Uploads the texels of the region starting at `origin` with the given `size`.
    fn write_texture(
        &self,
        texture: &Self::Texture,
        origin: UVec2,
        size: UVec2,
        texels: &[[u8; 4]],
    );
}

/// The [`TerrainDevice`] of the Bevy renderer.
#[derive(Clone)]
pub struct RenderTerrainDevice {
    device: RenderDevice,
    queue: RenderQueue,
}

impl RenderTerrainDevice {
    pub fn new(device: &RenderDevice, queue: &RenderQueue) -> Self {
        Self {
            device: device.clone(),
            queue: queue.clone(),
        }
    }
}

impl TerrainDevice for RenderTerrainDevice {
    type Buffer = Buffer;
    type Texture = Texture;

    fn create_vertex_buffer(&self, label: &str, contents: &[u8]) -> Buffer {
        self.device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some(label),
            contents,
            usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
        })
    }

    fn create_index_buffer(&self, label: &str, indices: &[u32]) -> Buffer {
        self.device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some(label),
            contents: cast_slice(indices),
            usage: BufferUsages::INDEX,
        })
    }

    fn create_buffer(&self, label: &str, size: u64) -> Buffer {
        self.device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size,
            usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn write_buffer(&self, buffer: &Buffer, offset: u64, bytes: &[u8]) {
        self.queue.write_buffer(buffer, offset, bytes);
    }

    fn create_texture(&self, label: &str, size: UVec2) -> Texture {
        self.device.create_texture(&TextureDescriptor {
            label: Some(label),
            size: Extent3d {
                width: size.x,
                height: size.y,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        })
    }

    fn write_texture(&self, texture: &Texture, origin: UVec2, size: UVec2, texels: &[[u8; 4]]) {
        self.queue.write_texture(
            ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: Origin3d {
                    x: origin.x,
                    y: origin.y,
                    z: 0,
                },
                aspect: TextureAspect::All,
            },
            cast_slice(texels),
            ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * size.x),
                rows_per_image: Some(size.y),
            },
            Extent3d {
                width: size.x,
                height: size.y,
                depth_or_array_layers: 1,
            },
        );
    }
}
