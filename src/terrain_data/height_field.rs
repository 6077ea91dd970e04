use crate::{
    math::aabb_from_points,
    terrain_data::{bbox_tree::HeightFieldBBoxTree, TerrainError},
};
use bevy::math::{bounding::Aabb3d, UVec2, Vec2, Vec3};
use itertools::iproduct;
use ndarray::{s, Array2};
use std::sync::Arc;

/// The whole-terrain normal map, encoded for an RGBA8 texture upload.
#[derive(Clone, Debug, Default)]
pub struct NormalMap {
    pub size: UVec2,
    pub texels: Vec<[u8; 4]>,
}

/// Encodes a unit normal from [-1, 1] into four unsigned bytes.
#[inline]
pub fn encode_normal(normal: Vec3) -> [u8; 4] {
    let encode = |value: f32| ((value.clamp(-1.0, 1.0) * 0.5 + 0.5) * 255.0).round() as u8;

    [encode(normal.x), encode(normal.y), encode(normal.z), u8::MAX]
}

/// Looks up a single sample in world units.
#[inline]
pub(crate) fn grid_height(samples: &Array2<Vec3>, x: u32, z: u32) -> f32 {
    samples[[z as usize, x as usize]].y
}

/// Bilinearly interpolates the world height at a fractional grid coordinate.
/// The coordinate is clamped to the grid.
pub(crate) fn bilinear_grid_height(samples: &Array2<Vec3>, grid: Vec2) -> f32 {
    let (size_z, size_x) = samples.dim();

    let gx = grid.x.clamp(0.0, (size_x - 1) as f32);
    let gz = grid.y.clamp(0.0, (size_z - 1) as f32);

    let x0 = (gx.floor() as usize).min(size_x - 2);
    let z0 = (gz.floor() as usize).min(size_z - 2);
    let fx = gx - x0 as f32;
    let fz = gz - z0 as f32;

    let h00 = samples[[z0, x0]].y;
    let h10 = samples[[z0, x0 + 1]].y;
    let h01 = samples[[z0 + 1, x0]].y;
    let h11 = samples[[z0 + 1, x0 + 1]].y;

    let top = h00 * (1.0 - fx) + h10 * fx;
    let bottom = h01 * (1.0 - fx) + h11 * fx;

    top * (1.0 - fz) + bottom * fz
}

/// Converts a world position into fractional grid coordinates.
#[inline]
pub(crate) fn world_to_grid(samples: &Array2<Vec3>, scale: Vec3, x: f32, z: f32) -> Vec2 {
    let origin = samples[[0, 0]];

    Vec2::new((x - origin.x) / scale.x, (z - origin.z) / scale.z)
}

/// A regular grid of elevation samples.
///
/// Every sample is stored as its world space position, rows run along the z axis.
/// The input rows are stored in reverse order: the first row of the source data ends up at
/// the far edge of the grid (`z = size_z - 1`), matching how image based heightmaps are laid out.
///
/// The height field is immutable after construction.
#[derive(Clone, Debug)]
pub struct HeightField {
    size_x: u32,
    size_z: u32,
    offset: Vec3,
    scale: Vec3,
    samples: Arc<Array2<Vec3>>,
    bbox_tree: HeightFieldBBoxTree,
}

impl HeightField {
    /// Builds the sample positions and the bounding box tree.
    ///
    /// `scale` is the horizontal sample spacing in x and z and the vertical scale in y,
    /// `offset` is the world position of the first sample.
    pub fn new(
        size_x: u32,
        size_z: u32,
        offset: Vec3,
        scale: Vec3,
        heights: &[f32],
        patch_size: u32,
    ) -> Result<Self, TerrainError> {
        if size_x < 2 || size_z < 2 {
            return Err(TerrainError::GridTooSmall { size_x, size_z });
        }

        let expected = size_x as usize * size_z as usize;
        if heights.len() != expected {
            return Err(TerrainError::ElevationCountMismatch {
                expected,
                actual: heights.len(),
            });
        }

        if scale.x <= 0.0 || scale.z <= 0.0 {
            return Err(TerrainError::InvalidScale { scale });
        }

        if patch_size < 2 {
            return Err(TerrainError::InvalidPatchSize { patch_size });
        }

        let samples = Array2::from_shape_fn((size_z as usize, size_x as usize), |(z, x)| {
            let row = size_z as usize - 1 - z;
            let elevation = heights[row * size_x as usize + x];

            offset + Vec3::new(x as f32, elevation, z as f32) * scale
        });
        let samples = Arc::new(samples);

        let bbox_tree = HeightFieldBBoxTree::create(size_x, size_z, samples.clone(), patch_size);

        Ok(Self {
            size_x,
            size_z,
            offset,
            scale,
            samples,
            bbox_tree,
        })
    }

    pub fn size_x(&self) -> u32 {
        self.size_x
    }

    pub fn size_z(&self) -> u32 {
        self.size_z
    }

    pub fn offset(&self) -> Vec3 {
        self.offset
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn bbox_tree(&self) -> &HeightFieldBBoxTree {
        &self.bbox_tree
    }

    /// The bounding box of the whole terrain.
    pub fn bounding_box(&self) -> Aabb3d {
        self.bbox_tree.root_box()
    }

    /// The world position of the sample at the grid coordinate.
    #[inline]
    pub fn position(&self, x: u32, z: u32) -> Vec3 {
        self.samples[[z as usize, x as usize]]
    }

    /// The exact world height of the sample at the grid coordinate.
    #[inline]
    pub fn height(&self, x: u32, z: u32) -> f32 {
        grid_height(&self.samples, x, z)
    }

    /// The bilinearly interpolated height at a fractional grid coordinate.
    #[inline]
    pub fn interpolated_height(&self, grid: Vec2) -> f32 {
        bilinear_grid_height(&self.samples, grid)
    }

    /// The bilinearly interpolated world height at the world position `x`, `z`.
    /// Positions outside of the grid are clamped to its edge.
    pub fn real_height(&self, x: f32, z: f32) -> f32 {
        self.interpolated_height(self.grid_coordinates(x, z))
    }

    /// Converts world `x`, `z` into fractional grid coordinates.
    pub fn grid_coordinates(&self, x: f32, z: f32) -> Vec2 {
        world_to_grid(&self.samples, self.scale, x, z)
    }

    /// The exact bounds of the samples in the rectangle starting at `offset`
    /// and spanning `extent` cells in both directions.
    pub fn region_bounds(&self, offset: UVec2, extent: u32) -> Option<Aabb3d> {
        let x1 = (offset.x + extent).min(self.size_x - 1) as usize;
        let z1 = (offset.y + extent).min(self.size_z - 1) as usize;

        if offset.x as usize > x1 || offset.y as usize > z1 {
            return None;
        }

        let region = self
            .samples
            .slice(s![offset.y as usize..=z1, offset.x as usize..=x1]);

        aabb_from_points(region.iter().copied())
    }

    fn normal_at(&self, x: usize, z: usize) -> Vec3 {
        let x0 = x.saturating_sub(1);
        let x1 = (x + 1).min(self.size_x as usize - 1);
        let z0 = z.saturating_sub(1);
        let z1 = (z + 1).min(self.size_z as usize - 1);

        let left = self.samples[[z, x0]];
        let right = self.samples[[z, x1]];
        let near = self.samples[[z0, x]];
        let far = self.samples[[z1, x]];

        let slope_x = (right.y - left.y) / (right.x - left.x);
        let slope_z = (far.y - near.y) / (far.z - near.z);

        Vec3::new(-slope_x, 1.0, -slope_z).normalize()
    }

    /// Estimates the surface normal of every sample with central differences.
    pub fn compute_normal_vectors(&self) -> Vec<Vec3> {
        iproduct!(0..self.size_z as usize, 0..self.size_x as usize)
            .map(|(z, x)| self.normal_at(x, z))
            .collect()
    }

    /// Estimates the surface normals, together with their encoding for a GPU normal map.
    pub fn compute_normals(&self) -> (Vec<Vec3>, NormalMap) {
        let normals = self.compute_normal_vectors();
        let normal_map = NormalMap {
            size: UVec2::new(self.size_x, self.size_z),
            texels: normals.iter().copied().map(encode_normal).collect(),
        };

        (normals, normal_map)
    }
}
