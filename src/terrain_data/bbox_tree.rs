use crate::{
    math::{aabb_from_min_max, aabb_from_points, aabb_union},
    terrain_data::height_field::{bilinear_grid_height, grid_height, world_to_grid},
};
use bevy::math::{bounding::Aabb3d, Vec3};
use itertools::iproduct;
use ndarray::Array2;
use std::sync::Arc;

/// A rectangle of grid samples.
///
/// Neighbouring rectangles share their border samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridRect {
    pub x: u32,
    pub y: u32,
    /// The width in samples.
    pub w: u32,
    /// The height in samples.
    pub h: u32,
}

impl GridRect {
    /// Splits the rectangle in half along its longer axis.
    fn bisect(self) -> [GridRect; 2] {
        if self.w >= self.h {
            let half = (self.w - 1) / 2;

            [
                GridRect {
                    w: half + 1,
                    ..self
                },
                GridRect {
                    x: self.x + half,
                    w: self.w - half,
                    ..self
                },
            ]
        } else {
            let half = (self.h - 1) / 2;

            [
                GridRect {
                    h: half + 1,
                    ..self
                },
                GridRect {
                    y: self.y + half,
                    h: self.h - half,
                    ..self
                },
            ]
        }
    }
}

#[derive(Clone, Debug)]
pub struct BBoxNode {
    pub bounding_box: Aabb3d,
    pub rect: GridRect,
    /// Indices of the two halves, `None` for leaves.
    pub children: Option<[usize; 2]>,
}

/// A binary bounding volume hierarchy over the samples of a [`HeightField`](super::HeightField).
///
/// The grid is bisected along its longer axis until a rectangle fits into a patch.
/// Leaves store the exact bounds of their samples, interior nodes the union of their children.
#[derive(Clone, Debug)]
pub struct HeightFieldBBoxTree {
    nodes: Vec<BBoxNode>,
    root: usize,
    samples: Arc<Array2<Vec3>>,
}

impl HeightFieldBBoxTree {
    pub fn create(res_x: u32, res_y: u32, vertices: Arc<Array2<Vec3>>, patch_size: u32) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: 0,
            samples: vertices,
        };

        let rect = GridRect {
            x: 0,
            y: 0,
            w: res_x,
            h: res_y,
        };

        tree.root = tree.build(rect, patch_size);
        tree
    }

    fn build(&mut self, rect: GridRect, patch_size: u32) -> usize {
        let node = if rect.w <= patch_size && rect.h <= patch_size {
            let first = self.samples[[rect.y as usize, rect.x as usize]];
            let points = iproduct!(rect.y..rect.y + rect.h, rect.x..rect.x + rect.w)
                .map(|(z, x)| self.samples[[z as usize, x as usize]]);

            BBoxNode {
                bounding_box: aabb_from_points(points)
                    .unwrap_or_else(|| aabb_from_min_max(first, first)),
                rect,
                children: None,
            }
        } else {
            let [a, b] = rect.bisect();
            let a = self.build(a, patch_size);
            let b = self.build(b, patch_size);

            BBoxNode {
                bounding_box: aabb_union(&self.nodes[a].bounding_box, &self.nodes[b].bounding_box),
                rect,
                children: Some([a, b]),
            }
        };

        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn root(&self) -> &BBoxNode {
        &self.nodes[self.root]
    }

    pub fn root_box(&self) -> Aabb3d {
        self.root().bounding_box
    }

    pub fn node(&self, index: usize) -> &BBoxNode {
        &self.nodes[index]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn leaves(&self) -> impl Iterator<Item = &BBoxNode> {
        self.nodes.iter().filter(|node| node.children.is_none())
    }

    /// The exact world height of the sample at the grid coordinate.
    pub fn height(&self, x: u32, z: u32) -> f32 {
        grid_height(&self.samples, x, z)
    }

    /// The bilinearly interpolated world height at world `x`, `z`.
    pub fn real_height(&self, x: f32, z: f32) -> f32 {
        let origin = self.samples[[0, 0]];
        let next = self.samples[[1, 1]];
        let scale = Vec3::new(next.x - origin.x, 1.0, next.z - origin.z);

        bilinear_grid_height(&self.samples, world_to_grid(&self.samples, scale, x, z))
    }
}
