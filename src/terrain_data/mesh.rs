//! The geometry shared by all patches of a quadtree.
//!
//! Every patch is drawn with the same unit grid of `(patch_size + 2)²` vertices: the inner
//! `patch_size²` vertices cover the patch and the outer ring forms the skirt. The ring repeats
//! the x/z coordinates of the border and is lowered by the patch's skirt length, so the template
//! only has to store two components per vertex. Per patch a scale and an offset place the grid
//! in the world.

use itertools::iproduct;

/// The vertex template and index lists shared by every patch.
#[derive(Clone, Debug)]
pub struct SharedGeometry {
    /// Vertices per side, including the skirt ring.
    pub vertices_per_side: u32,
    /// Unit grid x/z coordinates in patch cells.
    pub template: Vec<[f32; 2]>,
    /// Triangle strip covering the template.
    pub strip_indices: Vec<u32>,
    /// Line list with the edges of every non-degenerate strip triangle.
    pub wireframe_indices: Vec<u32>,
}

impl SharedGeometry {
    pub fn new(patch_size: u32, vertex_cache_size: u32) -> Self {
        let vertices_per_side = patch_size + 2;
        let strip_indices = strip_indices(vertices_per_side, vertex_cache_size);
        let wireframe_indices = wireframe_indices(&strip_indices);

        Self {
            vertices_per_side,
            template: template_vertices(patch_size),
            strip_indices,
            wireframe_indices,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.template.len()
    }

    /// The number of non-degenerate triangles drawn per patch.
    pub fn triangle_count(&self) -> usize {
        2 * (self.vertices_per_side as usize - 1).pow(2)
    }
}

/// The unit grid including the skirt ring, which repeats the border coordinates.
pub fn template_vertices(patch_size: u32) -> Vec<[f32; 2]> {
    let side = patch_size + 2;
    let cell = |i: u32| i.saturating_sub(1).min(patch_size - 1) as f32;

    iproduct!(0..side, 0..side)
        .map(|(z, x)| [cell(x), cell(z)])
        .collect()
}

/// Whether the template vertex belongs to the skirt ring.
#[inline]
pub fn is_skirt_vertex(x: u32, z: u32, vertices_per_side: u32) -> bool {
    x == 0 || z == 0 || x == vertices_per_side - 1 || z == vertices_per_side - 1
}

/// The number of quad rows processed together, so that the vertices shared by two neighbouring
/// columns are still in the post transform cache when they are reused.
#[inline]
pub fn band_rows(vertex_cache_size: u32) -> u32 {
    (vertex_cache_size / 2).saturating_sub(1).max(1)
}

/// Builds a triangle strip over a square grid with a cache aware row block ordering.
///
/// The quad rows are processed in bands of [`band_rows`] rows. Inside a band every quad column
/// is emitted as one vertical strip segment, whose first and last index are repeated to
/// stitch the segments together with degenerate triangles. Every segment has an even length,
/// which keeps the winding consistent across the whole strip.
pub fn strip_indices(vertices_per_side: u32, vertex_cache_size: u32) -> Vec<u32> {
    let quads = vertices_per_side - 1;
    let band = band_rows(vertex_cache_size);
    let index = |x: u32, z: u32| z * vertices_per_side + x;

    let mut indices = Vec::new();

    for start in (0..quads).step_by(band as usize) {
        let end = (start + band).min(quads);

        for column in 0..quads {
            indices.push(index(column, start));

            for row in start..=end {
                indices.push(index(column, row));
                indices.push(index(column + 1, row));
            }

            indices.push(index(column + 1, end));
        }
    }

    indices
}

/// The number of indices [`strip_indices`] produces.
pub fn strip_index_count(vertices_per_side: u32, vertex_cache_size: u32) -> usize {
    let quads = vertices_per_side - 1;
    let bands = quads.div_ceil(band_rows(vertex_cache_size));

    (quads * (2 * quads + 4 * bands)) as usize
}

/// Converts a triangle strip into a line list by walking it in triangle triples.
/// Triangles with two equal indices are degenerate and skipped.
pub fn wireframe_indices(strip: &[u32]) -> Vec<u32> {
    strip
        .windows(3)
        .filter(|triangle| {
            triangle[0] != triangle[1] && triangle[1] != triangle[2] && triangle[0] != triangle[2]
        })
        .flat_map(|triangle| {
            [
                triangle[0],
                triangle[1],
                triangle[1],
                triangle[2],
                triangle[2],
                triangle[0],
            ]
        })
        .collect()
}
