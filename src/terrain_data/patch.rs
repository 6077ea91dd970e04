use crate::{
    math::sqr_distance_to_box,
    terrain_data::{mesh::is_skirt_vertex, HeightField},
};
use bevy::math::{bounding::Aabb3d, UVec2, Vec3};
use bytemuck::{Pod, Zeroable};
use itertools::iproduct;
use std::fmt;

/// The four children of a quadtree node, in their fixed order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quadrant {
    LeftTop,
    RightTop,
    LeftBottom,
    RightBottom,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [
        Quadrant::LeftTop,
        Quadrant::RightTop,
        Quadrant::LeftBottom,
        Quadrant::RightBottom,
    ];

    /// The grid offset of the quadrant relative to its parent,
    /// where `interval` is the size of the quadrant in grid cells.
    #[inline]
    pub fn offset(self, interval: u32) -> UVec2 {
        match self {
            Quadrant::LeftTop => UVec2::new(0, 0),
            Quadrant::RightTop => UVec2::new(interval, 0),
            Quadrant::LeftBottom => UVec2::new(0, interval),
            Quadrant::RightBottom => UVec2::new(interval, interval),
        }
    }
}

/// Identifies a rendered patch of a quadtree.
///
/// The ids are dense, starting at zero in build order, so they can index per patch GPU data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatchId(pub u32);

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "patch_{}", self.0)
    }
}

/// Hands out [`PatchId`]s during a single quadtree build.
#[derive(Debug, Default)]
pub(crate) struct PatchIdCounter(u32);

impl PatchIdCounter {
    pub(crate) fn next(&mut self) -> PatchId {
        let id = PatchId(self.0);
        self.0 += 1;
        id
    }

    pub(crate) fn count(&self) -> u32 {
        self.0
    }
}

/// The per patch data a vertex shader needs to place the shared template in the world:
/// `world.xz = template.xz * scale + offset`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PatchUniform {
    pub scale: [f32; 2],
    pub offset: [f32; 2],
}

/// The CPU side mesh data of a rendered patch.
#[derive(Clone, Debug)]
pub struct PatchMesh {
    pub id: PatchId,
    /// The exact bounds of all height field samples covered by the patch.
    pub bounding_box: Aabb3d,
    /// The largest vertical deviation between the patch surface and the height field.
    pub max_error: f32,
    /// How far the skirt ring is lowered below the border.
    pub skirt_length: f32,
    /// One world height per template vertex, the skirt ring already lowered.
    pub heights: Vec<f32>,
    /// One normal per template vertex.
    pub normals: Vec<[f32; 3]>,
}

/// The geometry of a patch.
///
/// Patches that do not lie completely inside the source grid have no geometry.
/// They are kept to preserve the shape of the tree, but are never rendered.
#[derive(Clone, Debug)]
pub enum PatchGeometry {
    Rendered(PatchMesh),
    Dummy,
}

/// The inputs shared by all patches of a quadtree build.
pub(crate) struct PatchContext<'a> {
    pub(crate) height_field: &'a HeightField,
    pub(crate) normals: &'a [Vec3],
    pub(crate) patch_size: u32,
    pub(crate) root_step: u32,
}

/// A square grid of height samples taken every `step` grid cells.
#[derive(Clone, Copy)]
struct CoarseSamples<'a> {
    heights: &'a [f32],
    row_length: usize,
    border: usize,
    offset: UVec2,
    step: u32,
    patch_size: u32,
}

impl CoarseSamples<'_> {
    #[inline]
    fn sample(&self, i: u32, j: u32) -> f32 {
        self.heights[(j as usize + self.border) * self.row_length + i as usize + self.border]
    }

    /// Bilinear height at the fractional grid coordinate `x`, `z`, clamped to the patch.
    fn height(&self, x: f32, z: f32) -> f32 {
        let last = (self.patch_size - 1) as f32;
        let u = ((x - self.offset.x as f32) / self.step as f32).clamp(0.0, last);
        let v = ((z - self.offset.y as f32) / self.step as f32).clamp(0.0, last);

        let i = (u.floor() as u32).min(self.patch_size - 2);
        let j = (v.floor() as u32).min(self.patch_size - 2);
        let fu = u - i as f32;
        let fv = v - j as f32;

        let top = self.sample(i, j) * (1.0 - fu) + self.sample(i + 1, j) * fu;
        let bottom = self.sample(i, j + 1) * (1.0 - fu) + self.sample(i + 1, j + 1) * fu;

        top * (1.0 - fv) + bottom * fv
    }
}

/// Every grid point on the border of the square at `offset` with `extent` cells per side.
fn boundary_points(offset: UVec2, extent: u32) -> impl Iterator<Item = UVec2> {
    let horizontal = (0..=extent)
        .flat_map(move |i| [offset + UVec2::new(i, 0), offset + UVec2::new(i, extent)]);
    let vertical = (1..extent)
        .flat_map(move |i| [offset + UVec2::new(0, i), offset + UVec2::new(extent, i)]);

    horizontal.chain(vertical)
}

/// The camera distance at which a geometric error of `max_error` projects to exactly
/// `max_pixel_error` pixels, or `-1` if level of detail is disabled.
///
/// Inverts `pixels = error / distance * (viewport_height / 2) / tan(fovy / 2)`.
pub fn lod_distance(
    max_error: f32,
    viewport_height: f32,
    tan_half_fovy: f32,
    max_pixel_error: f32,
) -> f32 {
    if max_pixel_error <= 0.0 || tan_half_fovy <= 0.0 {
        return -1.0;
    }

    0.5 * max_error * viewport_height / (max_pixel_error * tan_half_fovy)
}

/// Squares a [`lod_distance`], mapping a disabled level of detail to [`f32::MAX`].
pub(crate) fn sqr_switch_distance(lod_distance: f32) -> f32 {
    if lod_distance < 0.0 {
        f32::MAX
    } else {
        lod_distance * lod_distance
    }
}

/// A tile of the terrain at one level of detail.
///
/// Each patch samples the height field every `step` cells, starting at its grid `offset`,
/// with `patch_size` samples per side.
#[derive(Clone, Debug)]
pub struct TerrainPatch {
    mip_level: u32,
    offset: UVec2,
    step: u32,
    patch_size: u32,
    lod_distance: f32,
    geometry: PatchGeometry,
}

impl TerrainPatch {
    /// Creates the patch covering the whole quadtree.
    pub(crate) fn root(context: &PatchContext, ids: &mut PatchIdCounter) -> Self {
        Self::new(0, UVec2::ZERO, context.root_step, &[], context, ids)
    }

    /// Creates the patch of a child quadrant.
    ///
    /// `ancestors` lists the patches from the parent up to the root.
    pub(crate) fn initialize(
        parent: &TerrainPatch,
        quadrant: Quadrant,
        ancestors: &[&TerrainPatch],
        context: &PatchContext,
        ids: &mut PatchIdCounter,
    ) -> Self {
        let mip_level = parent.mip_level + 1;
        let step = context.root_step >> mip_level;
        let interval = (context.patch_size - 1) * step;
        let offset = parent.offset + quadrant.offset(interval);

        Self::new(mip_level, offset, step, ancestors, context, ids)
    }

    fn new(
        mip_level: u32,
        offset: UVec2,
        step: u32,
        ancestors: &[&TerrainPatch],
        context: &PatchContext,
        ids: &mut PatchIdCounter,
    ) -> Self {
        let height_field = context.height_field;
        let patch_size = context.patch_size;
        let extent = (patch_size - 1) * step;

        let inside = offset.x + extent < height_field.size_x()
            && offset.y + extent < height_field.size_z();

        let geometry = match (inside, height_field.region_bounds(offset, extent)) {
            (true, Some(bounding_box)) => {
                let base: Vec<f32> = iproduct!(0..patch_size, 0..patch_size)
                    .map(|(j, i)| height_field.height(offset.x + i * step, offset.y + j * step))
                    .collect();

                let coarse = CoarseSamples {
                    heights: &base,
                    row_length: patch_size as usize,
                    border: 0,
                    offset,
                    step,
                    patch_size,
                };

                let max_error = Self::compute_max_error(&coarse, height_field);
                let skirt_length = Self::compute_skirt_length(&coarse, ancestors);
                let (heights, normals) =
                    Self::setup_vertices(&coarse, skirt_length, context.normals, height_field);

                PatchGeometry::Rendered(PatchMesh {
                    id: ids.next(),
                    bounding_box,
                    max_error,
                    skirt_length,
                    heights,
                    normals,
                })
            }
            _ => PatchGeometry::Dummy,
        };

        Self {
            mip_level,
            offset,
            step,
            patch_size,
            lod_distance: -1.0,
            geometry,
        }
    }

    /// The largest difference between the bilinear surface of the coarse samples and
    /// the true height of every fine sample the patch covers.
    fn compute_max_error(coarse: &CoarseSamples, height_field: &HeightField) -> f32 {
        let extent = (coarse.patch_size - 1) * coarse.step;
        let offset = coarse.offset;

        iproduct!(offset.y..=offset.y + extent, offset.x..=offset.x + extent)
            .map(|(z, x)| (coarse.height(x as f32, z as f32) - height_field.height(x, z)).abs())
            .fold(0.0, f32::max)
    }

    /// The largest height difference to any ancestor along the border of the patch.
    ///
    /// A coarser neighbour meets this patch along its border with the surface of the
    /// ancestor at its level, so a skirt of this length closes every possible gap.
    fn compute_skirt_length(coarse: &CoarseSamples, ancestors: &[&TerrainPatch]) -> f32 {
        ancestors
            .iter()
            .filter_map(|ancestor| ancestor.coarse_samples())
            .map(|other| Self::error_metric(coarse, &other))
            .fold(0.0, f32::max)
    }

    fn error_metric(coarse: &CoarseSamples, other: &CoarseSamples) -> f32 {
        boundary_points(coarse.offset, (coarse.patch_size - 1) * coarse.step)
            .map(|point| {
                let (x, z) = (point.x as f32, point.y as f32);
                (coarse.height(x, z) - other.height(x, z)).abs()
            })
            .fold(0.0, f32::max)
    }

    fn setup_vertices(
        coarse: &CoarseSamples,
        skirt_length: f32,
        normals: &[Vec3],
        height_field: &HeightField,
    ) -> (Vec<f32>, Vec<[f32; 3]>) {
        let patch_size = coarse.patch_size;
        let side = patch_size + 2;
        let cell = |i: u32| i.saturating_sub(1).min(patch_size - 1);

        iproduct!(0..side, 0..side)
            .map(|(z, x)| {
                let (i, j) = (cell(x), cell(z));
                let drop = if is_skirt_vertex(x, z, side) {
                    skirt_length
                } else {
                    0.0
                };

                let grid_x = coarse.offset.x + i * coarse.step;
                let grid_z = coarse.offset.y + j * coarse.step;
                let normal = normals[(grid_z * height_field.size_x() + grid_x) as usize];

                (coarse.sample(i, j) - drop, normal.to_array())
            })
            .unzip()
    }

    fn coarse_samples(&self) -> Option<CoarseSamples> {
        match &self.geometry {
            PatchGeometry::Rendered(mesh) => Some(CoarseSamples {
                heights: &mesh.heights,
                row_length: (self.patch_size + 2) as usize,
                border: 1,
                offset: self.offset,
                step: self.step,
                patch_size: self.patch_size,
            }),
            PatchGeometry::Dummy => None,
        }
    }

    /// The largest height difference to `other`, measured along the border of this patch.
    /// Dummy patches have no surface to compare against and yield zero.
    pub fn compute_error_metric(&self, other: &TerrainPatch) -> f32 {
        match (self.coarse_samples(), other.coarse_samples()) {
            (Some(coarse), Some(other)) => Self::error_metric(&coarse, &other),
            _ => 0.0,
        }
    }

    /// Recomputes the distance at which this patch is replaced by its children.
    pub fn compute_lod_distance(
        &mut self,
        viewport_height: f32,
        tan_half_fovy: f32,
        max_pixel_error: f32,
    ) {
        if let PatchGeometry::Rendered(mesh) = &self.geometry {
            self.lod_distance = lod_distance(
                mesh.max_error,
                viewport_height,
                tan_half_fovy,
                max_pixel_error,
            );
        }
    }

    /// The squared distance from the point to the bounding box of the patch.
    /// Dummy patches report zero, so that the traversal always looks at their children.
    pub fn sqr_distance_to_point(&self, point: Vec3) -> f32 {
        match &self.geometry {
            PatchGeometry::Rendered(mesh) => sqr_distance_to_box(&mesh.bounding_box, point),
            PatchGeometry::Dummy => 0.0,
        }
    }

    /// The bilinear height of the patch surface at the fractional grid coordinate `x`, `z`.
    ///
    /// In contrast to [`HeightField::real_height`] this only uses the samples of this patch.
    pub fn height(&self, x: f32, z: f32) -> Option<f32> {
        self.coarse_samples().map(|coarse| coarse.height(x, z))
    }

    /// The payload used to place the shared template of this patch in the world.
    pub fn uniform(&self, scale: Vec3, origin: Vec3) -> PatchUniform {
        PatchUniform {
            scale: [self.step as f32 * scale.x, self.step as f32 * scale.z],
            offset: [
                origin.x + self.offset.x as f32 * scale.x,
                origin.z + self.offset.y as f32 * scale.z,
            ],
        }
    }

    /// The grid points on the border of this patch.
    pub fn boundary(&self) -> impl Iterator<Item = UVec2> {
        boundary_points(self.offset, self.extent())
    }

    pub fn is_dummy(&self) -> bool {
        matches!(self.geometry, PatchGeometry::Dummy)
    }

    pub fn mesh(&self) -> Option<&PatchMesh> {
        match &self.geometry {
            PatchGeometry::Rendered(mesh) => Some(mesh),
            PatchGeometry::Dummy => None,
        }
    }

    pub fn id(&self) -> Option<PatchId> {
        self.mesh().map(|mesh| mesh.id)
    }

    pub fn geometry(&self) -> &PatchGeometry {
        &self.geometry
    }

    pub fn bounding_box(&self) -> Option<Aabb3d> {
        self.mesh().map(|mesh| mesh.bounding_box)
    }

    pub fn max_error(&self) -> f32 {
        self.mesh().map_or(0.0, |mesh| mesh.max_error)
    }

    pub fn skirt_length(&self) -> f32 {
        self.mesh().map_or(0.0, |mesh| mesh.skirt_length)
    }

    pub fn mip_level(&self) -> u32 {
        self.mip_level
    }

    pub fn offset(&self) -> UVec2 {
        self.offset
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    /// The number of grid cells covered along each side.
    pub fn extent(&self) -> u32 {
        (self.patch_size - 1) * self.step
    }

    pub fn lod_distance(&self) -> f32 {
        self.lod_distance
    }

    /// The squared switch distance, or [`f32::MAX`] if level of detail is disabled.
    pub fn sqr_lod_distance(&self) -> f32 {
        sqr_switch_distance(self.lod_distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain_data::height_field::tests::random_heights;

    fn context_field(size: u32, heights: &[f32]) -> (HeightField, Vec<Vec3>) {
        let field = HeightField::new(size, size, Vec3::ZERO, Vec3::ONE, heights, 5).unwrap();
        let normals = field.compute_normal_vectors();
        (field, normals)
    }

    #[test]
    fn lod_distance_formula() {
        assert_eq!(lod_distance(2.0, 1000.0, 0.5, 4.0), 500.0);
        assert_eq!(lod_distance(0.0, 1000.0, 0.5, 4.0), 0.0);
        assert_eq!(lod_distance(2.0, 1000.0, 0.5, 0.0), -1.0);
        assert_eq!(lod_distance(2.0, 1000.0, 0.5, -1.0), -1.0);
        assert_eq!(lod_distance(2.0, 1000.0, 0.0, 4.0), -1.0);
    }

    #[test]
    fn lod_distance_is_monotonic() {
        let errors = [0.0, 0.1, 1.0, 3.5, 20.0];
        let pixel_errors = [0.5, 1.0, 2.0, 8.0];

        for error in errors {
            for window in pixel_errors.windows(2) {
                assert!(
                    lod_distance(error, 1080.0, 0.4, window[1])
                        <= lod_distance(error, 1080.0, 0.4, window[0])
                );
            }
        }

        for pixel_error in pixel_errors {
            for window in errors.windows(2) {
                assert!(
                    lod_distance(window[1], 1080.0, 0.4, pixel_error)
                        >= lod_distance(window[0], 1080.0, 0.4, pixel_error)
                );
            }
        }
    }

    #[test]
    fn quadrant_offsets() {
        let offsets: Vec<UVec2> = Quadrant::ALL.iter().map(|q| q.offset(8)).collect();

        assert_eq!(
            offsets,
            vec![
                UVec2::new(0, 0),
                UVec2::new(8, 0),
                UVec2::new(0, 8),
                UVec2::new(8, 8)
            ]
        );
    }

    #[test]
    fn boundary_visits_every_border_point_once() {
        let points: Vec<UVec2> = boundary_points(UVec2::new(4, 8), 4).collect();

        assert_eq!(points.len(), 16);
        assert!(points
            .iter()
            .all(|p| p.x == 4 || p.x == 8 || p.y == 8 || p.y == 12));

        let mut unique = points.clone();
        unique.sort_by_key(|p| (p.x, p.y));
        unique.dedup();
        assert_eq!(unique.len(), points.len());
    }

    #[test]
    fn root_patch_of_a_random_field() {
        let heights = random_heights(9, 9, 11);
        let (field, normals) = context_field(9, &heights);
        let context = PatchContext {
            height_field: &field,
            normals: &normals,
            patch_size: 5,
            root_step: 2,
        };
        let mut ids = PatchIdCounter::default();

        let root = TerrainPatch::root(&context, &mut ids);
        let mesh = root.mesh().unwrap();

        assert_eq!(mesh.id, PatchId(0));
        assert_eq!(ids.count(), 1);
        assert_eq!(mesh.heights.len(), 49);
        assert_eq!(mesh.skirt_length, 0.0);
        assert!(mesh.max_error > 0.0);
        assert_eq!(root.extent(), 8);

        // the coarse surface passes through its own samples
        for (j, i) in iproduct!(0..5, 0..5) {
            let (x, z) = (i * 2, j * 2);
            assert_eq!(root.height(x as f32, z as f32), Some(field.height(x, z)));
        }

        let child = TerrainPatch::initialize(
            &root,
            Quadrant::RightBottom,
            &[&root],
            &context,
            &mut ids,
        );

        assert_eq!(child.mip_level(), 1);
        assert_eq!(child.step(), 1);
        assert_eq!(child.offset(), UVec2::new(4, 4));
        assert_eq!(child.max_error(), 0.0);
        assert_eq!(child.skirt_length(), child.compute_error_metric(&root));
        assert_eq!(child.id(), Some(PatchId(1)));
    }

    #[test]
    fn skirt_ring_is_lowered() {
        let heights = random_heights(9, 9, 12);
        let (field, normals) = context_field(9, &heights);
        let context = PatchContext {
            height_field: &field,
            normals: &normals,
            patch_size: 5,
            root_step: 2,
        };
        let mut ids = PatchIdCounter::default();

        let root = TerrainPatch::root(&context, &mut ids);
        let child =
            TerrainPatch::initialize(&root, Quadrant::LeftTop, &[&root], &context, &mut ids);
        let mesh = child.mesh().unwrap();
        let skirt = mesh.skirt_length;

        assert!(skirt > 0.0);

        // corner ring vertex and the border vertex it repeats
        assert_eq!(mesh.heights[0], field.height(0, 0) - skirt);
        assert_eq!(mesh.heights[8], field.height(0, 0));
        // far corner
        assert_eq!(mesh.heights[48], field.height(4, 4) - skirt);
        assert_eq!(mesh.heights[40], field.height(4, 4));
    }

    #[test]
    fn patches_outside_of_the_grid_are_dummies() {
        let heights = random_heights(9, 9, 13);
        let (field, normals) = context_field(9, &heights);
        let context = PatchContext {
            height_field: &field,
            normals: &normals,
            // a root covering 16 cells, twice the grid
            patch_size: 5,
            root_step: 4,
        };
        let mut ids = PatchIdCounter::default();

        let root = TerrainPatch::root(&context, &mut ids);
        assert!(root.is_dummy());
        assert_eq!(root.height(1.0, 1.0), None);
        assert_eq!(root.sqr_distance_to_point(Vec3::splat(100.0)), 0.0);

        let inside =
            TerrainPatch::initialize(&root, Quadrant::LeftTop, &[&root], &context, &mut ids);
        let outside =
            TerrainPatch::initialize(&root, Quadrant::RightTop, &[&root], &context, &mut ids);

        assert!(!inside.is_dummy());
        assert!(outside.is_dummy());
        assert_eq!(inside.id(), Some(PatchId(0)));
        assert_eq!(outside.id(), None);
    }

    #[test]
    fn lod_distance_is_only_computed_for_rendered_patches() {
        let heights = random_heights(9, 9, 14);
        let (field, normals) = context_field(9, &heights);
        let context = PatchContext {
            height_field: &field,
            normals: &normals,
            patch_size: 5,
            root_step: 4,
        };
        let mut ids = PatchIdCounter::default();

        let mut root = TerrainPatch::root(&context, &mut ids);
        root.compute_lod_distance(1080.0, 0.5, 2.0);
        assert_eq!(root.lod_distance(), -1.0);
        assert_eq!(root.sqr_lod_distance(), f32::MAX);

        let mut inside =
            TerrainPatch::initialize(&root, Quadrant::LeftTop, &[&root], &context, &mut ids);
        inside.compute_lod_distance(1080.0, 0.5, 2.0);
        assert_eq!(
            inside.lod_distance(),
            lod_distance(inside.max_error(), 1080.0, 0.5, 2.0)
        );
    }

    #[test]
    fn uniform_places_the_template() {
        let heights = random_heights(9, 9, 15);
        let (field, normals) = context_field(9, &heights);
        let context = PatchContext {
            height_field: &field,
            normals: &normals,
            patch_size: 5,
            root_step: 2,
        };
        let mut ids = PatchIdCounter::default();
        let root = TerrainPatch::root(&context, &mut ids);
        let child =
            TerrainPatch::initialize(&root, Quadrant::RightTop, &[&root], &context, &mut ids);

        let uniform = child.uniform(Vec3::new(2.0, 1.0, 3.0), Vec3::new(10.0, 0.0, 20.0));
        assert_eq!(uniform.scale, [2.0, 3.0]);
        assert_eq!(uniform.offset, [18.0, 20.0]);
    }
}
