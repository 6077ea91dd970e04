use crate::{
    math::{aabb_union, ClipFrustum, ClipPlanes},
    terrain_data::{
        patch::{lod_distance, sqr_switch_distance, PatchContext, PatchIdCounter},
        HeightField, NormalMap, PatchId, PatchUniform, Quadrant, SharedGeometry, TerrainError,
        TerrainPatch,
    },
};
use bevy::math::{bounding::Aabb3d, Mat4, Vec3};
use slab::Slab;
use std::iter;

/// Everything required to build a [`Quadtree`] besides the elevation samples.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadtreeDescriptor {
    /// The number of samples along each side of a patch, a power of two plus one.
    pub patch_size: u32,
    pub size_x: u32,
    pub size_z: u32,
    /// The sample spacing in x and z and the vertical scale in y.
    pub scale: Vec3,
    /// The world position of the first sample.
    pub offset: Vec3,
    /// The number of vertices the post transform cache of the target GPU holds.
    pub vertex_cache_size: u32,
}

impl QuadtreeDescriptor {
    pub const DEFAULT_VERTEX_CACHE_SIZE: u32 = 24;

    pub fn new(size_x: u32, size_z: u32, patch_size: u32) -> Self {
        Self {
            patch_size,
            size_x,
            size_z,
            scale: Vec3::ONE,
            offset: Vec3::ZERO,
            vertex_cache_size: Self::DEFAULT_VERTEX_CACHE_SIZE,
        }
    }

    fn validate(&self) -> Result<(), TerrainError> {
        let Self {
            patch_size,
            size_x,
            size_z,
            vertex_cache_size,
            ..
        } = *self;

        if patch_size < 2 || !(patch_size - 1).is_power_of_two() {
            return Err(TerrainError::InvalidPatchSize { patch_size });
        }

        if size_x < 2 || size_z < 2 {
            return Err(TerrainError::GridTooSmall { size_x, size_z });
        }

        if (size_x - 1) % (patch_size - 1) != 0 || (size_z - 1) % (patch_size - 1) != 0 {
            return Err(TerrainError::MisalignedExtents {
                size_x,
                size_z,
                patch_size,
            });
        }

        if vertex_cache_size < 4 {
            return Err(TerrainError::InvalidVertexCacheSize { vertex_cache_size });
        }

        Ok(())
    }
}

/// Addresses a node inside the arena of a [`Quadtree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// A node of the [`Quadtree`], owning exactly one patch.
#[derive(Clone, Debug)]
pub struct QuadtreeNode {
    pub patch: TerrainPatch,
    pub parent: Option<NodeId>,
    /// The children in [`Quadrant::ALL`] order.
    pub children: Option<[NodeId; 4]>,
    /// Bounds of all rendered patches in the subtree, `None` if there are none.
    pub bounding_box: Option<Aabb3d>,
}

/// The camera data required to select the patches of a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CullCamera {
    pub clip_from_world: Mat4,
    /// The viewport height in pixels.
    pub viewport_height: f32,
    /// The tangent of half the vertical field of view, zero for orthographic projections.
    pub tan_half_fovy: f32,
}

/// A patch chosen to be rendered this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SelectedPatch {
    pub id: PatchId,
    pub node: NodeId,
    pub mip_level: u32,
    pub uniform: PatchUniform,
}

/// The patches chosen by [`Quadtree::cull`], in traversal order.
#[derive(Clone, Debug, Default)]
pub struct PatchSelection {
    patches: Vec<SelectedPatch>,
}

impl PatchSelection {
    pub fn clear(&mut self) {
        self.patches.clear();
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SelectedPatch> {
        self.patches.iter()
    }

    pub fn patches(&self) -> &[SelectedPatch] {
        &self.patches
    }

    pub fn uniforms(&self) -> Vec<PatchUniform> {
        self.patches.iter().map(|patch| patch.uniform).collect()
    }

    /// The number of triangles drawn for the selection, given the triangles of one patch.
    pub fn triangle_count(&self, triangles_per_patch: usize) -> usize {
        self.patches.len() * triangles_per_patch
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct CameraParameters {
    viewport_height: f32,
    tan_half_fovy: f32,
    max_pixel_error: f32,
}

/// The switch distances of every patch for one set of camera parameters, kept per view.
#[derive(Clone, Debug, PartialEq)]
pub struct LodDistances {
    parameters: CameraParameters,
    /// Squared distances indexed by [`NodeId`].
    sqr_distances: Vec<f32>,
}

impl LodDistances {
    /// Whether the distances were computed for these camera parameters.
    pub fn is_for(&self, viewport_height: f32, tan_half_fovy: f32, max_pixel_error: f32) -> bool {
        self.parameters
            == CameraParameters {
                viewport_height,
                tan_half_fovy,
                max_pixel_error,
            }
    }

    /// The squared switch distance of the node, [`f32::MAX`] if it never switches.
    pub fn sqr_distance(&self, id: NodeId) -> f32 {
        self.sqr_distances[id.0]
    }
}

struct Traversal<'a> {
    frustum: ClipFrustum,
    lod_distances: Option<&'a LodDistances>,
    eye: Vec3,
    max_detail_level: Option<u32>,
    scale: Vec3,
    origin: Vec3,
}

/// A quadtree of [`TerrainPatch`]es covering a [`HeightField`].
///
/// The root patch spans the next power of two sized square around the source grid, every
/// level below halves the `step` of its parent until the leaves sample every grid point.
/// Parts of the square outside of the source grid are filled with dummy patches, which keeps
/// the tree a complete quad split without rendering anything there.
///
/// The tree is built once and afterwards only the switch distances of the patches change,
/// whenever [`Quadtree::setup_camera`] is called with new parameters.
#[derive(Clone, Debug)]
pub struct Quadtree {
    patch_size: u32,
    root_size: u32,
    root_step: u32,
    height_field: HeightField,
    geometry: SharedGeometry,
    normal_map: NormalMap,
    normals: Vec<Vec3>,
    nodes: Slab<QuadtreeNode>,
    root: NodeId,
    /// The node of every rendered patch, indexed by [`PatchId`].
    patches: Vec<NodeId>,
    camera: Option<CameraParameters>,
}

impl Quadtree {
    /// Builds the height field, the shared geometry and all patches.
    pub fn build(
        descriptor: &QuadtreeDescriptor,
        elevations: &[f32],
    ) -> Result<Self, TerrainError> {
        descriptor.validate()?;

        let QuadtreeDescriptor {
            patch_size,
            size_x,
            size_z,
            scale,
            offset,
            vertex_cache_size,
        } = *descriptor;

        let height_field = HeightField::new(size_x, size_z, offset, scale, elevations, patch_size)?;
        let geometry = SharedGeometry::new(patch_size, vertex_cache_size);

        let (normals, normal_map) = height_field.compute_normals();

        let root_size = (size_x.max(size_z) - 1).next_power_of_two() + 1;
        let root_step = (root_size - 1) / (patch_size - 1);

        let context = PatchContext {
            height_field: &height_field,
            normals: &normals,
            patch_size,
            root_step,
        };

        let depth = root_step.trailing_zeros();
        let capacity: usize = (0..=depth).map(|level| 1usize << (2 * level)).sum();

        let mut nodes = Slab::with_capacity(capacity);
        let mut ids = PatchIdCounter::default();

        let root = TerrainPatch::root(&context, &mut ids);
        let root = Self::build_subtree(&mut nodes, root, &[], &context, &mut ids);

        let mut patches = vec![root; ids.count() as usize];
        for (key, node) in &nodes {
            if let Some(id) = node.patch.id() {
                patches[id.0 as usize] = NodeId(key);
            }
        }

        Ok(Self {
            patch_size,
            root_size,
            root_step,
            height_field,
            geometry,
            normal_map,
            normals,
            nodes,
            root,
            patches,
            camera: None,
        })
    }

    /// Inserts the patch and all of its descendants, returns the id of its node.
    ///
    /// `ancestors` lists the patches from the parent up to the root.
    fn build_subtree(
        nodes: &mut Slab<QuadtreeNode>,
        patch: TerrainPatch,
        ancestors: &[&TerrainPatch],
        context: &PatchContext,
        ids: &mut PatchIdCounter,
    ) -> NodeId {
        let children = (patch.step() > 1).then(|| {
            let chain: Vec<&TerrainPatch> = iter::once(&patch)
                .chain(ancestors.iter().copied())
                .collect();

            Quadrant::ALL.map(|quadrant| {
                let child = TerrainPatch::initialize(&patch, quadrant, &chain, context, ids);
                Self::build_subtree(nodes, child, &chain, context, ids)
            })
        });

        let bounding_box = match &children {
            Some(children) => children
                .iter()
                .filter_map(|&child| nodes[child.0].bounding_box)
                .reduce(|a, b| aabb_union(&a, &b)),
            None => patch.bounding_box(),
        };

        let id = NodeId(nodes.insert(QuadtreeNode {
            patch,
            parent: None,
            children,
            bounding_box,
        }));

        if let Some(children) = children {
            for child in children {
                nodes[child.0].parent = Some(id);
            }
        }

        id
    }

    /// Recomputes the switch distance of every patch.
    ///
    /// Does nothing if the parameters equal the ones of the previous call.
    /// Returns whether the distances were recomputed.
    pub fn setup_camera(
        &mut self,
        viewport_height: f32,
        tan_half_fovy: f32,
        max_pixel_error: f32,
    ) -> bool {
        let parameters = CameraParameters {
            viewport_height,
            tan_half_fovy,
            max_pixel_error,
        };

        if self.camera == Some(parameters) {
            return false;
        }

        for (_, node) in self.nodes.iter_mut() {
            node.patch
                .compute_lod_distance(viewport_height, tan_half_fovy, max_pixel_error);
        }

        self.camera = Some(parameters);
        true
    }

    /// Computes the switch distances of every patch without storing them in the patches.
    pub fn lod_distances(
        &self,
        viewport_height: f32,
        tan_half_fovy: f32,
        max_pixel_error: f32,
    ) -> LodDistances {
        let mut sqr_distances = vec![f32::MAX; self.nodes.len()];

        for (key, node) in &self.nodes {
            if !node.patch.is_dummy() {
                sqr_distances[key] = sqr_switch_distance(lod_distance(
                    node.patch.max_error(),
                    viewport_height,
                    tan_half_fovy,
                    max_pixel_error,
                ));
            }
        }

        LodDistances {
            parameters: CameraParameters {
                viewport_height,
                tan_half_fovy,
                max_pixel_error,
            },
            sqr_distances,
        }
    }

    /// Selects the patches to render for the camera, using the distances of the last
    /// [`Quadtree::setup_camera`] call.
    ///
    /// `eye` is the camera position in the local space of the terrain and
    /// `world_from_local` the transform of the terrain.
    /// With a `max_detail_level` the traversal never descends below that mip level, except
    /// through dummy patches, which are always refined so that the selection has no holes.
    pub fn cull(
        &self,
        camera: &CullCamera,
        eye: Vec3,
        world_from_local: &Mat4,
        max_detail_level: Option<u32>,
        selection: &mut PatchSelection,
    ) {
        self.traverse(None, camera, eye, world_from_local, max_detail_level, selection);
    }

    /// Like [`Quadtree::cull`], but switches patches at the given per view distances.
    pub fn cull_with_distances(
        &self,
        lod_distances: &LodDistances,
        camera: &CullCamera,
        eye: Vec3,
        world_from_local: &Mat4,
        max_detail_level: Option<u32>,
        selection: &mut PatchSelection,
    ) {
        self.traverse(
            Some(lod_distances),
            camera,
            eye,
            world_from_local,
            max_detail_level,
            selection,
        );
    }

    fn traverse(
        &self,
        lod_distances: Option<&LodDistances>,
        camera: &CullCamera,
        eye: Vec3,
        world_from_local: &Mat4,
        max_detail_level: Option<u32>,
        selection: &mut PatchSelection,
    ) {
        selection.clear();

        let traversal = Traversal {
            frustum: ClipFrustum::from_clip_from_local(
                &(camera.clip_from_world * *world_from_local),
            ),
            lod_distances,
            eye,
            max_detail_level,
            scale: self.height_field.scale(),
            origin: self.height_field.offset(),
        };

        self.cull_r(self.root, &traversal, ClipPlanes::all(), selection);
    }

    fn cull_r(
        &self,
        id: NodeId,
        traversal: &Traversal,
        clip_planes: ClipPlanes,
        selection: &mut PatchSelection,
    ) {
        let node = &self.nodes[id.0];

        let Some(bounding_box) = node.bounding_box else {
            return;
        };

        let clip_planes = if clip_planes.is_empty() {
            clip_planes
        } else {
            match traversal.frustum.classify(&bounding_box, clip_planes) {
                Some(clip_planes) => clip_planes,
                None => return,
            }
        };

        let patch = &node.patch;
        let eye_dist_sq = patch.sqr_distance_to_point(traversal.eye);
        let within_detail = traversal
            .max_detail_level
            .map_or(true, |max| patch.mip_level() < max);

        let sqr_lod_distance = traversal
            .lod_distances
            .map_or_else(|| patch.sqr_lod_distance(), |lod| lod.sqr_distance(id));

        // dummies have nothing to draw, so the detail limit does not stop at them
        let descend = patch.is_dummy() || (eye_dist_sq < sqr_lod_distance && within_detail);

        match node.children {
            Some(children) if descend => {
                for child in children {
                    self.cull_r(child, traversal, clip_planes, selection);
                }
            }
            _ => {
                if let Some(patch_id) = patch.id() {
                    selection.patches.push(SelectedPatch {
                        id: patch_id,
                        node: id,
                        mip_level: patch.mip_level(),
                        uniform: patch.uniform(traversal.scale, traversal.origin),
                    });
                }
            }
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &QuadtreeNode {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &QuadtreeNode)> {
        self.nodes.iter().map(|(key, node)| (NodeId(key), node))
    }

    /// The ancestors of the node, starting with its parent.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        iter::successors(self.nodes[id.0].parent, |&id| self.nodes[id.0].parent)
    }

    pub fn patch(&self, id: PatchId) -> Option<&TerrainPatch> {
        self.patches
            .get(id.0 as usize)
            .map(|&node| &self.nodes[node.0].patch)
    }

    /// All rendered patches, ordered by their [`PatchId`].
    pub fn rendered_patches(&self) -> impl Iterator<Item = &TerrainPatch> {
        self.patches.iter().map(|&node| &self.nodes[node.0].patch)
    }

    pub fn patch_count(&self) -> usize {
        self.patches.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The number of levels below the root.
    pub fn depth(&self) -> u32 {
        self.root_step.trailing_zeros()
    }

    /// The number of nodes sampling every grid point, including dummies.
    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|(_, node)| node.children.is_none())
            .count()
    }

    pub fn bounding_box(&self) -> Option<Aabb3d> {
        self.nodes[self.root.0].bounding_box
    }

    /// The height of the terrain at the local position, interpolated from the source grid.
    pub fn height_at(&self, local: Vec3) -> f32 {
        self.height_field.real_height(local.x, local.z)
    }

    pub fn patch_size(&self) -> u32 {
        self.patch_size
    }

    pub fn root_size(&self) -> u32 {
        self.root_size
    }

    pub fn root_step(&self) -> u32 {
        self.root_step
    }

    pub fn height_field(&self) -> &HeightField {
        &self.height_field
    }

    pub fn geometry(&self) -> &SharedGeometry {
        &self.geometry
    }

    pub fn normal_map(&self) -> &NormalMap {
        &self.normal_map
    }

    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        math::aabb_contains,
        terrain_data::{encode_normal, height_field::tests::random_heights},
    };
    use bevy::math::UVec2;
    use itertools::iproduct;

    fn build(size: u32, patch_size: u32, seed: u64) -> Quadtree {
        let heights = random_heights(size, size, seed);
        let descriptor = QuadtreeDescriptor::new(size, size, patch_size);

        Quadtree::build(&descriptor, &heights).unwrap()
    }

    fn ortho_camera() -> CullCamera {
        CullCamera {
            clip_from_world: Mat4::orthographic_rh(
                -1000.0, 1000.0, -1000.0, 1000.0, -1000.0, 1000.0,
            ),
            viewport_height: 1080.0,
            tan_half_fovy: 0.5,
        }
    }

    fn select(
        quadtree: &Quadtree,
        camera: &CullCamera,
        eye: Vec3,
        max_detail_level: Option<u32>,
    ) -> PatchSelection {
        let mut selection = PatchSelection::default();
        quadtree.cull(camera, eye, &Mat4::IDENTITY, max_detail_level, &mut selection);
        selection
    }

    /// How often every grid cell is covered by the selected patches.
    fn coverage(quadtree: &Quadtree, selection: &PatchSelection) -> Vec<u32> {
        let field = quadtree.height_field();
        let cells_x = field.size_x() - 1;
        let mut counts = vec![0; (cells_x * (field.size_z() - 1)) as usize];

        for selected in selection.iter() {
            let patch = &quadtree.node(selected.node).patch;
            let (offset, extent) = (patch.offset(), patch.extent());

            for (z, x) in iproduct!(offset.y..offset.y + extent, offset.x..offset.x + extent) {
                counts[(z * cells_x + x) as usize] += 1;
            }
        }

        counts
    }

    #[test]
    fn grid_of_33_has_depth_two() {
        let quadtree = build(33, 9, 21);

        assert_eq!(quadtree.root_size(), 33);
        assert_eq!(quadtree.root_step(), 4);
        assert_eq!(quadtree.depth(), 2);
        assert_eq!(quadtree.node_count(), 21);
        assert_eq!(quadtree.patch_count(), 21);
        assert_eq!(quadtree.leaf_count(), 16);

        let leaves: Vec<_> = quadtree
            .nodes()
            .filter(|(_, node)| node.children.is_none())
            .collect();
        assert!(leaves.iter().all(|(_, node)| node.patch.step() == 1));
        assert!(leaves
            .iter()
            .all(|(id, _)| quadtree.ancestors(*id).count() == 2));
    }

    #[test]
    fn steps_halve_towards_the_leaves() {
        let quadtree = build(65, 9, 22);

        for (id, node) in quadtree.nodes() {
            match node.children {
                Some(children) => {
                    assert!(node.patch.step() > 1);

                    for child in children {
                        let child_node = quadtree.node(child);
                        assert_eq!(child_node.patch.step(), node.patch.step() >> 1);
                        assert_eq!(child_node.parent, Some(id));
                    }
                }
                None => {
                    assert_eq!(node.patch.step(), 1);
                    assert!(node.patch.extent() < quadtree.patch_size());
                }
            }
        }
    }

    #[test]
    fn boxes_contain_children_and_leaves_are_exact() {
        let quadtree = build(33, 9, 23);
        let field = quadtree.height_field();

        for (_, node) in quadtree.nodes() {
            let bounding_box = node.bounding_box.unwrap();

            if let Some(children) = node.children {
                for child in children {
                    let child_box = quadtree.node(child).bounding_box.unwrap();
                    assert!(aabb_contains(&bounding_box, &child_box));
                }
            } else {
                let (offset, extent) = (node.patch.offset(), node.patch.extent());
                let (mut min, mut max) = (f32::MAX, f32::MIN);

                for (z, x) in iproduct!(offset.y..=offset.y + extent, offset.x..=offset.x + extent)
                {
                    min = min.min(field.height(x, z));
                    max = max.max(field.height(x, z));
                }

                assert_eq!(bounding_box.min.y, min);
                assert_eq!(bounding_box.max.y, max);
                assert_eq!(bounding_box.min.x, offset.x as f32);
                assert_eq!(bounding_box.max.z, (offset.y + extent) as f32);
            }
        }

        assert_eq!(quadtree.bounding_box(), Some(field.bounding_box()));
    }

    #[test]
    fn flat_terrain_has_no_error() {
        let descriptor = QuadtreeDescriptor::new(17, 17, 9);
        let mut quadtree = Quadtree::build(&descriptor, &[0.0; 17 * 17]).unwrap();

        assert!(quadtree.rendered_patches().all(|patch| patch.max_error() == 0.0));
        assert!(quadtree
            .rendered_patches()
            .all(|patch| patch.skirt_length() == 0.0));

        quadtree.setup_camera(1080.0, 0.5, 0.0);
        assert!(quadtree
            .rendered_patches()
            .all(|patch| patch.lod_distance() == -1.0));

        quadtree.setup_camera(1080.0, 0.5, -2.0);
        assert!(quadtree
            .rendered_patches()
            .all(|patch| patch.lod_distance() == -1.0));

        assert_eq!(
            quadtree.geometry().strip_indices.len(),
            (2 * (9 + 2) * (9 + 2) - 2) as usize
        );
    }

    #[test]
    fn setup_camera_is_idempotent() {
        let mut quadtree = build(33, 9, 24);

        assert!(quadtree.setup_camera(1080.0, 0.5, 2.0));
        let distances: Vec<f32> = quadtree
            .rendered_patches()
            .map(TerrainPatch::lod_distance)
            .collect();

        assert!(!quadtree.setup_camera(1080.0, 0.5, 2.0));
        let again: Vec<f32> = quadtree
            .rendered_patches()
            .map(TerrainPatch::lod_distance)
            .collect();
        assert_eq!(distances, again);

        assert!(quadtree.setup_camera(1080.0, 0.5, 4.0));
        for (before, patch) in distances.iter().zip(quadtree.rendered_patches()) {
            assert!(patch.lod_distance() <= *before);
        }
    }

    #[test]
    fn invalid_descriptors_are_rejected() {
        let heights = vec![0.0; 33 * 33];
        let valid = QuadtreeDescriptor::new(33, 33, 9);

        let invalid = [
            (
                QuadtreeDescriptor {
                    patch_size: 10,
                    ..valid
                },
                TerrainError::InvalidPatchSize { patch_size: 10 },
            ),
            (
                QuadtreeDescriptor {
                    patch_size: 1,
                    ..valid
                },
                TerrainError::InvalidPatchSize { patch_size: 1 },
            ),
            (
                QuadtreeDescriptor {
                    patch_size: 5,
                    size_x: 31,
                    ..valid
                },
                TerrainError::MisalignedExtents {
                    size_x: 31,
                    size_z: 33,
                    patch_size: 5,
                },
            ),
            (
                QuadtreeDescriptor {
                    size_x: 1,
                    ..valid
                },
                TerrainError::GridTooSmall {
                    size_x: 1,
                    size_z: 33,
                },
            ),
            (
                QuadtreeDescriptor {
                    vertex_cache_size: 3,
                    ..valid
                },
                TerrainError::InvalidVertexCacheSize {
                    vertex_cache_size: 3,
                },
            ),
        ];

        for (descriptor, error) in invalid {
            assert_eq!(Quadtree::build(&descriptor, &heights).unwrap_err(), error);
        }

        assert_eq!(
            Quadtree::build(&valid, &heights[1..]).unwrap_err(),
            TerrainError::ElevationCountMismatch {
                expected: 33 * 33,
                actual: 33 * 33 - 1
            }
        );
    }

    #[test]
    fn selection_follows_the_lod_distance() {
        let mut quadtree = build(33, 9, 25);
        quadtree.setup_camera(1080.0, 0.5, 1.0);

        let camera = ortho_camera();
        let root = &quadtree.node(quadtree.root()).patch;
        let root_box = root.bounding_box().unwrap();
        let lod_distance = root.lod_distance();
        assert!(lod_distance > 0.0);

        let far = Vec3::new(16.0, root_box.max.y + lod_distance * 1.5, 16.0);
        let selection = select(&quadtree, &camera, far, None);
        assert_eq!(selection.len(), 1);
        assert_eq!(selection.patches()[0].id, PatchId(0));
        assert_eq!(selection.patches()[0].mip_level, 0);

        let near = Vec3::new(16.0, root_box.max.y + lod_distance * 0.5, 16.0);
        let selection = select(&quadtree, &camera, near, None);
        assert!(selection.len() >= 4);
        assert!(selection.iter().all(|patch| patch.mip_level > 0));

        let clamped = select(&quadtree, &camera, near, Some(0));
        assert_eq!(clamped.len(), 1);
    }

    #[test]
    fn per_view_distances_match_the_patch_distances() {
        let mut quadtree = build(65, 9, 31);
        let camera = ortho_camera();
        let eye = Vec3::new(20.0, 90.0, 12.0);

        let coarse = quadtree.lod_distances(1080.0, 0.5, 8.0);
        let fine = quadtree.lod_distances(720.0, 0.4, 1.0);
        assert!(coarse.is_for(1080.0, 0.5, 8.0));
        assert!(!coarse.is_for(720.0, 0.4, 1.0));

        for (parameters, distances) in [((1080.0, 0.5, 8.0), &coarse), ((720.0, 0.4, 1.0), &fine)] {
            quadtree.setup_camera(parameters.0, parameters.1, parameters.2);

            let mut with_distances = PatchSelection::default();
            quadtree.cull_with_distances(
                distances,
                &camera,
                eye,
                &Mat4::IDENTITY,
                None,
                &mut with_distances,
            );

            assert_eq!(with_distances.patches(), select(&quadtree, &camera, eye, None).patches());

            for (id, node) in quadtree.nodes() {
                assert_eq!(distances.sqr_distance(id), node.patch.sqr_lod_distance());
            }
        }

        // the distances do not depend on the state of the patches
        quadtree.setup_camera(1080.0, 0.5, 8.0);
        assert_eq!(quadtree.lod_distances(720.0, 0.4, 1.0), fine);
    }

    #[test]
    fn selection_covers_the_terrain_once() {
        let mut quadtree = build(65, 9, 26);
        let camera = ortho_camera();

        // without camera setup every patch refines down to the leaves
        let selection = select(&quadtree, &camera, Vec3::ZERO, None);
        assert_eq!(selection.len(), 64);
        assert!(coverage(&quadtree, &selection).iter().all(|&count| count == 1));

        quadtree.setup_camera(1080.0, 0.5, 2.0);

        for eye in [
            Vec3::new(5.0, 120.0, 7.0),
            Vec3::new(60.0, 10.0, 2.0),
            Vec3::new(-300.0, 500.0, 900.0),
        ] {
            let selection = select(&quadtree, &camera, eye, None);
            assert!(coverage(&quadtree, &selection).iter().all(|&count| count == 1));
        }
    }

    #[test]
    fn frustum_rejects_invisible_patches() {
        let quadtree = build(33, 9, 27);
        let camera = CullCamera {
            clip_from_world: Mat4::orthographic_rh(
                -100.0, 10.0, -1000.0, 1000.0, -1000.0, 1000.0,
            ),
            ..ortho_camera()
        };

        let selection = select(&quadtree, &camera, Vec3::ZERO, None);

        assert_eq!(selection.len(), 8);
        assert!(selection
            .iter()
            .all(|selected| quadtree.node(selected.node).patch.offset().x < 16));
    }

    #[test]
    fn skirts_cover_the_ancestor_surfaces() {
        let quadtree = build(65, 9, 28);

        for (id, node) in quadtree.nodes() {
            let patch = &node.patch;
            if patch.is_dummy() {
                continue;
            }

            let (offset, extent) = (patch.offset(), patch.extent());
            let inside = |point: &UVec2| {
                (offset.x..=offset.x + extent).contains(&point.x)
                    && (offset.y..=offset.y + extent).contains(&point.y)
            };

            for ancestor in quadtree.ancestors(id) {
                let ancestor = &quadtree.node(ancestor).patch;

                for point in ancestor.boundary().filter(inside) {
                    let (x, z) = (point.x as f32, point.y as f32);
                    let discrepancy =
                        (patch.height(x, z).unwrap() - ancestor.height(x, z).unwrap()).abs();

                    assert!(discrepancy <= patch.skirt_length() + 1e-3);
                }
            }
        }
    }

    #[test]
    fn dummies_fill_unaligned_grids() {
        let quadtree = build(25, 9, 29);
        let camera = ortho_camera();

        assert_eq!(quadtree.root_size(), 33);
        assert!(quadtree.node(quadtree.root()).patch.is_dummy());
        assert_eq!(quadtree.node_count(), 21);
        assert_eq!(quadtree.leaf_count(), 16);
        assert_eq!(quadtree.patch_count(), 10);
        assert_eq!(
            quadtree.bounding_box(),
            Some(quadtree.height_field().bounding_box())
        );

        let selection = select(&quadtree, &camera, Vec3::ZERO, None);
        assert_eq!(selection.len(), 9);
        assert!(coverage(&quadtree, &selection).iter().all(|&count| count == 1));

        let clamped = select(&quadtree, &camera, Vec3::ZERO, Some(1));
        assert_eq!(clamped.len(), 6);
        assert!(coverage(&quadtree, &clamped).iter().all(|&count| count == 1));
    }

    #[test]
    fn lookups_by_patch_id() {
        let quadtree = build(33, 9, 30);

        for (index, patch) in quadtree.rendered_patches().enumerate() {
            let id = PatchId(index as u32);
            assert_eq!(patch.id(), Some(id));
            assert_eq!(quadtree.patch(id).and_then(TerrainPatch::id), Some(id));
        }

        assert!(quadtree.patch(PatchId(21)).is_none());

        let field = quadtree.height_field();
        for local in [Vec3::new(1.5, 0.0, 2.25), Vec3::new(31.0, 7.0, 0.5)] {
            assert_eq!(quadtree.height_at(local), field.real_height(local.x, local.z));
        }
    }

    #[test]
    fn normal_map_encodes_the_vertex_normals() {
        let quadtree = build(17, 9, 32);
        let normal_map = quadtree.normal_map();

        assert_eq!(normal_map.size, UVec2::new(17, 17));
        assert_eq!(quadtree.normals().len(), 17 * 17);
        assert_eq!(
            normal_map.texels,
            quadtree
                .normals()
                .iter()
                .copied()
                .map(encode_normal)
                .collect::<Vec<_>>()
        );
    }
}
