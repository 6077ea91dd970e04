//! Types and systems that connect terrains with the cameras viewing them.

use crate::{
    debug::DebugTerrain,
    terrain::Terrain,
    terrain_data::{CullCamera, LodDistances, PatchSelection, Quadtree},
};
use bevy::{prelude::*, utils::HashMap};

/// Resource that stores components that are associated to a terrain entity and a view entity.
#[derive(Clone, Resource, Deref, DerefMut)]
pub struct TerrainViewComponents<C>(pub HashMap<(Entity, Entity), C>);

impl<C> Default for TerrainViewComponents<C> {
    fn default() -> Self {
        Self(default())
    }
}

/// How detailed a terrain is rendered for a view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainViewConfig {
    /// The largest screen space error in pixels a patch may have before it is refined.
    pub max_pixel_error: f32,
    /// Stops the refinement at this mip level, `None` refines down to the source resolution.
    pub max_detail_level: Option<u32>,
}

impl Default for TerrainViewConfig {
    fn default() -> Self {
        Self {
            max_pixel_error: 4.0,
            max_detail_level: None,
        }
    }
}

/// Gathers the parameters the patch selection needs from the components of a camera.
pub fn cull_camera(
    clip_from_view: Mat4,
    projection: &Projection,
    view_transform: &GlobalTransform,
    viewport_height: f32,
) -> CullCamera {
    let tan_half_fovy = match projection {
        Projection::Perspective(perspective) => (perspective.fov * 0.5).tan(),
        _ => 0.0,
    };

    CullCamera {
        clip_from_world: clip_from_view * view_transform.compute_matrix().inverse(),
        viewport_height,
        tan_half_fovy,
    }
}

/// The position of the view in the local space of the terrain.
pub fn local_eye(terrain_transform: &GlobalTransform, view_transform: &GlobalTransform) -> Vec3 {
    terrain_transform
        .affine()
        .inverse()
        .transform_point3(view_transform.translation())
}

/// Makes sure the switch distances of the view match its camera and config.
///
/// Returns whether they had to be recomputed.
pub(crate) fn refresh_lod_distances(
    lod_distances: &mut TerrainViewComponents<LodDistances>,
    key: (Entity, Entity),
    quadtree: &Quadtree,
    quadtree_changed: bool,
    camera: &CullCamera,
    max_pixel_error: f32,
) -> bool {
    let up_to_date = !quadtree_changed
        && lod_distances.get(&key).is_some_and(|distances| {
            distances.is_for(camera.viewport_height, camera.tan_half_fovy, max_pixel_error)
        });

    if !up_to_date {
        lod_distances.insert(
            key,
            quadtree.lod_distances(camera.viewport_height, camera.tan_half_fovy, max_pixel_error),
        );
    }

    !up_to_date
}

/// Selects the patches of every terrain for every view it is configured for.
pub(crate) fn update_selections(
    debug: Option<Res<DebugTerrain>>,
    view_configs: Res<TerrainViewComponents<TerrainViewConfig>>,
    mut selections: ResMut<TerrainViewComponents<PatchSelection>>,
    mut lod_distances: ResMut<TerrainViewComponents<LodDistances>>,
    terrains: Query<(Ref<Terrain>, &GlobalTransform)>,
    views: Query<(&Camera, &Projection, &GlobalTransform)>,
) {
    if debug.is_some_and(|debug| debug.freeze) {
        return;
    }

    selections.retain(|key, _| view_configs.contains_key(key));
    lod_distances.retain(|key, _| view_configs.contains_key(key));

    for (&(terrain, view), view_config) in view_configs.iter() {
        let Ok((quadtree, terrain_transform)) = terrains.get(terrain) else {
            continue;
        };
        let Ok((camera, projection, view_transform)) = views.get(view) else {
            continue;
        };
        let Some(viewport_size) = camera.physical_viewport_size() else {
            continue;
        };

        let camera = cull_camera(
            camera.clip_from_view(),
            projection,
            view_transform,
            viewport_size.y as f32,
        );

        if refresh_lod_distances(
            &mut lod_distances,
            (terrain, view),
            &quadtree,
            quadtree.is_changed(),
            &camera,
            view_config.max_pixel_error,
        ) {
            debug!("Recomputed the switch distances of terrain {terrain} for view {view}.");
        }

        let selection = selections.entry((terrain, view)).or_default();
        quadtree.cull_with_distances(
            &lod_distances[&(terrain, view)],
            &camera,
            local_eye(terrain_transform, view_transform),
            &terrain_transform.compute_matrix(),
            view_config.max_detail_level,
            selection,
        );
    }
}
