//! Contains a debug resource and systems controlling it to inspect the patch selection.
use crate::{
    terrain::Terrain,
    terrain_data::PatchSelection,
    terrain_view::{TerrainViewComponents, TerrainViewConfig},
};
use bevy::{
    prelude::*,
    render::{Extract, RenderApp},
};

/// Adds a terrain debug config and debug control systems.
pub struct TerrainDebugPlugin;

impl Plugin for TerrainDebugPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<DebugTerrain>().add_systems(
            Update,
            (toggle_debug, change_config, log_statistics.after(toggle_debug)),
        );

        if let Some(render_app) = app.get_sub_app_mut(RenderApp) {
            render_app
                .init_resource::<DebugTerrain>()
                .add_systems(ExtractSchedule, extract_debug);
        }
    }
}

#[derive(Clone, Debug, Default, Resource)]
pub struct DebugTerrain {
    /// Draw the patches with the line list index buffer.
    pub wireframe: bool,
    /// Keep the current selections, so that the culling can be inspected from another angle.
    pub freeze: bool,
    /// Log the patch and triangle counts of every view.
    pub statistics: bool,
}

pub fn extract_debug(mut debug: ResMut<DebugTerrain>, extracted_debug: Extract<Res<DebugTerrain>>) {
    *debug = extracted_debug.clone();
}

pub fn toggle_debug(input: Res<ButtonInput<KeyCode>>, mut debug_terrain: ResMut<DebugTerrain>) {
    if input.just_pressed(KeyCode::KeyW) {
        debug_terrain.wireframe = !debug_terrain.wireframe;
        info!(
            "Toggled the wireframe view {}.",
            if debug_terrain.wireframe { "on" } else { "off" }
        )
    }
    if input.just_pressed(KeyCode::KeyF) {
        debug_terrain.freeze = !debug_terrain.freeze;
        info!(
            "{} the patch selection.",
            if debug_terrain.freeze { "Froze" } else { "Unfroze" }
        )
    }
    if input.just_pressed(KeyCode::KeyL) {
        debug_terrain.statistics = !debug_terrain.statistics;
        info!(
            "Toggled the statistics {}.",
            if debug_terrain.statistics { "on" } else { "off" }
        )
    }
}

pub fn change_config(
    input: Res<ButtonInput<KeyCode>>,
    mut view_configs: ResMut<TerrainViewComponents<TerrainViewConfig>>,
) {
    for view_config in view_configs.values_mut() {
        if input.just_pressed(KeyCode::KeyN) && view_config.max_pixel_error > 0.5 {
            view_config.max_pixel_error -= 0.5;
            info!(
                "Decreased the maximum pixel error to {}.",
                view_config.max_pixel_error
            );
        }
        if input.just_pressed(KeyCode::KeyE) {
            view_config.max_pixel_error += 0.5;
            info!(
                "Increased the maximum pixel error to {}.",
                view_config.max_pixel_error
            );
        }

        if input.just_pressed(KeyCode::KeyX) {
            view_config.max_detail_level = match view_config.max_detail_level {
                Some(level) => Some(level.saturating_sub(1)),
                None => Some(0),
            };
            info!(
                "Limited the detail level to {:?}.",
                view_config.max_detail_level
            );
        }
        if input.just_pressed(KeyCode::KeyJ) {
            view_config.max_detail_level = None;
            info!("Removed the detail level limit.");
        }
    }
}

pub(crate) fn log_statistics(
    debug: Res<DebugTerrain>,
    terrains: Query<&Terrain>,
    selections: Res<TerrainViewComponents<PatchSelection>>,
) {
    if !debug.statistics {
        return;
    }

    for (&(terrain, view), selection) in selections.iter() {
        let Ok(quadtree) = terrains.get(terrain) else {
            continue;
        };

        info!(
            "Terrain {terrain} in view {view}: {} of {} patches, {} triangles.",
            selection.len(),
            quadtree.patch_count(),
            selection.triangle_count(quadtree.geometry().triangle_count())
        );
    }
}
