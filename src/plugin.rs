use crate::{
    config::TerrainConfig,
    formats::TiffLoader,
    render::{GpuTerrain, GpuTerrainView},
    spawn::{spawn_terrains, TerrainsToSpawn},
    terrain::TerrainComponents,
    terrain_data::{LodDistances, PatchSelection},
    terrain_view::{update_selections, TerrainViewComponents, TerrainViewConfig},
};
use bevy::{
    prelude::*,
    render::{camera::CameraUpdateSystem, Render, RenderApp, RenderSet},
    transform::TransformSystem,
};
use bevy_common_assets::ron::RonAssetPlugin;

#[derive(Clone, Resource)]
pub struct TerrainPluginConfig {
    /// The file extensions of terrain configs.
    pub config_extensions: &'static [&'static str],
}

impl Default for TerrainPluginConfig {
    fn default() -> Self {
        Self {
            config_extensions: &["terrain.ron"],
        }
    }
}

/// The plugin for the terrain renderer.
#[derive(Default)]
pub struct TerrainPlugin {
    pub config: TerrainPluginConfig,
}

impl Plugin for TerrainPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(RonAssetPlugin::<TerrainConfig>::new(
            self.config.config_extensions,
        ))
        .init_asset_loader::<TiffLoader>()
        .insert_resource(self.config.clone())
        .init_resource::<TerrainsToSpawn>()
        .init_resource::<TerrainViewComponents<TerrainViewConfig>>()
        .init_resource::<TerrainViewComponents<PatchSelection>>()
        .init_resource::<TerrainViewComponents<LodDistances>>()
        .add_systems(Update, spawn_terrains)
        .add_systems(
            PostUpdate,
            update_selections
                .after(TransformSystem::TransformPropagate)
                .after(CameraUpdateSystem),
        );

        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };

        render_app
            .init_resource::<TerrainComponents<GpuTerrain>>()
            .init_resource::<TerrainViewComponents<PatchSelection>>()
            .init_resource::<TerrainViewComponents<GpuTerrainView>>()
            .add_systems(
                ExtractSchedule,
                (GpuTerrain::initialize, GpuTerrainView::extract),
            )
            .add_systems(
                Render,
                GpuTerrainView::prepare.in_set(RenderSet::PrepareResources),
            );
    }
}
