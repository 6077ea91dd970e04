use crate::{
    config::TerrainConfig,
    formats::Heightmap,
    terrain::{Terrain, TerrainBuildFailed},
    terrain_data::{Quadtree, TerrainError},
    terrain_view::{TerrainViewComponents, TerrainViewConfig},
};
use bevy::{asset::LoadState, prelude::*};

#[derive(Clone)]
pub(crate) struct TerrainToSpawn {
    /// Reserved when the terrain is requested.
    entity: Entity,
    config: Handle<TerrainConfig>,
    /// Requested once the config is available.
    heightmap: Option<Handle<Image>>,
    view_config: TerrainViewConfig,
    view: Entity,
}

#[derive(Default, Resource)]
pub(crate) struct TerrainsToSpawn(pub(crate) Vec<TerrainToSpawn>);

fn load_failed<A: Asset>(asset_server: &AssetServer, handle: &Handle<A>) -> bool {
    if let Some(LoadState::Failed(error)) = asset_server.get_load_state(handle) {
        error!("Failed to load a terrain asset: {error}");
        true
    } else {
        false
    }
}

/// Completes a queued terrain: either the terrain or the build failure lands on its entity.
fn finish_spawn(
    commands: &mut Commands,
    view_configs: &mut TerrainViewComponents<TerrainViewConfig>,
    terrain: &TerrainToSpawn,
    quadtree: Result<Quadtree, TerrainError>,
) {
    match quadtree {
        Ok(quadtree) => {
            commands
                .entity(terrain.entity)
                .insert((Terrain::new(quadtree), Transform::default()));
            view_configs.insert((terrain.entity, terrain.view), terrain.view_config);
        }
        Err(error) => {
            commands
                .entity(terrain.entity)
                .insert(TerrainBuildFailed(error));
        }
    }
}

/// Builds the quadtrees of all terrains whose config and heightmap finished loading.
pub(crate) fn spawn_terrains(
    mut commands: Commands,
    mut terrains: ResMut<TerrainsToSpawn>,
    mut view_configs: ResMut<TerrainViewComponents<TerrainViewConfig>>,
    asset_server: Res<AssetServer>,
    configs: Res<Assets<TerrainConfig>>,
    images: Res<Assets<Image>>,
) {
    terrains.0.retain_mut(|terrain| {
        if load_failed(&asset_server, &terrain.config) {
            commands.entity(terrain.entity).despawn();
            return false;
        }

        let Some(config) = configs.get(&terrain.config) else {
            return true;
        };

        let heightmap = terrain
            .heightmap
            .get_or_insert_with(|| asset_server.load(config.heightmap.clone()));

        if load_failed(&asset_server, heightmap) {
            commands.entity(terrain.entity).despawn();
            return false;
        }

        let Some(image) = images.get(&*heightmap) else {
            return true;
        };

        let quadtree = Heightmap::from_image(image)
            .and_then(|heightmap| config.build_quadtree(&heightmap));

        match &quadtree {
            Ok(quadtree) => info!(
                "Built the terrain {} with {} patches and a depth of {}.",
                config.heightmap,
                quadtree.patch_count(),
                quadtree.depth()
            ),
            Err(error) => error!("Failed to build the terrain {}: {error}", config.heightmap),
        }

        finish_spawn(&mut commands, &mut view_configs, terrain, quadtree);

        false
    });
}

pub trait SpawnTerrainCommandsExt {
    /// Spawns a terrain once its config and heightmap are loaded.
    ///
    /// The returned entity receives the [`Terrain`], or a [`TerrainBuildFailed`] if the
    /// quadtree could not be built. It is despawned if an asset fails to load.
    fn spawn_terrain(
        &mut self,
        config: Handle<TerrainConfig>,
        view_config: TerrainViewConfig,
        view: Entity,
    ) -> Entity;

    /// Spawns a terrain from an already built quadtree and returns its entity.
    fn spawn_terrain_from_quadtree(
        &mut self,
        quadtree: Quadtree,
        transform: Transform,
        view_config: TerrainViewConfig,
        view: Entity,
    ) -> Entity;
}

impl SpawnTerrainCommandsExt for Commands<'_, '_> {
    fn spawn_terrain(
        &mut self,
        config: Handle<TerrainConfig>,
        view_config: TerrainViewConfig,
        view: Entity,
    ) -> Entity {
        let entity = self.spawn_empty().id();

        self.queue(move |world: &mut World| {
            world
                .resource_mut::<TerrainsToSpawn>()
                .0
                .push(TerrainToSpawn {
                    entity,
                    config,
                    heightmap: None,
                    view_config,
                    view,
                });
        });

        entity
    }

    fn spawn_terrain_from_quadtree(
        &mut self,
        quadtree: Quadtree,
        transform: Transform,
        view_config: TerrainViewConfig,
        view: Entity,
    ) -> Entity {
        let terrain = self.spawn((Terrain::new(quadtree), transform)).id();

        self.queue(move |world: &mut World| {
            world
                .resource_mut::<TerrainViewComponents<TerrainViewConfig>>()
                .insert((terrain, view), view_config);
        });

        terrain
    }
}
