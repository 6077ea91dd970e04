//! Types for configuring terrains.

use crate::terrain_data::{Quadtree, TerrainError};
use bevy::{prelude::*, utils::HashMap};

/// Resource that stores components that are associated to a terrain entity.
/// This is used to persist components in the render world.
#[derive(Resource, Deref, DerefMut)]
pub struct TerrainComponents<C>(pub HashMap<Entity, C>);

impl<C> Default for TerrainComponents<C> {
    fn default() -> Self {
        Self(default())
    }
}

/// The component of a terrain entity, owning its [`Quadtree`].
///
/// The quadtree is built once. The switch distances of every view are kept next to it, in a
/// [`TerrainViewComponents`](crate::terrain_view::TerrainViewComponents) resource.
#[derive(Component, Deref)]
pub struct Terrain(Quadtree);

impl Terrain {
    pub fn new(quadtree: Quadtree) -> Self {
        Self(quadtree)
    }

    pub fn quadtree(&self) -> &Quadtree {
        &self.0
    }
}

/// Marks a terrain whose quadtree could not be built.
///
/// The build is deterministic, so it is not retried.
#[derive(Component, Debug)]
pub struct TerrainBuildFailed(pub TerrainError);
