use bevy::{math::bounding::BoundingVolume, prelude::*};
use bevy_clod_terrain::prelude::*;

const GRID_SIZE: u32 = 257;
const PATCH_SIZE: u32 = 33;
const SPACING: f32 = 4.0;
const HEIGHT: f32 = 120.0;

fn main() {
    App::new()
        .add_plugins((DefaultPlugins, TerrainPlugin::default(), TerrainDebugPlugin))
        .add_systems(Startup, setup)
        .add_systems(Update, (orbit_camera, draw_selection))
        .run();
}

fn elevation(x: u32, z: u32) -> f32 {
    let (x, z) = (x as f32 / GRID_SIZE as f32, z as f32 / GRID_SIZE as f32);

    0.5 + 0.3 * (x * 9.0).sin() * (z * 7.0).cos() + 0.2 * ((x + z) * 23.0).sin()
}

fn setup(mut commands: Commands) {
    let heights = (0..GRID_SIZE)
        .flat_map(|z| (0..GRID_SIZE).map(move |x| elevation(x, z)))
        .collect::<Vec<_>>();

    let descriptor = QuadtreeDescriptor {
        scale: Vec3::new(SPACING, HEIGHT, SPACING),
        ..QuadtreeDescriptor::new(GRID_SIZE, GRID_SIZE, PATCH_SIZE)
    };

    let quadtree = match Quadtree::build(&descriptor, &heights) {
        Ok(quadtree) => quadtree,
        Err(error) => {
            error!("{error}");
            return;
        }
    };

    let view = commands
        .spawn((
            Camera3d::default(),
            Transform::from_xyz(-200.0, 300.0, -200.0).looking_at(Vec3::ZERO, Vec3::Y),
        ))
        .id();

    commands.spawn_terrain_from_quadtree(
        quadtree,
        Transform::default(),
        TerrainViewConfig::default(),
        view,
    );
}

fn orbit_camera(time: Res<Time>, mut cameras: Query<&mut Transform, With<Camera3d>>) {
    let center = Vec3::new(512.0, 0.0, 512.0);
    let angle = time.elapsed_secs() * 0.1;

    for mut transform in &mut cameras {
        let eye = center + Vec3::new(angle.cos() * 700.0, 250.0, angle.sin() * 700.0);
        *transform = Transform::from_translation(eye).looking_at(center, Vec3::Y);
    }
}

fn draw_selection(
    mut gizmos: Gizmos,
    terrains: Query<(&Terrain, &GlobalTransform)>,
    selections: Res<TerrainViewComponents<PatchSelection>>,
) {
    for (&(terrain, _), selection) in selections.iter() {
        let Ok((quadtree, transform)) = terrains.get(terrain) else {
            continue;
        };

        for selected in selection.iter() {
            let Some(bounding_box) = quadtree.node(selected.node).bounding_box else {
                continue;
            };

            let center = Vec3::from(bounding_box.center());
            let size = Vec3::from(bounding_box.max - bounding_box.min);
            let color = Color::hsl(selected.mip_level as f32 * 60.0, 0.8, 0.5);

            gizmos.cuboid(
                transform.mul_transform(Transform::from_translation(center).with_scale(size)),
                color,
            );
        }
    }
}
