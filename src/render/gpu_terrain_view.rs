use crate::{
    debug::DebugTerrain,
    render::device::{RenderTerrainDevice, TerrainDevice},
    terrain_data::{PatchSelection, PatchUniform},
    terrain_view::TerrainViewComponents,
};
use bevy::{
    prelude::*,
    render::{
        renderer::{RenderDevice, RenderQueue},
        Extract,
    },
};
use bytemuck::cast_slice;
use std::mem::size_of;

/// The per view GPU data of a terrain: one [`PatchUniform`] instance per selected patch.
///
/// The instance buffer is kept across frames and only grows when a selection no longer fits.
pub struct GpuTerrainView<D: TerrainDevice = RenderTerrainDevice> {
    /// `None` until a patch is visible.
    pub instances: Option<D::Buffer>,
    /// The number of instances the buffer can hold.
    pub capacity: u32,
    pub instance_count: u32,
    /// Whether to draw with the wireframe index buffer.
    pub wireframe: bool,
}

impl<D: TerrainDevice> Default for GpuTerrainView<D> {
    fn default() -> Self {
        Self {
            instances: None,
            capacity: 0,
            instance_count: 0,
            wireframe: false,
        }
    }
}

impl<D: TerrainDevice> GpuTerrainView<D> {
    pub fn new(device: &D, selection: &PatchSelection, wireframe: bool) -> Self {
        let mut view = Self::default();
        view.update(device, selection, wireframe);
        view
    }

    /// Writes the instances of the selection, reallocating the buffer if it is too small.
    pub fn update(&mut self, device: &D, selection: &PatchSelection, wireframe: bool) {
        let uniforms = selection.uniforms();

        self.instance_count = uniforms.len() as u32;
        self.wireframe = wireframe;

        if uniforms.is_empty() {
            return;
        }

        if self.instances.is_none() || self.instance_count > self.capacity {
            self.capacity = self.instance_count.next_power_of_two();
            let size = self.capacity as u64 * size_of::<PatchUniform>() as u64;
            self.instances = Some(device.create_buffer("terrain_instances", size));
        }

        if let Some(instances) = &self.instances {
            device.write_buffer(instances, 0, cast_slice(&uniforms));
        }
    }
}

/// Drops the views without a selection and updates the others in place.
pub(crate) fn update_views<D: TerrainDevice>(
    device: &D,
    selections: &TerrainViewComponents<PatchSelection>,
    gpu_views: &mut TerrainViewComponents<GpuTerrainView<D>>,
    wireframe: bool,
) {
    gpu_views.retain(|key, _| selections.contains_key(key));

    for (&key, selection) in selections.iter() {
        gpu_views
            .entry(key)
            .or_default()
            .update(device, selection, wireframe);
    }
}

impl GpuTerrainView {
    /// Copies the selections of this frame into the render world.
    pub(crate) fn extract(
        mut selections: ResMut<TerrainViewComponents<PatchSelection>>,
        extracted_selections: Extract<Res<TerrainViewComponents<PatchSelection>>>,
    ) {
        *selections = extracted_selections.clone();
    }

    pub(crate) fn prepare(
        device: Res<RenderDevice>,
        queue: Res<RenderQueue>,
        debug: Option<Res<DebugTerrain>>,
        selections: Res<TerrainViewComponents<PatchSelection>>,
        mut gpu_views: ResMut<TerrainViewComponents<GpuTerrainView>>,
    ) {
        let device = RenderTerrainDevice::new(&device, &queue);
        let wireframe = debug.is_some_and(|debug| debug.wireframe);

        update_views(&device, &selections, &mut gpu_views, wireframe);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        render::gpu_terrain::tests::{Call, RecordingDevice},
        terrain_data::{
            height_field::tests::random_heights, CullCamera, Quadtree, QuadtreeDescriptor,
        },
    };
    use bevy::math::{Mat4, Vec3};

    fn selection(size: u32, seed: u64) -> PatchSelection {
        let heights = random_heights(size, size, seed);
        let quadtree = Quadtree::build(&QuadtreeDescriptor::new(size, size, 9), &heights).unwrap();
        let camera = CullCamera {
            clip_from_world: Mat4::orthographic_rh(
                -100.0, 100.0, -200.0, 200.0, -100.0, 100.0,
            ),
            viewport_height: 720.0,
            tan_half_fovy: 0.0,
        };

        let mut selection = PatchSelection::default();
        quadtree.cull(&camera, Vec3::ZERO, &Mat4::IDENTITY, None, &mut selection);
        selection
    }

    #[test]
    fn one_instance_per_selected_patch() {
        let selection = selection(33, 51);

        let device = RecordingDevice::default();
        let view = GpuTerrainView::new(&device, &selection, true);

        assert_eq!(view.instance_count, 16);
        assert_eq!(view.capacity, 16);
        assert_eq!(view.instances, Some(0));
        assert!(view.wireframe);
        assert_eq!(
            *device.calls.borrow(),
            vec![
                Call::Buffer {
                    label: "terrain_instances".to_string(),
                    size: 16 * 16,
                },
                Call::WriteBuffer {
                    buffer: 0,
                    offset: 0,
                    size: 16 * 16,
                },
            ]
        );
    }

    #[test]
    fn instance_buffers_are_reused_across_frames() {
        let terrain = Entity::from_raw(1);
        let view = Entity::from_raw(2);

        let mut selections = TerrainViewComponents::<PatchSelection>::default();
        selections.insert((terrain, view), selection(33, 52));

        let device = RecordingDevice::default();
        let mut gpu_views = TerrainViewComponents::default();

        update_views(&device, &selections, &mut gpu_views, false);
        update_views(&device, &selections, &mut gpu_views, true);

        assert_eq!(
            *device.calls.borrow(),
            vec![
                Call::Buffer {
                    label: "terrain_instances".to_string(),
                    size: 16 * 16,
                },
                Call::WriteBuffer {
                    buffer: 0,
                    offset: 0,
                    size: 16 * 16,
                },
                Call::WriteBuffer {
                    buffer: 0,
                    offset: 0,
                    size: 16 * 16,
                },
            ]
        );
        assert!(gpu_views[&(terrain, view)].wireframe);

        // a larger selection no longer fits and gets a new buffer
        selections.insert((terrain, view), selection(65, 53));
        update_views(&device, &selections, &mut gpu_views, false);

        let gpu_view = &gpu_views[&(terrain, view)];
        assert_eq!(gpu_view.instance_count, 64);
        assert_eq!(gpu_view.capacity, 64);
        assert_eq!(gpu_view.instances, Some(3));
        assert_eq!(
            device.calls.borrow()[3..],
            [
                Call::Buffer {
                    label: "terrain_instances".to_string(),
                    size: 64 * 16,
                },
                Call::WriteBuffer {
                    buffer: 3,
                    offset: 0,
                    size: 64 * 16,
                },
            ]
        );

        // views without a selection are dropped
        selections.clear();
        update_views(&device, &selections, &mut gpu_views, false);
        assert!(gpu_views.is_empty());
        assert_eq!(device.calls.borrow().len(), 5);
    }

    #[test]
    fn empty_selections_create_no_buffer() {
        let device = RecordingDevice::default();
        let view = GpuTerrainView::new(&device, &PatchSelection::default(), false);

        assert_eq!(view.instance_count, 0);
        assert_eq!(view.instances, None);
        assert!(device.calls.borrow().is_empty());
    }
}
