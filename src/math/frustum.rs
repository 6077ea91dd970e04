use bevy::math::{bounding::Aabb3d, Mat4, Vec3A, Vec4};

bitflags::bitflags! {
    /// The set of frustum planes a bounding box still has to be tested against.
    ///
    /// Once a box lies completely on the inner side of a plane, all boxes it contains do as
    /// well, so the plane is removed from the mask handed to the descendants.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ClipPlanes: u8 {
        const LEFT   = 1 << 0;
        const RIGHT  = 1 << 1;
        const BOTTOM = 1 << 2;
        const TOP    = 1 << 3;
        /// `z >= 0` in clip space (the far plane of reversed-z projections).
        const NEAR   = 1 << 4;
        /// `z <= w` in clip space (the near plane of reversed-z projections).
        const FAR    = 1 << 5;
    }
}

/// A view frustum described by six inward facing planes.
///
/// The planes are extracted from a clip-from-local matrix, which means the frustum lives in the
/// same space as the boxes it is tested against.
#[derive(Clone, Copy, Debug)]
pub struct ClipFrustum {
    planes: [Vec4; 6],
}

impl ClipFrustum {
    pub fn from_clip_from_local(clip_from_local: &Mat4) -> Self {
        let row0 = clip_from_local.row(0);
        let row1 = clip_from_local.row(1);
        let row2 = clip_from_local.row(2);
        let row3 = clip_from_local.row(3);

        let planes = [
            row3 + row0,
            row3 - row0,
            row3 + row1,
            row3 - row1,
            row2,
            row3 - row2,
        ]
        .map(Self::normalize_plane);

        Self { planes }
    }

    /// Infinite projections produce a plane without a normal, which contains everything.
    fn normalize_plane(plane: Vec4) -> Vec4 {
        let length = plane.truncate().length();

        if length > f32::EPSILON {
            plane / length
        } else {
            Vec4::W
        }
    }

    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    /// Classifies the box against the planes contained in the mask.
    ///
    /// Returns `None` if the box is outside of the frustum. Otherwise the returned mask contains
    /// the planes the box intersects, an empty mask means the box is fully inside.
    pub fn classify(&self, aabb: &Aabb3d, planes: ClipPlanes) -> Option<ClipPlanes> {
        let center = (aabb.min + aabb.max) * 0.5;
        let half_size = (aabb.max - aabb.min) * 0.5;

        let mut remaining = planes;

        for (index, plane) in self.planes.iter().enumerate() {
            let flag = ClipPlanes::from_bits_retain(1 << index);

            if !planes.contains(flag) {
                continue;
            }

            let normal = Vec3A::from(plane.truncate());
            let radius = normal.abs().dot(half_size);
            let distance = normal.dot(center) + plane.w;

            if distance + radius < 0.0 {
                return None;
            }

            if distance - radius >= 0.0 {
                remaining.remove(flag);
            }
        }

        Some(remaining)
    }

    pub fn intersects(&self, aabb: &Aabb3d) -> bool {
        self.classify(aabb, ClipPlanes::all()).is_some()
    }
}
