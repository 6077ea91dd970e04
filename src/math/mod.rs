//! Small geometric helpers shared by the terrain data structures and the culling pass.

mod frustum;

pub use frustum::{ClipFrustum, ClipPlanes};

use bevy::math::{bounding::Aabb3d, Vec3, Vec3A};

/// Creates an axis aligned box from its corners.
#[inline]
pub fn aabb_from_min_max(min: Vec3, max: Vec3) -> Aabb3d {
    Aabb3d {
        min: min.into(),
        max: max.into(),
    }
}

/// Computes the tightest box around all points.
///
/// Returns `None` for an empty iterator.
pub fn aabb_from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Aabb3d> {
    let mut points = points.into_iter();
    let first = Vec3A::from(points.next()?);

    let (min, max) = points.fold((first, first), |(min, max), point| {
        let point = Vec3A::from(point);
        (min.min(point), max.max(point))
    });

    Some(Aabb3d { min, max })
}

/// The smallest box containing both boxes.
#[inline]
pub fn aabb_union(a: &Aabb3d, b: &Aabb3d) -> Aabb3d {
    Aabb3d {
        min: a.min.min(b.min),
        max: a.max.max(b.max),
    }
}

/// Whether `outer` fully contains `inner` (touching faces count as contained).
#[inline]
pub fn aabb_contains(outer: &Aabb3d, inner: &Aabb3d) -> bool {
    outer.min.cmple(inner.min).all() && outer.max.cmpge(inner.max).all()
}

/// Squared distance from a point to a box.
///
/// The planar distance is measured on the clamped x/z axes, the vertical distance against the
/// y range of the box. A point inside the box has a distance of zero.
pub fn sqr_distance_to_box(aabb: &Aabb3d, point: Vec3) -> f32 {
    let planar = |value: f32, min: f32, max: f32| (min - value).max(value - max).max(0.0);

    let dx = planar(point.x, aabb.min.x, aabb.max.x);
    let dz = planar(point.z, aabb.min.z, aabb.max.z);
    let dy = if point.y < aabb.min.y {
        aabb.min.y - point.y
    } else if point.y > aabb.max.y {
        point.y - aabb.max.y
    } else {
        0.0
    };

    dx * dx + dz * dz + dy * dy
}
