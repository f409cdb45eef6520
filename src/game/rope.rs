//! Rope distance constraint and the visual link shown while swinging.

use serde::Serialize;

use super::math::{clamp_to_max_length, normalize_safe, project_on_plane, rotation_with_up_priority, Quat, Vec3};
use super::physics::EntityId;

/// Radius the rope visual is drawn with
pub const ROPE_VISUAL_THICKNESS: f32 = 0.04;

/// Pulls the character back inside the rope sphere around `anchor`.
///
/// `attachment` is the rope point on the character. When it is farther than `rope_length` from
/// the anchor, `translation` is moved so it lies exactly on the sphere and any velocity taking
/// it farther away is removed. A single position-based correction, not an iterative solve.
pub fn constrain_to_rope(
    translation: &mut Vec3,
    velocity: &mut Vec3,
    rope_length: f32,
    anchor: &Vec3,
    attachment: &Vec3,
) {
    let to_anchor = anchor - attachment;
    if to_anchor.norm() < rope_length {
        return;
    }
    let rope_normal = normalize_safe(&to_anchor);
    let target_attachment = anchor - clamp_to_max_length(&to_anchor, rope_length);
    *translation += target_attachment - attachment;
    if velocity.dot(&rope_normal) < 0.0 {
        *velocity = project_on_plane(velocity, &rope_normal);
    }
}

/// Pose of the rope visual: centered between its ends, up axis along the rope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RopeTransform {
    pub midpoint: [f32; 3],
    pub rotation: [f32; 4],
    pub length: f32,
    pub thickness: f32,
}

impl RopeTransform {
    pub fn between(anchor: &Vec3, attachment: &Vec3) -> Self {
        let rope = anchor - attachment;
        let midpoint = attachment + rope * 0.5;
        let rotation: Quat = rotation_with_up_priority(&normalize_safe(&rope), &Vec3::z());
        let q = rotation.quaternion();
        Self {
            midpoint: [midpoint.x, midpoint.y, midpoint.z],
            rotation: [q.i, q.j, q.k, q.w],
            length: rope.norm(),
            thickness: ROPE_VISUAL_THICKNESS,
        }
    }
}

/// Rope spawned for a swinging character. Dropped when the character leaves the swing.
#[derive(Debug, Clone, PartialEq)]
pub struct RopeLink {
    pub prefab: String,
    pub owner: EntityId,
    pub anchor: Vec3,
    pub transform: RopeTransform,
}

impl RopeLink {
    pub fn new(prefab: String, owner: EntityId, anchor: Vec3, attachment: &Vec3) -> Self {
        Self {
            prefab,
            owner,
            anchor,
            transform: RopeTransform::between(&anchor, attachment),
        }
    }

    pub fn update(&mut self, attachment: &Vec3) {
        self.transform = RopeTransform::between(&self.anchor, attachment);
    }
}
