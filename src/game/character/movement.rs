//! Velocity building blocks shared by the states.

use crate::game::math::{
    clamp_to_max_length, normalize_safe, project_on_plane, reorient_on_plane, sharpness_factor, Vec3,
};

use super::body::CharacterBody;

pub fn accelerate_velocity(velocity: &mut Vec3, acceleration: &Vec3, dt: f32) {
    *velocity += acceleration * dt;
}

pub fn apply_drag(velocity: &mut Vec3, dt: f32, drag: f32) {
    *velocity *= 1.0 / (1.0 + drag * dt);
}

pub fn interpolate_velocity_towards_target(velocity: &mut Vec3, target: &Vec3, dt: f32, sharpness: f32) {
    *velocity = velocity.lerp(target, sharpness_factor(sharpness, dt));
}

/// Ground movement: the target is laid on the ground plane before interpolating toward it.
pub fn standard_ground_move_interpolated(
    velocity: &mut Vec3,
    target_velocity: &Vec3,
    sharpness: f32,
    dt: f32,
    grounding_up: &Vec3,
    ground_normal: &Vec3,
) {
    *velocity = reorient_on_plane(velocity, ground_normal, grounding_up);
    let target = reorient_on_plane(target_velocity, ground_normal, grounding_up);
    interpolate_velocity_towards_target(velocity, &target, dt, sharpness);
}

/// Adds `acceleration` without letting it push planar speed past `max_speed`.
///
/// Speed gained from other sources is kept unless `force_max_speed_limit` is set, in which case
/// the planar component is clamped as well.
pub fn standard_air_move(
    velocity: &mut Vec3,
    acceleration: &Vec3,
    max_speed: f32,
    movement_plane_up: &Vec3,
    dt: f32,
    force_max_speed_limit: bool,
) {
    let mut added = Vec3::zeros();
    accelerate_velocity(&mut added, acceleration, dt);

    let planar_after = project_on_plane(&(*velocity + added), movement_plane_up);
    if planar_after.norm_squared() > max_speed * max_speed {
        let planar_now = project_on_plane(velocity, movement_plane_up);
        let heading = normalize_safe(&planar_now);
        if added.dot(&heading) > 0.0 {
            added = project_on_plane(&added, &heading);
        }
    }
    *velocity += added;

    if force_max_speed_limit {
        let vertical = movement_plane_up * velocity.dot(movement_plane_up);
        let planar = clamp_to_max_length(&(*velocity - vertical), max_speed);
        *velocity = planar + vertical;
    }
}

/// Ungrounds the body and adds `jump_velocity`, optionally discarding the velocity along
/// `velocity_cancelling_up` first.
pub fn standard_jump(
    body: &mut CharacterBody,
    jump_velocity: &Vec3,
    cancel_velocity_before_jump: bool,
    velocity_cancelling_up: &Vec3,
) {
    body.is_grounded = false;
    body.ground_hit = None;
    if cancel_velocity_before_jump {
        body.relative_velocity = project_on_plane(&body.relative_velocity, velocity_cancelling_up);
    }
    body.relative_velocity += jump_velocity;
}
