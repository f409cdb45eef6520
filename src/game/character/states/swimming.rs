use crate::game::constants::swimming as consts;
use crate::game::input::{volumetric_move_vector, PlayerInputs};
use crate::game::math::{
    forward, normalize_safe, project_on_plane, rotation_with_up_priority, sharpness_factor, slerp, Quat, Vec3,
};
use crate::game::physics::{CollisionFilter, WorldHit, GROUP_WATER};

use super::super::movement::{apply_drag, standard_air_move, standard_jump};
use super::super::pipeline::{Phase1, Phase2};
use super::super::{CharacterCore, StepContext};
use super::{ActiveState, CameraParameters, CameraTarget, CharacterState, CharacterStateBehavior};

/// Closest water volume around the swimming detection point.
///
/// The hit distance is signed (negative below the surface) and its normal points toward the
/// surface. Both are stored on the character for the animation layer and the swimming state.
pub fn detect_water_zones(core: &mut CharacterCore, ctx: &StepContext) -> Option<WorldHit> {
    let detection_point = core.position + core.rotation * core.params.local_swimming_detection_point;
    let hit = ctx.world.point_distance(
        &detection_point,
        core.params.water_detection_distance,
        &CollisionFilter::volumes(GROUP_WATER),
    )?;
    core.volatile.direction_to_water_surface = hit.normal;
    core.volatile.distance_from_water_surface = hit.distance;
    Some(hit)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SwimmingState {
    pub has_jumped_while_swimming: bool,
    pub has_detected_grounding: bool,
    pub should_exit_swimming: bool,
}

impl SwimmingState {
    fn pre_movement_update(&mut self, core: &mut CharacterCore, ctx: &StepContext) {
        let dt = ctx.dt();
        self.has_detected_grounding = core.body.is_grounded;
        core.body.is_grounded = false;

        if detect_water_zones(core, ctx).is_none() {
            self.should_exit_swimming = true;
            return;
        }

        let distance = core.volatile.distance_from_water_surface;
        let to_surface = core.volatile.direction_to_water_surface;

        let mut added_move = Vec3::zeros();
        if distance > core.params.swimming_stand_up_distance_from_surface {
            // Near the surface, input pointing at it is flattened unless it dives back down
            let toward_surface = normalize_safe(&core.control.move_vector).dot(&to_surface);
            if toward_surface > core.params.swimming_surface_dive_threshold {
                core.control.move_vector = project_on_plane(&core.control.move_vector, &to_surface);
            }
            added_move = to_surface * consts::SURFACE_NUDGE;
        }

        let acceleration = (core.control.move_vector + added_move) * core.params.swimming_acceleration;
        let max_speed = core.params.swimming_max_speed * core.carrying_speed_multiplier();
        let plane_up = -forward(&core.rotation);
        standard_air_move(&mut core.body.relative_velocity, &acceleration, max_speed, &plane_up, dt, true);
        apply_drag(&mut core.body.relative_velocity, dt, core.params.swimming_drag);

        self.has_jumped_while_swimming = false;
        if core.control.is_jump_pressed() && distance > consts::DISTANCE_FROM_SURFACE_TO_ALLOW_JUMPING {
            let up = core.body.grounding_up;
            standard_jump(&mut core.body, &(up * core.params.swimming_jump_speed), true, &up);
            self.has_jumped_while_swimming = true;
        }
    }

    /// Holds the character just under the surface, unless it is jumping out or stands on
    /// something it can walk out onto.
    fn post_movement_update(&mut self, core: &mut CharacterCore, ctx: &StepContext) {
        if detect_water_zones(core, ctx).is_none() {
            self.should_exit_swimming = true;
            return;
        }

        let mut has_exited_water = false;
        let distance = core.volatile.distance_from_water_surface;
        if distance > -consts::FORCED_DISTANCE_FROM_SURFACE {
            if self.has_jumped_while_swimming || core.body.ground_entity().is_some() {
                has_exited_water = true;
            } else {
                let to_surface = core.volatile.direction_to_water_surface;
                core.position += to_surface * (-consts::FORCED_DISTANCE_FROM_SURFACE - distance);
                core.body.relative_velocity = project_on_plane(&core.body.relative_velocity, &to_surface);
            }
        }
        self.should_exit_swimming = has_exited_water;
    }

    fn rotate_around_center(core: &mut CharacterCore, target: &Quat, dt: f32) {
        let center = core.geometry.swimming.world_center(&core.position, &core.rotation);
        let smoothed = slerp(
            &core.rotation,
            target,
            sharpness_factor(core.params.swimming_rotation_sharpness, dt),
        );
        let local_center = core.rotation.inverse() * (center - core.position);
        core.rotation = smoothed;
        core.position = center - smoothed * local_center;
    }
}

impl CharacterStateBehavior for SwimmingState {
    fn on_enter(&mut self, _previous: CharacterState, core: &mut CharacterCore, _ctx: &StepContext) {
        core.set_capsule_geometry(core.geometry.swimming);
        core.properties.snap_to_ground = false;
        core.body.is_grounded = false;
        self.has_jumped_while_swimming = false;
        self.should_exit_swimming = false;
    }

    fn on_exit(&mut self, _next: CharacterState, core: &mut CharacterCore, _ctx: &StepContext) {
        core.properties.snap_to_ground = true;
    }

    fn physics_update(&mut self, core: &mut CharacterCore, ctx: &StepContext) {
        core.physics_phase1(ctx, Phase1::all());
        self.pre_movement_update(core, ctx);
        core.physics_phase2(ctx, Phase2::MOVEMENT_AND_DECOLLISION | Phase2::PARENT_MOMENTUM);
        self.post_movement_update(core, ctx);
    }

    fn variable_update(&mut self, core: &mut CharacterCore, dt: f32) {
        if self.should_exit_swimming {
            return;
        }
        let move_vector = core.control.move_vector;
        let gravity_up = -normalize_safe(&core.gravity);

        if core.volatile.distance_from_water_surface > core.params.swimming_stand_up_distance_from_surface {
            // Upright near the surface
            let target_forward = if move_vector.norm_squared() > 0.0 {
                normalize_safe(&project_on_plane(&move_vector, &gravity_up))
            } else {
                let facing = normalize_safe(&project_on_plane(&forward(&core.rotation), &gravity_up));
                if core.body.grounding_up.dot(&gravity_up) < 0.0 {
                    -facing
                } else {
                    facing
                }
            };
            let target = rotation_with_up_priority(&gravity_up, &target_forward);
            Self::rotate_around_center(core, &target, dt);
        } else if move_vector.norm_squared() > 0.0 {
            // Head first along the swim direction, belly toward gravity
            let target = rotation_with_up_priority(&normalize_safe(&move_vector), &normalize_safe(&core.gravity));
            Self::rotate_around_center(core, &target, dt);
        }
    }

    fn detect_transitions(&mut self, _core: &mut CharacterCore, _ctx: &StepContext) -> Option<ActiveState> {
        if self.has_detected_grounding {
            return Some(ActiveState::ground_move());
        }
        if self.should_exit_swimming {
            return Some(ActiveState::air_move());
        }
        None
    }

    fn camera_parameters(&self, _core: &CharacterCore) -> CameraParameters {
        CameraParameters::new(CameraTarget::Swimming, true)
    }

    fn move_vector(&self, inputs: &PlayerInputs, camera_rotation: &Quat) -> Vec3 {
        volumetric_move_vector(inputs, camera_rotation)
    }
}
