use crate::game::math::{
    normalize_safe, project_on_plane, slerp_rotation_towards_direction_around_up, slerp_up_towards_direction, up,
};
use crate::game::physics::SurfaceTags;

use super::super::movement::standard_ground_move_interpolated;
use super::super::pipeline::{Phase1, Phase2};
use super::super::{CharacterCore, StepContext};
use super::{
    ActiveState, CameraParameters, CameraTarget, CharacterState, CharacterStateBehavior, DashingState,
    RollingState, SlidingState,
};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CrouchedState;

impl CharacterStateBehavior for CrouchedState {
    fn on_enter(&mut self, _previous: CharacterState, core: &mut CharacterCore, _ctx: &StepContext) {
        core.set_capsule_geometry(core.geometry.crouching);
    }

    fn on_exit(&mut self, _next: CharacterState, core: &mut CharacterCore, _ctx: &StepContext) {
        core.volatile.is_on_sticky_surface = false;
    }

    fn physics_update(&mut self, core: &mut CharacterCore, ctx: &StepContext) {
        core.physics_phase1(ctx, Phase1::all());

        if core.body.parent.is_some() {
            let rotation = core.body.rotation_from_parent;
            core.control.move_vector = rotation * core.control.move_vector;
            core.body.relative_velocity = rotation * core.body.relative_velocity;
        }

        let surface = core
            .body
            .ground_hit
            .map(|hit| ctx.world.surface(hit.collider))
            .unwrap_or_default();
        core.volatile.is_on_sticky_surface = surface.tags.contains(SurfaceTags::STICKY);

        let up = core.body.grounding_up;
        let move_vector = core.control.move_vector;
        let move_on_plane = normalize_safe(&project_on_plane(&move_vector, &up)) * move_vector.norm();
        let target = move_on_plane * core.params.crouched_max_speed * core.carrying_speed_multiplier();
        let ground_normal = core.body.ground_normal();
        standard_ground_move_interpolated(
            &mut core.body.relative_velocity,
            &target,
            core.params.crouched_movement_sharpness * surface.friction,
            ctx.dt(),
            &up,
            &ground_normal,
        );

        core.physics_phase2(ctx, Phase2::all());
    }

    fn variable_update(&mut self, core: &mut CharacterCore, dt: f32) {
        let move_vector = core.control.move_vector;
        if move_vector.norm_squared() > 0.0 {
            let current_up = up(&core.rotation);
            slerp_rotation_towards_direction_around_up(
                &mut core.rotation,
                dt,
                &normalize_safe(&move_vector),
                &current_up,
                core.params.crouched_rotation_sharpness,
            );
        }
        let target_up = if core.volatile.is_on_sticky_surface {
            core.body.ground_normal()
        } else {
            -core.gravity
        };
        slerp_up_towards_direction(
            &mut core.rotation,
            dt,
            &target_up,
            core.params.up_orientation_adaptation_sharpness,
        );
    }

    fn detect_transitions(&mut self, core: &mut CharacterCore, ctx: &StepContext) -> Option<ActiveState> {
        let control = core.control;
        if control.is_crouch_pressed() && core.can_stand_up(ctx) {
            return Some(if core.body.is_grounded {
                ActiveState::ground_move()
            } else {
                ActiveState::air_move()
            });
        }
        if control.is_roll_held() {
            return Some(if control.is_sprint_held() {
                ActiveState::Sliding(SlidingState)
            } else {
                ActiveState::Rolling(RollingState)
            });
        }
        if control.is_dash_pressed() {
            return Some(ActiveState::Dashing(DashingState::default()));
        }
        if !core.body.is_grounded {
            return Some(ActiveState::air_move());
        }
        None
    }

    fn camera_parameters(&self, core: &CharacterCore) -> CameraParameters {
        CameraParameters::new(CameraTarget::Crouching, !core.volatile.is_on_sticky_surface)
    }
}
