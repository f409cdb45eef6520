use crate::game::math::{
    normalize_safe, project_on_plane, slerp_rotation_towards_direction_around_up, slerp_up_towards_direction, up,
};
use crate::game::physics::SurfaceTags;

use super::super::movement::{accelerate_velocity, standard_jump};
use super::super::pipeline::{Phase1, Phase2};
use super::super::{CharacterCore, StepContext};
use super::{ActiveState, CameraParameters, CameraTarget, CharacterStateBehavior, CrouchedState};
use super::CharacterState;

/// Speed below which steering input is ignored (squared)
const MIN_STEERING_SPEED_SQ: f32 = 0.1;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SlidingState;

impl CharacterStateBehavior for SlidingState {
    fn on_enter(&mut self, _previous: CharacterState, core: &mut CharacterCore, _ctx: &StepContext) {
        core.set_capsule_geometry(core.geometry.crouching);
    }

    fn physics_update(&mut self, core: &mut CharacterCore, ctx: &StepContext) {
        let dt = ctx.dt();
        core.physics_phase1(ctx, Phase1::all());

        let gravity = core.gravity;
        if core.body.is_grounded {
            // Slopes speed the slide up or slow it down
            let gravity_on_plane = project_on_plane(&gravity, &core.body.ground_normal());
            core.body.relative_velocity += gravity_on_plane * dt;
            core.body.relative_velocity *= 1.0 - core.params.slide_friction * dt;

            if core.body.relative_velocity.norm_squared() > MIN_STEERING_SPEED_SQ {
                let heading = normalize_safe(&core.body.relative_velocity);
                let steering = project_on_plane(&core.control.move_vector, &heading);
                accelerate_velocity(
                    &mut core.body.relative_velocity,
                    &(steering * core.params.slide_steering_sharpness),
                    dt,
                );
            }

            core.volatile.is_on_sticky_surface = core
                .body
                .ground_hit
                .is_some_and(|hit| ctx.world.surface(hit.collider).tags.contains(SurfaceTags::STICKY));
        } else {
            accelerate_velocity(&mut core.body.relative_velocity, &gravity, dt);
        }

        core.physics_phase2(ctx, Phase2::all());
    }

    fn variable_update(&mut self, core: &mut CharacterCore, dt: f32) {
        let velocity = core.body.relative_velocity;
        if velocity.norm_squared() > 0.0 {
            let current_up = up(&core.rotation);
            slerp_rotation_towards_direction_around_up(
                &mut core.rotation,
                dt,
                &normalize_safe(&velocity),
                &current_up,
                core.params.ground_rotation_sharpness,
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
        if !core.body.is_grounded {
            return Some(ActiveState::air_move());
        }
        let exit_speed = core.params.slide_exit_speed;
        if core.body.relative_velocity.norm_squared() < exit_speed * exit_speed {
            return Some(ActiveState::Crouched(CrouchedState));
        }
        if !core.control.is_roll_held() && core.can_stand_up(ctx) {
            return Some(ActiveState::ground_move());
        }
        if core.control.is_jump_pressed() {
            let up = core.body.grounding_up;
            standard_jump(&mut core.body, &(up * core.params.ground_jump_speed), true, &up);
            return Some(ActiveState::air_move());
        }
        None
    }

    fn camera_parameters(&self, core: &CharacterCore) -> CameraParameters {
        CameraParameters::new(CameraTarget::Crouching, !core.volatile.is_on_sticky_surface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::character::states::test_support::*;
    use crate::game::input::InputFlags;
    use crate::game::math::Vec3;
    use crate::game::parent::ParentRegistry;
    use crate::game::physics::CollisionWorld;

    #[test]
    fn test_slide_slows_down_into_crouch() {
        let mut world = CollisionWorld::new();
        floor(&mut world);
        let mut core = core_at(&mut world, Vec3::new(0.0, 0.02, 0.0));
        core.body.is_grounded = true;
        core.body.relative_velocity = Vec3::new(0.0, 0.0, 8.0);
        core.control.set_held(InputFlags::ROLL_HELD, true);
        let parents = ParentRegistry::new();
        let mut state = SlidingState;

        let mut exit = None;
        for tick in 0..600 {
            let step = step_ctx(&world, &parents, tick);
            state.physics_update(&mut core, &step);
            if let Some(next) = state.detect_transitions(&mut core, &step) {
                exit = Some(next.tag());
                break;
            }
        }
        assert_eq!(exit, Some(CharacterState::Crouched));
    }
}
