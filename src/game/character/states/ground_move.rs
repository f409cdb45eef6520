use crate::game::math::{slerp_rotation_towards_direction_around_up, slerp_up_towards_direction};
use crate::game::physics::SurfaceTags;

use super::super::movement::{accelerate_velocity, standard_ground_move_interpolated, standard_jump};
use super::super::pipeline::{Phase1, Phase2};
use super::super::{CharacterCore, StepContext};
use super::{
    climbing, ActiveState, CameraParameters, CameraTarget, CharacterState, CharacterStateBehavior,
    CrouchedState, DashingState, RollingState, SlidingState,
};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GroundMoveState;

impl CharacterStateBehavior for GroundMoveState {
    fn on_enter(&mut self, _previous: CharacterState, core: &mut CharacterCore, _ctx: &StepContext) {
        core.set_capsule_geometry(core.geometry.standing);
    }

    fn on_exit(&mut self, _next: CharacterState, core: &mut CharacterCore, _ctx: &StepContext) {
        core.volatile.is_sprinting = false;
        core.volatile.is_on_sticky_surface = false;
    }

    fn physics_update(&mut self, core: &mut CharacterCore, ctx: &StepContext) {
        let dt = ctx.dt();
        core.physics_phase1(ctx, Phase1::all());

        if core.body.is_grounded {
            let mut move_vector = core.control.move_vector;
            if core.body.parent.is_some() {
                move_vector = core.body.rotation_from_parent * move_vector;
                core.body.relative_velocity = core.body.rotation_from_parent * core.body.relative_velocity;
            }

            core.volatile.is_sprinting = core.control.is_sprint_held();
            let max_speed = if core.volatile.is_sprinting {
                core.params.ground_sprint_max_speed
            } else {
                core.params.ground_run_max_speed
            } * core.carrying_speed_multiplier();

            let surface = core
                .body
                .ground_hit
                .map(|hit| ctx.world.surface(hit.collider))
                .unwrap_or_default();
            core.volatile.is_on_sticky_surface = surface.tags.contains(SurfaceTags::STICKY);

            let target = move_vector * max_speed;
            let up = core.body.grounding_up;
            let ground_normal = core.body.ground_normal();
            standard_ground_move_interpolated(
                &mut core.body.relative_velocity,
                &target,
                core.params.ground_movement_sharpness * surface.friction,
                dt,
                &up,
                &ground_normal,
            );

            let buffered_jump = core.volatile.jump_pressed_before_became_grounded
                && ctx.elapsed()
                    < core.volatile.last_time_jump_pressed
                        + f64::from(core.params.jump_before_grounded_grace_time);
            if core.control.is_jump_pressed() || buffered_jump {
                standard_jump(&mut core.body, &(up * core.params.ground_jump_speed), true, &up);
                core.volatile.allow_jump_after_became_ungrounded = false;
                core.volatile.jump_pressed_before_became_grounded = false;
            }
        } else {
            let gravity = core.gravity;
            accelerate_velocity(&mut core.body.relative_velocity, &gravity, dt);
        }

        core.physics_phase2(ctx, Phase2::all());
    }

    fn variable_update(&mut self, core: &mut CharacterCore, dt: f32) {
        let move_vector = core.control.move_vector;
        let up = core.body.grounding_up;
        slerp_rotation_towards_direction_around_up(
            &mut core.rotation,
            dt,
            &move_vector,
            &up,
            core.params.ground_rotation_sharpness,
        );

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
        if control.is_crouch_pressed() {
            return Some(ActiveState::Crouched(CrouchedState));
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
        if control.is_climb_pressed() {
            if let Some(surface) = climbing::climbing_detection(core, ctx, false) {
                return Some(ActiveState::Climbing(climbing::ClimbingState::from_surface(&surface)));
            }
        }
        None
    }

    fn camera_parameters(&self, core: &CharacterCore) -> CameraParameters {
        CameraParameters::new(CameraTarget::Default, !core.volatile.is_on_sticky_surface)
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
    fn test_idle_velocity_decays_and_stays_grounded() {
        let mut world = CollisionWorld::new();
        floor(&mut world);
        let mut core = core_at(&mut world, Vec3::new(0.0, 0.02, 0.0));
        core.body.is_grounded = true;
        core.body.relative_velocity = Vec3::new(6.0, 0.0, 0.0);
        let parents = ParentRegistry::new();
        let mut state = GroundMoveState;

        for tick in 0..120 {
            let ctx = step_ctx(&world, &parents, tick);
            state.physics_update(&mut core, &ctx);
            assert!(state.detect_transitions(&mut core, &ctx).is_none());
        }
        assert!(core.body.is_grounded);
        assert!(core.body.relative_velocity.norm() < 0.01);
    }

    #[test]
    fn test_jump_ungrounds_and_routes_to_air() {
        let mut world = CollisionWorld::new();
        floor(&mut world);
        let mut core = core_at(&mut world, Vec3::new(0.0, 0.02, 0.0));
        core.body.is_grounded = true;
        core.control.set_pressed(InputFlags::JUMP_PRESSED, true);
        let parents = ParentRegistry::new();
        let ctx = step_ctx(&world, &parents, 0);
        let mut state = GroundMoveState;

        state.physics_update(&mut core, &ctx);
        assert!(core.body.relative_velocity.y > 0.0);
        let next = state.detect_transitions(&mut core, &ctx);
        assert_eq!(next.map(|s| s.tag()), Some(CharacterState::AirMove));
    }

    #[test]
    fn test_roll_and_slide_selection() {
        let mut world = CollisionWorld::new();
        floor(&mut world);
        let mut core = core_at(&mut world, Vec3::new(0.0, 0.02, 0.0));
        let parents = ParentRegistry::new();
        let ctx = step_ctx(&world, &parents, 0);
        let mut state = GroundMoveState;

        core.control.set_held(InputFlags::ROLL_HELD, true);
        let next = state.detect_transitions(&mut core, &ctx);
        assert_eq!(next.map(|s| s.tag()), Some(CharacterState::Rolling));

        core.control.set_held(InputFlags::SPRINT_HELD, true);
        let next = state.detect_transitions(&mut core, &ctx);
        assert_eq!(next.map(|s| s.tag()), Some(CharacterState::Sliding));
    }
}
