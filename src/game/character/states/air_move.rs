use crate::game::math::{normalize_safe, slerp_rotation_towards_direction_around_up, slerp_up_towards_direction, up};

use super::super::movement::{accelerate_velocity, apply_drag, standard_air_move, standard_jump};
use super::super::pipeline::{Phase1, Phase2};
use super::super::{CharacterCore, StepContext};
use super::{
    climbing, ledge_grab, rope_swing, ActiveState, CharacterStateBehavior, DashingState,
    LedgeGrabState, RollingState, RopeSwingState, WallRunState,
};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AirMoveState;

impl AirMoveState {
    fn handle_jump(core: &mut CharacterCore, ctx: &StepContext) {
        let up = core.body.grounding_up;
        let elapsed = ctx.elapsed();

        if core.control.is_jump_pressed() {
            let within_coyote_time = core.volatile.allow_jump_after_became_ungrounded
                && elapsed
                    < core.volatile.last_time_was_grounded
                        + f64::from(core.params.jump_after_ungrounded_grace_time);

            if within_coyote_time {
                standard_jump(&mut core.body, &(up * core.params.ground_jump_speed), true, &up);
                core.volatile.held_jump_time_counter = 0.0;
            } else if core.volatile.current_ungrounded_jumps < core.params.max_ungrounded_jumps {
                standard_jump(&mut core.body, &(up * core.params.air_jump_speed), true, &up);
                core.volatile.current_ungrounded_jumps += 1;
            } else {
                // Consumed by the grounded state if it lands within the grace window
                core.volatile.jump_pressed_before_became_grounded = true;
            }
            core.volatile.allow_jump_after_became_ungrounded = false;
        }

        if core.volatile.allow_held_jump_in_air
            && core.control.is_jump_held()
            && core.volatile.held_jump_time_counter < core.params.max_held_jump_time
        {
            core.body.relative_velocity += up * core.params.jump_held_acceleration * ctx.dt();
        }
    }
}

impl CharacterStateBehavior for AirMoveState {
    fn physics_update(&mut self, core: &mut CharacterCore, ctx: &StepContext) {
        let dt = ctx.dt();
        core.physics_phase1(ctx, Phase1::all());

        let acceleration = core.control.move_vector * core.params.air_acceleration;
        if acceleration.norm_squared() > 0.0 {
            let before = core.body.relative_velocity;
            let up = core.body.grounding_up;
            standard_air_move(
                &mut core.body.relative_velocity,
                &acceleration,
                core.params.air_max_speed,
                &up,
                dt,
                false,
            );

            // Input never pushes the character up walls it cannot stand on
            let movement = core.body.relative_velocity * dt;
            if let Some(hit) = core.movement_would_hit_non_grounded_obstruction(ctx, &movement) {
                core.body.relative_velocity = before;
                core.volatile.has_detected_move_against_wall = true;
                core.volatile.last_known_wall_normal = hit.normal;
            }
        }

        Self::handle_jump(core, ctx);

        let gravity = core.gravity;
        accelerate_velocity(&mut core.body.relative_velocity, &gravity, dt);
        apply_drag(&mut core.body.relative_velocity, dt, core.params.air_drag);

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
                core.params.air_rotation_sharpness,
            );
        }
        let target_up = -core.gravity;
        slerp_up_towards_direction(
            &mut core.rotation,
            dt,
            &target_up,
            core.params.up_orientation_adaptation_sharpness,
        );
    }

    fn detect_transitions(&mut self, core: &mut CharacterCore, ctx: &StepContext) -> Option<ActiveState> {
        let control = core.control;

        if control.is_rope_pressed() {
            if let Some(anchor) = rope_swing::detect_rope_points(core, ctx) {
                return Some(ActiveState::RopeSwing(RopeSwingState::new(anchor)));
            }
        }
        if control.is_roll_held() {
            return Some(ActiveState::Rolling(RollingState));
        }
        if control.is_dash_pressed() {
            return Some(ActiveState::Dashing(DashingState::default()));
        }
        if core.body.is_grounded {
            return Some(ActiveState::ground_move());
        }
        if control.is_sprint_held() && core.volatile.has_detected_move_against_wall {
            return Some(ActiveState::WallRun(WallRunState::default()));
        }
        if let Some(probe) = ledge_grab::can_grab_ledge(core, ctx) {
            return Some(ActiveState::LedgeGrab(LedgeGrabState::from_probe(&probe)));
        }
        if control.is_climb_pressed() {
            if let Some(surface) = climbing::climbing_detection(core, ctx, false) {
                return Some(ActiveState::Climbing(climbing::ClimbingState::from_surface(&surface)));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::character::states::test_support::*;
    use crate::game::character::states::CharacterState;
    use crate::game::input::InputFlags;
    use crate::game::math::Vec3;
    use crate::game::parent::ParentRegistry;
    use crate::game::physics::CollisionWorld;

    #[test]
    fn test_air_jump_budget_then_buffered_jump() {
        let mut world = CollisionWorld::new();
        floor(&mut world);
        let mut core = core_at(&mut world, Vec3::new(0.0, 20.0, 0.0));
        core.params.max_ungrounded_jumps = 1;
        let parents = ParentRegistry::new();
        let mut state = AirMoveState;

        // Far from any recent grounding, so the first press is an air jump.
        let ctx = step_ctx(&world, &parents, 600);
        core.control.set_pressed(InputFlags::JUMP_PRESSED, true);
        state.physics_update(&mut core, &ctx);
        assert_eq!(core.volatile.current_ungrounded_jumps, 1);
        assert!(core.body.relative_velocity.y > 0.0);
        assert!(!core.volatile.jump_pressed_before_became_grounded);
        core.control.drain_pressed();

        let ctx = step_ctx(&world, &parents, 601);
        core.control.set_pressed(InputFlags::JUMP_PRESSED, true);
        state.physics_update(&mut core, &ctx);
        assert_eq!(core.volatile.current_ungrounded_jumps, 1);
        assert!(core.volatile.jump_pressed_before_became_grounded);
    }

    #[test]
    fn test_coyote_jump_uses_ground_speed() {
        let mut world = CollisionWorld::new();
        floor(&mut world);
        let mut core = core_at(&mut world, Vec3::new(0.0, 20.0, 0.0));
        let parents = ParentRegistry::new();
        let ctx = step_ctx(&world, &parents, 10);
        core.volatile.allow_jump_after_became_ungrounded = true;
        core.volatile.last_time_was_grounded = ctx.elapsed() - 0.05;
        core.control.set_pressed(InputFlags::JUMP_PRESSED, true);

        AirMoveState.physics_update(&mut core, &ctx);
        assert_eq!(core.volatile.current_ungrounded_jumps, 0);
        assert!(!core.volatile.allow_jump_after_became_ungrounded);
    }

    #[test]
    fn test_landing_routes_to_ground_move() {
        let mut world = CollisionWorld::new();
        floor(&mut world);
        let mut core = core_at(&mut world, Vec3::new(0.0, 0.5, 0.0));
        let parents = ParentRegistry::new();
        let mut state = AirMoveState;

        let mut landed = None;
        for tick in 0..120 {
            let ctx = step_ctx(&world, &parents, tick);
            state.physics_update(&mut core, &ctx);
            if let Some(next) = state.detect_transitions(&mut core, &ctx) {
                landed = Some(next.tag());
                break;
            }
        }
        assert_eq!(landed, Some(CharacterState::GroundMove));
        assert!(core.position.y < 0.1);
    }
}
