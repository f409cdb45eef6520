use crate::game::math::{
    normalize_safe, project_on_plane, slerp_rotation_towards_direction_around_up, slerp_up_towards_direction,
    Vec3,
};

use super::super::movement::{accelerate_velocity, apply_drag, standard_air_move, standard_jump};
use super::super::pipeline::{Phase1, Phase2};
use super::super::{CharacterCore, StepContext};
use super::{ActiveState, CharacterState, CharacterStateBehavior, DashingState, RollingState};

/// Running along a wall the character is pressed against. Side is left to the animation layer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WallRunState;

impl WallRunState {
    /// Direction along the wall, perpendicular to both the wall normal and grounding up.
    fn along_wall(core: &CharacterCore) -> Vec3 {
        normalize_safe(&core.volatile.last_known_wall_normal.cross(&core.body.grounding_up))
    }
}

impl CharacterStateBehavior for WallRunState {
    fn on_enter(&mut self, _previous: CharacterState, core: &mut CharacterCore, _ctx: &StepContext) {
        core.set_capsule_geometry(core.geometry.standing);
    }

    fn physics_update(&mut self, core: &mut CharacterCore, ctx: &StepContext) {
        let dt = ctx.dt();
        core.physics_phase1(ctx, Phase1::all());

        // The wall is re-detected every step; losing it ends the run.
        let probe = -core.volatile.last_known_wall_normal * core.params.wall_run_detection_distance;
        match core.movement_would_hit_non_grounded_obstruction(ctx, &probe) {
            Some(hit) => {
                core.volatile.has_detected_move_against_wall = true;
                core.volatile.last_known_wall_normal = hit.normal;
            }
            None => core.volatile.last_known_wall_normal = Vec3::zeros(),
        }

        if core.volatile.has_detected_move_against_wall {
            let up = core.body.grounding_up;
            let along_wall = Self::along_wall(core);
            let move_vector = core.control.move_vector;
            let move_on_plane = normalize_safe(&project_on_plane(&move_vector, &up)) * move_vector.norm();
            let acceleration = move_on_plane * core.params.wall_run_acceleration;
            let acceleration = along_wall * acceleration.dot(&along_wall);
            standard_air_move(
                &mut core.body.relative_velocity,
                &acceleration,
                core.params.wall_run_max_speed,
                &up,
                dt,
                false,
            );

            if core.control.is_jump_pressed() {
                let wall_normal = core.volatile.last_known_wall_normal;
                let jump_direction = normalize_safe(&up.lerp(&wall_normal, core.params.wall_run_jump_ratio));
                standard_jump(
                    &mut core.body,
                    &(jump_direction * core.params.wall_run_jump_speed),
                    true,
                    &jump_direction,
                );
            }

            if core.control.is_jump_held() && core.volatile.held_jump_time_counter < core.params.max_held_jump_time {
                core.body.relative_velocity += up * core.params.jump_held_acceleration * dt;
            }
        }

        let gravity = core.gravity * core.params.wall_run_gravity_factor;
        accelerate_velocity(&mut core.body.relative_velocity, &gravity, dt);
        apply_drag(&mut core.body.relative_velocity, dt, core.params.wall_run_drag);

        core.physics_phase2(
            ctx,
            Phase2::all().difference(Phase2::PREVENT_GROUNDING_FROM_FUTURE_SLOPE_CHANGE),
        );
    }

    fn variable_update(&mut self, core: &mut CharacterCore, dt: f32) {
        if core.volatile.has_detected_move_against_wall {
            let mut direction = Self::along_wall(core);
            if direction.dot(&core.body.relative_velocity) < 0.0 {
                direction = -direction;
            }
            let up = core.body.grounding_up;
            slerp_rotation_towards_direction_around_up(
                &mut core.rotation,
                dt,
                &direction,
                &up,
                core.params.ground_rotation_sharpness,
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

    fn detect_transitions(&mut self, core: &mut CharacterCore, _ctx: &StepContext) -> Option<ActiveState> {
        let control = core.control;
        if control.is_roll_held() {
            return Some(ActiveState::Rolling(RollingState));
        }
        if control.is_dash_pressed() {
            return Some(ActiveState::Dashing(DashingState::default()));
        }
        if core.body.is_grounded {
            return Some(ActiveState::ground_move());
        }
        if !core.volatile.has_detected_move_against_wall {
            return Some(ActiveState::air_move());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::character::states::test_support::*;
    use crate::game::input::InputFlags;
    use crate::game::parent::ParentRegistry;
    use crate::game::physics::{CollisionWorld, PartCategory, SurfaceTags};
    use approx::assert_relative_eq;

    /// Wall whose face is the plane x = 1, facing -X.
    fn wall(world: &mut CollisionWorld) {
        cuboid(
            world,
            3,
            Vec3::new(0.5, 10.0, 10.0),
            Vec3::new(1.5, 10.0, 0.0),
            PartCategory::Solid,
            SurfaceTags::empty(),
        );
        world.update_queries();
    }

    #[test]
    fn test_runs_along_the_wall_and_keeps_contact() {
        let mut world = CollisionWorld::new();
        wall(&mut world);
        let mut core = core_at(&mut world, Vec3::new(0.68, 5.0, 0.0));
        core.volatile.last_known_wall_normal = Vec3::new(-1.0, 0.0, 0.0);
        core.control.move_vector = Vec3::new(0.0, 0.0, 1.0);
        let parents = ParentRegistry::new();
        let step = step_ctx(&world, &parents, 0);
        let mut state = WallRunState;

        state.physics_update(&mut core, &step);
        assert!(core.volatile.has_detected_move_against_wall);
        assert_relative_eq!(core.volatile.last_known_wall_normal, Vec3::new(-1.0, 0.0, 0.0), epsilon = 1.0e-3);
        assert!(core.body.relative_velocity.z.abs() > 0.0);
        assert!(state.detect_transitions(&mut core, &step).is_none());
    }

    #[test]
    fn test_wall_jump_pushes_off_the_wall() {
        let mut world = CollisionWorld::new();
        wall(&mut world);
        let mut core = core_at(&mut world, Vec3::new(0.68, 5.0, 0.0));
        core.volatile.last_known_wall_normal = Vec3::new(-1.0, 0.0, 0.0);
        core.control.set_pressed(InputFlags::JUMP_PRESSED, true);
        let parents = ParentRegistry::new();
        let step = step_ctx(&world, &parents, 0);

        WallRunState.physics_update(&mut core, &step);
        assert!(core.body.relative_velocity.x < 0.0);
        assert!(core.body.relative_velocity.y > 0.0);
    }

    #[test]
    fn test_losing_the_wall_falls_back_to_air() {
        let mut world = CollisionWorld::new();
        wall(&mut world);
        let mut core = core_at(&mut world, Vec3::new(-3.0, 5.0, 0.0));
        core.volatile.last_known_wall_normal = Vec3::new(-1.0, 0.0, 0.0);
        let parents = ParentRegistry::new();
        let step = step_ctx(&world, &parents, 0);
        let mut state = WallRunState;

        state.physics_update(&mut core, &step);
        let next = state.detect_transitions(&mut core, &step);
        assert_eq!(next.map(|s| s.tag()), Some(CharacterState::AirMove));
    }
}
