use tracing::error;

use crate::game::math::slerp_up_towards_direction;

use super::super::movement::accelerate_velocity;
use super::super::pipeline::{Phase1, Phase2};
use super::super::{CharacterCore, StepContext};
use super::{ActiveState, CharacterState, CharacterStateBehavior};

/// Ball form: ungrounded, accelerated by input and gravity only.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RollingState;

fn set_rollball_visible(core: &mut CharacterCore, visible: bool) {
    if core.params.rollball_mesh.is_none() {
        if visible {
            error!(character = %core.id, "no rollball mesh configured, rolling without it");
        }
        return;
    }
    core.rollball_visible = visible;
}

impl CharacterStateBehavior for RollingState {
    fn on_enter(&mut self, _previous: CharacterState, core: &mut CharacterCore, _ctx: &StepContext) {
        core.set_capsule_geometry(core.geometry.rolling);
        core.properties.evaluate_grounding = false;
        core.body.is_grounded = false;
        set_rollball_visible(core, true);
    }

    fn on_exit(&mut self, _next: CharacterState, core: &mut CharacterCore, _ctx: &StepContext) {
        core.properties.evaluate_grounding = true;
        set_rollball_visible(core, false);
    }

    fn physics_update(&mut self, core: &mut CharacterCore, ctx: &StepContext) {
        let dt = ctx.dt();
        core.physics_phase1(ctx, Phase1::PARENT_MOVEMENT);

        let acceleration = core.control.move_vector * core.params.rolling_acceleration;
        let gravity = core.gravity;
        accelerate_velocity(&mut core.body.relative_velocity, &acceleration, dt);
        accelerate_velocity(&mut core.body.relative_velocity, &gravity, dt);

        core.physics_phase2(ctx, Phase2::MOVEMENT_AND_DECOLLISION | Phase2::PARENT_MOMENTUM);
    }

    fn variable_update(&mut self, core: &mut CharacterCore, dt: f32) {
        let target_up = -core.gravity;
        slerp_up_towards_direction(
            &mut core.rotation,
            dt,
            &target_up,
            core.params.up_orientation_adaptation_sharpness,
        );
    }

    fn detect_transitions(&mut self, core: &mut CharacterCore, ctx: &StepContext) -> Option<ActiveState> {
        if !core.control.is_roll_held() && core.can_stand_up(ctx) {
            return Some(ActiveState::air_move());
        }
        None
    }
}
