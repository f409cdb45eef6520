use crate::game::math::{clamp_to_max_length, forward, normalize_safe, project_on_plane, Vec3};

use super::super::pipeline::{Phase1, Phase2};
use super::super::{CharacterCore, StepContext};
use super::{ActiveState, CharacterState, CharacterStateBehavior};

/// Fixed-speed burst along the move direction, ignoring gravity for `dash_duration`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DashingState {
    pub start_time: f64,
    pub direction: Vec3,
}

impl Default for DashingState {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            direction: Vec3::z(),
        }
    }
}

impl DashingState {
    fn is_over(&self, core: &CharacterCore, ctx: &StepContext) -> bool {
        ctx.elapsed() >= self.start_time + f64::from(core.params.dash_duration)
    }
}

impl CharacterStateBehavior for DashingState {
    fn on_enter(&mut self, _previous: CharacterState, core: &mut CharacterCore, ctx: &StepContext) {
        core.set_capsule_geometry(core.geometry.standing);
        self.start_time = ctx.elapsed();

        let move_direction = normalize_safe(&core.control.move_vector);
        self.direction = if move_direction == Vec3::zeros() {
            forward(&core.rotation)
        } else {
            move_direction
        };
    }

    fn on_exit(&mut self, _next: CharacterState, core: &mut CharacterCore, _ctx: &StepContext) {
        let up = core.body.grounding_up;
        let velocity = core.body.relative_velocity;
        let vertical = up * velocity.dot(&up);
        let planar = clamp_to_max_length(&project_on_plane(&velocity, &up), core.params.air_max_speed);
        core.body.relative_velocity = planar + vertical;
    }

    fn physics_update(&mut self, core: &mut CharacterCore, ctx: &StepContext) {
        core.physics_phase1(ctx, Phase1::all());
        core.body.relative_velocity = self.direction * core.params.dash_speed;
        core.physics_phase2(ctx, Phase2::MOVEMENT_AND_DECOLLISION);
    }

    fn detect_transitions(&mut self, core: &mut CharacterCore, ctx: &StepContext) -> Option<ActiveState> {
        if !self.is_over(core, ctx) {
            return None;
        }
        Some(if core.body.is_grounded {
            ActiveState::ground_move()
        } else {
            ActiveState::air_move()
        })
    }
}
