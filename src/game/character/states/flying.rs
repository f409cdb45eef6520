use crate::game::input::{volumetric_move_vector, PlayerInputs};
use crate::game::math::{Quat, Vec3};

use super::super::movement::interpolate_velocity_towards_target;
use super::super::pipeline::Phase1;
use super::super::{CharacterCore, StepContext};
use super::{ActiveState, CameraParameters, CameraTarget, CharacterState, CharacterStateBehavior};

/// Debug fly mode: no collisions, no gravity, toggled by the same input that entered it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlyingNoCollisionsState;

impl CharacterStateBehavior for FlyingNoCollisionsState {
    fn on_enter(&mut self, _previous: CharacterState, core: &mut CharacterCore, _ctx: &StepContext) {
        core.set_capsule_geometry(core.geometry.standing);
        core.properties.detect_movement_collisions = false;
        core.properties.decollide_from_overlaps = false;
        core.set_collisions_enabled(false);
        core.body.is_grounded = false;
    }

    fn on_exit(&mut self, _next: CharacterState, core: &mut CharacterCore, _ctx: &StepContext) {
        core.properties.detect_movement_collisions = true;
        core.properties.decollide_from_overlaps = true;
        core.set_collisions_enabled(true);
    }

    fn physics_update(&mut self, core: &mut CharacterCore, ctx: &StepContext) {
        let dt = ctx.dt();
        core.physics_phase1(ctx, Phase1::empty());

        let target = core.control.move_vector * core.params.flying_max_speed;
        interpolate_velocity_towards_target(
            &mut core.body.relative_velocity,
            &target,
            dt,
            core.params.flying_movement_sharpness,
        );
        core.position += core.body.relative_velocity * dt;
    }

    fn variable_update(&mut self, core: &mut CharacterCore, _dt: f32) {
        core.rotation = Quat::identity();
    }

    /// Only the global toggle leaves this state.
    fn detect_transitions(&mut self, _core: &mut CharacterCore, _ctx: &StepContext) -> Option<ActiveState> {
        None
    }

    fn camera_parameters(&self, _core: &CharacterCore) -> CameraParameters {
        CameraParameters::new(CameraTarget::Default, false)
    }

    fn move_vector(&self, inputs: &PlayerInputs, camera_rotation: &Quat) -> Vec3 {
        volumetric_move_vector(inputs, camera_rotation)
    }
}
