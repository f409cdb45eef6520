use tracing::error;

use crate::game::math::{
    normalize_safe, project_on_plane, slerp_rotation_towards_direction_around_up, slerp_up_towards_direction, up,
    Vec3,
};
use crate::game::physics::{CollisionFilter, GROUP_ROPE_ANCHOR};
use crate::game::rope::{constrain_to_rope, RopeLink};

use super::super::movement::{accelerate_velocity, apply_drag, standard_air_move};
use super::super::pipeline::{Phase1, Phase2};
use super::super::{CharacterCore, StepContext};
use super::{ActiveState, CharacterState, CharacterStateBehavior};

/// Closest rope anchor within rope length of the character's rope attachment point.
pub fn detect_rope_points(core: &CharacterCore, ctx: &StepContext) -> Option<Vec3> {
    let attachment = rope_attachment_point(core);
    ctx.world
        .point_distance(
            &attachment,
            core.params.rope_length,
            &CollisionFilter::volumes(GROUP_ROPE_ANCHOR),
        )
        .map(|hit| hit.position)
}

fn rope_attachment_point(core: &CharacterCore) -> Vec3 {
    core.position + core.rotation * core.params.local_rope_anchor_point
}

/// Swinging from a fixed anchor under a rope-length distance constraint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RopeSwingState {
    pub anchor_point: Vec3,
}

impl RopeSwingState {
    pub fn new(anchor_point: Vec3) -> Self {
        Self { anchor_point }
    }
}

impl Default for RopeSwingState {
    fn default() -> Self {
        Self::new(Vec3::zeros())
    }
}

impl CharacterStateBehavior for RopeSwingState {
    fn on_enter(&mut self, _previous: CharacterState, core: &mut CharacterCore, _ctx: &StepContext) {
        core.set_capsule_geometry(core.geometry.standing);
        core.properties.evaluate_grounding = false;

        let Some(prefab) = core.params.rope_prefab.clone() else {
            error!(character = %core.id, "no rope prefab configured, swinging without a rope link");
            return;
        };
        let attachment = rope_attachment_point(core);
        core.rope_link = Some(RopeLink::new(prefab, core.id, self.anchor_point, &attachment));
    }

    fn on_exit(&mut self, _next: CharacterState, core: &mut CharacterCore, _ctx: &StepContext) {
        core.properties.evaluate_grounding = true;
        core.rope_link = None;
    }

    fn physics_update(&mut self, core: &mut CharacterCore, ctx: &StepContext) {
        let dt = ctx.dt();
        core.physics_phase1(ctx, Phase1::empty());

        let up = core.body.grounding_up;
        let move_vector = core.control.move_vector;
        let move_on_plane = normalize_safe(&project_on_plane(&move_vector, &up)) * move_vector.norm();
        let acceleration = move_on_plane * core.params.rope_swing_acceleration;
        let max_speed = core.params.rope_swing_max_speed * core.carrying_speed_multiplier();
        standard_air_move(&mut core.body.relative_velocity, &acceleration, max_speed, &up, dt, false);

        let gravity = core.gravity;
        accelerate_velocity(&mut core.body.relative_velocity, &gravity, dt);
        apply_drag(&mut core.body.relative_velocity, dt, core.params.rope_swing_drag);

        let attachment = rope_attachment_point(core);
        constrain_to_rope(
            &mut core.position,
            &mut core.body.relative_velocity,
            core.params.rope_length,
            &self.anchor_point,
            &attachment,
        );

        core.physics_phase2(ctx, Phase2::MOVEMENT_AND_DECOLLISION);

        let attachment = rope_attachment_point(core);
        if let Some(link) = core.rope_link.as_mut() {
            link.update(&attachment);
        }
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
        let to_anchor = normalize_safe(&(self.anchor_point - core.position));
        slerp_up_towards_direction(
            &mut core.rotation,
            dt,
            &to_anchor,
            core.params.up_orientation_adaptation_sharpness,
        );
    }

    fn detect_transitions(&mut self, core: &mut CharacterCore, _ctx: &StepContext) -> Option<ActiveState> {
        if core.control.is_jump_pressed() || core.control.is_dash_pressed() {
            return Some(ActiveState::air_move());
        }
        None
    }
}
