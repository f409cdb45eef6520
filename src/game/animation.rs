//! Clip selection for the character's current state.
//!
//! Read-only over the character: nothing here feeds back into motion.

use serde::{Deserialize, Serialize};

use super::carrying::CarryingComponent;
use super::character::states::CharacterState;
use super::character::CharacterCore;
use super::constants::animation as consts;
use super::math::right;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationClip {
    Idle,
    Run,
    Sprint,
    InAir,
    LedgeGrabMove,
    LedgeStandUp,
    WallRunLeft,
    WallRunRight,
    CrouchIdle,
    CrouchMove,
    ClimbingMove,
    SwimmingIdle,
    SwimmingMove,
    Dash,
    RopeHang,
    Sliding,
}

/// Load thresholds for the breathing flags.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnimationSettings {
    pub breathing_intensity_threshold: f32,
    pub heavy_breathing_load_ratio: f32,
}

impl Default for AnimationSettings {
    fn default() -> Self {
        Self {
            breathing_intensity_threshold: 0.5,
            heavy_breathing_load_ratio: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnimationOutput {
    pub clip: AnimationClip,
    /// Playback speed, already scaled by the carried load
    pub speed: f32,
    pub load_ratio: f32,
    pub carrying_weight: f32,
    pub is_breathing_heavy: bool,
    pub should_play_breathing_sound: bool,
    pub breathing_intensity: f32,
    pub footstep_volume: f32,
}

fn clip(clip: AnimationClip) -> (AnimationClip, f32) {
    (clip, 1.0)
}

fn base_clip(state: CharacterState, core: &CharacterCore) -> (AnimationClip, f32) {
    let params = &core.params;
    let speed = core.body.relative_velocity.norm();
    let moving = core.control.move_vector.norm() >= consts::IDLE_MOVE_INPUT;

    match state {
        CharacterState::GroundMove => {
            if !moving {
                clip(AnimationClip::Idle)
            } else if core.volatile.is_sprinting {
                (AnimationClip::Sprint, speed / params.ground_sprint_max_speed)
            } else {
                (AnimationClip::Run, speed / params.ground_run_max_speed)
            }
        }
        CharacterState::Crouched => {
            if moving {
                (AnimationClip::CrouchMove, speed / params.crouched_max_speed)
            } else {
                clip(AnimationClip::CrouchIdle)
            }
        }
        CharacterState::Swimming => {
            let ratio = speed / params.swimming_max_speed;
            if ratio < consts::SWIMMING_IDLE_VELOCITY_RATIO {
                clip(AnimationClip::SwimmingIdle)
            } else {
                (AnimationClip::SwimmingMove, ratio)
            }
        }
        CharacterState::Climbing => (AnimationClip::ClimbingMove, speed / params.climbing_speed),
        CharacterState::LedgeGrab => (AnimationClip::LedgeGrabMove, speed / params.ledge_move_speed),
        CharacterState::WallRun => {
            let wall_on_left = right(&core.rotation).dot(&core.volatile.last_known_wall_normal) > 0.0;
            clip(if wall_on_left {
                AnimationClip::WallRunLeft
            } else {
                AnimationClip::WallRunRight
            })
        }
        CharacterState::AirMove => clip(AnimationClip::InAir),
        CharacterState::Dashing => clip(AnimationClip::Dash),
        CharacterState::RopeSwing => clip(AnimationClip::RopeHang),
        CharacterState::LedgeStandingUp => clip(AnimationClip::LedgeStandUp),
        CharacterState::Sliding => clip(AnimationClip::Sliding),
        CharacterState::Rolling | CharacterState::FlyingNoCollisions | CharacterState::Uninitialized => {
            clip(AnimationClip::Idle)
        }
    }
}

/// Picks the clip for `state` and applies the carried-load modifiers.
pub fn select_animation(state: CharacterState, core: &CharacterCore, settings: &AnimationSettings) -> AnimationOutput {
    let (clip, base_speed) = base_clip(state, core);
    let carrying = core.carrying.as_ref();

    let load_ratio = carrying.map_or(0.0, CarryingComponent::load_ratio);
    let speed_multiplier = carrying.map_or(1.0, CarryingComponent::animation_speed_multiplier);

    AnimationOutput {
        clip,
        speed: base_speed * speed_multiplier,
        load_ratio,
        carrying_weight: carrying.map_or(0.0, |c| c.current_weight),
        is_breathing_heavy: load_ratio >= settings.heavy_breathing_load_ratio,
        should_play_breathing_sound: load_ratio >= settings.breathing_intensity_threshold,
        breathing_intensity: carrying.map_or(0.0, CarryingComponent::breathing_intensity),
        footstep_volume: carrying.map_or(1.0, CarryingComponent::footstep_volume),
    }
}
