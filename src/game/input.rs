//! Character intent encoding.
//!
//! `CharacterControl` is the per-step snapshot a character consumes: a world-space move vector
//! plus two disjoint flag families. Held flags are level-triggered and rewritten every frame.
//! Pressed flags are edge-triggered: the consumer drains them once they have been observed.

use bitflags::bitflags;
use nalgebra::Vector2;
use serde::Deserialize;

use super::math::{clamp_to_max_length, Quat, Vec3};

bitflags! {
    /// Input bitset shared by player and AI controllers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InputFlags: u16 {
        // Held inputs (continuous)
        const JUMP_HELD = 1 << 0;
        const ROLL_HELD = 1 << 1;
        const SPRINT_HELD = 1 << 2;

        // Pressed inputs (one step)
        const JUMP_PRESSED = 1 << 3;
        const DASH_PRESSED = 1 << 4;
        const CROUCH_PRESSED = 1 << 5;
        const ROPE_PRESSED = 1 << 6;
        const CLIMB_PRESSED = 1 << 7;
        const FLY_NO_COLLISIONS_PRESSED = 1 << 8;
    }
}

impl InputFlags {
    pub const HELD: InputFlags = InputFlags::JUMP_HELD
        .union(InputFlags::ROLL_HELD)
        .union(InputFlags::SPRINT_HELD);

    pub const PRESSED: InputFlags = InputFlags::JUMP_PRESSED
        .union(InputFlags::DASH_PRESSED)
        .union(InputFlags::CROUCH_PRESSED)
        .union(InputFlags::ROPE_PRESSED)
        .union(InputFlags::CLIMB_PRESSED)
        .union(InputFlags::FLY_NO_COLLISIONS_PRESSED);
}

/// Per-step input snapshot consumed by the character state machine.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CharacterControl {
    /// Camera-relative, world-space move intent (length <= 1 for planar policies)
    pub move_vector: Vec3,
    pub flags: InputFlags,
}

impl CharacterControl {
    pub fn is_jump_held(&self) -> bool {
        self.flags.contains(InputFlags::JUMP_HELD)
    }

    pub fn is_roll_held(&self) -> bool {
        self.flags.contains(InputFlags::ROLL_HELD)
    }

    pub fn is_sprint_held(&self) -> bool {
        self.flags.contains(InputFlags::SPRINT_HELD)
    }

    pub fn is_jump_pressed(&self) -> bool {
        self.flags.contains(InputFlags::JUMP_PRESSED)
    }

    pub fn is_dash_pressed(&self) -> bool {
        self.flags.contains(InputFlags::DASH_PRESSED)
    }

    pub fn is_crouch_pressed(&self) -> bool {
        self.flags.contains(InputFlags::CROUCH_PRESSED)
    }

    pub fn is_rope_pressed(&self) -> bool {
        self.flags.contains(InputFlags::ROPE_PRESSED)
    }

    pub fn is_climb_pressed(&self) -> bool {
        self.flags.contains(InputFlags::CLIMB_PRESSED)
    }

    pub fn is_fly_no_collisions_pressed(&self) -> bool {
        self.flags.contains(InputFlags::FLY_NO_COLLISIONS_PRESSED)
    }

    pub fn set_held(&mut self, flag: InputFlags, held: bool) {
        debug_assert!(InputFlags::HELD.contains(flag));
        self.flags.set(flag, held);
    }

    pub fn set_pressed(&mut self, flag: InputFlags, active: bool) {
        debug_assert!(InputFlags::PRESSED.contains(flag));
        self.flags.set(flag, active);
    }

    /// Clears every edge-triggered bit. Called once per step by the consumer.
    pub fn drain_pressed(&mut self) -> InputFlags {
        let drained = self.flags & InputFlags::PRESSED;
        self.flags.remove(InputFlags::PRESSED);
        drained
    }

    pub fn clear_all(&mut self) {
        self.flags = InputFlags::empty();
        self.move_vector = Vec3::zeros();
    }
}

/// A pressed action stamped with the fixed tick it happened on.
///
/// Rendering frames may outpace fixed ticks, so a press is remembered until the fixed
/// update of the tick it was recorded in reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FixedInputEvent {
    last_set_tick: Option<u64>,
}

impl FixedInputEvent {
    pub fn set(&mut self, tick: u64) {
        self.last_set_tick = Some(tick);
    }

    pub fn is_set(&self, tick: u64) -> bool {
        self.last_set_tick == Some(tick)
    }
}

/// Raw player intent in camera space, sampled at frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerInputs {
    /// Stick/keys, clamped to unit length on write
    pub move_axes: Vector2<f32>,
    pub jump_held: bool,
    pub roll_held: bool,
    pub sprint_held: bool,
    pub jump_pressed: FixedInputEvent,
    pub dash_pressed: FixedInputEvent,
    pub crouch_pressed: FixedInputEvent,
    pub rope_pressed: FixedInputEvent,
    pub climb_pressed: FixedInputEvent,
    pub fly_no_collisions_pressed: FixedInputEvent,
}

/// Actions a scripted or remote controller can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputAction {
    Jump,
    Dash,
    Crouch,
    Rope,
    Climb,
    FlyNoCollisions,
}

impl PlayerInputs {
    pub fn set_move_axes(&mut self, x: f32, y: f32) {
        let axes = Vector2::new(x, y);
        let len = axes.norm();
        self.move_axes = if len > 1.0 { axes / len } else { axes };
    }

    /// Stamps a pressed action on the given fixed tick.
    pub fn press(&mut self, action: InputAction, tick: u64) {
        match action {
            InputAction::Jump => self.jump_pressed.set(tick),
            InputAction::Dash => self.dash_pressed.set(tick),
            InputAction::Crouch => self.crouch_pressed.set(tick),
            InputAction::Rope => self.rope_pressed.set(tick),
            InputAction::Climb => self.climb_pressed.set(tick),
            InputAction::FlyNoCollisions => self.fly_no_collisions_pressed.set(tick),
        }
    }

    /// Writes held and pressed flags for `tick` into `control`. The move vector is filled
    /// separately because its policy depends on the active state.
    pub fn write_flags(&self, control: &mut CharacterControl, tick: u64) {
        control.set_held(InputFlags::JUMP_HELD, self.jump_held);
        control.set_held(InputFlags::ROLL_HELD, self.roll_held);
        control.set_held(InputFlags::SPRINT_HELD, self.sprint_held);

        control.set_pressed(InputFlags::JUMP_PRESSED, self.jump_pressed.is_set(tick));
        control.set_pressed(InputFlags::DASH_PRESSED, self.dash_pressed.is_set(tick));
        control.set_pressed(InputFlags::CROUCH_PRESSED, self.crouch_pressed.is_set(tick));
        control.set_pressed(InputFlags::ROPE_PRESSED, self.rope_pressed.is_set(tick));
        control.set_pressed(InputFlags::CLIMB_PRESSED, self.climb_pressed.is_set(tick));
        control.set_pressed(
            InputFlags::FLY_NO_COLLISIONS_PRESSED,
            self.fly_no_collisions_pressed.is_set(tick),
        );
    }
}

/// Planar move vector on the camera's right/forward axes.
pub fn common_move_vector(inputs: &PlayerInputs, camera_rotation: &Quat) -> Vec3 {
    let camera_right = camera_rotation * Vec3::x();
    let camera_forward = camera_rotation * Vec3::z();
    camera_right * inputs.move_axes.x + camera_forward * inputs.move_axes.y
}

/// Free 3-axis move vector: camera plane plus camera-up from jump/roll held, clamped to unit length.
pub fn volumetric_move_vector(inputs: &PlayerInputs, camera_rotation: &Quat) -> Vec3 {
    let camera_up = camera_rotation * Vec3::y();
    let mut move_vector = common_move_vector(inputs, camera_rotation);
    if inputs.jump_held {
        move_vector += camera_up;
    }
    if inputs.roll_held {
        move_vector -= camera_up;
    }
    clamp_to_max_length(&move_vector, 1.0)
}
