//! Character tunables, pipeline flags and the volatile per-step bookkeeping.

use serde::Deserialize;

use crate::game::math::Vec3;

/// Every tunable a character exposes. Read-only during a step.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CharacterParameters {
    // Ground movement
    pub ground_run_max_speed: f32,
    pub ground_sprint_max_speed: f32,
    pub ground_movement_sharpness: f32,
    pub ground_rotation_sharpness: f32,

    // Crouching
    pub crouched_max_speed: f32,
    pub crouched_movement_sharpness: f32,
    pub crouched_rotation_sharpness: f32,

    // Air movement
    pub air_acceleration: f32,
    pub air_max_speed: f32,
    pub air_drag: f32,
    pub air_rotation_sharpness: f32,

    // Rolling
    pub rolling_acceleration: f32,

    // Wall run
    pub wall_run_acceleration: f32,
    pub wall_run_max_speed: f32,
    pub wall_run_drag: f32,
    pub wall_run_gravity_factor: f32,
    /// 0 jumps straight up, 1 jumps straight off the wall
    pub wall_run_jump_ratio: f32,
    pub wall_run_detection_distance: f32,

    // Flying (debug)
    pub flying_max_speed: f32,
    pub flying_movement_sharpness: f32,

    // Jumping
    pub ground_jump_speed: f32,
    pub air_jump_speed: f32,
    pub wall_run_jump_speed: f32,
    pub jump_held_acceleration: f32,
    pub max_held_jump_time: f32,
    pub max_ungrounded_jumps: u32,
    pub jump_after_ungrounded_grace_time: f32,
    pub jump_before_grounded_grace_time: f32,

    // Ledge detection
    pub ledge_move_speed: f32,
    pub ledge_rotation_sharpness: f32,
    pub ledge_surface_probing_height: f32,
    pub ledge_surface_obstruction_probing_height: f32,
    pub ledge_side_probing_length: f32,
    pub ledge_stand_up_duration: f32,
    /// Point in the character's local frame where the ledge top is probed
    pub local_ledge_detection_point: Vec3,

    // Dashing
    pub dash_duration: f32,
    pub dash_speed: f32,

    // Swimming
    pub swimming_acceleration: f32,
    pub swimming_max_speed: f32,
    pub swimming_drag: f32,
    pub swimming_rotation_sharpness: f32,
    /// Below this distance to the surface the character swims freely, above it stays upright
    pub swimming_stand_up_distance_from_surface: f32,
    pub water_detection_distance: f32,
    pub swimming_jump_speed: f32,
    pub swimming_surface_dive_threshold: f32,
    pub local_swimming_detection_point: Vec3,

    // Rope swing
    pub rope_swing_acceleration: f32,
    pub rope_swing_max_speed: f32,
    pub rope_swing_drag: f32,
    pub rope_length: f32,
    pub local_rope_anchor_point: Vec3,

    // Climbing
    pub climbing_distance_from_surface: f32,
    pub climbing_speed: f32,
    pub climbing_movement_sharpness: f32,
    pub climbing_rotation_sharpness: f32,

    // Sliding
    pub slide_friction: f32,
    pub slide_steering_sharpness: f32,
    pub slide_exit_speed: f32,

    pub up_orientation_adaptation_sharpness: f32,

    /// Visual assets spawned by some states. `None` is a configuration error reported at use.
    pub rope_prefab: Option<String>,
    pub rollball_mesh: Option<String>,
}

impl Default for CharacterParameters {
    fn default() -> Self {
        Self {
            ground_run_max_speed: 10.0,
            ground_sprint_max_speed: 15.0,
            ground_movement_sharpness: 15.0,
            ground_rotation_sharpness: 10.0,

            crouched_max_speed: 5.0,
            crouched_movement_sharpness: 10.0,
            crouched_rotation_sharpness: 10.0,

            air_acceleration: 100.0,
            air_max_speed: 10.0,
            air_drag: 0.1,
            air_rotation_sharpness: 5.0,

            rolling_acceleration: 50.0,

            wall_run_acceleration: 20.0,
            wall_run_max_speed: 10.0,
            wall_run_drag: 0.0,
            wall_run_gravity_factor: 0.5,
            wall_run_jump_ratio: 0.5,
            wall_run_detection_distance: 0.3,

            flying_max_speed: 20.0,
            flying_movement_sharpness: 15.0,

            ground_jump_speed: 10.0,
            air_jump_speed: 10.0,
            wall_run_jump_speed: 12.0,
            jump_held_acceleration: 50.0,
            max_held_jump_time: 0.15,
            max_ungrounded_jumps: 1,
            jump_after_ungrounded_grace_time: 0.15,
            jump_before_grounded_grace_time: 0.15,

            ledge_move_speed: 3.0,
            ledge_rotation_sharpness: 8.0,
            ledge_surface_probing_height: 1.0,
            ledge_surface_obstruction_probing_height: 0.1,
            ledge_side_probing_length: 0.2,
            ledge_stand_up_duration: 0.3,
            local_ledge_detection_point: Vec3::new(0.0, 1.4, 0.4),

            dash_duration: 0.2,
            dash_speed: 30.0,

            swimming_acceleration: 20.0,
            swimming_max_speed: 5.0,
            swimming_drag: 1.0,
            swimming_rotation_sharpness: 5.0,
            swimming_stand_up_distance_from_surface: -0.5,
            water_detection_distance: 1.0,
            swimming_jump_speed: 10.0,
            swimming_surface_dive_threshold: 0.5,
            local_swimming_detection_point: Vec3::new(0.0, 1.2, 0.0),

            rope_swing_acceleration: 15.0,
            rope_swing_max_speed: 15.0,
            rope_swing_drag: 0.1,
            rope_length: 8.0,
            local_rope_anchor_point: Vec3::new(0.0, 1.8, 0.0),

            climbing_distance_from_surface: 0.1,
            climbing_speed: 5.0,
            climbing_movement_sharpness: 10.0,
            climbing_rotation_sharpness: 8.0,

            slide_friction: 0.5,
            slide_steering_sharpness: 3.0,
            slide_exit_speed: 1.0,

            up_orientation_adaptation_sharpness: 5.0,

            rope_prefab: Some("rope".to_string()),
            rollball_mesh: Some("rollball".to_string()),
        }
    }
}

/// Flags and limits of the shared pipeline. States toggle some of them on enter/exit.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct KinematicCharacterProperties {
    pub evaluate_grounding: bool,
    pub snap_to_ground: bool,
    pub ground_snapping_distance: f32,
    pub max_grounded_slope_degrees: f32,
    pub detect_movement_collisions: bool,
    pub decollide_from_overlaps: bool,
    /// Push dynamic bodies and let them be hit by queries
    pub simulate_dynamic_body: bool,
    pub mass: f32,
}

impl Default for KinematicCharacterProperties {
    fn default() -> Self {
        Self {
            evaluate_grounding: true,
            snap_to_ground: true,
            ground_snapping_distance: 0.5,
            max_grounded_slope_degrees: 60.0,
            detect_movement_collisions: true,
            decollide_from_overlaps: true,
            simulate_dynamic_body: true,
            mass: 1.0,
        }
    }
}

impl KinematicCharacterProperties {
    pub fn should_ignore_dynamic_bodies(&self) -> bool {
        !self.simulate_dynamic_body
    }

    pub fn max_grounded_slope_radians(&self) -> f32 {
        self.max_grounded_slope_degrees.to_radians()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct StepAndSlopeSettings {
    pub step_handling: bool,
    pub max_step_height: f32,
    pub extra_steps_check_distance: f32,
    pub character_width_for_step_grounding_check: f32,
    pub prevent_grounding_when_moving_towards_no_grounding: bool,
    pub has_max_downward_slope_change_angle: bool,
    pub max_downward_slope_change_angle: f32,
    pub constrain_velocity_to_ground_plane: bool,
}

impl Default for StepAndSlopeSettings {
    fn default() -> Self {
        Self {
            step_handling: true,
            max_step_height: 0.5,
            extra_steps_check_distance: 0.1,
            character_width_for_step_grounding_check: 1.0,
            prevent_grounding_when_moving_towards_no_grounding: true,
            has_max_downward_slope_change_angle: false,
            max_downward_slope_change_angle: 90.0,
            constrain_velocity_to_ground_plane: true,
        }
    }
}

/// Fields written inside a physics step and read by the next step or by the variable update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolatileState {
    pub held_jump_time_counter: f32,
    pub current_ungrounded_jumps: u32,
    pub allow_jump_after_became_ungrounded: bool,
    pub allow_held_jump_in_air: bool,
    pub jump_pressed_before_became_grounded: bool,
    pub last_time_was_grounded: f64,
    pub last_time_jump_pressed: f64,
    pub has_detected_move_against_wall: bool,
    pub last_known_wall_normal: Vec3,
    pub ledge_grab_block_counter: f32,
    pub distance_from_water_surface: f32,
    pub direction_to_water_surface: Vec3,
    pub is_sprinting: bool,
    pub is_on_sticky_surface: bool,
}

impl Default for VolatileState {
    fn default() -> Self {
        Self {
            held_jump_time_counter: 0.0,
            current_ungrounded_jumps: 0,
            allow_jump_after_became_ungrounded: false,
            allow_held_jump_in_air: false,
            jump_pressed_before_became_grounded: false,
            last_time_was_grounded: f64::NEG_INFINITY,
            last_time_jump_pressed: f64::NEG_INFINITY,
            has_detected_move_against_wall: false,
            last_known_wall_normal: Vec3::zeros(),
            ledge_grab_block_counter: 0.0,
            distance_from_water_surface: 0.0,
            direction_to_water_surface: Vec3::zeros(),
            is_sprinting: false,
            is_on_sticky_surface: false,
        }
    }
}

impl VolatileState {
    pub fn is_ledge_grab_blocked(&self) -> bool {
        self.ledge_grab_block_counter > 0.0
    }
}
