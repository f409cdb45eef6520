//! Simulation and character motion constants.
//! Values that several states share live here so they are not duplicated as literals.

/// Physics constants
pub mod physics {
    /// Default gravity magnitude in m/s² (applied along -Y unless a zone overrides it)
    pub const DEFAULT_GRAVITY: f32 = 30.0;

    /// Fixed timestep for physics simulation (60 Hz)
    pub const TIMESTEP: f32 = 1.0 / 60.0;

    /// Skin distance kept between the character capsule and the world
    pub const COLLISION_OFFSET: f32 = 0.02;

    /// Decollision passes run after the move-and-slide solve
    pub const DECOLLISION_ITERATIONS: usize = 3;

    /// Maximum simultaneous planes considered when projecting velocity on hits
    pub const MAX_CLIP_PLANES: usize = 5;

    /// Small epsilon for float comparisons
    pub const EPSILON: f32 = 0.001;

    /// Dot-product tolerance for "same direction" checks
    pub const DOT_SIMILARITY_EPSILON: f32 = 1.0e-5;
}

/// Character capsule presets as (radius, height, center height)
pub mod geometry {
    pub const STANDING: (f32, f32, f32) = (0.3, 1.4, 0.7);
    pub const CROUCHING: (f32, f32, f32) = (0.3, 0.9, 0.45);
    pub const ROLLING: (f32, f32, f32) = (0.3, 0.6, 0.3);
    /// Also the climb surface probe, so its radius sets the detection range
    pub const CLIMBING: (f32, f32, f32) = (1.0, 2.0, 0.7);
    pub const SWIMMING: (f32, f32, f32) = (0.3, 1.4, 0.7);

    /// Minimum margin added to the radius when clamping capsule height
    pub const CAPSULE_HEIGHT_EPSILON: f32 = 1.0e-4;
}

/// Ledge grab tuning that is not exposed as a tunable
pub mod ledge {
    /// Distance kept from the wall and the ledge top while hanging
    pub const COLLISION_OFFSET: f32 = 0.02;

    /// Extra length on downward probes so a surface exactly at probe depth still hits
    pub const PROBING_TOLERANCE: f32 = 0.04;

    /// Seconds during which a released ledge cannot be grabbed again
    pub const GRAB_COOLDOWN: f32 = 0.3;
}

/// Swimming tuning that is not exposed as a tunable
pub mod swimming {
    /// Jumping out is allowed once the detection point is at least this close to the surface
    pub const DISTANCE_FROM_SURFACE_TO_ALLOW_JUMPING: f32 = -0.05;

    /// Target depth the character is held at when trying to swim out of the water
    pub const FORCED_DISTANCE_FROM_SURFACE: f32 = 0.01;

    /// Strength of the automatic pull toward the surface
    pub const SURFACE_NUDGE: f32 = 0.1;
}

/// Thresholds used by variable-rate updates and animation selection
pub mod animation {
    /// Move input below this length counts as idle
    pub const IDLE_MOVE_INPUT: f32 = 0.01;

    /// Swimming velocity ratio below which the idle clip plays
    pub const SWIMMING_IDLE_VELOCITY_RATIO: f32 = 0.1;

    /// Lowest animation speed multiplier a load can produce
    pub const MIN_ANIMATION_SPEED: f32 = 0.1;

    /// Climbing move vector switches to the camera-up axis below this facing dot
    pub const CLIMB_CAMERA_FACING_DOT: f32 = -0.05;
}

/// Gravity zone tuning
pub mod zones {
    /// Spherical gravity distance ratio is clamped to this range
    pub const SPHERICAL_MIN_DISTANCE_RATIO: f32 = 0.01;
    pub const SPHERICAL_MAX_DISTANCE_RATIO: f32 = 0.99;
}
