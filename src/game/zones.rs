//! World zones that act on characters from outside their state machine: custom gravity,
//! jump pads, wind, teleporters, plus the kinematic moving platforms.
//!
//! Zone volumes are analytic shapes tested against the center of the character's active
//! capsule. Jump pads and teleporters fire once on entry; gravity and wind act every step
//! the character is inside.

use std::collections::HashSet;

use serde::Deserialize;
use tracing::debug;

use super::character::Character;
use super::constants::zones as consts;
use super::error::SimulationError;
use super::math::{forward, normalize_safe, Quat, Vec3};
use super::physics::{CollisionWorld, EntityId};

/// Analytic trigger volume.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ZoneVolume {
    Box { center: Vec3, half_extents: Vec3 },
    Sphere { center: Vec3, radius: f32 },
}

impl ZoneVolume {
    pub fn contains(&self, point: &Vec3) -> bool {
        match self {
            ZoneVolume::Box { center, half_extents } => {
                let local = point - center;
                local.x.abs() <= half_extents.x && local.y.abs() <= half_extents.y && local.z.abs() <= half_extents.z
            }
            ZoneVolume::Sphere { center, radius } => (point - center).norm_squared() <= radius * radius,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SphericalGravityZone {
    pub center: Vec3,
    pub radius: f32,
    pub gravity_strength_at_center: f32,
}

impl SphericalGravityZone {
    /// Pull toward the center, strongest at the center and fading to almost nothing at the edge.
    pub fn gravity_at(&self, point: &Vec3) -> Vec3 {
        let to_center = self.center - point;
        let ratio = if self.radius > 0.0 {
            (to_center.norm() / self.radius)
                .clamp(consts::SPHERICAL_MIN_DISTANCE_RATIO, consts::SPHERICAL_MAX_DISTANCE_RATIO)
        } else {
            consts::SPHERICAL_MAX_DISTANCE_RATIO
        };
        normalize_safe(&to_center) * self.gravity_strength_at_center * (1.0 - ratio)
    }

    fn contains(&self, point: &Vec3) -> bool {
        (point - self.center).norm_squared() < self.radius * self.radius
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct JumpPad {
    pub volume: ZoneVolume,
    /// Launch direction is this rotation's forward axis
    #[serde(default = "Quat::identity")]
    pub rotation: Quat,
    pub jump_power: f32,
    #[serde(default)]
    pub ungrounding_dot_threshold: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct WindZone {
    pub volume: ZoneVolume,
    /// Acceleration applied while inside
    pub wind_force: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Teleporter {
    pub volume: ZoneVolume,
    pub destination_position: Vec3,
    #[serde(default = "Quat::identity")]
    pub destination_rotation: Quat,
}

/// Kinematic platform animated by a sine translation, a constant spin and a sine oscillation.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct MovingPlatform {
    pub entity: EntityId,
    pub original_position: Vec3,
    pub original_rotation: Quat,
    pub translation_axis: Vec3,
    pub translation_amplitude: f32,
    pub translation_speed: f32,
    pub rotation_axis: Vec3,
    pub rotation_speed: f32,
    pub oscillation_axis: Vec3,
    pub oscillation_amplitude: f32,
    pub oscillation_speed: f32,
}

impl Default for MovingPlatform {
    fn default() -> Self {
        Self {
            entity: EntityId(0),
            original_position: Vec3::zeros(),
            original_rotation: Quat::identity(),
            translation_axis: Vec3::x(),
            translation_amplitude: 0.0,
            translation_speed: 0.0,
            rotation_axis: Vec3::y(),
            rotation_speed: 0.0,
            oscillation_axis: Vec3::x(),
            oscillation_amplitude: 0.0,
            oscillation_speed: 0.0,
        }
    }
}

impl MovingPlatform {
    pub fn target_pose(&self, time: f32) -> (Vec3, Quat) {
        let position = self.original_position
            + normalize_safe(&self.translation_axis)
                * (time * self.translation_speed).sin()
                * self.translation_amplitude;

        let spin = Quat::from_scaled_axis(normalize_safe(&self.rotation_axis) * self.rotation_speed * time);
        let oscillation = Quat::from_scaled_axis(
            normalize_safe(&self.oscillation_axis) * (time * self.oscillation_speed).sin() * self.oscillation_amplitude,
        );
        (position, spin * oscillation * self.original_rotation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TriggerKey {
    JumpPad(usize),
    Teleporter(usize),
}

/// Which one-shot trigger volumes a character was inside last step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneContacts {
    inside: HashSet<TriggerKey>,
}

impl ZoneContacts {
    /// Records this step's occupancy and returns true if `key` was just entered.
    fn enter(&mut self, key: TriggerKey, now_inside: bool, next: &mut HashSet<TriggerKey>) -> bool {
        if !now_inside {
            return false;
        }
        next.insert(key);
        !self.inside.contains(&key)
    }
}

/// Every zone of a scenario.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ZoneSet {
    /// Gravity outside every spherical zone. `None` leaves the world gravity in place.
    pub global_gravity: Option<Vec3>,
    pub spherical_gravity: Vec<SphericalGravityZone>,
    pub jump_pads: Vec<JumpPad>,
    pub wind: Vec<WindZone>,
    pub teleporters: Vec<Teleporter>,
    pub moving_platforms: Vec<MovingPlatform>,
}

impl ZoneSet {
    /// Gravity for a character at `point`. A spherical zone takes precedence over the global one.
    pub fn gravity_at(&self, point: &Vec3, multiplier: f32, fallback: &Vec3) -> Vec3 {
        let zone_gravity = self
            .spherical_gravity
            .iter()
            .rev()
            .find(|zone| zone.contains(point))
            .map(|zone| zone.gravity_at(point));
        match (zone_gravity, self.global_gravity) {
            (Some(gravity), _) | (None, Some(gravity)) => gravity * multiplier,
            (None, None) => fallback * multiplier,
        }
    }

    /// Applies gravity, jump pads, wind and teleporters to one character before its physics step.
    pub fn apply_to_character(&self, character: &mut Character, world_gravity: &Vec3, dt: f32) {
        let state = character.current_state();
        let core = &mut character.core;
        let probe = core.active_geometry.world_center(&core.position, &core.rotation);

        core.gravity = self.gravity_at(&probe, core.gravity_multiplier, world_gravity);

        let mut next_inside = HashSet::new();
        let contacts = &mut character.zone_contacts;

        for (index, pad) in self.jump_pads.iter().enumerate() {
            if !contacts.enter(TriggerKey::JumpPad(index), pad.volume.contains(&probe), &mut next_inside) {
                continue;
            }
            let jump_velocity = forward(&pad.rotation) * pad.jump_power;
            core.body.relative_velocity = jump_velocity;
            if core.body.is_grounded
                && normalize_safe(&jump_velocity).dot(&core.body.ground_normal()) > pad.ungrounding_dot_threshold
            {
                core.body.is_grounded = false;
            }
            debug!(character = %core.id, pad = index, "jump pad");
        }

        if state.can_be_affected_by_wind_zone() {
            for zone in self.wind.iter().filter(|zone| zone.volume.contains(&probe)) {
                core.body.relative_velocity += zone.wind_force * dt;
            }
        }

        for (index, teleporter) in self.teleporters.iter().enumerate() {
            if !contacts.enter(TriggerKey::Teleporter(index), teleporter.volume.contains(&probe), &mut next_inside) {
                continue;
            }
            core.position = teleporter.destination_position;
            core.rotation = teleporter.destination_rotation;
            debug!(character = %core.id, teleporter = index, "teleported");
        }

        contacts.inside = next_inside;
    }

    /// Schedules every moving platform's pose for the next world step.
    pub fn drive_platforms(&self, world: &mut CollisionWorld, time: f32) -> Result<(), SimulationError> {
        for platform in &self.moving_platforms {
            let (position, rotation) = platform.target_pose(time);
            world.set_kinematic_target(platform.entity, &position, &rotation)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_spherical_gravity_fades_toward_the_edge() {
        let zone = SphericalGravityZone {
            center: Vec3::zeros(),
            radius: 10.0,
            gravity_strength_at_center: 20.0,
        };
        let near = zone.gravity_at(&Vec3::new(0.0, 2.0, 0.0));
        assert_relative_eq!(near, Vec3::new(0.0, -16.0, 0.0), epsilon = 1.0e-4);

        let edge = zone.gravity_at(&Vec3::new(10.0, 0.0, 0.0));
        assert_relative_eq!(edge.norm(), 20.0 * 0.01, epsilon = 1.0e-4);
    }

    #[test]
    fn test_spherical_zone_overrides_global_gravity() {
        let zones = ZoneSet {
            global_gravity: Some(Vec3::new(0.0, -10.0, 0.0)),
            spherical_gravity: vec![SphericalGravityZone {
                center: Vec3::new(100.0, 0.0, 0.0),
                radius: 10.0,
                gravity_strength_at_center: 20.0,
            }],
            ..ZoneSet::default()
        };
        let fallback = Vec3::new(0.0, -30.0, 0.0);

        let outside = zones.gravity_at(&Vec3::zeros(), 2.0, &fallback);
        assert_relative_eq!(outside, Vec3::new(0.0, -20.0, 0.0));

        let inside = zones.gravity_at(&Vec3::new(95.0, 0.0, 0.0), 1.0, &fallback);
        assert!(inside.x > 0.0);

        let bare = ZoneSet::default();
        assert_relative_eq!(bare.gravity_at(&Vec3::zeros(), 1.0, &fallback), fallback);
    }

    #[test]
    fn test_box_volume_containment() {
        let volume = ZoneVolume::Box {
            center: Vec3::new(0.0, 1.0, 0.0),
            half_extents: Vec3::new(1.0, 1.0, 1.0),
        };
        assert!(volume.contains(&Vec3::new(0.5, 1.5, -0.5)));
        assert!(!volume.contains(&Vec3::new(0.0, 2.5, 0.0)));
    }

    #[test]
    fn test_platform_pose_follows_sine_translation() {
        let platform = MovingPlatform {
            original_position: Vec3::new(0.0, 1.0, 0.0),
            translation_axis: Vec3::new(2.0, 0.0, 0.0),
            translation_amplitude: 3.0,
            translation_speed: 1.0,
            ..MovingPlatform::default()
        };
        let (position, rotation) = platform.target_pose(std::f32::consts::FRAC_PI_2);
        assert_relative_eq!(position, Vec3::new(3.0, 1.0, 0.0), epsilon = 1.0e-5);
        assert_relative_eq!(rotation.angle(), 0.0, epsilon = 1.0e-5);
    }
}
