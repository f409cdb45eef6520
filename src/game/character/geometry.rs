use rapier3d::parry::shape::Capsule;
use rapier3d::prelude::{Isometry, SharedShape};
use serde::Deserialize;

use crate::game::constants::geometry as consts;
use crate::game::math::{Quat, Vec3};

/// A capsule preset in the character's local frame. `center` is measured from the feet.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CapsuleGeometry {
    pub radius: f32,
    pub height: f32,
    pub center: Vec3,
}

impl CapsuleGeometry {
    pub fn from_preset(preset: (f32, f32, f32)) -> Self {
        Self {
            radius: preset.0,
            height: preset.1,
            center: Vec3::new(0.0, preset.2, 0.0),
        }
    }

    /// Height clamped so the capsule never degenerates below a sphere.
    pub fn effective_height(&self) -> f32 {
        self.height.max((self.radius + consts::CAPSULE_HEIGHT_EPSILON) * 2.0)
    }

    /// Half length of the capsule's inner segment.
    pub fn half_segment(&self) -> f32 {
        self.effective_height() * 0.5 - self.radius
    }

    pub fn shape(&self) -> Capsule {
        Capsule::new_y(self.half_segment(), self.radius)
    }

    pub fn shared_shape(&self) -> SharedShape {
        SharedShape::capsule_y(self.half_segment(), self.radius)
    }

    /// World pose of the capsule for a character standing at `position` with `rotation`.
    pub fn pose(&self, position: &Vec3, rotation: &Quat) -> Isometry<f32> {
        Isometry::from_parts((position + rotation * self.center).into(), *rotation)
    }

    /// Offset of the collider relative to the character's body origin.
    pub fn local_pose(&self) -> Isometry<f32> {
        Isometry::translation(self.center.x, self.center.y, self.center.z)
    }

    pub fn world_center(&self, position: &Vec3, rotation: &Quat) -> Vec3 {
        position + rotation * self.center
    }
}

/// The five named presets a character swaps between.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CharacterGeometry {
    pub standing: CapsuleGeometry,
    pub crouching: CapsuleGeometry,
    pub rolling: CapsuleGeometry,
    pub climbing: CapsuleGeometry,
    pub swimming: CapsuleGeometry,
}

impl Default for CharacterGeometry {
    fn default() -> Self {
        Self {
            standing: CapsuleGeometry::from_preset(consts::STANDING),
            crouching: CapsuleGeometry::from_preset(consts::CROUCHING),
            rolling: CapsuleGeometry::from_preset(consts::ROLLING),
            climbing: CapsuleGeometry::from_preset(consts::CLIMBING),
            swimming: CapsuleGeometry::from_preset(consts::SWIMMING),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_height_is_clamped_to_sphere() {
        let g = CapsuleGeometry {
            radius: 0.5,
            height: 0.2,
            center: Vec3::zeros(),
        };
        assert!(g.effective_height() >= 1.0);
        assert!(g.half_segment() >= 0.0);
    }

    #[test]
    fn test_pose_follows_rotation() {
        let g = CharacterGeometry::default().standing;
        let rot = Quat::from_axis_angle(&Vec3::z_axis(), std::f32::consts::FRAC_PI_2);
        let pose = g.pose(&Vec3::zeros(), &rot);
        assert_relative_eq!(pose.translation.vector, Vec3::new(-0.7, 0.0, 0.0), epsilon = 1.0e-5);
    }
}
