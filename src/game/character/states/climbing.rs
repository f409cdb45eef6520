//! Free climbing on tagged surfaces.
//!
//! The character keeps a fixed stand-off from the nearest climbable hit of its climbing capsule
//! and moves in the plane of the averaged climbable normals. Untagged geometry touched while
//! climbing acts as an obstruction only.

use crate::game::constants::animation::CLIMB_CAMERA_FACING_DOT;
use crate::game::input::PlayerInputs;
use crate::game::math::{
    forward, look_rotation, normalize_safe, project_on_plane, sharpness_factor, slerp, Quat, Vec3,
};
use crate::game::parent::ParentAttachment;
use crate::game::physics::{SurfaceTags, WorldHit};

use super::super::movement::interpolate_velocity_towards_target;
use super::super::pipeline::{Phase1, Phase2};
use super::super::{CharacterCore, StepContext};
use super::{ActiveState, CameraParameters, CameraTarget, CharacterState, CharacterStateBehavior};

/// What the climbing capsule currently touches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimbSurface {
    pub average_normal: Vec3,
    pub closest_climbable: WorldHit,
    pub closest_unclimbable: Option<WorldHit>,
}

/// Overlaps of the climbing capsule at the current pose, split by the climbable tag.
///
/// With `add_unclimbable_hits`, untagged hits become velocity projection hits for this step.
/// Returns `None` when nothing climbable is touched.
pub fn climbing_detection(
    core: &mut CharacterCore,
    ctx: &StepContext,
    add_unclimbable_hits: bool,
) -> Option<ClimbSurface> {
    let climbing = core.geometry.climbing;
    let pose = climbing.pose(&core.position, &core.rotation);
    let hits = ctx
        .world
        .distance_all(&climbing.shape(), &pose, 0.0, &core.solid_filter());

    let mut normal_sum = Vec3::zeros();
    let mut climbable_count = 0usize;
    let mut closest_climbable: Option<WorldHit> = None;
    let mut closest_unclimbable: Option<WorldHit> = None;

    for hit in hits {
        if ctx.world.surface(hit.collider).tags.contains(SurfaceTags::CLIMBABLE) {
            if closest_climbable.map_or(true, |c| hit.distance < c.distance) {
                closest_climbable = Some(hit);
            }
            normal_sum += hit.normal;
            climbable_count += 1;
        } else {
            if closest_unclimbable.map_or(true, |c| hit.distance < c.distance) {
                closest_unclimbable = Some(hit);
            }
            if add_unclimbable_hits {
                core.body.velocity_projection_hits.push(hit);
            }
        }
    }

    let closest_climbable = closest_climbable?;
    Some(ClimbSurface {
        average_normal: normalize_safe(&(normal_sum / climbable_count as f32)),
        closest_climbable,
        closest_unclimbable,
    })
}

/// Whether the character could start climbing from where it stands.
pub fn can_start_climbing(core: &mut CharacterCore, ctx: &StepContext) -> bool {
    climbing_detection(core, ctx, false).is_some()
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClimbingState {
    pub last_known_climb_normal: Vec3,
    found_valid_surface: bool,
}

impl ClimbingState {
    pub fn from_surface(surface: &ClimbSurface) -> Self {
        Self {
            last_known_climb_normal: surface.average_normal,
            found_valid_surface: true,
        }
    }

    /// Point the climbing rotation pivots around, halfway up the climbing capsule.
    fn geometry_center(core: &CharacterCore) -> Vec3 {
        core.position + core.rotation * (Vec3::y() * core.geometry.climbing.height * 0.5)
    }
}

impl CharacterStateBehavior for ClimbingState {
    fn on_enter(&mut self, _previous: CharacterState, core: &mut CharacterCore, _ctx: &StepContext) {
        core.set_capsule_geometry(core.geometry.climbing);
        core.properties.evaluate_grounding = false;
        core.properties.detect_movement_collisions = false;
        core.properties.decollide_from_overlaps = false;
        core.body.is_grounded = false;
        if self.last_known_climb_normal == Vec3::zeros() {
            self.last_known_climb_normal = -forward(&core.rotation);
        }
    }

    fn on_exit(&mut self, _next: CharacterState, core: &mut CharacterCore, ctx: &StepContext) {
        core.set_or_update_parent(ctx, None);
        core.properties.evaluate_grounding = true;
        core.properties.detect_movement_collisions = true;
        core.properties.decollide_from_overlaps = true;
    }

    fn physics_update(&mut self, core: &mut CharacterCore, ctx: &StepContext) {
        let dt = ctx.dt();
        core.physics_phase1(ctx, Phase1::PARENT_MOVEMENT);

        self.found_valid_surface = false;
        match climbing_detection(core, ctx, true) {
            Some(surface) => {
                self.found_valid_surface = true;
                self.last_known_climb_normal = surface.average_normal;
                let closest = surface.closest_climbable;

                // Hold the configured stand-off from the nearest climbable surface
                core.position += -closest.distance * closest.normal;
                core.position += (core.geometry.climbing.radius - core.params.climbing_distance_from_surface)
                    * -closest.normal;
                if let Some(unclimbable) = surface.closest_unclimbable {
                    core.position += -unclimbable.distance * unclimbable.normal;
                }

                let normal = self.last_known_climb_normal;
                let move_vector = core.control.move_vector;
                let climb_move = normalize_safe(&project_on_plane(&move_vector, &normal)) * move_vector.norm();
                interpolate_velocity_towards_target(
                    &mut core.body.relative_velocity,
                    &(climb_move * core.params.climbing_speed),
                    dt,
                    core.params.climbing_movement_sharpness,
                );
                core.body.relative_velocity = project_on_plane(&core.body.relative_velocity, &normal);

                if !core.body.velocity_projection_hits.is_empty() {
                    let hits = std::mem::take(&mut core.body.velocity_projection_hits);
                    let mut velocity = core.body.relative_velocity;
                    let direction = normalize_safe(&velocity);
                    core.project_velocity_on_hits(&mut velocity, &hits, &direction);
                    core.body.relative_velocity = velocity;
                    core.body.velocity_projection_hits = hits;
                }

                core.position += core.body.relative_velocity * dt;

                let attachment = closest.body.map(|body| ParentAttachment {
                    body,
                    entity: closest.entity,
                    anchor: closest.position,
                });
                core.set_or_update_parent(ctx, attachment);
            }
            None => core.set_or_update_parent(ctx, None),
        }

        core.physics_phase2(ctx, Phase2::PARENT_MOMENTUM);
    }

    fn variable_update(&mut self, core: &mut CharacterCore, dt: f32) {
        let center = Self::geometry_center(core);
        let normal = self.last_known_climb_normal;

        let move_vector = core.control.move_vector;
        let target_up = if move_vector.norm_squared() > 0.0 {
            normalize_safe(&project_on_plane(&move_vector, &normal))
        } else {
            core.body.grounding_up
        };
        let target = look_rotation(&-normal, &target_up);
        let smoothed = slerp(
            &core.rotation,
            &target,
            sharpness_factor(core.params.climbing_rotation_sharpness, dt),
        );

        // Rotate around the capsule's middle so the body does not swing around the feet
        let local_center = core.rotation.inverse() * (center - core.position);
        core.rotation = smoothed;
        core.position = center - smoothed * local_center;
    }

    fn detect_transitions(&mut self, core: &mut CharacterCore, _ctx: &StepContext) -> Option<ActiveState> {
        let control = core.control;
        if !self.found_valid_surface
            || control.is_jump_pressed()
            || control.is_dash_pressed()
            || control.is_climb_pressed()
        {
            return Some(ActiveState::air_move());
        }
        None
    }

    fn camera_parameters(&self, _core: &CharacterCore) -> CameraParameters {
        CameraParameters::new(CameraTarget::Climbing, true)
    }

    /// Vertical input climbs up when the camera faces the wall, and moves toward it otherwise.
    fn move_vector(&self, inputs: &PlayerInputs, camera_rotation: &Quat) -> Vec3 {
        let camera_forward = camera_rotation * Vec3::z();
        let camera_right = camera_rotation * Vec3::x();
        let camera_up = camera_rotation * Vec3::y();
        let vertical = if self.last_known_climb_normal.dot(&camera_forward) < CLIMB_CAMERA_FACING_DOT {
            camera_up
        } else {
            camera_forward
        };
        camera_right * inputs.move_axes.x + vertical * inputs.move_axes.y
    }
}
