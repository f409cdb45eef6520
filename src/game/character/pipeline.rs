//! Shared physics steps every state composes its update from.
//!
//! Phase 1 prepares the step (reset, parent movement, grounding). The state then builds its
//! velocity, and phase 2 moves the capsule and resolves what the move ran into.

use bitflags::bitflags;
use rapier3d::control::{CharacterAutostep, CharacterLength, KinematicCharacterController};
use tracing::trace;

use crate::game::constants::physics::{
    COLLISION_OFFSET, DECOLLISION_ITERATIONS, EPSILON, MAX_CLIP_PLANES,
};
use crate::game::math::{
    is_walkable, normalize_safe, project_on_plane, reorient_on_plane, unit_or, up, Quat, Vec3,
};
use crate::game::parent::ParentAttachment;
use crate::game::physics::WorldHit;

use super::{CharacterCore, StepContext};

bitflags! {
    /// Optional steps of phase 1. Initialization always runs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Phase1: u8 {
        const PARENT_MOVEMENT = 1 << 0;
        const GROUNDING = 1 << 1;
    }
}

bitflags! {
    /// Optional steps of phase 2. Hit bookkeeping always runs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Phase2: u8 {
        const PREVENT_GROUNDING_FROM_FUTURE_SLOPE_CHANGE = 1 << 0;
        const GROUND_PUSHING = 1 << 1;
        const MOVEMENT_AND_DECOLLISION = 1 << 2;
        const MOVING_PLATFORM_DETECTION = 1 << 3;
        const PARENT_MOMENTUM = 1 << 4;
    }
}

/// Translation that resolves every `(normal, depth)` overlap, solved Gauss-Seidel style.
pub fn depenetration_offset(overlaps: &[(Vec3, f32)], iterations: usize, tolerance: f32) -> Vec3 {
    let mut fixup = Vec3::zeros();
    for _ in 0..iterations {
        let mut total_error = 0.0;
        for (normal, depth) in overlaps {
            let error = (depth - fixup.dot(normal)).max(0.0);
            total_error += error;
            fixup += normal * error;
        }
        if total_error < tolerance {
            break;
        }
    }
    fixup
}

impl CharacterCore {
    pub fn physics_phase1(&mut self, ctx: &StepContext, steps: Phase1) {
        self.initialize_step(ctx);
        if steps.contains(Phase1::PARENT_MOVEMENT) {
            self.apply_parent_movement(ctx);
        }
        if steps.contains(Phase1::GROUNDING) {
            self.update_grounding(ctx);
        }
    }

    pub fn physics_phase2(&mut self, ctx: &StepContext, steps: Phase2) {
        if steps.contains(Phase2::PREVENT_GROUNDING_FROM_FUTURE_SLOPE_CHANGE) {
            self.prevent_grounding_from_future_slope_change(ctx);
        }
        if steps.contains(Phase2::GROUND_PUSHING) {
            self.push_ground(ctx);
        }
        if steps.contains(Phase2::MOVEMENT_AND_DECOLLISION) {
            self.move_and_decollide(ctx);
        }
        if steps.contains(Phase2::MOVING_PLATFORM_DETECTION) {
            self.detect_moving_platform(ctx);
        }
        if steps.contains(Phase2::PARENT_MOMENTUM) {
            self.apply_parent_momentum(ctx);
        }
        self.hits.finalize();
    }

    fn initialize_step(&mut self, ctx: &StepContext) {
        self.hits.begin_step();
        self.body.velocity_projection_hits.clear();

        // A parent whose body was removed reads as detached.
        if let Some(parent) = self.body.parent {
            if ctx.world.rigid_body_set.get(parent.body).is_none() {
                trace!(character = %self.id, "parent body no longer exists");
                self.set_or_update_parent(ctx, None);
            }
        }

        self.body.was_grounded_before_update = self.body.is_grounded;
        self.body.previous_parent = self.body.parent;
        self.body.rotation_from_parent = Quat::identity();
        self.body.parent_velocity = Vec3::zeros();
        self.body.is_grounded = false;
        self.body.ground_hit = None;
        self.body.last_physics_dt = ctx.dt();
        self.body.grounding_up = up(&self.rotation);
    }

    /// Carries the character along with its parent's displacement since the last step.
    fn apply_parent_movement(&mut self, ctx: &StepContext) {
        let Some(parent) = self.body.parent else {
            return;
        };
        let Some(tracked) = ctx.world.tracked_transform(parent.body) else {
            return;
        };
        let delta = tracked.delta();
        let dt = ctx.dt();

        self.body.parent_velocity = tracked.point_velocity(&self.position, dt);
        self.position = (delta * nalgebra::Point3::from(self.position)).coords;
        self.body.rotation_from_parent = delta.rotation;
        self.rotation = delta.rotation * self.rotation;
        self.body.grounding_up = up(&self.rotation);

        let anchor = (delta * nalgebra::Point3::from(parent.anchor)).coords;
        self.set_or_update_parent(ctx, Some(ParentAttachment { anchor, ..parent }));
    }

    /// Closest walkable hit under the capsule within `distance`.
    pub fn detect_ground(&self, ctx: &StepContext, distance: f32) -> Option<WorldHit> {
        let shape = self.active_geometry.shape();
        let pose = self.capsule_pose();
        ctx.world
            .cast_shape_all(&shape, &pose, &-self.body.grounding_up, distance, &self.solid_filter())
            .into_iter()
            .find(|hit| self.is_grounded_on_hit(ctx, hit))
    }

    fn update_grounding(&mut self, ctx: &StepContext) {
        if !self.properties.evaluate_grounding {
            return;
        }
        // Airborne and moving away from the ground: launched, not landing
        if !self.body.was_grounded_before_update && self.body.relative_velocity.dot(&self.body.grounding_up) > 0.0 {
            return;
        }
        let snapping = self.properties.snap_to_ground && self.body.was_grounded_before_update;
        let distance = if snapping {
            self.properties.ground_snapping_distance.max(COLLISION_OFFSET * 3.0)
        } else {
            COLLISION_OFFSET * 3.0
        };

        let Some(hit) = self.detect_ground(ctx, distance) else {
            return;
        };
        self.body.is_grounded = true;
        self.body.ground_hit = Some(hit);
        self.hits.record(&hit);

        if self.properties.snap_to_ground && hit.distance > COLLISION_OFFSET {
            self.position -= self.body.grounding_up * (hit.distance - COLLISION_OFFSET);
        }
    }

    /// Whether a hit can be stood on: walkable slope, or the edge of a step low enough to climb.
    pub fn is_grounded_on_hit(&self, ctx: &StepContext, hit: &WorldHit) -> bool {
        if !ctx.world.surface(hit.collider).collidable {
            return false;
        }
        let up = self.body.grounding_up;
        let max_slope = self.properties.max_grounded_slope_radians();
        if is_walkable(&hit.normal, &up, max_slope) {
            return true;
        }
        self.step_and_slope.step_handling && self.is_grounded_on_step(ctx, hit, max_slope)
    }

    /// A non-walkable hit within the character's footprint counts as a step edge when a probe
    /// just past it finds a walkable top no higher than the max step height.
    fn is_grounded_on_step(&self, ctx: &StepContext, hit: &WorldHit, max_slope: f32) -> bool {
        let up = self.body.grounding_up;
        let settings = &self.step_and_slope;
        let offset = hit.position - self.position;
        let height = offset.dot(&up);
        if height < -COLLISION_OFFSET || height > settings.max_step_height {
            return false;
        }
        let lateral = project_on_plane(&offset, &up);
        if lateral.norm() > settings.character_width_for_step_grounding_check * 0.5 {
            return false;
        }
        let outward = normalize_safe(&lateral);
        if outward == Vec3::zeros() {
            return false;
        }

        let probe_height = settings.max_step_height + COLLISION_OFFSET;
        let origin = self.position + outward * (lateral.norm() + settings.extra_steps_check_distance)
            + up * probe_height;
        ctx.world
            .cast_ray(&origin, &-up, probe_height, &self.solid_filter())
            .is_some_and(|top| top.distance > 0.0 && is_walkable(&top.normal, &up, max_slope))
    }

    /// Ungrounds a character about to walk onto a surface it could not stand on.
    fn prevent_grounding_from_future_slope_change(&mut self, ctx: &StepContext) {
        if !self.body.is_grounded {
            return;
        }
        let settings = self.step_and_slope;
        if !settings.prevent_grounding_when_moving_towards_no_grounding
            && !settings.has_max_downward_slope_change_angle
        {
            return;
        }
        let up = self.body.grounding_up;
        let planar = project_on_plane(&self.body.relative_velocity, &up);
        let speed = planar.norm();
        if speed < EPSILON {
            return;
        }
        let direction = planar / speed;
        let look_ahead = speed * ctx.dt() + settings.extra_steps_check_distance + self.active_geometry.radius;
        let origin = self.position + direction * look_ahead + up * settings.max_step_height;
        let probe_length = settings.max_step_height * 2.0 + self.properties.ground_snapping_distance;

        let max_slope = self.properties.max_grounded_slope_radians();
        let ground_normal = self.body.ground_normal();
        let ungrounds = match ctx.world.cast_ray(&origin, &-up, probe_length, &self.solid_filter()) {
            None => settings.prevent_grounding_when_moving_towards_no_grounding,
            Some(future) => {
                let not_walkable = settings.prevent_grounding_when_moving_towards_no_grounding
                    && !is_walkable(&future.normal, &up, max_slope);
                let slope_drop = settings.has_max_downward_slope_change_angle
                    && future.normal.dot(&direction) > ground_normal.dot(&direction)
                    && ground_normal.angle(&future.normal).to_degrees()
                        > settings.max_downward_slope_change_angle;
                not_walkable || slope_drop
            }
        };
        if ungrounds {
            self.body.is_grounded = false;
            self.body.ground_hit = None;
        }
    }

    /// Weight of the character pressing on a dynamic ground body, applied in the sync phase.
    fn push_ground(&mut self, ctx: &StepContext) {
        if !self.body.is_grounded || !self.properties.simulate_dynamic_body {
            return;
        }
        let Some(hit) = self.body.ground_hit else {
            return;
        };
        let Some(ground_body) = hit.body.filter(|b| ctx.world.is_dynamic(Some(*b))) else {
            return;
        };
        let impulse = self.gravity * self.properties.mass * ctx.dt();
        self.queue_impulse(ground_body, impulse, hit.position);
    }

    pub fn character_controller(&self) -> KinematicCharacterController {
        let max_slope = self.properties.max_grounded_slope_radians();
        let autostep = self.step_and_slope.step_handling.then(|| CharacterAutostep {
            max_height: CharacterLength::Absolute(self.step_and_slope.max_step_height),
            min_width: CharacterLength::Absolute(self.active_geometry.radius),
            include_dynamic_bodies: self.properties.simulate_dynamic_body,
        });
        KinematicCharacterController {
            up: unit_or(&self.body.grounding_up, Vec3::y()),
            offset: CharacterLength::Absolute(COLLISION_OFFSET),
            autostep,
            max_slope_climb_angle: max_slope,
            min_slope_slide_angle: max_slope,
            snap_to_ground: None,
            ..Default::default()
        }
    }

    fn move_and_decollide(&mut self, ctx: &StepContext) {
        let dt = ctx.dt();
        let original_velocity = self.body.relative_velocity;
        let original_direction = normalize_safe(&original_velocity);
        let desired = original_velocity * dt;

        if !self.properties.detect_movement_collisions {
            self.position += desired;
            return;
        }

        let shape = self.active_geometry.shape();
        let filter = self.solid_filter();
        let controller = self.character_controller();
        let movement = ctx
            .world
            .move_shape(&controller, &shape, &self.capsule_pose(), &desired, &filter, dt);
        self.position += movement.translation;

        // Contacts after the move drive landing and velocity projection.
        let contacts = ctx
            .world
            .distance_all(&shape, &self.capsule_pose(), COLLISION_OFFSET * 2.0, &filter);
        for hit in &contacts {
            self.hits.record(hit);
            let into_hit = original_velocity.dot(&hit.normal);
            if !self.body.is_grounded
                && self.properties.evaluate_grounding
                && into_hit <= 0.0
                && self.is_grounded_on_hit(ctx, hit)
            {
                self.body.is_grounded = true;
                self.body.ground_hit = Some(*hit);
            }
            if into_hit < 0.0 {
                self.body.velocity_projection_hits.push(*hit);
            }
        }

        let hits = std::mem::take(&mut self.body.velocity_projection_hits);
        let mut velocity = self.body.relative_velocity;
        self.project_velocity_on_hits(&mut velocity, &hits, &original_direction);
        self.body.relative_velocity = velocity;
        self.body.velocity_projection_hits = hits;

        if self.properties.decollide_from_overlaps {
            self.decollide(ctx);
        }
    }

    fn decollide(&mut self, ctx: &StepContext) {
        let shape = self.active_geometry.shape();
        let overlaps: Vec<WorldHit> = ctx
            .world
            .distance_all(&shape, &self.capsule_pose(), 0.0, &self.solid_filter())
            .into_iter()
            .filter(|hit| hit.distance < 0.0)
            .collect();
        if overlaps.is_empty() {
            return;
        }

        let planes: Vec<(Vec3, f32)> = overlaps.iter().map(|h| (h.normal, -h.distance)).collect();
        self.position += depenetration_offset(&planes, DECOLLISION_ITERATIONS, EPSILON);

        for hit in &overlaps {
            let velocity = self.body.relative_velocity;
            if velocity.dot(&hit.normal) < 0.0 {
                self.body.relative_velocity = project_on_plane(&velocity, &hit.normal);
            }
            if !self.body.is_grounded
                && self.properties.evaluate_grounding
                && self.is_grounded_on_hit(ctx, hit)
            {
                self.body.is_grounded = true;
                self.body.ground_hit = Some(*hit);
            }
        }
    }

    /// Removes velocity going into `hits`. Grounded characters keep their speed along walkable
    /// surfaces, and obstructions only deflect them within the ground plane.
    pub fn project_velocity_on_hits(&self, velocity: &mut Vec3, hits: &[WorldHit], original_direction: &Vec3) {
        let up = self.body.grounding_up;
        let max_slope = self.properties.max_grounded_slope_radians();
        let grounded_before = self.body.was_grounded_before_update && self.body.is_grounded;
        let constrain_to_ground =
            self.step_and_slope.constrain_velocity_to_ground_plane && self.body.is_grounded;
        let ground_normal = self.body.ground_normal();

        let mut planes: Vec<Vec3> = Vec::with_capacity(MAX_CLIP_PLANES);
        for hit in hits.iter().take(MAX_CLIP_PLANES) {
            let walkable = is_walkable(&hit.normal, &up, max_slope);
            let mut normal = hit.normal;
            if !walkable && constrain_to_ground {
                normal = normalize_safe(&project_on_plane(&normal, &ground_normal));
                if normal == Vec3::zeros() {
                    continue;
                }
            }
            if velocity.dot(&normal) >= 0.0 {
                planes.push(normal);
                continue;
            }

            *velocity = if walkable && grounded_before {
                reorient_on_plane(velocity, &normal, &up)
            } else {
                project_on_plane(velocity, &normal)
            };

            if let Some(previous) = planes.iter().find(|p| velocity.dot(p) < -EPSILON) {
                // Crease between two planes
                let crease = normalize_safe(&normal.cross(previous));
                *velocity = crease * velocity.dot(&crease);
                if planes.iter().any(|p| velocity.dot(p) < -EPSILON) {
                    *velocity = Vec3::zeros();
                    return;
                }
            }
            planes.push(normal);
        }

        if velocity.dot(original_direction) < -EPSILON {
            *velocity = Vec3::zeros();
        }
    }

    /// Attaches to the kinematic body the character stands on, or detaches.
    fn detect_moving_platform(&mut self, ctx: &StepContext) {
        let attachment = self
            .body
            .ground_hit
            .filter(|_| self.body.is_grounded)
            .and_then(|hit| {
                let body = hit.body?;
                ctx.world.tracked_transform(body)?;
                Some(ParentAttachment { body, entity: hit.entity, anchor: hit.position })
            });
        if attachment.is_some() || self.body.parent.is_some() {
            self.set_or_update_parent(ctx, attachment);
        }
    }

    /// Converts between parent-relative velocities when the parent changed this step.
    fn apply_parent_momentum(&mut self, ctx: &StepContext) {
        if !self.body.parent_changed() {
            return;
        }
        if self.body.previous_parent.is_some() {
            self.body.relative_velocity += self.body.parent_velocity;
        }
        self.body.parent_velocity = match self.body.parent {
            Some(parent) => ctx.world.point_velocity(parent.body, &self.position, ctx.dt()),
            None => Vec3::zeros(),
        };
        self.body.relative_velocity -= self.body.parent_velocity;
    }

    /// True when the standing capsule fits at the current pose.
    pub fn can_stand_up(&self, ctx: &StepContext) -> bool {
        let standing = self.geometry.standing;
        let pose = standing.pose(&self.position, &self.rotation);
        ctx.world
            .distance_closest(&standing.shape(), &pose, 0.0, &self.solid_filter())
            .is_none()
    }

    /// First hit along `movement` that the character could not stand on, if any.
    pub fn movement_would_hit_non_grounded_obstruction(
        &self,
        ctx: &StepContext,
        movement: &Vec3,
    ) -> Option<WorldHit> {
        let length = movement.norm();
        if length <= EPSILON {
            return None;
        }
        let shape = self.active_geometry.shape();
        ctx.world
            .cast_shape_all(&shape, &self.capsule_pose(), movement, length, &self.solid_filter())
            .into_iter()
            .find(|hit| hit.normal.dot(movement) < 0.0 && !self.is_grounded_on_hit(ctx, hit))
    }
}
