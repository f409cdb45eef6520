//! Hanging from a ledge, and climbing up onto it.
//!
//! A ledge is found with three probes: a forward capsule cast against the wall, a downward ray
//! (center, then right, then left) onto the ledge top, and a downward capsule cast from just
//! above that top to check that the character would fit there.

use crate::game::constants::ledge::{COLLISION_OFFSET, GRAB_COOLDOWN, PROBING_TOLERANCE};
use crate::game::math::{
    forward, look_rotation, normalize_safe, project_on_plane, right, sharpness_factor, slerp, Quat, Vec3,
};
use crate::game::parent::ParentAttachment;
use crate::game::physics::WorldHit;

use super::super::pipeline::{Phase1, Phase2};
use super::super::{CharacterCore, StepContext};
use super::{ActiveState, CharacterState, CharacterStateBehavior};

/// Result of probing for a ledge at a given pose.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LedgeProbe {
    /// A wall was hit, the character is not overlapping anything and a static ledge top was found
    pub is_valid: bool,
    pub forward_hit: Option<WorldHit>,
    pub forward_hit_distance: f32,
    /// Hit of the fit check on the ledge top
    pub surface_hit: Option<WorldHit>,
    pub is_obstructed_at_surface: bool,
    pub is_obstructed_at_current_position: bool,
    /// How far up the character must move to bring its detection point level with the ledge
    pub up_offset_to_ledge_level: f32,
    pub translation_at_ledge_surface: Vec3,
    pub would_be_grounded_on_surface: bool,
}

impl LedgeProbe {
    pub fn is_grabbable(&self) -> bool {
        self.is_valid && !self.is_obstructed_at_surface
    }
}

/// Probes for a ledge as if the character stood at `position` with `rotation`.
pub fn ledge_detection(core: &CharacterCore, ctx: &StepContext, position: &Vec3, rotation: &Quat) -> LedgeProbe {
    let mut probe = LedgeProbe {
        forward_hit_distance: -1.0,
        up_offset_to_ledge_level: -1.0,
        ..Default::default()
    };
    let params = &core.params;
    let up = core.body.grounding_up;
    let filter = core.solid_filter();
    let shape = core.active_geometry.shape();
    let character_forward = forward(rotation);
    let character_right = right(rotation);

    let detection_point = position + rotation * params.local_ledge_detection_point;
    let forward_depth = (detection_point - position).dot(&character_forward).abs();

    // Wall in front
    let pose = core.active_geometry.pose(position, rotation);
    let Some(forward_hit) = ctx
        .world
        .cast_shape(&shape, &pose, &character_forward, forward_depth, &filter)
    else {
        return probe;
    };
    probe.forward_hit = Some(forward_hit);
    probe.forward_hit_distance = forward_hit.distance;
    probe.is_obstructed_at_current_position = ctx
        .world
        .distance_closest(&shape, &pose, 0.0, &filter)
        .is_some_and(|hit| hit.distance <= 0.0);
    if probe.is_obstructed_at_current_position {
        return probe;
    }

    // Ledge top, probed at the detection point then on either side of it
    let ray_start = detection_point + up * params.ledge_surface_probing_height;
    let ray_length = params.ledge_surface_probing_height + PROBING_TOLERANCE;
    let side = character_right * params.ledge_side_probing_length;
    let Some(surface_ray_hit) = [ray_start, ray_start + side, ray_start - side]
        .iter()
        .find_map(|start| {
            ctx.world
                .cast_ray(start, &-up, ray_length, &filter)
                .filter(|hit| hit.fraction > 0.0)
        })
    else {
        return probe;
    };
    if ctx.world.is_dynamic(surface_ray_hit.body) {
        return probe;
    }
    probe.is_valid = true;
    probe.up_offset_to_ledge_level = ray_length - surface_ray_hit.distance;

    // Would the character fit on top
    let fit_start = surface_ray_hit.position + up * params.ledge_surface_obstruction_probing_height;
    let fit_length = params.ledge_surface_obstruction_probing_height + PROBING_TOLERANCE;
    let fit_pose = core.active_geometry.pose(&fit_start, rotation);
    let Some(surface_hit) = ctx.world.cast_shape(&shape, &fit_pose, &-up, fit_length, &filter) else {
        return probe;
    };
    probe.surface_hit = Some(surface_hit);
    if surface_hit.fraction <= 0.0 {
        probe.is_obstructed_at_surface = true;
        return probe;
    }
    probe.translation_at_ledge_surface = fit_start - up * surface_hit.distance;
    probe.would_be_grounded_on_surface = core.is_grounded_on_hit(ctx, &surface_hit);
    probe
}

/// A grabbable ledge at the character's current pose, unless grabbing is on cooldown.
pub fn can_grab_ledge(core: &CharacterCore, ctx: &StepContext) -> Option<LedgeProbe> {
    if core.volatile.is_ledge_grab_blocked() {
        return None;
    }
    let probe = ledge_detection(core, ctx, &core.position, &core.rotation);
    probe.is_grabbable().then_some(probe)
}

fn attachment_to(hit: &WorldHit) -> Option<ParentAttachment> {
    hit.body.map(|body| ParentAttachment {
        body,
        entity: hit.entity,
        anchor: hit.position,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LedgeGrabState {
    detected_must_exit: bool,
    forward_hit_normal: Vec3,
    initial_parent: Option<ParentAttachment>,
}

impl LedgeGrabState {
    /// Grab that starts attached to the body owning the ledge.
    pub fn attached_to(parent: Option<ParentAttachment>) -> Self {
        Self {
            initial_parent: parent,
            ..Default::default()
        }
    }

    /// Grab from the probe that found the ledge.
    pub fn from_probe(probe: &LedgeProbe) -> Self {
        Self::attached_to(probe.surface_hit.as_ref().and_then(attachment_to))
    }
}

impl CharacterStateBehavior for LedgeGrabState {
    fn on_enter(&mut self, _previous: CharacterState, core: &mut CharacterCore, ctx: &StepContext) {
        core.set_capsule_geometry(core.geometry.standing);
        core.properties.evaluate_grounding = false;
        core.properties.detect_movement_collisions = false;
        core.properties.decollide_from_overlaps = false;
        core.body.relative_velocity = Vec3::zeros();
        core.body.is_grounded = false;
        if self.initial_parent.is_some() {
            core.set_or_update_parent(ctx, self.initial_parent);
        }
    }

    fn on_exit(&mut self, next: CharacterState, core: &mut CharacterCore, ctx: &StepContext) {
        // Standing up keeps collisions off and the ledge as parent until it completes
        if next != CharacterState::LedgeStandingUp {
            core.properties.evaluate_grounding = true;
            core.properties.detect_movement_collisions = true;
            core.properties.decollide_from_overlaps = true;
            core.set_or_update_parent(ctx, None);
        }
        core.body.relative_velocity = Vec3::zeros();
    }

    fn physics_update(&mut self, core: &mut CharacterCore, ctx: &StepContext) {
        let dt = ctx.dt();
        core.physics_phase1(ctx, Phase1::PARENT_MOVEMENT);

        self.detected_must_exit = false;
        core.body.relative_velocity = Vec3::zeros();

        let probe = ledge_detection(core, ctx, &core.position, &core.rotation);
        match probe.forward_hit.filter(|_| probe.is_grabbable()) {
            Some(forward_hit) => {
                self.forward_hit_normal = forward_hit.normal;
                let up = core.body.grounding_up;

                // Snap onto the wall and level with the ledge
                core.position += forward(&core.rotation) * (probe.forward_hit_distance - COLLISION_OFFSET);
                core.position += up * (probe.up_offset_to_ledge_level - COLLISION_OFFSET);

                let move_vector = core.control.move_vector;
                if move_vector.norm_squared() > 0.0 {
                    let surface_normal = probe.surface_hit.map_or(up, |hit| hit.normal);
                    let ledge_direction = normalize_safe(&surface_normal.cross(&forward_hit.normal));
                    let move_along_ledge = ledge_direction * move_vector.dot(&ledge_direction);
                    let velocity = move_along_ledge * core.params.ledge_move_speed;

                    // Only shuffle sideways if the ledge continues there
                    let target = core.position + velocity * dt;
                    if ledge_detection(core, ctx, &target, &core.rotation).is_grabbable() {
                        core.body.relative_velocity = velocity;
                        core.position += velocity * dt;
                    }
                }

                core.set_or_update_parent(ctx, attachment_to(&forward_hit));
            }
            None => self.detected_must_exit = true,
        }

        if core.control.is_crouch_pressed() || core.control.is_dash_pressed() {
            core.volatile.ledge_grab_block_counter = GRAB_COOLDOWN;
        }

        core.physics_phase2(ctx, Phase2::PARENT_MOMENTUM);
    }

    fn variable_update(&mut self, core: &mut CharacterCore, dt: f32) {
        let up = core.body.grounding_up;
        let facing = normalize_safe(&project_on_plane(&-self.forward_hit_normal, &up));
        if facing == Vec3::zeros() {
            return;
        }
        let target = look_rotation(&facing, &up);
        core.rotation = slerp(
            &core.rotation,
            &target,
            sharpness_factor(core.params.ledge_rotation_sharpness, dt),
        );
    }

    fn detect_transitions(&mut self, core: &mut CharacterCore, ctx: &StepContext) -> Option<ActiveState> {
        if core.volatile.is_ledge_grab_blocked() || self.detected_must_exit {
            return Some(ActiveState::air_move());
        }
        if core.control.is_jump_pressed() {
            let probe = ledge_detection(core, ctx, &core.position, &core.rotation);
            if probe.is_grabbable() && probe.would_be_grounded_on_surface {
                if let Some(surface_hit) = probe.surface_hit {
                    return Some(ActiveState::LedgeStandingUp(LedgeStandingUpState::new(
                        surface_hit.position,
                    )));
                }
            }
            // Nowhere to stand on top: let go
            return Some(ActiveState::air_move());
        }
        None
    }
}

/// Scripted climb from the hanging pose onto the ledge top.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LedgeStandingUpState {
    pub standing_point: Vec3,
    start_position: Vec3,
    elapsed: f32,
    finished: bool,
}

impl LedgeStandingUpState {
    pub fn new(standing_point: Vec3) -> Self {
        Self {
            standing_point,
            ..Default::default()
        }
    }

    pub fn progress(&self, duration: f32) -> f32 {
        if duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / duration).min(1.0)
        }
    }
}

impl CharacterStateBehavior for LedgeStandingUpState {
    fn on_enter(&mut self, _previous: CharacterState, core: &mut CharacterCore, _ctx: &StepContext) {
        core.set_capsule_geometry(core.geometry.standing);
        core.properties.evaluate_grounding = false;
        core.properties.detect_movement_collisions = false;
        core.properties.decollide_from_overlaps = false;
        core.body.relative_velocity = Vec3::zeros();
        core.body.is_grounded = false;
        self.start_position = core.position;
        self.elapsed = 0.0;
        self.finished = false;
    }

    fn on_exit(&mut self, _next: CharacterState, core: &mut CharacterCore, ctx: &StepContext) {
        core.properties.evaluate_grounding = true;
        core.properties.detect_movement_collisions = true;
        core.properties.decollide_from_overlaps = true;
        core.set_or_update_parent(ctx, None);
        core.body.relative_velocity = Vec3::zeros();
    }

    fn physics_update(&mut self, core: &mut CharacterCore, ctx: &StepContext) {
        let dt = ctx.dt();
        core.physics_phase1(ctx, Phase1::PARENT_MOVEMENT);

        // The ledge may be moving: carry both ends of the path along with it
        if let Some(tracked) = core.body.parent.and_then(|p| ctx.world.tracked_transform(p.body)) {
            let delta = tracked.delta();
            self.standing_point = (delta * nalgebra::Point3::from(self.standing_point)).coords;
            self.start_position = (delta * nalgebra::Point3::from(self.start_position)).coords;
        }

        self.elapsed += dt;
        let t = self.progress(core.params.ledge_stand_up_duration);
        let target = self.standing_point + core.body.grounding_up * COLLISION_OFFSET;
        core.position = self.start_position.lerp(&target, t);
        core.body.relative_velocity = Vec3::zeros();
        self.finished = t >= 1.0;

        core.physics_phase2(ctx, Phase2::empty());
    }

    fn detect_transitions(&mut self, core: &mut CharacterCore, ctx: &StepContext) -> Option<ActiveState> {
        if !self.finished {
            return None;
        }
        match core.detect_ground(ctx, core.properties.ground_snapping_distance) {
            Some(ground) => {
                core.body.is_grounded = true;
                core.body.ground_hit = Some(ground);
                Some(ActiveState::ground_move())
            }
            None => Some(ActiveState::air_move()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::character::states::test_support::*;
    use crate::game::input::InputFlags;
    use crate::game::parent::ParentRegistry;
    use crate::game::physics::{
        BodyKind, CollisionWorld, EntityId, PartCategory, PartDesc, PartShape, SurfaceProperties, SurfaceTags,
    };
    use approx::assert_relative_eq;

    /// Block whose wall faces -Z at z = 0.5 and whose top is at y = 2.
    fn ledge(world: &mut CollisionWorld) {
        cuboid(
            world,
            5,
            Vec3::new(5.0, 1.0, 0.5),
            Vec3::new(0.0, 1.0, 1.0),
            PartCategory::Solid,
            SurfaceTags::empty(),
        );
        world.update_queries();
    }

    fn hanging_core(world: &mut CollisionWorld) -> CharacterCore {
        // Detection point 0.3 below the ledge top, 0.05 from the wall
        core_at(world, Vec3::new(0.0, 0.3, 0.15))
    }

    #[test]
    fn test_probe_finds_wall_top_and_room() {
        let mut world = CollisionWorld::new();
        ledge(&mut world);
        let core = hanging_core(&mut world);
        let parents = ParentRegistry::new();
        let step = step_ctx(&world, &parents, 0);

        let probe = can_grab_ledge(&core, &step).unwrap();
        assert!(probe.would_be_grounded_on_surface);
        assert_relative_eq!(probe.forward_hit_distance, 0.05, epsilon = 1.0e-3);
        assert_relative_eq!(probe.up_offset_to_ledge_level, 0.34, epsilon = 1.0e-3);
        assert_relative_eq!(probe.forward_hit.unwrap().normal, Vec3::new(0.0, 0.0, -1.0), epsilon = 1.0e-3);
        assert_eq!(probe.surface_hit.and_then(|h| h.entity), Some(EntityId(5)));
    }

    #[test]
    fn test_no_ledge_without_a_wall() {
        let mut world = CollisionWorld::new();
        floor(&mut world);
        let core = core_at(&mut world, Vec3::new(0.0, 3.0, 0.0));
        let parents = ParentRegistry::new();
        let step = step_ctx(&world, &parents, 0);

        let probe = ledge_detection(&core, &step, &core.position, &core.rotation);
        assert!(!probe.is_valid);
        assert!(probe.forward_hit.is_none());
        assert!(can_grab_ledge(&core, &step).is_none());
    }

    #[test]
    fn test_hanging_snaps_to_wall_and_ledge_height() {
        let mut world = CollisionWorld::new();
        ledge(&mut world);
        let mut core = hanging_core(&mut world);
        let parents = ParentRegistry::new();
        let step = step_ctx(&world, &parents, 0);
        let mut state = LedgeGrabState::from_probe(&can_grab_ledge(&core, &step).unwrap());

        state.on_enter(CharacterState::AirMove, &mut core, &step);
        assert_eq!(parents.get(core.id).and_then(|p| p.entity), Some(EntityId(5)));
        state.physics_update(&mut core, &step);

        assert_relative_eq!(core.position.z, 0.18, epsilon = 1.0e-3);
        assert_relative_eq!(core.position.y, 0.62, epsilon = 1.0e-3);
        assert!(state.detect_transitions(&mut core, &step).is_none());
    }

    #[test]
    fn test_letting_go_blocks_regrab() {
        let mut world = CollisionWorld::new();
        ledge(&mut world);
        let mut core = hanging_core(&mut world);
        let parents = ParentRegistry::new();
        let step = step_ctx(&world, &parents, 0);
        let mut state = LedgeGrabState::default();
        state.on_enter(CharacterState::AirMove, &mut core, &step);

        core.control.set_pressed(InputFlags::CROUCH_PRESSED, true);
        state.physics_update(&mut core, &step);
        assert!(core.volatile.ledge_grab_block_counter > 0.0);

        let next = state.detect_transitions(&mut core, &step);
        assert_eq!(next.map(|s| s.tag()), Some(CharacterState::AirMove));
        state.on_exit(CharacterState::AirMove, &mut core, &step);
        assert!(core.properties.detect_movement_collisions);
        assert!(parents.get(core.id).is_none());
        assert!(can_grab_ledge(&core, &step).is_none());
    }

    #[test]
    fn test_dash_while_hanging_lets_go() {
        let mut world = CollisionWorld::new();
        ledge(&mut world);
        let mut core = hanging_core(&mut world);
        let parents = ParentRegistry::new();
        let step = step_ctx(&world, &parents, 0);
        let mut state = LedgeGrabState::default();
        state.on_enter(CharacterState::AirMove, &mut core, &step);

        core.control.set_pressed(InputFlags::DASH_PRESSED, true);
        state.physics_update(&mut core, &step);
        assert!(core.volatile.ledge_grab_block_counter > 0.0);

        let next = state.detect_transitions(&mut core, &step);
        assert_eq!(next.map(|s| s.tag()), Some(CharacterState::AirMove));
    }

    #[test]
    fn test_jump_below_a_steep_top_lets_go() {
        let mut world = CollisionWorld::new();
        ledge(&mut world);
        // Thin slab rising away from the wall at 20 degrees, starting at the lip (y = 2, z = 0.5)
        let tilt = 20.0_f32.to_radians();
        let rotation = Quat::from_axis_angle(&Vec3::x_axis(), -tilt);
        let along = Vec3::new(0.0, tilt.sin(), tilt.cos());
        let normal = Vec3::new(0.0, tilt.cos(), -tilt.sin());
        world
            .add_part(&PartDesc {
                entity: EntityId(6),
                shape: PartShape::Cuboid {
                    half_extents: Vec3::new(5.0, 0.05, 1.0),
                },
                position: Vec3::new(0.0, 2.0, 0.5) + along - normal * 0.05,
                rotation,
                kind: BodyKind::Fixed,
                category: PartCategory::Solid,
                surface: SurfaceProperties::default(),
                density: 1.0,
            })
            .unwrap();
        world.update_queries();

        let mut core = hanging_core(&mut world);
        // This character only stands on slopes up to 10 degrees
        core.properties.max_grounded_slope_degrees = 10.0;
        core.step_and_slope.step_handling = false;
        let parents = ParentRegistry::new();
        let step = step_ctx(&world, &parents, 0);

        let probe = can_grab_ledge(&core, &step).unwrap();
        assert!(!probe.would_be_grounded_on_surface);
        assert_eq!(probe.surface_hit.and_then(|h| h.entity), Some(EntityId(6)));

        let mut grab = LedgeGrabState::from_probe(&probe);
        grab.on_enter(CharacterState::AirMove, &mut core, &step);
        grab.physics_update(&mut core, &step);
        assert!(grab.detect_transitions(&mut core, &step).is_none());

        core.control.set_pressed(InputFlags::JUMP_PRESSED, true);
        let next = grab.detect_transitions(&mut core, &step);
        assert_eq!(next.map(|s| s.tag()), Some(CharacterState::AirMove));
    }

    #[test]
    fn test_jump_stands_up_onto_the_ledge() {
        let mut world = CollisionWorld::new();
        ledge(&mut world);
        let mut core = hanging_core(&mut world);
        let parents = ParentRegistry::new();
        let step = step_ctx(&world, &parents, 0);
        let mut grab = LedgeGrabState::default();
        grab.on_enter(CharacterState::AirMove, &mut core, &step);
        grab.physics_update(&mut core, &step);

        core.control.set_pressed(InputFlags::JUMP_PRESSED, true);
        let Some(ActiveState::LedgeStandingUp(mut stand_up)) = grab.detect_transitions(&mut core, &step) else {
            panic!("expected to stand up");
        };
        core.control.drain_pressed();
        grab.on_exit(CharacterState::LedgeStandingUp, &mut core, &step);
        assert!(!core.properties.detect_movement_collisions);
        stand_up.on_enter(CharacterState::LedgeGrab, &mut core, &step);

        let mut next = None;
        for tick in 1..60 {
            let step = step_ctx(&world, &parents, tick);
            stand_up.physics_update(&mut core, &step);
            next = stand_up.detect_transitions(&mut core, &step);
            if next.is_some() {
                break;
            }
        }
        assert_eq!(next.map(|s| s.tag()), Some(CharacterState::GroundMove));
        assert!(core.body.is_grounded);
        assert_relative_eq!(core.position.y, 2.0 + COLLISION_OFFSET, epsilon = 1.0e-3);
    }
}
