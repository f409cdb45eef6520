use std::collections::{HashMap, HashSet};
use std::fmt;

use bitflags::bitflags;
use rapier3d::control::{EffectiveCharacterMovement, KinematicCharacterController};
use rapier3d::parry::bounding_volume::{Aabb, BoundingVolume};
use rapier3d::parry::query::{self as parry_query, ShapeCastOptions};
use rapier3d::prelude::*;
use serde::Deserialize;

use super::character::geometry::CapsuleGeometry;
use super::constants::physics as consts;
use super::error::SimulationError;
use super::math::{normalize_safe, Quat, Vec3};

// Collision categories. Characters never collide with each other, only with solids.
// Note: rapier3d uses InteractionGroups (not CollisionGroups like bevy_rapier)
pub const GROUP_STATIC: Group = Group::GROUP_1; // Walls, floors, platforms, props
pub const GROUP_CHARACTER: Group = Group::GROUP_2; // Character capsules
pub const GROUP_WATER: Group = Group::GROUP_3; // Swimmable volumes (sensors)
pub const GROUP_ROPE_ANCHOR: Group = Group::GROUP_4; // Rope attachment volumes (sensors)

/// Stable identifier for anything placed in the world, characters included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

bitflags! {
    /// Gameplay tags attached to a surface.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SurfaceTags: u8 {
        const CLIMBABLE = 1 << 0;
        const STICKY = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceProperties {
    pub tags: SurfaceTags,
    /// False for surfaces queries may see but characters pass through
    pub collidable: bool,
    /// Multiplier on grounded movement sharpness
    pub friction: f32,
}

impl Default for SurfaceProperties {
    fn default() -> Self {
        Self {
            tags: SurfaceTags::empty(),
            collidable: true,
            friction: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    Fixed,
    Kinematic,
    Dynamic,
}

/// What a part is for, which decides its category and whether it is a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartCategory {
    #[default]
    Solid,
    Water,
    RopeAnchor,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartShape {
    Cuboid { half_extents: Vec3 },
    Ball { radius: f32 },
    Capsule { half_height: f32, radius: f32 },
}

impl PartShape {
    fn to_shared_shape(self) -> SharedShape {
        match self {
            PartShape::Cuboid { half_extents } => {
                SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z)
            }
            PartShape::Ball { radius } => SharedShape::ball(radius),
            PartShape::Capsule { half_height, radius } => SharedShape::capsule_y(half_height, radius),
        }
    }
}

/// Everything needed to insert a part into the world.
#[derive(Debug, Clone, Copy)]
pub struct PartDesc {
    pub entity: EntityId,
    pub shape: PartShape,
    pub position: Vec3,
    pub rotation: Quat,
    pub kind: BodyKind,
    pub category: PartCategory,
    pub surface: SurfaceProperties,
    /// Density of dynamic bodies (ignored otherwise)
    pub density: f32,
}

/// Pose of a kinematic body before and after the last world step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedTransform {
    pub previous: Isometry<Real>,
    pub current: Isometry<Real>,
}

impl TrackedTransform {
    fn at(pose: Isometry<Real>) -> Self {
        Self {
            previous: pose,
            current: pose,
        }
    }

    /// World-space transform that maps the previous pose onto the current one.
    pub fn delta(&self) -> Isometry<Real> {
        self.current * self.previous.inverse()
    }

    /// Velocity of a world point rigidly attached to the body.
    pub fn point_velocity(&self, point: &Vec3, dt: f32) -> Vec3 {
        if dt <= consts::EPSILON {
            return Vec3::zeros();
        }
        let moved = self.delta() * Point::from(*point);
        (moved.coords - point) / dt
    }
}

/// A single query result, in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldHit {
    pub entity: Option<EntityId>,
    pub collider: ColliderHandle,
    pub body: Option<RigidBodyHandle>,
    pub position: Vec3,
    /// Surface normal at the hit, pointing away from the obstacle
    pub normal: Vec3,
    /// Travel or separation distance. Negative for penetrating distance hits.
    pub distance: f32,
    /// Distance over the query's max distance (casts), or the raw distance (distance queries)
    pub fraction: f32,
}

/// Which colliders a query considers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionFilter {
    pub categories: Group,
    pub exclude_body: Option<RigidBodyHandle>,
    pub ignore_dynamic: bool,
    pub include_sensors: bool,
}

impl CollisionFilter {
    /// Solid geometry, as seen by a character's own movement.
    pub fn solids(exclude_body: Option<RigidBodyHandle>, ignore_dynamic: bool) -> Self {
        Self {
            categories: GROUP_STATIC,
            exclude_body,
            ignore_dynamic,
            include_sensors: false,
        }
    }

    /// Sensor volumes of the given categories (water, rope anchors).
    pub fn volumes(categories: Group) -> Self {
        Self {
            categories,
            exclude_body: None,
            ignore_dynamic: false,
            include_sensors: true,
        }
    }
}

/// Wrapper around the rapier world that characters query during a step.
///
/// Queries take `&self` so that many characters can run against the same world in parallel.
/// Mutators are only called from the scheduler's sequential phases.
pub struct CollisionWorld {
    pub gravity: Vector<Real>,
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub integration_parameters: IntegrationParameters,
    pub physics_pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub impulse_joint_set: ImpulseJointSet,
    pub multibody_joint_set: MultibodyJointSet,
    pub ccd_solver: CCDSolver,
    pub query_pipeline: QueryPipeline,

    entity_to_body: HashMap<EntityId, RigidBodyHandle>,
    collider_to_entity: HashMap<ColliderHandle, EntityId>,
    surfaces: HashMap<ColliderHandle, SurfaceProperties>,
    tracked: HashMap<RigidBodyHandle, TrackedTransform>,
    character_bodies: HashSet<RigidBodyHandle>,
}

impl CollisionWorld {
    pub fn new() -> Self {
        Self {
            gravity: vector![0.0, -consts::DEFAULT_GRAVITY, 0.0],
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            entity_to_body: HashMap::new(),
            collider_to_entity: HashMap::new(),
            surfaces: HashMap::new(),
            tracked: HashMap::new(),
            character_bodies: HashSet::new(),
        }
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    /// Steps dynamic bodies and moves kinematic bodies to their targets.
    pub fn step(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );
    }

    /// Rebuilds the query acceleration structure from current collider poses.
    pub fn update_queries(&mut self) {
        self.query_pipeline.update(&self.collider_set);
    }

    pub fn add_part(&mut self, desc: &PartDesc) -> Result<RigidBodyHandle, SimulationError> {
        if self.entity_to_body.contains_key(&desc.entity) {
            return Err(SimulationError::DuplicateEntity(desc.entity));
        }

        let builder = match desc.kind {
            BodyKind::Fixed => RigidBodyBuilder::fixed(),
            BodyKind::Kinematic => RigidBodyBuilder::kinematic_position_based(),
            BodyKind::Dynamic => RigidBodyBuilder::dynamic(),
        };
        let body = builder
            .translation(desc.position)
            .rotation(desc.rotation.scaled_axis())
            .build();
        let handle = self.rigid_body_set.insert(body);

        let (membership, sensor) = match desc.category {
            PartCategory::Solid => (GROUP_STATIC, !desc.surface.collidable),
            PartCategory::Water => (GROUP_WATER, true),
            PartCategory::RopeAnchor => (GROUP_ROPE_ANCHOR, true),
        };
        let collider = ColliderBuilder::new(desc.shape.to_shared_shape())
            .sensor(sensor)
            .density(desc.density.max(consts::EPSILON))
            .collision_groups(InteractionGroups::new(membership, Group::ALL))
            .build();
        let collider_handle =
            self.collider_set
                .insert_with_parent(collider, handle, &mut self.rigid_body_set);

        self.entity_to_body.insert(desc.entity, handle);
        self.collider_to_entity.insert(collider_handle, desc.entity);
        self.surfaces.insert(collider_handle, desc.surface);
        if desc.kind == BodyKind::Kinematic {
            if let Some(body) = self.rigid_body_set.get(handle) {
                self.tracked.insert(handle, TrackedTransform::at(*body.position()));
            }
        }
        Ok(handle)
    }

    /// Inserts the kinematic body backing a character. Its collider pushes dynamic bodies but is
    /// never hit by other characters' queries.
    pub fn add_character_body(
        &mut self,
        entity: EntityId,
        position: &Vec3,
        rotation: &Quat,
        geometry: &CapsuleGeometry,
    ) -> Result<(RigidBodyHandle, ColliderHandle), SimulationError> {
        if self.entity_to_body.contains_key(&entity) {
            return Err(SimulationError::DuplicateEntity(entity));
        }
        let body = RigidBodyBuilder::kinematic_position_based()
            .translation(*position)
            .rotation(rotation.scaled_axis())
            .build();
        let body_handle = self.rigid_body_set.insert(body);

        let collider = ColliderBuilder::new(geometry.shared_shape())
            .position(geometry.local_pose())
            .collision_groups(InteractionGroups::new(GROUP_CHARACTER, GROUP_STATIC))
            .build();
        let collider_handle =
            self.collider_set
                .insert_with_parent(collider, body_handle, &mut self.rigid_body_set);

        self.entity_to_body.insert(entity, body_handle);
        self.collider_to_entity.insert(collider_handle, entity);
        self.character_bodies.insert(body_handle);
        Ok((body_handle, collider_handle))
    }

    pub fn set_character_pose(&mut self, body: RigidBodyHandle, position: &Vec3, rotation: &Quat) {
        if let Some(body) = self.rigid_body_set.get_mut(body) {
            body.set_next_kinematic_position(Isometry::from_parts((*position).into(), *rotation));
        }
    }

    pub fn set_character_shape(&mut self, collider: ColliderHandle, geometry: &CapsuleGeometry) {
        if let Some(collider) = self.collider_set.get_mut(collider) {
            collider.set_shape(geometry.shared_shape());
            collider.set_position_wrt_parent(geometry.local_pose());
        }
    }

    pub fn set_character_collisions_enabled(&mut self, collider: ColliderHandle, enabled: bool) {
        if let Some(collider) = self.collider_set.get_mut(collider) {
            collider.set_enabled(enabled);
        }
    }

    pub fn apply_impulse(&mut self, body: RigidBodyHandle, impulse: &Vec3, point: &Vec3) {
        if let Some(body) = self.rigid_body_set.get_mut(body) {
            if body.is_dynamic() {
                body.apply_impulse_at_point(*impulse, Point::from(*point), true);
            }
        }
    }

    /// Schedules a kinematic part's pose for the next world step.
    pub fn set_kinematic_target(
        &mut self,
        entity: EntityId,
        position: &Vec3,
        rotation: &Quat,
    ) -> Result<(), SimulationError> {
        let handle = self.body_of_entity(entity).ok_or(SimulationError::UnknownEntity(entity))?;
        let body = self
            .rigid_body_set
            .get_mut(handle)
            .ok_or(SimulationError::UnknownEntity(entity))?;
        if !body.is_kinematic() {
            return Err(SimulationError::NotKinematic(entity));
        }
        body.set_next_kinematic_position(Isometry::from_parts((*position).into(), *rotation));
        Ok(())
    }

    /// Shifts current kinematic poses into `previous` and samples the new ones.
    /// Call once per tick, right after `step`.
    pub fn refresh_tracked_transforms(&mut self) {
        for (handle, tracked) in self.tracked.iter_mut() {
            if let Some(body) = self.rigid_body_set.get(*handle) {
                tracked.previous = tracked.current;
                tracked.current = *body.position();
            }
        }
    }

    pub fn entity_of(&self, collider: ColliderHandle) -> Option<EntityId> {
        self.collider_to_entity.get(&collider).copied()
    }

    pub fn body_of_entity(&self, entity: EntityId) -> Option<RigidBodyHandle> {
        self.entity_to_body.get(&entity).copied()
    }

    pub fn body_kind(&self, body: RigidBodyHandle) -> Option<BodyKind> {
        let body = self.rigid_body_set.get(body)?;
        Some(if body.is_dynamic() {
            BodyKind::Dynamic
        } else if body.is_kinematic() {
            BodyKind::Kinematic
        } else {
            BodyKind::Fixed
        })
    }

    pub fn is_dynamic(&self, body: Option<RigidBodyHandle>) -> bool {
        body.and_then(|b| self.body_kind(b)) == Some(BodyKind::Dynamic)
    }

    pub fn surface(&self, collider: ColliderHandle) -> SurfaceProperties {
        self.surfaces.get(&collider).copied().unwrap_or_default()
    }

    pub fn tracked_transform(&self, body: RigidBodyHandle) -> Option<&TrackedTransform> {
        self.tracked.get(&body)
    }

    pub fn body_pose(&self, body: RigidBodyHandle) -> Option<Isometry<Real>> {
        self.rigid_body_set.get(body).map(|b| *b.position())
    }

    pub fn body_mass(&self, body: RigidBodyHandle) -> f32 {
        self.rigid_body_set.get(body).map_or(0.0, |b| b.mass())
    }

    /// Velocity of a point on a body. Kinematic bodies use their tracked transforms so the
    /// result matches the displacement parented characters receive.
    pub fn point_velocity(&self, body: RigidBodyHandle, point: &Vec3, dt: f32) -> Vec3 {
        if let Some(tracked) = self.tracked.get(&body) {
            return tracked.point_velocity(point, dt);
        }
        self.rigid_body_set
            .get(body)
            .map_or(Vec3::zeros(), |b| b.velocity_at_point(&Point::from(*point)))
    }

    fn accepts(&self, filter: &CollisionFilter, collider: &Collider) -> bool {
        if !collider.is_enabled() {
            return false;
        }
        if collider.is_sensor() && !filter.include_sensors {
            return false;
        }
        if !collider.collision_groups().memberships.intersects(filter.categories) {
            return false;
        }
        if let Some(parent) = collider.parent() {
            if filter.exclude_body == Some(parent) {
                return false;
            }
            if self.character_bodies.contains(&parent) {
                return false;
            }
            if filter.ignore_dynamic
                && self.rigid_body_set.get(parent).is_some_and(|b| b.is_dynamic())
            {
                return false;
            }
        }
        true
    }

    fn make_hit(
        &self,
        handle: ColliderHandle,
        position: Vec3,
        normal: Vec3,
        distance: f32,
        fraction: f32,
    ) -> WorldHit {
        WorldHit {
            entity: self.entity_of(handle),
            collider: handle,
            body: self.collider_set.get(handle).and_then(|c| c.parent()),
            position,
            normal,
            distance,
            fraction,
        }
    }

    // --- Ray queries ---

    pub fn cast_ray(
        &self,
        origin: &Vec3,
        direction: &Vec3,
        max_distance: f32,
        filter: &CollisionFilter,
    ) -> Option<WorldHit> {
        let dir = normalize_safe(direction);
        if dir == Vec3::zeros() || max_distance <= 0.0 {
            return None;
        }
        let ray = Ray::new(Point::from(*origin), dir);
        let predicate = |_handle: ColliderHandle, collider: &Collider| self.accepts(filter, collider);
        let query_filter = QueryFilter::default().predicate(&predicate);

        let (handle, intersection) = self.query_pipeline.cast_ray_and_get_normal(
            &self.rigid_body_set,
            &self.collider_set,
            &ray,
            max_distance,
            true,
            query_filter,
        )?;
        let toi = intersection.time_of_impact;
        Some(self.make_hit(
            handle,
            ray.point_at(toi).coords,
            intersection.normal,
            toi,
            toi / max_distance,
        ))
    }

    pub fn cast_ray_all(
        &self,
        origin: &Vec3,
        direction: &Vec3,
        max_distance: f32,
        filter: &CollisionFilter,
    ) -> Vec<WorldHit> {
        let mut hits = Vec::new();
        let dir = normalize_safe(direction);
        if dir == Vec3::zeros() || max_distance <= 0.0 {
            return hits;
        }
        let ray = Ray::new(Point::from(*origin), dir);
        let predicate = |_handle: ColliderHandle, collider: &Collider| self.accepts(filter, collider);
        let query_filter = QueryFilter::default().predicate(&predicate);

        self.query_pipeline.intersections_with_ray(
            &self.rigid_body_set,
            &self.collider_set,
            &ray,
            max_distance,
            true,
            query_filter,
            |handle, intersection| {
                let toi = intersection.time_of_impact;
                hits.push(self.make_hit(
                    handle,
                    ray.point_at(toi).coords,
                    intersection.normal,
                    toi,
                    toi / max_distance,
                ));
                true
            },
        );
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    // --- Shape casts ---

    /// Closest hit of `shape` swept from `pose` along `direction`.
    pub fn cast_shape(
        &self,
        shape: &dyn Shape,
        pose: &Isometry<Real>,
        direction: &Vec3,
        max_distance: f32,
        filter: &CollisionFilter,
    ) -> Option<WorldHit> {
        self.cast_shape_all(shape, pose, direction, max_distance, filter)
            .into_iter()
            .next()
    }

    /// Every hit along the sweep, sorted by distance. A cast that starts in contact reports 0.
    pub fn cast_shape_all(
        &self,
        shape: &dyn Shape,
        pose: &Isometry<Real>,
        direction: &Vec3,
        max_distance: f32,
        filter: &CollisionFilter,
    ) -> Vec<WorldHit> {
        let mut hits = Vec::new();
        let dir = normalize_safe(direction);
        if dir == Vec3::zeros() || max_distance < 0.0 {
            return hits;
        }

        let end_pose = translated(pose, &(dir * max_distance));
        let swept = shape.compute_aabb(pose).merged(&shape.compute_aabb(&end_pose));

        self.query_pipeline
            .colliders_with_aabb_intersecting_aabb(&swept, |&handle| {
                if let Some(collider) = self.collider_set.get(handle) {
                    if self.accepts(filter, collider) {
                        if let Some(hit) =
                            self.cast_against(shape, pose, &dir, max_distance, handle, collider)
                        {
                            hits.push(hit);
                        }
                    }
                }
                true
            });
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    fn cast_against(
        &self,
        shape: &dyn Shape,
        pose: &Isometry<Real>,
        dir: &Vec3,
        max_distance: f32,
        handle: ColliderHandle,
        collider: &Collider,
    ) -> Option<WorldHit> {
        let options = ShapeCastOptions {
            max_time_of_impact: max_distance,
            stop_at_penetration: true,
            ..ShapeCastOptions::default()
        };
        let hit = parry_query::cast_shapes(
            pose,
            dir,
            shape,
            collider.position(),
            &Vector::zeros(),
            collider.shape(),
            options,
        )
        .ok()
        .flatten()?;

        let distance = hit.time_of_impact.max(0.0);
        let collider_pose = collider.position();
        let position = (collider_pose * hit.witness2).coords;
        // Casts that start in contact may report a degenerate normal
        let normal = normalize_safe(&(collider_pose.rotation * hit.normal2.into_inner()));
        let normal = if normal == Vec3::zeros() { -dir } else { normal };

        let fraction = if max_distance > 0.0 { distance / max_distance } else { 0.0 };
        Some(self.make_hit(handle, position, normal, distance, fraction))
    }

    // --- Distance queries ---

    /// Every collider within `max_distance` of `shape` at `pose`. Penetrations are negative.
    pub fn distance_all(
        &self,
        shape: &dyn Shape,
        pose: &Isometry<Real>,
        max_distance: f32,
        filter: &CollisionFilter,
    ) -> Vec<WorldHit> {
        let mut hits = Vec::new();
        let margin = max_distance.max(0.0);
        let aabb = shape.compute_aabb(pose).loosened(margin);

        self.query_pipeline
            .colliders_with_aabb_intersecting_aabb(&aabb, |&handle| {
                let Some(collider) = self.collider_set.get(handle) else {
                    return true;
                };
                if !self.accepts(filter, collider) {
                    return true;
                }
                let contact = parry_query::contact(
                    pose,
                    shape,
                    collider.position(),
                    collider.shape(),
                    margin,
                );
                if let Ok(Some(c)) = contact {
                    if c.dist <= max_distance {
                        hits.push(self.make_hit(
                            handle,
                            c.point2.coords,
                            c.normal2.into_inner(),
                            c.dist,
                            c.dist,
                        ));
                    }
                }
                true
            });
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    pub fn distance_closest(
        &self,
        shape: &dyn Shape,
        pose: &Isometry<Real>,
        max_distance: f32,
        filter: &CollisionFilter,
    ) -> Option<WorldHit> {
        self.distance_all(shape, pose, max_distance, filter)
            .into_iter()
            .next()
    }

    /// Signed distance from `point` to the closest accepted collider surface.
    /// Negative inside; the normal always points toward the outside of the collider.
    pub fn point_distance(
        &self,
        point: &Vec3,
        max_distance: f32,
        filter: &CollisionFilter,
    ) -> Option<WorldHit> {
        let pt = Point::from(*point);
        let margin = Vector::repeat(max_distance.max(0.0));
        let aabb = Aabb::new(pt - margin, pt + margin);
        let mut best: Option<WorldHit> = None;

        self.query_pipeline
            .colliders_with_aabb_intersecting_aabb(&aabb, |&handle| {
                let Some(collider) = self.collider_set.get(handle) else {
                    return true;
                };
                if !self.accepts(filter, collider) {
                    return true;
                }
                let projection = collider.shape().project_point(collider.position(), &pt, false);
                let to_surface = projection.point.coords - point;
                let len = to_surface.norm();
                let (distance, normal) = if projection.is_inside {
                    (-len, normalize_safe(&to_surface))
                } else {
                    (len, -normalize_safe(&to_surface))
                };
                if distance <= max_distance && best.map_or(true, |b| distance < b.distance) {
                    best = Some(self.make_hit(
                        handle,
                        projection.point.coords,
                        normal,
                        distance,
                        distance,
                    ));
                }
                true
            });
        best
    }

    /// Move-and-slide against solids through rapier's kinematic controller.
    pub fn move_shape(
        &self,
        controller: &KinematicCharacterController,
        shape: &dyn Shape,
        pose: &Isometry<Real>,
        desired_translation: &Vec3,
        filter: &CollisionFilter,
        dt: f32,
    ) -> EffectiveCharacterMovement {
        let predicate = |_handle: ColliderHandle, collider: &Collider| self.accepts(filter, collider);
        let query_filter = QueryFilter::default().exclude_sensors().predicate(&predicate);

        controller.move_shape(
            dt,
            &self.rigid_body_set,
            &self.collider_set,
            &self.query_pipeline,
            shape,
            pose,
            *desired_translation,
            query_filter,
            |_collision| {},
        )
    }
}

impl Default for CollisionWorld {
    fn default() -> Self {
        Self::new()
    }
}

fn translated(pose: &Isometry<Real>, offset: &Vec3) -> Isometry<Real> {
    Isometry::from_parts((pose.translation.vector + offset).into(), pose.rotation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rapier3d::parry::shape::{Ball, Capsule};

    fn floor(world: &mut CollisionWorld, entity: u64, kind: BodyKind) -> RigidBodyHandle {
        world
            .add_part(&PartDesc {
                entity: EntityId(entity),
                shape: PartShape::Cuboid {
                    half_extents: Vec3::new(50.0, 0.5, 50.0),
                },
                position: Vec3::new(0.0, -0.5, 0.0),
                rotation: Quat::identity(),
                kind,
                category: PartCategory::Solid,
                surface: SurfaceProperties::default(),
                density: 1.0,
            })
            .unwrap()
    }

    fn water(world: &mut CollisionWorld, entity: u64, center: Vec3) {
        world
            .add_part(&PartDesc {
                entity: EntityId(entity),
                shape: PartShape::Cuboid {
                    half_extents: Vec3::new(5.0, 2.0, 5.0),
                },
                position: center,
                rotation: Quat::identity(),
                kind: BodyKind::Fixed,
                category: PartCategory::Water,
                surface: SurfaceProperties::default(),
                density: 1.0,
            })
            .unwrap();
    }

    #[test]
    fn test_world_creation() {
        let world = CollisionWorld::new();
        assert_eq!(world.gravity.y, -consts::DEFAULT_GRAVITY);
    }

    #[test]
    fn test_duplicate_entity_is_rejected() {
        let mut world = CollisionWorld::new();
        floor(&mut world, 1, BodyKind::Fixed);
        let err = world
            .add_part(&PartDesc {
                entity: EntityId(1),
                shape: PartShape::Ball { radius: 1.0 },
                position: Vec3::zeros(),
                rotation: Quat::identity(),
                kind: BodyKind::Fixed,
                category: PartCategory::Solid,
                surface: SurfaceProperties::default(),
                density: 1.0,
            })
            .unwrap_err();
        assert_eq!(err, SimulationError::DuplicateEntity(EntityId(1)));
    }

    #[test]
    fn test_ray_hits_floor_with_upward_normal() {
        let mut world = CollisionWorld::new();
        floor(&mut world, 1, BodyKind::Fixed);
        world.update_queries();

        let hit = world
            .cast_ray(
                &Vec3::new(0.0, 3.0, 0.0),
                &-Vec3::y(),
                10.0,
                &CollisionFilter::solids(None, false),
            )
            .expect("floor below the origin");
        assert_eq!(hit.entity, Some(EntityId(1)));
        assert_relative_eq!(hit.distance, 3.0, epsilon = 1.0e-4);
        assert_relative_eq!(hit.normal, Vec3::y(), epsilon = 1.0e-4);
    }

    #[test]
    fn test_shape_cast_reports_travel_distance() {
        let mut world = CollisionWorld::new();
        floor(&mut world, 1, BodyKind::Fixed);
        world.update_queries();

        let ball = Ball::new(0.5);
        let pose = Isometry::translation(0.0, 2.5, 0.0);
        let hit = world
            .cast_shape(&ball, &pose, &-Vec3::y(), 5.0, &CollisionFilter::solids(None, false))
            .expect("ball lands on the floor");
        // The cast converges to within a few millimeters of contact
        assert_relative_eq!(hit.distance, 2.0, epsilon = 5.0e-3);
        assert_relative_eq!(hit.normal, Vec3::y(), epsilon = 1.0e-4);
        assert_relative_eq!(hit.position, Vec3::zeros(), epsilon = 5.0e-3);
        assert_relative_eq!(hit.fraction, 0.4, epsilon = 1.0e-3);
    }

    #[test]
    fn test_capsule_cast_against_wall_face_uses_face_normal() {
        let mut world = CollisionWorld::new();
        let yaw = 30.0_f32.to_radians();
        world
            .add_part(&PartDesc {
                entity: EntityId(2),
                shape: PartShape::Cuboid {
                    half_extents: Vec3::new(0.5, 3.0, 5.0),
                },
                position: Vec3::new(3.0, 3.0, 0.0),
                rotation: Quat::from_axis_angle(&Vector::y_axis(), yaw),
                kind: BodyKind::Fixed,
                category: PartCategory::Solid,
                surface: SurfaceProperties::default(),
                density: 1.0,
            })
            .unwrap();
        world.update_queries();

        let capsule = Capsule::new_y(0.4, 0.3);
        let pose = Isometry::translation(0.0, 1.0, 0.0);
        let hit = world
            .cast_shape(&capsule, &pose, &Vec3::x(), 5.0, &CollisionFilter::solids(None, false))
            .expect("capsule reaches the wall");
        assert_eq!(hit.entity, Some(EntityId(2)));
        assert_relative_eq!(hit.normal, Vec3::new(-yaw.cos(), 0.0, yaw.sin()), epsilon = 1.0e-4);
        // Contact lies on the face plane
        let face_point = Vec3::new(3.0, 3.0, 0.0) - Vec3::new(yaw.cos(), 0.0, -yaw.sin()) * 0.5;
        assert_relative_eq!((hit.position - face_point).dot(&hit.normal), 0.0, epsilon = 1.0e-3);
    }

    #[test]
    fn test_distance_query_reports_penetration_as_negative() {
        let mut world = CollisionWorld::new();
        floor(&mut world, 1, BodyKind::Fixed);
        world.update_queries();

        let ball = Ball::new(0.5);
        let pose = Isometry::translation(0.0, 0.3, 0.0);
        let hit = world
            .distance_closest(&ball, &pose, 0.0, &CollisionFilter::solids(None, false))
            .expect("ball overlaps the floor");
        assert_relative_eq!(hit.distance, -0.2, epsilon = 1.0e-3);
        assert!(hit.normal.y > 0.99);
    }

    #[test]
    fn test_point_distance_is_signed_for_water() {
        let mut world = CollisionWorld::new();
        water(&mut world, 2, Vec3::new(0.0, 0.0, 0.0));
        world.update_queries();
        let filter = CollisionFilter::volumes(GROUP_WATER);

        let inside = world
            .point_distance(&Vec3::new(0.0, 1.5, 0.0), 1.0, &filter)
            .expect("point inside the volume");
        assert_relative_eq!(inside.distance, -0.5, epsilon = 1.0e-4);
        assert_relative_eq!(inside.normal, Vec3::y(), epsilon = 1.0e-4);

        let above = world
            .point_distance(&Vec3::new(0.0, 2.5, 0.0), 1.0, &filter)
            .expect("point just above the surface");
        assert_relative_eq!(above.distance, 0.5, epsilon = 1.0e-4);
        assert_relative_eq!(above.normal, Vec3::y(), epsilon = 1.0e-4);

        assert!(world.point_distance(&Vec3::new(0.0, 9.0, 0.0), 1.0, &filter).is_none());
    }

    #[test]
    fn test_solid_filter_ignores_water_and_dynamic_when_asked() {
        let mut world = CollisionWorld::new();
        water(&mut world, 2, Vec3::new(0.0, 5.0, 0.0));
        floor(&mut world, 3, BodyKind::Dynamic);
        world.update_queries();

        let origin = Vec3::new(0.0, 10.0, 0.0);
        let solids = CollisionFilter::solids(None, false);
        let hit = world.cast_ray(&origin, &-Vec3::y(), 20.0, &solids).unwrap();
        assert_eq!(hit.entity, Some(EntityId(3)), "water sensor is skipped");

        let static_only = CollisionFilter::solids(None, true);
        assert!(world.cast_ray(&origin, &-Vec3::y(), 20.0, &static_only).is_none());
    }

    #[test]
    fn test_tracked_transform_delta_and_point_velocity() {
        let mut world = CollisionWorld::new();
        let platform = floor(&mut world, 4, BodyKind::Kinematic);
        world
            .set_kinematic_target(EntityId(4), &Vec3::new(1.0, -0.5, 0.0), &Quat::identity())
            .unwrap();
        world.step(0.5);
        world.refresh_tracked_transforms();

        let tracked = world.tracked_transform(platform).unwrap();
        assert_relative_eq!(tracked.delta().translation.vector, Vec3::new(1.0, 0.0, 0.0), epsilon = 1.0e-4);
        let v = world.point_velocity(platform, &Vec3::new(3.0, 0.0, 0.0), 0.5);
        assert_relative_eq!(v, Vec3::new(2.0, 0.0, 0.0), epsilon = 1.0e-3);
    }

    #[test]
    fn test_kinematic_target_rejects_fixed_bodies() {
        let mut world = CollisionWorld::new();
        floor(&mut world, 5, BodyKind::Fixed);
        let err = world
            .set_kinematic_target(EntityId(5), &Vec3::zeros(), &Quat::identity())
            .unwrap_err();
        assert_eq!(err, SimulationError::NotKinematic(EntityId(5)));
        let err = world
            .set_kinematic_target(EntityId(99), &Vec3::zeros(), &Quat::identity())
            .unwrap_err();
        assert_eq!(err, SimulationError::UnknownEntity(EntityId(99)));
    }
}
