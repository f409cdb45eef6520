//! Character context, the per-step update driver and the state machine that owns the states.

pub mod body;
pub mod geometry;
pub mod movement;
pub mod params;
pub mod pipeline;
pub mod states;

use rapier3d::prelude::{ColliderHandle, Isometry, RigidBodyHandle};
use tracing::debug;

use super::animation::AnimationSettings;
use super::carrying::{self, CarryingComponent};
use super::input::{CharacterControl, PlayerInputs};
use super::math::{add_variable_rate_rotation, Quat, Vec3};
use super::parent::{ParentAttachment, ParentRegistry};
use super::physics::{CollisionFilter, CollisionWorld, EntityId};
use super::rope::RopeLink;
use super::zones::ZoneContacts;

use body::{CharacterBody, HitTracker};
use geometry::{CapsuleGeometry, CharacterGeometry};
use params::{CharacterParameters, KinematicCharacterProperties, StepAndSlopeSettings, VolatileState};
use states::{CameraParameters, CharacterState, StateMachine};

/// Time bookkeeping for one fixed step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepTime {
    pub delta_time: f32,
    pub elapsed_time: f64,
    pub tick: u64,
}

/// Read-only collaborators shared by every character updated during a step.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub world: &'a CollisionWorld,
    pub parents: &'a ParentRegistry,
    pub time: StepTime,
}

impl StepContext<'_> {
    pub fn dt(&self) -> f32 {
        self.time.delta_time
    }

    pub fn elapsed(&self) -> f64 {
        self.time.elapsed_time
    }
}

/// Recorded in call order, so tests and tools can check exit-before-enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterEvent {
    StateExited {
        state: CharacterState,
        next: CharacterState,
    },
    StateEntered {
        state: CharacterState,
        previous: CharacterState,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeferredImpulse {
    pub body: RigidBodyHandle,
    pub impulse: Vec3,
    pub point: Vec3,
}

/// World writes a character requests during its (parallel) update, applied in the sync phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingWorldWrites {
    pub impulses: Vec<DeferredImpulse>,
    pub shape_dirty: bool,
    pub collisions_dirty: bool,
}

/// Everything a state reads and writes during an update, minus the state data itself.
#[derive(Debug, Clone)]
pub struct CharacterCore {
    pub id: EntityId,
    pub body: CharacterBody,
    pub params: CharacterParameters,
    pub properties: KinematicCharacterProperties,
    pub step_and_slope: StepAndSlopeSettings,
    pub volatile: VolatileState,
    pub geometry: CharacterGeometry,
    pub active_geometry: CapsuleGeometry,
    pub control: CharacterControl,
    pub position: Vec3,
    pub rotation: Quat,
    /// Gravity resolved from zones for this step
    pub gravity: Vec3,
    pub gravity_multiplier: f32,
    pub carrying: Option<CarryingComponent>,
    pub animation: AnimationSettings,
    pub body_handle: RigidBodyHandle,
    pub collider_handle: ColliderHandle,
    pub collisions_enabled: bool,
    pub rollball_visible: bool,
    pub rope_link: Option<RopeLink>,
    pub hits: HitTracker,
    pub events: Vec<CharacterEvent>,
    pub pending: PendingWorldWrites,
}

impl CharacterCore {
    pub fn new(
        id: EntityId,
        config: &crate::config::CharacterConfig,
        position: Vec3,
        rotation: Quat,
        body_handle: RigidBodyHandle,
        collider_handle: ColliderHandle,
        gravity: Vec3,
    ) -> Self {
        let mut body = CharacterBody::default();
        body.grounding_up = super::math::up(&rotation);
        Self {
            id,
            body,
            params: config.parameters.clone(),
            properties: config.properties,
            step_and_slope: config.step_and_slope,
            volatile: VolatileState::default(),
            geometry: config.geometry,
            active_geometry: config.geometry.standing,
            control: CharacterControl::default(),
            position,
            rotation,
            gravity,
            gravity_multiplier: 1.0,
            carrying: config.carrying.clone(),
            animation: config.animation,
            body_handle,
            collider_handle,
            collisions_enabled: true,
            rollball_visible: false,
            rope_link: None,
            hits: HitTracker::default(),
            events: Vec::new(),
            pending: PendingWorldWrites::default(),
        }
    }

    /// Solid geometry as seen by this character's own queries.
    pub fn solid_filter(&self) -> CollisionFilter {
        CollisionFilter::solids(Some(self.body_handle), self.properties.should_ignore_dynamic_bodies())
    }

    pub fn capsule_pose(&self) -> Isometry<f32> {
        self.active_geometry.pose(&self.position, &self.rotation)
    }

    /// Speed multiplier from the carried load (1 without a carrying component).
    pub fn carrying_speed_multiplier(&self) -> f32 {
        carrying::speed_multiplier(self.carrying.as_ref())
    }

    pub fn set_capsule_geometry(&mut self, geometry: CapsuleGeometry) {
        if self.active_geometry != geometry {
            self.active_geometry = geometry;
            self.pending.shape_dirty = true;
        }
    }

    pub fn set_collisions_enabled(&mut self, enabled: bool) {
        if self.collisions_enabled != enabled {
            self.collisions_enabled = enabled;
            self.pending.collisions_dirty = true;
        }
    }

    /// The only way a character changes what it is attached to. `None` detaches.
    pub fn set_or_update_parent(&mut self, ctx: &StepContext, attachment: Option<ParentAttachment>) {
        self.body.parent = attachment;
        ctx.parents.set_or_update(self.id, attachment);
    }

    pub fn queue_impulse(&mut self, body: RigidBodyHandle, impulse: Vec3, point: Vec3) {
        self.pending.impulses.push(DeferredImpulse { body, impulse, point });
    }

    /// Jump/grounding bookkeeping run before the active state's update.
    fn begin_physics_update(&mut self, ctx: &StepContext) {
        let dt = ctx.dt();
        let elapsed = ctx.elapsed();

        if self.control.is_jump_held() {
            self.volatile.held_jump_time_counter += dt;
        } else {
            self.volatile.held_jump_time_counter = 0.0;
            self.volatile.allow_held_jump_in_air = false;
        }
        if self.control.is_jump_pressed() {
            self.volatile.last_time_jump_pressed = elapsed;
        }

        self.volatile.has_detected_move_against_wall = false;

        if self.body.is_grounded {
            self.volatile.last_time_was_grounded = elapsed;
            self.volatile.current_ungrounded_jumps = 0;
            self.volatile.allow_jump_after_became_ungrounded = true;
            self.volatile.allow_held_jump_in_air = true;
        }

        if self.volatile.ledge_grab_block_counter > 0.0 {
            self.volatile.ledge_grab_block_counter -= dt;
        }
    }

    fn end_physics_update(&mut self, ctx: &StepContext) {
        let grace = f64::from(self.params.jump_before_grounded_grace_time);
        if ctx.elapsed() >= self.volatile.last_time_jump_pressed + grace {
            self.volatile.jump_pressed_before_became_grounded = false;
        }
        self.control.drain_pressed();
    }
}

/// A character: shared context plus the state machine driving it.
#[derive(Debug, Clone)]
pub struct Character {
    pub core: CharacterCore,
    pub state_machine: StateMachine,
    /// Present for player-driven characters; scripted ones write `core.control` directly
    pub inputs: Option<PlayerInputs>,
    pub camera_rotation: Quat,
    pub zone_contacts: ZoneContacts,
}

impl Character {
    pub fn new(core: CharacterCore) -> Self {
        Self {
            core,
            state_machine: StateMachine::new(),
            inputs: None,
            camera_rotation: Quat::identity(),
            zone_contacts: ZoneContacts::default(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.core.id
    }

    pub fn current_state(&self) -> CharacterState {
        self.state_machine.current_state()
    }

    pub fn previous_state(&self) -> CharacterState {
        self.state_machine.previous_state()
    }

    pub fn camera_parameters(&self) -> CameraParameters {
        self.state_machine.camera_parameters(&self.core)
    }

    /// Converts player inputs into this tick's control, using the active state's move-vector policy.
    pub fn apply_player_inputs(&mut self, tick: u64) {
        let Some(inputs) = self.inputs else {
            return;
        };
        self.core.control.move_vector = self.state_machine.move_vector(&inputs, &self.camera_rotation);
        inputs.write_flags(&mut self.core.control, tick);
    }

    /// One fixed physics step.
    pub fn physics_update(&mut self, ctx: &StepContext) {
        if self.state_machine.current_state() == CharacterState::Uninitialized {
            debug!(character = %self.core.id, "initializing state machine");
            self.state_machine
                .transition_to(states::ActiveState::air_move(), &mut self.core, ctx);
        }

        self.core.begin_physics_update(ctx);
        self.state_machine.physics_update(&mut self.core, ctx);
        self.core.end_physics_update(ctx);
    }

    /// Cosmetic update at render rate. Never feeds back into the next physics step's motion.
    pub fn variable_update(&mut self, dt: f32) {
        add_variable_rate_rotation(
            &mut self.core.rotation,
            &self.core.body.rotation_from_parent,
            dt,
            self.core.body.last_physics_dt,
        );
        self.state_machine.variable_update(&mut self.core, dt);
    }

    pub fn drain_events(&mut self) -> Vec<CharacterEvent> {
        std::mem::take(&mut self.core.events)
    }
}
