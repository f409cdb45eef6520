//! Character container and fixed-step scheduler.
//!
//! A `Simulation` owns the collision world, the parent registry, the zones and every
//! character. `step` runs one fixed tick through the phases in `tick_pipeline`; `variable_update`
//! runs the cosmetic pass any number of times between ticks.

use std::collections::HashMap;

use rapier3d::prelude::RigidBodyHandle;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{CharacterConfig, InputEvent, ScenarioConfig, SimulationSettings};

use super::animation::{select_animation, AnimationOutput};
use super::character::states::CharacterState;
use super::character::{Character, CharacterCore, CharacterEvent};
use super::error::SimulationError;
use super::input::{CharacterControl, PlayerInputs};
use super::math::{Quat, Vec3};
use super::parent::ParentRegistry;
use super::physics::{CollisionWorld, EntityId, PartDesc};
use super::tick_pipeline;
use super::zones::ZoneSet;

/// Serializable view of one character after a tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharacterSnapshot {
    pub id: u64,
    pub state: CharacterState,
    pub previous_state: CharacterState,
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    pub is_grounded: bool,
    pub parent: Option<u64>,
    pub animation: AnimationOutput,
}

pub struct Simulation {
    pub world: CollisionWorld,
    pub parents: ParentRegistry,
    pub zones: ZoneSet,
    pub fixed_dt: f32,
    pub tick: u64,
    pub elapsed: f64,
    /// Iterated in insertion order so every run of a scenario is reproducible
    pub(super) characters: Vec<Character>,
    index: HashMap<EntityId, usize>,
    events: Vec<(EntityId, CharacterEvent)>,
}

impl Simulation {
    pub fn new(settings: &SimulationSettings) -> Self {
        let mut world = CollisionWorld::new();
        world.set_gravity(settings.gravity);
        Self {
            world,
            parents: ParentRegistry::new(),
            zones: ZoneSet::default(),
            fixed_dt: settings.dt,
            tick: 0,
            elapsed: 0.0,
            characters: Vec::new(),
            index: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// Builds the world, zones and characters described by a validated scenario.
    pub fn from_scenario(scenario: &ScenarioConfig) -> Result<Self, SimulationError> {
        let mut simulation = Self::new(&scenario.simulation);
        for part in &scenario.parts {
            simulation.add_part(&part.to_desc())?;
        }
        simulation.zones = scenario.zones.clone();
        for spawn in &scenario.characters {
            simulation.add_character(spawn.id, &spawn.config, spawn.position, spawn.rotation(), spawn.player)?;
        }
        simulation.world.update_queries();
        info!(
            parts = scenario.parts.len(),
            characters = simulation.characters.len(),
            "simulation ready"
        );
        Ok(simulation)
    }

    pub fn add_part(&mut self, desc: &PartDesc) -> Result<RigidBodyHandle, SimulationError> {
        let handle = self.world.add_part(desc)?;
        debug!(entity = %desc.entity, kind = ?desc.kind, category = ?desc.category, "part added");
        Ok(handle)
    }

    /// Spawns a character. Player characters read `PlayerInputs`; others are driven by writing
    /// their control through `set_control`.
    pub fn add_character(
        &mut self,
        id: EntityId,
        config: &CharacterConfig,
        position: Vec3,
        rotation: Quat,
        player: bool,
    ) -> Result<EntityId, SimulationError> {
        if self.index.contains_key(&id) {
            return Err(SimulationError::DuplicateEntity(id));
        }
        let (body, collider) =
            self.world
                .add_character_body(id, &position, &rotation, &config.geometry.standing)?;
        let core = CharacterCore::new(id, config, position, rotation, body, collider, self.world.gravity);

        let mut character = Character::new(core);
        if player {
            character.inputs = Some(PlayerInputs::default());
        }
        self.index.insert(id, self.characters.len());
        self.characters.push(character);
        debug!(character = %id, player, "character added");
        Ok(id)
    }

    pub fn character(&self, id: EntityId) -> Option<&Character> {
        self.index.get(&id).map(|&i| &self.characters[i])
    }

    pub fn character_mut(&mut self, id: EntityId) -> Result<&mut Character, SimulationError> {
        let index = *self.index.get(&id).ok_or(SimulationError::UnknownCharacter(id))?;
        Ok(&mut self.characters[index])
    }

    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    /// Input buffer of a player character. Pressed actions should be stamped with `self.tick`.
    pub fn player_inputs_mut(&mut self, id: EntityId) -> Result<&mut PlayerInputs, SimulationError> {
        let character = self.character_mut(id)?;
        Ok(character.inputs.get_or_insert_with(PlayerInputs::default))
    }

    /// Replaces the control of a scripted character for the next tick.
    pub fn set_control(&mut self, id: EntityId, control: CharacterControl) -> Result<(), SimulationError> {
        let character = self.character_mut(id)?;
        character.inputs = None;
        character.core.control = control;
        Ok(())
    }

    pub fn set_camera_rotation(&mut self, id: EntityId, rotation: Quat) -> Result<(), SimulationError> {
        self.character_mut(id)?.camera_rotation = rotation;
        Ok(())
    }

    /// Applies one entry of a scripted input timeline. Presses are stamped with the next tick.
    pub fn apply_input_event(&mut self, event: &InputEvent) -> Result<(), SimulationError> {
        let tick = self.tick;
        if let Some(yaw) = event.camera_yaw_degrees {
            let rotation = Quat::from_axis_angle(&Vec3::y_axis(), yaw.to_radians());
            self.set_camera_rotation(event.character, rotation)?;
        }

        let inputs = self.player_inputs_mut(event.character)?;
        if let Some([x, y]) = event.move_axes {
            inputs.set_move_axes(x, y);
        }
        if let Some(held) = event.jump_held {
            inputs.jump_held = held;
        }
        if let Some(held) = event.roll_held {
            inputs.roll_held = held;
        }
        if let Some(held) = event.sprint_held {
            inputs.sprint_held = held;
        }
        for action in &event.press {
            inputs.press(*action, tick);
        }
        Ok(())
    }

    /// Runs one fixed tick.
    pub fn step(&mut self) -> Result<(), SimulationError> {
        tick_pipeline::run_tick_phases(self)?;

        for character in &mut self.characters {
            let id = character.id();
            self.events.extend(character.drain_events().into_iter().map(|e| (id, e)));
        }
        self.tick += 1;
        self.elapsed += f64::from(self.fixed_dt);
        Ok(())
    }

    /// Cosmetic pass at render rate.
    pub fn variable_update(&mut self, dt: f32) {
        for character in &mut self.characters {
            character.variable_update(dt);
        }
    }

    /// State transitions recorded since the last drain, in the order they happened.
    pub fn drain_events(&mut self) -> Vec<(EntityId, CharacterEvent)> {
        std::mem::take(&mut self.events)
    }

    pub fn snapshot(&self, id: EntityId) -> Option<CharacterSnapshot> {
        let character = self.character(id)?;
        let core = &character.core;
        Some(CharacterSnapshot {
            id: id.0,
            state: character.current_state(),
            previous_state: character.previous_state(),
            position: core.position.into(),
            velocity: core.body.relative_velocity.into(),
            is_grounded: core.body.is_grounded,
            parent: self
                .parents
                .live_parent(id, &self.world)
                .and_then(|attachment| attachment.entity)
                .map(|entity| entity.0),
            animation: select_animation(character.current_state(), core, &core.animation),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::{BodyKind, PartCategory, PartShape, SurfaceProperties};

    fn floor_desc() -> PartDesc {
        PartDesc {
            entity: EntityId(1),
            shape: PartShape::Cuboid {
                half_extents: Vec3::new(50.0, 0.5, 50.0),
            },
            position: Vec3::new(0.0, -0.5, 0.0),
            rotation: Quat::identity(),
            kind: BodyKind::Fixed,
            category: PartCategory::Solid,
            surface: SurfaceProperties::default(),
            density: 1.0,
        }
    }

    #[test]
    fn test_duplicate_character_is_rejected() {
        let mut sim = Simulation::new(&SimulationSettings::default());
        let config = CharacterConfig::default();
        sim.add_character(EntityId(5), &config, Vec3::zeros(), Quat::identity(), true)
            .unwrap();
        let err = sim
            .add_character(EntityId(5), &config, Vec3::zeros(), Quat::identity(), true)
            .unwrap_err();
        assert_eq!(err, SimulationError::DuplicateEntity(EntityId(5)));
        assert!(matches!(
            sim.character_mut(EntityId(6)),
            Err(SimulationError::UnknownCharacter(EntityId(6)))
        ));
    }

    #[test]
    fn test_first_step_initializes_into_air_move() {
        let mut sim = Simulation::new(&SimulationSettings::default());
        sim.add_part(&floor_desc()).unwrap();
        sim.add_character(EntityId(10), &CharacterConfig::default(), Vec3::new(0.0, 2.0, 0.0), Quat::identity(), true)
            .unwrap();
        sim.world.update_queries();

        sim.step().unwrap();
        let events = sim.drain_events();
        assert_eq!(
            events.first().map(|(_, e)| *e),
            Some(CharacterEvent::StateExited {
                state: CharacterState::Uninitialized,
                next: CharacterState::AirMove,
            })
        );
        assert_eq!(sim.tick, 1);
        assert!(sim.drain_events().is_empty());
    }

    #[test]
    fn test_falling_character_lands_on_the_floor() {
        let mut sim = Simulation::new(&SimulationSettings::default());
        sim.add_part(&floor_desc()).unwrap();
        let id = sim
            .add_character(EntityId(10), &CharacterConfig::default(), Vec3::new(0.0, 1.0, 0.0), Quat::identity(), true)
            .unwrap();
        sim.world.update_queries();

        for _ in 0..120 {
            sim.step().unwrap();
        }
        let snapshot = sim.snapshot(id).unwrap();
        assert_eq!(snapshot.state, CharacterState::GroundMove);
        assert!(snapshot.is_grounded);
        assert!(snapshot.position[1] >= -0.01 && snapshot.position[1] < 0.1);
    }
}
