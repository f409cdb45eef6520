//! Character and scenario configuration parsed from TOML files

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::game::animation::AnimationSettings;
use crate::game::carrying::CarryingComponent;
use crate::game::character::geometry::{CapsuleGeometry, CharacterGeometry};
use crate::game::character::params::{CharacterParameters, KinematicCharacterProperties, StepAndSlopeSettings};
use crate::game::constants::physics as physics_consts;
use crate::game::input::InputAction;
use crate::game::math::{Quat, Vec3};
use crate::game::physics::{
    BodyKind, EntityId, PartCategory, PartDesc, PartShape, SurfaceProperties, SurfaceTags,
};
use crate::game::zones::ZoneSet;

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {}", .0.display(), .1)]
    IoError(PathBuf, #[source] std::io::Error),

    #[error("failed to parse {}: {}", .0.display(), .1)]
    ParseError(PathBuf, #[source] toml::de::Error),

    #[error("failed to parse configuration: {0}")]
    ParseStrError(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Everything that defines one character's motion.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct CharacterConfig {
    pub parameters: CharacterParameters,
    pub properties: KinematicCharacterProperties,
    pub step_and_slope: StepAndSlopeSettings,
    pub geometry: CharacterGeometry,
    /// Carried load; `None` means the character carries nothing
    pub carrying: Option<CarryingComponent>,
    pub animation: AnimationSettings,
}

impl CharacterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let presets = [
            ("standing", &self.geometry.standing),
            ("crouching", &self.geometry.crouching),
            ("rolling", &self.geometry.rolling),
            ("climbing", &self.geometry.climbing),
            ("swimming", &self.geometry.swimming),
        ];
        for (name, preset) in presets {
            validate_capsule(name, preset)?;
        }

        let params = &self.parameters;
        if params.rope_length <= 0.0 {
            return Err(ConfigError::Invalid("rope_length must be positive".into()));
        }
        if params.dash_duration < 0.0 || params.ledge_stand_up_duration < 0.0 {
            return Err(ConfigError::Invalid("durations cannot be negative".into()));
        }
        if self.properties.mass <= 0.0 {
            return Err(ConfigError::Invalid("character mass must be positive".into()));
        }
        Ok(())
    }
}

fn validate_capsule(name: &str, capsule: &CapsuleGeometry) -> Result<(), ConfigError> {
    if capsule.radius <= 0.0 || !capsule.radius.is_finite() {
        return Err(ConfigError::Invalid(format!("{name} capsule radius must be positive")));
    }
    if !capsule.height.is_finite() {
        return Err(ConfigError::Invalid(format!("{name} capsule height must be finite")));
    }
    Ok(())
}

/// Fixed-step settings of a headless run.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub dt: f32,
    pub ticks: u64,
    /// Variable updates run per physics tick
    pub render_frames_per_tick: u32,
    pub gravity: Vec3,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            dt: physics_consts::TIMESTEP,
            ticks: 600,
            render_frames_per_tick: 1,
            gravity: Vec3::new(0.0, -physics_consts::DEFAULT_GRAVITY, 0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceTag {
    Climbable,
    Sticky,
}

/// A static, kinematic or dynamic part of the world.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PartConfig {
    pub entity: EntityId,
    pub shape: PartShape,
    #[serde(default = "Vec3::zeros")]
    pub position: Vec3,
    /// Euler angles in degrees (roll, pitch, yaw around X, Y, Z)
    #[serde(default = "Vec3::zeros")]
    pub rotation_degrees: Vec3,
    #[serde(default = "default_body_kind")]
    pub kind: BodyKind,
    #[serde(default)]
    pub category: PartCategory,
    #[serde(default)]
    pub tags: Vec<SurfaceTag>,
    #[serde(default = "default_true")]
    pub collidable: bool,
    #[serde(default = "default_one")]
    pub friction: f32,
    #[serde(default = "default_one")]
    pub density: f32,
}

fn default_body_kind() -> BodyKind {
    BodyKind::Fixed
}

fn default_true() -> bool {
    true
}

fn default_one() -> f32 {
    1.0
}

impl PartConfig {
    pub fn rotation(&self) -> Quat {
        let r = self.rotation_degrees;
        Quat::from_euler_angles(r.x.to_radians(), r.y.to_radians(), r.z.to_radians())
    }

    pub fn to_desc(&self) -> PartDesc {
        let tags = self.tags.iter().fold(SurfaceTags::empty(), |tags, tag| {
            tags | match tag {
                SurfaceTag::Climbable => SurfaceTags::CLIMBABLE,
                SurfaceTag::Sticky => SurfaceTags::STICKY,
            }
        });
        PartDesc {
            entity: self.entity,
            shape: self.shape,
            position: self.position,
            rotation: self.rotation(),
            kind: self.kind,
            category: self.category,
            surface: SurfaceProperties {
                tags,
                collidable: self.collidable,
                friction: self.friction,
            },
            density: self.density,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CharacterSpawn {
    pub id: EntityId,
    #[serde(default = "Vec3::zeros")]
    pub position: Vec3,
    #[serde(default)]
    pub yaw_degrees: f32,
    /// Player-driven characters read `PlayerInputs`; others take control directly
    #[serde(default = "default_true")]
    pub player: bool,
    #[serde(default)]
    pub config: CharacterConfig,
}

impl CharacterSpawn {
    pub fn rotation(&self) -> Quat {
        Quat::from_axis_angle(&Vec3::y_axis(), self.yaw_degrees.to_radians())
    }
}

/// One entry of the scripted input timeline. Unset fields keep their previous value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InputEvent {
    pub tick: u64,
    pub character: EntityId,
    #[serde(default)]
    pub move_axes: Option<[f32; 2]>,
    #[serde(default)]
    pub jump_held: Option<bool>,
    #[serde(default)]
    pub roll_held: Option<bool>,
    #[serde(default)]
    pub sprint_held: Option<bool>,
    #[serde(default)]
    pub camera_yaw_degrees: Option<f32>,
    #[serde(default)]
    pub press: Vec<InputAction>,
}

/// A whole headless run: world, zones, characters and their inputs.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub simulation: SimulationSettings,
    pub parts: Vec<PartConfig>,
    pub zones: ZoneSet,
    pub characters: Vec<CharacterSpawn>,
    pub inputs: Vec<InputEvent>,
}

impl ScenarioConfig {
    /// Load and validate a scenario from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: ScenarioConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: ScenarioConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if sim.dt <= 0.0 || !sim.dt.is_finite() {
            return Err(ConfigError::Invalid("simulation.dt must be positive".into()));
        }
        if sim.render_frames_per_tick == 0 {
            return Err(ConfigError::Invalid("simulation.render_frames_per_tick must be at least 1".into()));
        }

        let mut entities = HashSet::new();
        let ids = self
            .parts
            .iter()
            .map(|p| p.entity)
            .chain(self.characters.iter().map(|c| c.id));
        for id in ids {
            if !entities.insert(id) {
                return Err(ConfigError::Invalid(format!("entity {id} is defined twice")));
            }
        }

        for platform in &self.zones.moving_platforms {
            let part = self.parts.iter().find(|p| p.entity == platform.entity);
            match part {
                Some(part) if part.kind == BodyKind::Kinematic => {}
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "moving platform {} must reference a kinematic part",
                        platform.entity
                    )))
                }
            }
        }

        let characters: HashSet<EntityId> = self.characters.iter().map(|c| c.id).collect();
        for event in &self.inputs {
            if !characters.contains(&event.character) {
                return Err(ConfigError::Invalid(format!(
                    "input at tick {} targets unknown character {}",
                    event.tick, event.character
                )));
            }
        }

        for spawn in &self.characters {
            spawn.config.validate()?;
        }
        Ok(())
    }
}
