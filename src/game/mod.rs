pub mod animation;
pub mod carrying;
pub mod character;
pub mod constants;
pub mod error;
pub mod input;
pub mod math;
pub mod parent;
pub mod physics;
pub mod rope;
pub mod simulation;
mod tick_pipeline;
pub mod zones;

pub use character::states::CharacterState;
pub use character::{Character, CharacterEvent};
pub use error::SimulationError;
pub use physics::EntityId;
pub use simulation::{CharacterSnapshot, Simulation};
