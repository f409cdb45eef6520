use thiserror::Error;

use super::physics::EntityId;

/// Errors surfaced by the simulation container and the collision world's mutators.
///
/// Per-step motion code never produces these; detection failures inside a step resolve to
/// state transitions instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimulationError {
    #[error("unknown character {0}")]
    UnknownCharacter(EntityId),

    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),

    #[error("entity {0} is already registered")]
    DuplicateEntity(EntityId),

    #[error("entity {0} is not a kinematic body")]
    NotKinematic(EntityId),
}
