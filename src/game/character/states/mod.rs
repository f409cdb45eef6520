//! Locomotion states and the machine that switches between them.
//!
//! States are plain values held in [`ActiveState`]; dispatch is a `match` over the variant so
//! adding a state is a compile error everywhere a callback is not handled.

pub mod air_move;
pub mod climbing;
pub mod crouched;
pub mod dashing;
pub mod flying;
pub mod ground_move;
pub mod ledge_grab;
pub mod rolling;
pub mod rope_swing;
pub mod sliding;
pub mod swimming;
pub mod wall_run;

use serde::Serialize;
use tracing::debug;

use crate::game::input::{common_move_vector, PlayerInputs};
use crate::game::math::{Quat, Vec3};

use super::{CharacterCore, CharacterEvent, StepContext};

pub use air_move::AirMoveState;
pub use climbing::ClimbingState;
pub use crouched::CrouchedState;
pub use dashing::DashingState;
pub use flying::FlyingNoCollisionsState;
pub use ground_move::GroundMoveState;
pub use ledge_grab::{LedgeGrabState, LedgeStandingUpState};
pub use rolling::RollingState;
pub use rope_swing::RopeSwingState;
pub use sliding::SlidingState;
pub use swimming::SwimmingState;
pub use wall_run::WallRunState;

/// Tag of the active state, readable by animation, camera and tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CharacterState {
    Uninitialized,
    GroundMove,
    Crouched,
    AirMove,
    WallRun,
    Rolling,
    LedgeGrab,
    LedgeStandingUp,
    Dashing,
    Swimming,
    Climbing,
    FlyingNoCollisions,
    RopeSwing,
    Sliding,
}

impl CharacterState {
    pub fn can_be_affected_by_wind_zone(self) -> bool {
        matches!(
            self,
            CharacterState::GroundMove
                | CharacterState::AirMove
                | CharacterState::Crouched
                | CharacterState::Rolling
        )
    }
}

/// What the camera should follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CameraTarget {
    Default,
    Climbing,
    Swimming,
    Crouching,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CameraParameters {
    pub target: CameraTarget,
    pub calculate_up_from_gravity: bool,
}

impl CameraParameters {
    pub fn new(target: CameraTarget, calculate_up_from_gravity: bool) -> Self {
        Self { target, calculate_up_from_gravity }
    }
}

/// Callbacks every state implements. Hooks default to no-ops.
pub trait CharacterStateBehavior {
    fn on_enter(&mut self, _previous: CharacterState, _core: &mut CharacterCore, _ctx: &StepContext) {}

    fn on_exit(&mut self, _next: CharacterState, _core: &mut CharacterCore, _ctx: &StepContext) {}

    fn physics_update(&mut self, core: &mut CharacterCore, ctx: &StepContext);

    fn variable_update(&mut self, _core: &mut CharacterCore, _dt: f32) {}

    /// State-specific transitions, checked after the physics update. `None` falls through to
    /// the global transitions.
    fn detect_transitions(&mut self, core: &mut CharacterCore, ctx: &StepContext) -> Option<ActiveState>;

    fn camera_parameters(&self, _core: &CharacterCore) -> CameraParameters {
        CameraParameters::new(CameraTarget::Default, true)
    }

    fn move_vector(&self, inputs: &PlayerInputs, camera_rotation: &Quat) -> Vec3 {
        common_move_vector(inputs, camera_rotation)
    }
}

/// The active state with its data.
#[derive(Debug, Clone, PartialEq)]
pub enum ActiveState {
    Uninitialized,
    GroundMove(GroundMoveState),
    Crouched(CrouchedState),
    AirMove(AirMoveState),
    WallRun(WallRunState),
    Rolling(RollingState),
    LedgeGrab(LedgeGrabState),
    LedgeStandingUp(LedgeStandingUpState),
    Dashing(DashingState),
    Swimming(SwimmingState),
    Climbing(ClimbingState),
    FlyingNoCollisions(FlyingNoCollisionsState),
    RopeSwing(RopeSwingState),
    Sliding(SlidingState),
}

macro_rules! dispatch {
    ($state:expr, $s:ident => $body:expr, $uninitialized:expr) => {
        match $state {
            ActiveState::Uninitialized => $uninitialized,
            ActiveState::GroundMove($s) => $body,
            ActiveState::Crouched($s) => $body,
            ActiveState::AirMove($s) => $body,
            ActiveState::WallRun($s) => $body,
            ActiveState::Rolling($s) => $body,
            ActiveState::LedgeGrab($s) => $body,
            ActiveState::LedgeStandingUp($s) => $body,
            ActiveState::Dashing($s) => $body,
            ActiveState::Swimming($s) => $body,
            ActiveState::Climbing($s) => $body,
            ActiveState::FlyingNoCollisions($s) => $body,
            ActiveState::RopeSwing($s) => $body,
            ActiveState::Sliding($s) => $body,
        }
    };
}

impl ActiveState {
    pub fn ground_move() -> Self {
        ActiveState::GroundMove(GroundMoveState::default())
    }

    pub fn air_move() -> Self {
        ActiveState::AirMove(AirMoveState::default())
    }

    pub fn tag(&self) -> CharacterState {
        match self {
            ActiveState::Uninitialized => CharacterState::Uninitialized,
            ActiveState::GroundMove(_) => CharacterState::GroundMove,
            ActiveState::Crouched(_) => CharacterState::Crouched,
            ActiveState::AirMove(_) => CharacterState::AirMove,
            ActiveState::WallRun(_) => CharacterState::WallRun,
            ActiveState::Rolling(_) => CharacterState::Rolling,
            ActiveState::LedgeGrab(_) => CharacterState::LedgeGrab,
            ActiveState::LedgeStandingUp(_) => CharacterState::LedgeStandingUp,
            ActiveState::Dashing(_) => CharacterState::Dashing,
            ActiveState::Swimming(_) => CharacterState::Swimming,
            ActiveState::Climbing(_) => CharacterState::Climbing,
            ActiveState::FlyingNoCollisions(_) => CharacterState::FlyingNoCollisions,
            ActiveState::RopeSwing(_) => CharacterState::RopeSwing,
            ActiveState::Sliding(_) => CharacterState::Sliding,
        }
    }
}

/// Transitions available from every state, checked when the state itself found none.
pub fn detect_global_transitions(
    current: CharacterState,
    core: &mut CharacterCore,
    ctx: &StepContext,
) -> Option<ActiveState> {
    if current != CharacterState::Swimming && current != CharacterState::FlyingNoCollisions {
        if let Some(water) = swimming::detect_water_zones(core, ctx) {
            if water.distance < 0.0 {
                return Some(ActiveState::Swimming(SwimmingState::default()));
            }
        }
    }

    if core.control.is_fly_no_collisions_pressed() {
        return Some(if current == CharacterState::FlyingNoCollisions {
            ActiveState::air_move()
        } else {
            ActiveState::FlyingNoCollisions(FlyingNoCollisionsState)
        });
    }

    None
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateMachine {
    current: ActiveState,
    previous: CharacterState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: ActiveState::Uninitialized,
            previous: CharacterState::Uninitialized,
        }
    }

    pub fn current_state(&self) -> CharacterState {
        self.current.tag()
    }

    pub fn previous_state(&self) -> CharacterState {
        self.previous
    }

    pub fn active(&self) -> &ActiveState {
        &self.current
    }

    /// Exits the current state, then enters `next`. Exit always completes before enter starts.
    pub fn transition_to(&mut self, next: ActiveState, core: &mut CharacterCore, ctx: &StepContext) {
        let previous = self.current.tag();
        let next_tag = next.tag();

        core.events.push(CharacterEvent::StateExited { state: previous, next: next_tag });
        dispatch!(&mut self.current, s => s.on_exit(next_tag, core, ctx), ());

        self.previous = previous;
        self.current = next;

        core.events.push(CharacterEvent::StateEntered { state: next_tag, previous });
        dispatch!(&mut self.current, s => s.on_enter(previous, core, ctx), ());

        debug!(character = %core.id, from = ?previous, to = ?next_tag, "state transition");
    }

    pub fn physics_update(&mut self, core: &mut CharacterCore, ctx: &StepContext) {
        let next = dispatch!(
            &mut self.current,
            s => {
                s.physics_update(core, ctx);
                s.detect_transitions(core, ctx)
            },
            None
        );
        let next = next.or_else(|| detect_global_transitions(self.current.tag(), core, ctx));
        if let Some(next) = next {
            self.transition_to(next, core, ctx);
        }
    }

    pub fn variable_update(&mut self, core: &mut CharacterCore, dt: f32) {
        dispatch!(&mut self.current, s => s.variable_update(core, dt), ());
    }

    pub fn camera_parameters(&self, core: &CharacterCore) -> CameraParameters {
        dispatch!(
            &self.current,
            s => s.camera_parameters(core),
            CameraParameters::new(CameraTarget::Default, true)
        )
    }

    pub fn move_vector(&self, inputs: &PlayerInputs, camera_rotation: &Quat) -> Vec3 {
        dispatch!(
            &self.current,
            s => s.move_vector(inputs, camera_rotation),
            common_move_vector(inputs, camera_rotation)
        )
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::game::parent::ParentRegistry;
    use crate::game::physics::CollisionWorld;

    #[test]
    fn test_transition_exits_before_entering() {
        let mut world = CollisionWorld::new();
        floor(&mut world);
        let mut core = core_at(&mut world, Vec3::new(0.0, 0.02, 0.0));
        let parents = ParentRegistry::new();
        let ctx = step_ctx(&world, &parents, 0);

        let mut machine = StateMachine::new();
        machine.transition_to(ActiveState::air_move(), &mut core, &ctx);
        machine.transition_to(ActiveState::ground_move(), &mut core, &ctx);

        assert_eq!(
            core.events,
            vec![
                CharacterEvent::StateExited {
                    state: CharacterState::Uninitialized,
                    next: CharacterState::AirMove
                },
                CharacterEvent::StateEntered {
                    state: CharacterState::AirMove,
                    previous: CharacterState::Uninitialized
                },
                CharacterEvent::StateExited {
                    state: CharacterState::AirMove,
                    next: CharacterState::GroundMove
                },
                CharacterEvent::StateEntered {
                    state: CharacterState::GroundMove,
                    previous: CharacterState::AirMove
                },
            ]
        );
        assert_eq!(machine.previous_state(), CharacterState::AirMove);
    }

    #[test]
    fn test_fly_toggle_is_global() {
        let mut world = CollisionWorld::new();
        floor(&mut world);
        let mut core = core_at(&mut world, Vec3::new(0.0, 0.02, 0.0));
        let parents = ParentRegistry::new();
        let ctx = step_ctx(&world, &parents, 0);

        core.control
            .set_pressed(crate::game::input::InputFlags::FLY_NO_COLLISIONS_PRESSED, true);
        let next = detect_global_transitions(CharacterState::GroundMove, &mut core, &ctx);
        assert_eq!(next.map(|s| s.tag()), Some(CharacterState::FlyingNoCollisions));

        let next = detect_global_transitions(CharacterState::FlyingNoCollisions, &mut core, &ctx);
        assert_eq!(next.map(|s| s.tag()), Some(CharacterState::AirMove));
    }

    #[test]
    fn test_wind_only_affects_ground_and_air_states() {
        assert!(CharacterState::Rolling.can_be_affected_by_wind_zone());
        assert!(!CharacterState::Swimming.can_be_affected_by_wind_zone());
        assert!(!CharacterState::WallRun.can_be_affected_by_wind_zone());
    }
}
