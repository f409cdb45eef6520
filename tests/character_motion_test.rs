//! Whole-scenario tests: real rapier worlds driven tick by tick through `Simulation`.
//!
//! Run with: cargo test --test character_motion_test

use approx::assert_relative_eq;

use platformer_motion::config::{CharacterConfig, ScenarioConfig, SimulationSettings};
use platformer_motion::game::input::InputAction;
use platformer_motion::game::math::{Quat, Vec3};
use platformer_motion::game::physics::{
    BodyKind, PartCategory, PartDesc, PartShape, SurfaceProperties,
};
use platformer_motion::game::zones::{JumpPad, MovingPlatform, Teleporter, ZoneVolume};
use platformer_motion::game::{CharacterEvent, CharacterState, EntityId, Simulation};

const PLAYER: EntityId = EntityId(100);

// ---------------------------------------------------------------------------
// World builders
// ---------------------------------------------------------------------------

fn cuboid(entity: u64, half_extents: Vec3, position: Vec3, kind: BodyKind, category: PartCategory) -> PartDesc {
    PartDesc {
        entity: EntityId(entity),
        shape: PartShape::Cuboid { half_extents },
        position,
        rotation: Quat::identity(),
        kind,
        category,
        surface: SurfaceProperties::default(),
        density: 1.0,
    }
}

/// 100x100 floor whose top is at `height`.
fn floor_at(height: f32) -> PartDesc {
    cuboid(
        1,
        Vec3::new(50.0, 0.5, 50.0),
        Vec3::new(0.0, height - 0.5, 0.0),
        BodyKind::Fixed,
        PartCategory::Solid,
    )
}

fn new_sim(parts: &[PartDesc]) -> Simulation {
    let mut sim = Simulation::new(&SimulationSettings::default());
    for part in parts {
        sim.add_part(part).unwrap();
    }
    sim
}

fn spawn(sim: &mut Simulation, position: Vec3) {
    sim.add_character(PLAYER, &CharacterConfig::default(), position, Quat::identity(), true)
        .unwrap();
    sim.world.update_queries();
}

fn state(sim: &Simulation) -> CharacterState {
    sim.character(PLAYER).unwrap().current_state()
}

/// Steps until the player enters `target`, returning every event seen on the way.
fn step_until_entered(sim: &mut Simulation, target: CharacterState, max_ticks: u32) -> Vec<CharacterEvent> {
    let mut seen = Vec::new();
    for _ in 0..max_ticks {
        sim.step().unwrap();
        seen.extend(sim.drain_events().into_iter().map(|(_, e)| e));
        if state(sim) == target {
            return seen;
        }
    }
    panic!("never entered {target:?}; events: {seen:?}");
}

fn assert_exit_before_enter(events: &[CharacterEvent]) {
    assert_eq!(events.len() % 2, 0, "unpaired transition events: {events:?}");
    for pair in events.chunks(2) {
        match (pair[0], pair[1]) {
            (
                CharacterEvent::StateExited { state, next },
                CharacterEvent::StateEntered { state: entered, previous },
            ) => {
                assert_eq!(next, entered);
                assert_eq!(previous, state);
            }
            other => panic!("expected exit then enter, got {other:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Grounded motion
// ---------------------------------------------------------------------------

#[test]
fn test_idle_character_stays_in_ground_move() {
    let mut sim = new_sim(&[floor_at(0.0)]);
    spawn(&mut sim, Vec3::new(0.0, 0.01, 0.0));

    let mut events = Vec::new();
    for _ in 0..240 {
        sim.step().unwrap();
        events.extend(sim.drain_events().into_iter().map(|(_, e)| e));
    }

    assert_eq!(state(&sim), CharacterState::GroundMove);
    assert_exit_before_enter(&events);
    // Uninitialized -> AirMove -> GroundMove, then nothing
    assert_eq!(events.len(), 4);

    let core = &sim.character(PLAYER).unwrap().core;
    assert!(core.body.is_grounded);
    assert!(core.body.relative_velocity.norm() < 1.0e-3);
    assert!(core.position.y.abs() < 0.05);
}

#[test]
fn test_falling_character_never_stays_airborne_once_grounded() {
    let mut sim = new_sim(&[floor_at(0.0)]);
    spawn(&mut sim, Vec3::new(0.0, 3.0, 0.0));

    let mut landed = false;
    for _ in 0..180 {
        sim.step().unwrap();
        let character = sim.character(PLAYER).unwrap();
        if character.core.body.is_grounded {
            landed = true;
            assert_ne!(character.current_state(), CharacterState::AirMove);
        }
    }
    assert!(landed);
    assert_exit_before_enter(&sim.drain_events().into_iter().map(|(_, e)| e).collect::<Vec<_>>());
}

#[test]
fn test_dash_press_dashes_then_returns_to_ground() {
    let mut sim = new_sim(&[floor_at(0.0)]);
    spawn(&mut sim, Vec3::new(0.0, 0.01, 0.0));
    step_until_entered(&mut sim, CharacterState::GroundMove, 30);

    let start_z = sim.character(PLAYER).unwrap().core.position.z;
    let tick = sim.tick;
    sim.player_inputs_mut(PLAYER).unwrap().press(InputAction::Dash, tick);
    sim.step().unwrap();
    assert_eq!(state(&sim), CharacterState::Dashing);

    let events = step_until_entered(&mut sim, CharacterState::GroundMove, 60);
    assert_exit_before_enter(&events);
    // Idle dash goes along the character's forward axis
    assert!(sim.character(PLAYER).unwrap().core.position.z - start_z > 3.0);
}

// ---------------------------------------------------------------------------
// Air motion
// ---------------------------------------------------------------------------

#[test]
fn test_air_jump_budget_then_jump_memory() {
    let mut sim = new_sim(&[]);
    spawn(&mut sim, Vec3::new(0.0, 50.0, 0.0));
    sim.step().unwrap();
    assert_eq!(state(&sim), CharacterState::AirMove);

    let tick = sim.tick;
    sim.player_inputs_mut(PLAYER).unwrap().press(InputAction::Jump, tick);
    sim.step().unwrap();
    {
        let core = &sim.character(PLAYER).unwrap().core;
        assert_eq!(core.volatile.current_ungrounded_jumps, 1);
        assert!(core.body.relative_velocity.y > 0.0);
        assert!(!core.volatile.jump_pressed_before_became_grounded);
    }

    sim.step().unwrap();
    let tick = sim.tick;
    sim.player_inputs_mut(PLAYER).unwrap().press(InputAction::Jump, tick);
    let vertical_before = sim.character(PLAYER).unwrap().core.body.relative_velocity.y;
    sim.step().unwrap();

    let core = &sim.character(PLAYER).unwrap().core;
    assert_eq!(core.volatile.current_ungrounded_jumps, 1);
    assert!(core.volatile.jump_pressed_before_became_grounded);
    assert!(core.body.relative_velocity.y < vertical_before);
}

#[test]
fn test_sprinting_into_a_wall_starts_a_wall_run() {
    // Face at x = 1, far taller than the character can reach
    let wall = cuboid(
        2,
        Vec3::new(0.5, 20.0, 10.0),
        Vec3::new(1.5, 10.0, 0.0),
        BodyKind::Fixed,
        PartCategory::Solid,
    );
    let mut sim = new_sim(&[wall]);
    spawn(&mut sim, Vec3::new(0.0, 8.0, 0.0));
    {
        let inputs = sim.player_inputs_mut(PLAYER).unwrap();
        inputs.set_move_axes(1.0, 0.0);
        inputs.sprint_held = true;
    }

    let events = step_until_entered(&mut sim, CharacterState::WallRun, 90);
    assert!(events.contains(&CharacterEvent::StateEntered {
        state: CharacterState::WallRun,
        previous: CharacterState::AirMove,
    }));
    let wall_normal = sim.character(PLAYER).unwrap().core.volatile.last_known_wall_normal;
    assert_relative_eq!(wall_normal, Vec3::new(-1.0, 0.0, 0.0), epsilon = 1.0e-2);
}

// ---------------------------------------------------------------------------
// Volumes
// ---------------------------------------------------------------------------

#[test]
fn test_falling_into_water_starts_swimming() {
    // Surface at y = 2, bottom at y = -2
    let water = cuboid(
        7,
        Vec3::new(10.0, 2.0, 10.0),
        Vec3::zeros(),
        BodyKind::Fixed,
        PartCategory::Water,
    );
    let mut sim = new_sim(&[floor_at(-2.0), water]);
    spawn(&mut sim, Vec3::new(0.0, 4.0, 0.0));

    let events = step_until_entered(&mut sim, CharacterState::Swimming, 120);
    assert_exit_before_enter(&events);

    let core = &sim.character(PLAYER).unwrap().core;
    assert!(core.volatile.distance_from_water_surface < 0.0);
    assert_relative_eq!(core.volatile.direction_to_water_surface, Vec3::y(), epsilon = 1.0e-3);
}

#[test]
fn test_rope_swing_stays_within_rope_length() {
    let anchor = PartDesc {
        shape: PartShape::Ball { radius: 0.25 },
        ..cuboid(
            6,
            Vec3::zeros(),
            Vec3::new(0.0, 10.25, 0.0),
            BodyKind::Fixed,
            PartCategory::RopeAnchor,
        )
    };
    let mut sim = new_sim(&[anchor]);
    spawn(&mut sim, Vec3::new(3.0, 2.0, 0.0));
    sim.step().unwrap();

    let tick = sim.tick;
    sim.player_inputs_mut(PLAYER).unwrap().press(InputAction::Rope, tick);
    sim.step().unwrap();
    assert_eq!(state(&sim), CharacterState::RopeSwing);

    // The constraint holds after each fixed step. Visual rotation between steps may swing the
    // attachment point past the rope length until the next step pulls it back.
    for _ in 0..180 {
        sim.step().unwrap();
        let core = &sim.character(PLAYER).unwrap().core;
        let link = core.rope_link.as_ref().expect("rope link while swinging");
        let attachment = core.position + core.rotation * core.params.local_rope_anchor_point;
        let distance = (link.anchor - attachment).norm();
        assert!(distance <= core.params.rope_length + 0.05, "rope stretched to {distance}");
        assert_relative_eq!(link.transform.length, distance, epsilon = 1.0e-4);
        sim.variable_update(sim.fixed_dt);
    }
    assert_eq!(state(&sim), CharacterState::RopeSwing);

    let tick = sim.tick;
    sim.player_inputs_mut(PLAYER).unwrap().press(InputAction::Jump, tick);
    sim.step().unwrap();
    assert_eq!(state(&sim), CharacterState::AirMove);
    assert!(sim.character(PLAYER).unwrap().core.rope_link.is_none());
}

// ---------------------------------------------------------------------------
// Zones and platforms
// ---------------------------------------------------------------------------

#[test]
fn test_jump_pad_launches_a_grounded_character() {
    let mut sim = new_sim(&[floor_at(0.0)]);
    spawn(&mut sim, Vec3::new(0.0, 0.01, 0.0));
    step_until_entered(&mut sim, CharacterState::GroundMove, 30);

    // Forward axis rotated to point straight up
    sim.zones.jump_pads.push(JumpPad {
        volume: ZoneVolume::Box {
            center: Vec3::new(0.0, 0.5, 0.0),
            half_extents: Vec3::new(1.0, 1.0, 1.0),
        },
        rotation: Quat::from_axis_angle(&Vec3::x_axis(), -std::f32::consts::FRAC_PI_2),
        jump_power: 20.0,
        ungrounding_dot_threshold: 0.0,
    });
    sim.step().unwrap();

    let character = sim.character(PLAYER).unwrap();
    assert_eq!(character.current_state(), CharacterState::AirMove);
    assert!(!character.core.body.is_grounded);
    assert!(character.core.body.relative_velocity.y > 15.0);
    assert!(character.core.position.y > 0.2);
}

#[test]
fn test_teleporter_moves_the_character_once() {
    let mut sim = new_sim(&[floor_at(0.0)]);
    sim.zones.teleporters.push(Teleporter {
        volume: ZoneVolume::Sphere {
            center: Vec3::new(0.0, 0.7, 0.0),
            radius: 1.0,
        },
        destination_position: Vec3::new(20.0, 0.01, 0.0),
        destination_rotation: Quat::identity(),
    });
    spawn(&mut sim, Vec3::new(0.0, 0.01, 0.0));

    for _ in 0..30 {
        sim.step().unwrap();
    }
    let core = &sim.character(PLAYER).unwrap().core;
    assert_relative_eq!(core.position.x, 20.0, epsilon = 1.0e-2);
    assert_eq!(state(&sim), CharacterState::GroundMove);
}

#[test]
fn test_character_rides_a_moving_platform() {
    let platform = cuboid(
        3,
        Vec3::new(3.0, 0.2, 3.0),
        Vec3::zeros(),
        BodyKind::Kinematic,
        PartCategory::Solid,
    );
    let mut sim = new_sim(&[platform]);
    sim.zones.moving_platforms.push(MovingPlatform {
        entity: EntityId(3),
        translation_axis: Vec3::x(),
        translation_amplitude: 2.0,
        translation_speed: 1.0,
        ..MovingPlatform::default()
    });
    spawn(&mut sim, Vec3::new(0.0, 0.21, 0.0));

    for _ in 0..60 {
        sim.step().unwrap();
    }

    let snapshot = sim.snapshot(PLAYER).unwrap();
    assert_eq!(snapshot.state, CharacterState::GroundMove);
    assert_eq!(snapshot.parent, Some(3));
    // Attaching keeps world velocity, so the character slips briefly before riding along
    let platform_x = 2.0 * (sim.elapsed as f32).sin();
    assert!(platform_x > 1.5);
    assert!((snapshot.position[0] - platform_x).abs() < 0.3);
}

// ---------------------------------------------------------------------------
// Scenario files
// ---------------------------------------------------------------------------

#[test]
fn test_scenario_with_input_timeline_walks_forward() {
    let scenario = ScenarioConfig::from_str(
        r#"
        [simulation]
        ticks = 90

        [[parts]]
        entity = 1
        shape = { type = "cuboid", half_extents = [50.0, 0.5, 50.0] }
        position = [0.0, -0.5, 0.0]

        [[characters]]
        id = 100
        position = [0.0, 0.01, 0.0]

        [[inputs]]
        tick = 10
        character = 100
        move_axes = [0.0, 1.0]

        [[inputs]]
        tick = 70
        character = 100
        move_axes = [0.0, 0.0]
        "#,
    )
    .unwrap();

    let mut sim = Simulation::from_scenario(&scenario).unwrap();
    let mut timeline = scenario.inputs.iter().peekable();
    for tick in 0..scenario.simulation.ticks {
        while let Some(event) = timeline.next_if(|e| e.tick <= tick) {
            sim.apply_input_event(event).unwrap();
        }
        sim.step().unwrap();
    }

    let snapshot = sim.snapshot(PLAYER).unwrap();
    assert_eq!(snapshot.state, CharacterState::GroundMove);
    assert!(snapshot.is_grounded);
    assert!(snapshot.position[2] > 4.0);
    assert!(snapshot.position[0].abs() < 1.0e-3);
}

#[test]
fn test_playground_scenario_loads_and_runs() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios/playground.toml");
    let scenario = ScenarioConfig::from_file(&path).unwrap();
    let mut sim = Simulation::from_scenario(&scenario).unwrap();

    let mut timeline = scenario.inputs.clone();
    timeline.sort_by_key(|event| event.tick);
    let mut timeline = timeline.iter().peekable();
    let mut swimmer_entered_water = false;
    for tick in 0..240 {
        while let Some(event) = timeline.next_if(|e| e.tick <= tick) {
            sim.apply_input_event(event).unwrap();
        }
        sim.step().unwrap();
        sim.variable_update(sim.fixed_dt * 0.5);
        sim.variable_update(sim.fixed_dt * 0.5);

        swimmer_entered_water |= sim.drain_events().iter().any(|(id, event)| {
            *id == EntityId(101)
                && matches!(event, CharacterEvent::StateEntered { state: CharacterState::Swimming, .. })
        });
    }

    for character in sim.characters() {
        let snapshot = sim.snapshot(character.id()).unwrap();
        assert!(snapshot.position.iter().all(|c| c.is_finite()));
        assert!(snapshot.position[1] > -1.0);
    }
    assert!(swimmer_entered_water);
}
