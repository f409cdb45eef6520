use rayon::prelude::*;
use tracing::trace;

use super::character::{Character, StepContext, StepTime};
use super::error::SimulationError;
use super::physics::CollisionWorld;
use super::simulation::Simulation;

/// Executes simulation phases for one tick.
/// Ordered so every character reads one consistent world:
/// platforms -> world step -> input -> character motion (parallel) -> sync back.
pub(super) fn run_tick_phases(sim: &mut Simulation) -> Result<(), SimulationError> {
    let Simulation {
        world,
        parents,
        zones,
        characters,
        fixed_dt,
        tick,
        elapsed,
        ..
    } = sim;
    let dt = *fixed_dt;
    let time = StepTime {
        delta_time: dt,
        elapsed_time: *elapsed,
        tick: *tick,
    };

    // Move kinematic platforms to this tick's pose, then step dynamic bodies.
    zones.drive_platforms(world, (*elapsed + f64::from(dt)) as f32)?;
    world.step(dt);
    world.refresh_tracked_transforms();

    // Update query pipeline before character movement so queries see current poses.
    world.update_queries();

    // Convert player inputs with each state's move-vector policy.
    for character in characters.iter_mut() {
        character.apply_player_inputs(time.tick);
    }

    // Characters only read the world here; their writes are queued on the character.
    let world_gravity = world.gravity;
    let zones = &*zones;
    let ctx = StepContext {
        world: &*world,
        parents: &*parents,
        time,
    };
    characters.par_iter_mut().for_each(|character| {
        zones.apply_to_character(character, &world_gravity, dt);
        character.physics_update(&ctx);
    });

    // Apply queued world writes in a stable order.
    for character in characters.iter_mut() {
        sync_character_to_world(world, character);
    }
    world.update_queries();

    trace!(tick = time.tick, characters = characters.len(), "tick complete");
    Ok(())
}

fn sync_character_to_world(world: &mut CollisionWorld, character: &mut Character) {
    let core = &mut character.core;
    world.set_character_pose(core.body_handle, &core.position, &core.rotation);

    if core.pending.shape_dirty {
        world.set_character_shape(core.collider_handle, &core.active_geometry);
    }
    if core.pending.collisions_dirty {
        world.set_character_collisions_enabled(core.collider_handle, core.collisions_enabled);
    }
    for impulse in core.pending.impulses.drain(..) {
        world.apply_impulse(impulse.body, &impulse.impulse, &impulse.point);
    }
    core.pending.shape_dirty = false;
    core.pending.collisions_dirty = false;
}
