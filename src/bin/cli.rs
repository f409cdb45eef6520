//! platformer-sim - run headless character motion scenarios

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use platformer_motion::config::ScenarioConfig;
use platformer_motion::game::{CharacterEvent, EntityId, Simulation};

#[derive(Parser)]
#[command(name = "platformer-sim")]
#[command(about = "Headless kinematic character motion simulator", long_about = None)]
struct Cli {
    /// Log state transitions and world setup
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and print a summary per character
    Run {
        /// Path to the scenario TOML file
        scenario: PathBuf,
        /// Number of fixed ticks (overrides the scenario)
        #[arg(long)]
        ticks: Option<u64>,
        /// Fixed timestep in seconds (overrides the scenario)
        #[arg(long)]
        dt: Option<f32>,
        /// Variable updates run after each tick (overrides the scenario)
        #[arg(long)]
        render_frames_per_tick: Option<u32>,
        /// Print the final snapshots as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a scenario file without running it
    Check {
        /// Path to the scenario TOML file
        scenario: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            scenario,
            ticks,
            dt,
            render_frames_per_tick,
            json,
        } => run_scenario(&scenario, ticks, dt, render_frames_per_tick, json),
        Commands::Check { scenario } => check_scenario(&scenario),
    }
}

fn load_scenario(path: &Path) -> ScenarioConfig {
    ScenarioConfig::from_file(path).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    })
}

fn check_scenario(path: &Path) {
    let scenario = load_scenario(path);
    if let Err(e) = Simulation::from_scenario(&scenario) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    println!(
        "{}: ok ({} parts, {} characters, {} input events)",
        path.display(),
        scenario.parts.len(),
        scenario.characters.len(),
        scenario.inputs.len()
    );
}

fn run_scenario(
    path: &Path,
    ticks: Option<u64>,
    dt: Option<f32>,
    render_frames_per_tick: Option<u32>,
    json: bool,
) {
    let mut scenario = load_scenario(path);
    if let Some(ticks) = ticks {
        scenario.simulation.ticks = ticks;
    }
    if let Some(dt) = dt {
        scenario.simulation.dt = dt;
    }
    if let Some(frames) = render_frames_per_tick {
        scenario.simulation.render_frames_per_tick = frames;
    }
    if let Err(e) = scenario.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let mut sim = Simulation::from_scenario(&scenario).unwrap_or_else(|e| {
        eprintln!("Error building world: {}", e);
        std::process::exit(1);
    });

    let settings = scenario.simulation;
    let frames = settings.render_frames_per_tick;
    let frame_dt = settings.dt / frames as f32;

    let mut timeline = scenario.inputs.clone();
    timeline.sort_by_key(|event| event.tick);
    let mut next_event = 0;

    let mut transitions: BTreeMap<EntityId, usize> = BTreeMap::new();

    info!(ticks = settings.ticks, dt = settings.dt, frames, "running {}", path.display());
    for tick in 0..settings.ticks {
        while let Some(event) = timeline.get(next_event).filter(|e| e.tick <= tick) {
            if let Err(e) = sim.apply_input_event(event) {
                eprintln!("Error at tick {}: {}", tick, e);
                std::process::exit(1);
            }
            next_event += 1;
        }

        if let Err(e) = sim.step() {
            eprintln!("Error at tick {}: {}", tick, e);
            std::process::exit(1);
        }
        for _ in 0..frames {
            sim.variable_update(frame_dt);
        }

        for (id, event) in sim.drain_events() {
            if let CharacterEvent::StateEntered { state, previous } = event {
                debug!(tick, character = %id, from = ?previous, to = ?state, "entered");
                *transitions.entry(id).or_default() += 1;
            }
        }
    }

    let snapshots: Vec<_> = sim
        .characters()
        .iter()
        .filter_map(|c| sim.snapshot(c.id()))
        .collect();

    if json {
        match serde_json::to_string_pretty(&snapshots) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error serializing snapshots: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    println!("After {} ticks ({:.2}s):", sim.tick, sim.elapsed);
    for snapshot in &snapshots {
        let [px, py, pz] = snapshot.position;
        let [vx, vy, vz] = snapshot.velocity;
        println!(
            "  #{:<6} {:<18} pos ({:>8.3}, {:>8.3}, {:>8.3})  vel ({:>7.3}, {:>7.3}, {:>7.3})  grounded={}  transitions={}",
            snapshot.id,
            format!("{:?}", snapshot.state),
            px,
            py,
            pz,
            vx,
            vy,
            vz,
            snapshot.is_grounded,
            transitions.get(&EntityId(snapshot.id)).copied().unwrap_or(0),
        );
    }
}
