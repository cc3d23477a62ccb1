use bhsolver::{load_scenario_config, run_steps, Scenario, ScenarioConfig};
use bhsolver::{create_backend_or_fallback, BackendKind};
use bhsolver::{load_snapshot, save_timestamped, center_of_mass, total_mass};
use bhsolver::{bench_backends, bench_theta_curve};

use clap::{Parser, Subcommand};
use anyhow::{bail, Result};
use log::info;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bhsolver", about = "Barnes-Hut N-body solver")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run headless and write a timestamped snapshot
    Precompute {
        /// Scenario file name, looked up under `scenarios/` if not a path
        #[arg(short, long, default_value = "default.yaml")]
        scenario: String,
        /// Override the seeded particle count
        #[arg(short = 'n', long)]
        particles: Option<usize>,
        /// Simulated time to cover (seconds)
        #[arg(short, long, default_value_t = 86_400.0 * 30.0)]
        duration: f64,
        /// Override the step size (seconds)
        #[arg(long)]
        dt: Option<f32>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(short, long, value_enum)]
        backend: Option<BackendKind>,
        #[arg(short, long, default_value = "data")]
        out_dir: PathBuf,
    },
    /// Summarise a snapshot file
    Inspect {
        file: PathBuf,
    },
    /// Time the CPU backends
    Bench {
        /// Print the theta/error curve instead
        #[arg(long)]
        theta_curve: bool,
    },
}

// load here to keep main clean
fn load_scenario(name: &str) -> Result<ScenarioConfig> {
    let direct = PathBuf::from(name);
    let path = if direct.exists() {
        direct
    } else {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios").join(name)
    };
    load_scenario_config(&path)
}

/// Steps needed to cover `duration` seconds at `dt`, rejecting values that
/// would never terminate.
fn step_count(duration: f64, dt: f32) -> Result<usize> {
    if !(dt.is_finite() && dt > 0.0) {
        bail!("time step must be positive, got {dt}");
    }
    if !(duration.is_finite() && duration >= 0.0) {
        bail!("duration must be finite and non-negative, got {duration}");
    }
    Ok((duration / f64::from(dt)).ceil() as usize)
}

fn precompute(
    scenario: &str,
    particles: Option<usize>,
    duration: f64,
    dt: Option<f32>,
    seed: Option<u64>,
    backend: Option<BackendKind>,
    out_dir: PathBuf,
) -> Result<()> {
    let mut cfg = load_scenario(scenario)?;
    if let Some(n) = particles {
        cfg.seeding.particles = n;
    }
    if let Some(seed) = seed {
        cfg.seeding.seed = seed;
    }
    if let Some(kind) = backend {
        cfg.engine.backend = kind;
    }

    let Scenario { mut engine, parameters, mut particles } = Scenario::build_scenario(cfg);
    if let Some(dt) = dt {
        engine.dt = dt;
    }
    let steps = step_count(duration, engine.dt)?;
    let mut sim = create_backend_or_fallback(engine.backend, &parameters, &mut particles)?;
    info!(
        "precomputing {steps} steps of {} s for {} particles on {}",
        engine.dt,
        particles.len(),
        sim.name()
    );

    let stats = run_steps(sim.as_mut(), &mut particles, &parameters, engine.dt, steps)?;
    info!(
        "done in {:.2?} ({:.3} ms/step), max dropped {}",
        stats.elapsed,
        stats.elapsed.as_secs_f64() * 1000.0 / stats.steps.max(1) as f64,
        stats.max_dropped
    );

    let path = save_timestamped(&out_dir, &particles)?;
    println!("{}", path.display());
    Ok(())
}

fn inspect(file: PathBuf) -> Result<()> {
    let particles = load_snapshot(&file)?;
    let extent = particles
        .iter()
        .map(|p| p.position.abs().max())
        .fold(0.0f32, f32::max);

    println!("file:        {}", file.display());
    println!("particles:   {}", particles.len());
    println!("total mass:  {:.6e} kg", total_mass(&particles));
    println!("centroid:    {:?}", center_of_mass(&particles).as_slice());
    println!("max extent:  {extent:.3} units");
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match args.command {
        Command::Precompute { scenario, particles, duration, dt, seed, backend, out_dir } => {
            precompute(&scenario, particles, duration, dt, seed, backend, out_dir)
        }
        Command::Inspect { file } => inspect(file),
        Command::Bench { theta_curve } => {
            if theta_curve {
                bench_theta_curve()
            } else {
                bench_backends()
            }
        }
    }
}
