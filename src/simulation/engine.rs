//! Runtime engine: the backend contract and backend selection
//!
//! Every solver implements [`Simulation`]. The caller owns the particle
//! buffer and hands it to `init` once and to `update` every step; backends
//! never resize it. Backends are chosen at runtime through [`BackendKind`].

use std::time::Duration;

use anyhow::{bail, Result};
use log::{info, warn};

use crate::configuration::config::BackendKind;
use crate::simulation::barnes_hut::BarnesHut;
use crate::simulation::brute_force::BruteForceCpu;
use crate::simulation::octree::DebugBox;
use crate::simulation::params::Parameters;
use crate::simulation::particle::Particle;

/// What one `update` did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepStats {
    pub dropped: usize,     // particles left out of the spatial index
    pub elapsed: Duration,  // wall time of the step
}

/// Common interface of all solver backends.
pub trait Simulation {
    fn name(&self) -> &'static str;

    /// Backend-specific setup for `particles` (device buffers and so on).
    fn init(&mut self, particles: &mut [Particle]) -> Result<()>;

    /// Advance every particle by `dt` seconds.
    fn update(&mut self, particles: &mut [Particle], params: &Parameters, dt: f32) -> Result<StepStats>;

    /// Geometry of the last spatial index, if the backend keeps one.
    fn debug_bounds(&self) -> Vec<DebugBox> {
        Vec::new()
    }
}

/// High-level settings for driving a run.
#[derive(Debug, Clone)]
pub struct Engine {
    pub backend: BackendKind, // which solver to construct
    pub dt: f32,              // seconds per step
}

/// Totals over several steps.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunStats {
    pub steps: usize,
    pub max_dropped: usize,
    pub elapsed: Duration,
}

/// Construct a backend. GPU device setup is deferred to `init`.
pub fn create_backend(kind: BackendKind, params: &Parameters) -> Result<Box<dyn Simulation>> {
    match kind {
        BackendKind::BarnesHut => Ok(Box::new(BarnesHut::new(params)?)),
        BackendKind::BruteForceCpu => Ok(Box::new(BruteForceCpu::new(params))),
        #[cfg(feature = "gpu")]
        BackendKind::BruteForceGpu => Ok(Box::new(crate::simulation::gpu::BruteForceGpu::new())),
        #[cfg(not(feature = "gpu"))]
        BackendKind::BruteForceGpu => bail!("brute-force-gpu backend requires the `gpu` feature"),
    }
}

/// Construct and initialise `kind`, falling back to `BruteForceCpu` if either
/// step fails.
pub fn create_backend_or_fallback(
    kind: BackendKind,
    params: &Parameters,
    particles: &mut [Particle],
) -> Result<Box<dyn Simulation>> {
    let attempt = create_backend(kind, params).and_then(|mut sim| {
        sim.init(particles)?;
        Ok(sim)
    });

    match attempt {
        Ok(sim) => {
            info!("using {} backend", sim.name());
            Ok(sim)
        }
        Err(err) if kind != BackendKind::BruteForceCpu => {
            warn!("{kind:?} backend unavailable ({err:#}); falling back to brute-force-cpu");
            let mut sim: Box<dyn Simulation> = Box::new(BruteForceCpu::new(params));
            sim.init(particles)?;
            Ok(sim)
        }
        Err(err) => Err(err),
    }
}

/// Run `steps` fixed steps of `dt` seconds.
pub fn run_steps(
    sim: &mut dyn Simulation,
    particles: &mut [Particle],
    params: &Parameters,
    dt: f32,
    steps: usize,
) -> Result<RunStats> {
    if !(dt.is_finite() && dt > 0.0) {
        bail!("time step must be positive and finite, got {dt}");
    }

    let mut stats = RunStats::default();
    for _ in 0..steps {
        let step = sim.update(particles, params, dt)?;
        stats.steps += 1;
        stats.max_dropped = stats.max_dropped.max(step.dropped);
        stats.elapsed += step.elapsed;
    }
    Ok(stats)
}
