//! Build fully-initialized simulation scenarios from configuration
//!
//! Takes a `ScenarioConfig` (YAML-facing) and produces a runtime bundle
//! containing:
//! - engine settings (`Engine`)
//! - numerical parameters (`Parameters`)
//! - the particle buffer at t = 0, from explicit bodies or a seeder

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;

use crate::configuration::config::{BodyConfig, ScenarioConfig};
use crate::simulation::engine::Engine;
use crate::simulation::params::Parameters;
use crate::simulation::particle::{NVec3, PVec3, Particle};
use crate::simulation::seeders::seeder_for;

/// A fully-initialized scenario: what to run, with which constants, on which
/// particles.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub engine: Engine,
    pub parameters: Parameters,
    pub particles: Vec<Particle>,
}

/// Read a scenario file.
pub fn load_scenario_config(path: &Path) -> Result<ScenarioConfig> {
    let file = File::open(path).with_context(|| format!("failed to open scenario {}", path.display()))?;
    let cfg = serde_yaml::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse scenario {}", path.display()))?;
    Ok(cfg)
}

impl Scenario {
    pub fn build_scenario(cfg: ScenarioConfig) -> Self {
        // Parameters (runtime) from ParametersConfig + EngineConfig
        let defaults = Parameters::default();
        let p_cfg = &cfg.parameters;
        let parameters = Parameters {
            G: p_cfg.G.unwrap_or(defaults.G),
            softening: p_cfg.softening.unwrap_or(defaults.softening),
            theta: cfg.engine.theta.unwrap_or(defaults.theta),
            distance_scale: p_cfg.distance_scale.unwrap_or(defaults.distance_scale),
            world_half_size: p_cfg.world_half_size.unwrap_or(defaults.world_half_size),
            max_tree_depth: p_cfg.max_tree_depth.unwrap_or(defaults.max_tree_depth),
            max_workers: cfg.engine.max_workers.unwrap_or(defaults.max_workers),
        };

        // Engine (runtime) from EngineConfig
        let engine = Engine {
            backend: cfg.engine.backend,
            dt: p_cfg.dt.unwrap_or(3600.0) as f32,
        };

        // Particles: explicit bodies win over the seeder
        let particles = if cfg.bodies.is_empty() {
            let mut particles = vec![Particle::default(); cfg.seeding.particles];
            seeder_for(cfg.seeding.seeder, parameters.gravity()).seed(&mut particles, cfg.seeding.seed);
            info!(
                "seeded {} particles with {:?} (seed {})",
                particles.len(),
                cfg.seeding.seeder,
                cfg.seeding.seed
            );
            particles
        } else {
            cfg.bodies.iter().map(body_from_config).collect()
        };

        Self {
            engine,
            parameters,
            particles,
        }
    }
}

fn body_from_config(bc: &BodyConfig) -> Particle {
    let p = Particle::new(PVec3::from(bc.x), NVec3::from(bc.v), bc.m);
    match bc.color {
        Some(color) => p.with_color(color),
        None => p,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::config::{BackendKind, SeedingConfig, SeederKind};

    #[test]
    fn explicit_bodies_override_seeding() {
        let cfg = ScenarioConfig {
            bodies: vec![BodyConfig {
                x: [1.0, 0.0, 0.0],
                v: [0.0, 2.0, 0.0],
                m: 3.0,
                color: None,
            }],
            ..Default::default()
        };
        let scenario = Scenario::build_scenario(cfg);
        assert_eq!(scenario.particles.len(), 1);
        assert_eq!(scenario.particles[0].velocity, NVec3::new(0.0, 2.0, 0.0));
        assert_eq!(scenario.engine.backend, BackendKind::BarnesHut);
    }

    #[test]
    fn seeding_fills_requested_count() {
        let cfg = ScenarioConfig {
            seeding: SeedingConfig {
                seeder: SeederKind::Random,
                particles: 50,
                seed: 1,
            },
            ..Default::default()
        };
        let scenario = Scenario::build_scenario(cfg);
        assert_eq!(scenario.particles.len(), 50);
        assert_eq!(scenario.parameters, Parameters::default());
    }
}
