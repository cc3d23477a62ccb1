//! Configuration types for loading simulation scenarios from YAML.
//!
//! This module defines a thin, `serde`-deserializable representation of a
//! scenario. A scenario consists of:
//!
//! - [`EngineConfig`]     – backend selection, opening angle, pool size
//! - [`ParametersConfig`] – physical constants, world bounds, time step
//! - [`SeedingConfig`]    – which seeder fills the particle buffer, and how many
//! - [`BodyConfig`]       – optional explicit bodies (override seeding)
//! - [`ScenarioConfig`]   – top-level wrapper used to load a scenario from YAML
//!
//! # YAML format
//!
//! ```yaml
//! engine:
//!   backend: "barnes-hut"     # barnes-hut | brute-force-cpu | brute-force-gpu
//!   theta: 0.5
//!   max_workers: 16
//!
//! parameters:
//!   G: 6.674e-11
//!   softening: 1.0e18         # m^2
//!   distance_scale: 1.0e9     # metres per render unit
//!   world_half_size: 4000.0   # render units
//!   max_tree_depth: 32
//!   dt: 3600.0                # seconds per step
//!
//! seeding:
//!   seeder: "galaxy"          # random | galaxy | star-system
//!   particles: 2000
//!   seed: 42
//!
//! bodies:                     # optional
//!   - x: [ 0.0, 0.0, 0.0 ]    # render units
//!     v: [ 0.0, 0.0, 0.0 ]    # m/s
//!     m: 2.0e30               # kg
//! ```
//!
//! Every field except the section headers may be omitted; missing values
//! fall back to the runtime defaults.

use serde::Deserialize;

/// Which solver backend to run
/// `backend: "barnes-hut"`, `"brute-force-cpu"` or `"brute-force-gpu"`
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    BarnesHut, // octree + worker pool, O(N log N)
    BruteForceCpu, // direct O(N^2) on scoped threads
    BruteForceGpu, // direct O(N^2) in wgpu compute kernels
}

/// Which initial-condition generator fills the buffer
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SeederKind {
    Random,
    #[default]
    Galaxy,
    StarSystem,
}

/// Engine-level configuration
#[derive(Deserialize, Debug, Clone, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub backend: BackendKind, // solver backend
    pub theta: Option<f64>,         // opening angle, 0 = exact
    pub max_workers: Option<usize>, // upper bound on worker threads
}

/// Global numerical and physical parameters for a scenario
#[allow(non_snake_case)]
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ParametersConfig {
    pub G: Option<f64>,               // gravitational constant
    pub softening: Option<f64>,       // added to d^2 (m^2)
    pub distance_scale: Option<f64>,  // metres per render unit
    pub world_half_size: Option<f64>, // root cube half extent (render units)
    pub max_tree_depth: Option<usize>, // octree depth cap
    pub dt: Option<f64>,              // seconds per step
}

/// How to generate the initial particle buffer
#[derive(Deserialize, Debug, Clone)]
pub struct SeedingConfig {
    #[serde(default)]
    pub seeder: SeederKind,
    #[serde(default = "default_particle_count")]
    pub particles: usize,
    #[serde(default)]
    pub seed: u64, // deterministic seed to make runs reproducible
}

impl Default for SeedingConfig {
    fn default() -> Self {
        Self {
            seeder: SeederKind::default(),
            particles: default_particle_count(),
            seed: 0,
        }
    }
}

fn default_particle_count() -> usize {
    1000
}

/// Configuration for a single body's initial state
#[derive(Deserialize, Debug, Clone)]
pub struct BodyConfig {
    pub x: [f32; 3],            // position (render units)
    #[serde(default)]
    pub v: [f64; 3],            // velocity (m/s)
    pub m: f64,                 // mass (kg)
    pub color: Option<[f32; 4]>, // presentation only
}

/// Top-level scenario configuration loaded from YAML.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub parameters: ParametersConfig,
    #[serde(default)]
    pub seeding: SeedingConfig,
    #[serde(default)]
    pub bodies: Vec<BodyConfig>, // explicit bodies; when present seeding is skipped
}
