pub mod simulation;
pub mod configuration;
pub mod storage;
pub mod benchmark;

pub use simulation::particle::{Particle, NVec3, PVec3, nearest_particle, center_of_mass, total_mass};
pub use simulation::physics::Gravity;
pub use simulation::params::Parameters;
pub use simulation::octree::{Octree, OctreeNode, DebugBox};
pub use simulation::partition::{partition, Partition};
pub use simulation::thread_pool::{ThreadPool, worker_count};
pub use simulation::engine::{Simulation, StepStats, Engine, RunStats, create_backend, create_backend_or_fallback, run_steps};
pub use simulation::barnes_hut::BarnesHut;
pub use simulation::brute_force::BruteForceCpu;
#[cfg(feature = "gpu")]
pub use simulation::gpu::BruteForceGpu;
pub use simulation::seeders::{ParticleSeeder, RandomSeeder, GalaxySeeder, StarSystemSeeder, seeder_for};
pub use simulation::scenario::{Scenario, load_scenario_config};

pub use configuration::config::{BackendKind, SeederKind, EngineConfig, ParametersConfig, SeedingConfig, BodyConfig, ScenarioConfig};

pub use storage::snapshot::{ParticleRecord, write_snapshot, read_snapshot, save_snapshot, save_timestamped, load_snapshot, load_snapshot_into};

pub use benchmark::benchmark::{bench_backends, bench_theta_curve};
