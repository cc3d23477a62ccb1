pub mod particle;
pub mod physics;
pub mod params;
pub mod octree;
pub mod partition;
pub mod thread_pool;
pub mod integrator;
pub mod engine;
pub mod barnes_hut;
pub mod brute_force;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod seeders;
pub mod scenario;
