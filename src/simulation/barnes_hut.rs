//! # Barnes–Hut backend
//!
//! Per step:
//! 1. build a fresh [`Octree`] over the world cube and aggregate its masses,
//! 2. split `0..n` into one stripe per pool worker (remainder stays here),
//! 3. dispatch a force task per stripe, evaluate the remainder meanwhile,
//! 4. join every dispatched worker,
//! 5. copy forces into the particles and integrate sequentially.
//!
//! The tree is shared read-only behind an `Arc` and each task owns its output
//! buffer, so workers never touch the particle array.

use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use log::{debug, info, warn};

use crate::simulation::engine::{Simulation, StepStats};
use crate::simulation::integrator::{clear_forces, semi_implicit_euler};
use crate::simulation::octree::{DebugBox, Octree};
use crate::simulation::params::Parameters;
use crate::simulation::particle::{NVec3, Particle};
use crate::simulation::partition::partition;
use crate::simulation::physics::Gravity;
use crate::simulation::thread_pool::ThreadPool;

/// One worker's share of a step.
pub struct ForceTask {
    tree: Arc<Octree>,
    gravity: Gravity,
    theta: f64,
    range: Range<usize>,
    forces: Vec<NVec3>, // forces[k] belongs to particle range.start + k
}

fn evaluate(task: &mut ForceTask) {
    let ForceTask { tree, gravity, theta, range, forces } = task;
    forces.clear();
    forces.extend(range.clone().map(|i| tree.calculate_force(i, gravity, *theta)));
}

pub struct BarnesHut {
    pool: ThreadPool<ForceTask>,
    buffers: Vec<Vec<NVec3>>,  // per-worker output buffers, reused across steps
    tree: Option<Arc<Octree>>, // last step's tree, kept for debug geometry
}

impl BarnesHut {
    pub fn new(params: &Parameters) -> Result<Self> {
        let pool = ThreadPool::new(params.max_workers, evaluate)?;
        let buffers = vec![Vec::new(); pool.len()];
        Ok(Self {
            pool,
            buffers,
            tree: None,
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.len()
    }

    /// Tree built during the most recent `update`.
    pub fn last_tree(&self) -> Option<&Octree> {
        self.tree.as_deref()
    }

    /// Fill `force` on every particle from `tree`, in parallel.
    fn compute_forces(&mut self, particles: &mut [Particle], tree: &Arc<Octree>, params: &Parameters) -> Result<()> {
        let gravity = params.gravity();
        let theta = params.theta;
        let plan = partition(particles.len(), self.pool.len());

        let mut dispatched = Vec::with_capacity(self.pool.len());
        let mut dispatch_error = None;
        for (worker, range) in plan.assigned() {
            let task = ForceTask {
                tree: Arc::clone(tree),
                gravity,
                theta,
                range,
                forces: std::mem::take(&mut self.buffers[worker]),
            };
            if let Err(err) = self.pool.dispatch(worker, task) {
                dispatch_error = Some(err);
                break;
            }
            dispatched.push(worker);
        }

        // Remainder on the calling thread while the workers run
        for i in plan.remainder.clone() {
            particles[i].force = tree.calculate_force(i, &gravity, theta);
        }

        // Barrier: every dispatched worker is joined, even after a failure
        let mut failed = Vec::new();
        for worker in dispatched {
            match self.pool.join(worker) {
                Some(task) => {
                    for (p, f) in particles[task.range.clone()].iter_mut().zip(&task.forces) {
                        p.force = *f;
                    }
                    self.buffers[worker] = task.forces;
                }
                None => failed.push(worker),
            }
        }

        if let Some(err) = dispatch_error {
            return Err(err);
        }
        if !failed.is_empty() {
            bail!("force evaluation failed on workers {failed:?}");
        }
        Ok(())
    }
}

impl Simulation for BarnesHut {
    fn name(&self) -> &'static str {
        "barnes-hut"
    }

    fn init(&mut self, particles: &mut [Particle]) -> Result<()> {
        info!(
            "barnes-hut: {} particles, {} workers",
            particles.len(),
            self.pool.len()
        );
        Ok(())
    }

    fn update(&mut self, particles: &mut [Particle], params: &Parameters, dt: f32) -> Result<StepStats> {
        let start = Instant::now();
        clear_forces(particles);

        let mut tree = Octree::build(
            particles,
            NVec3::zeros(),
            params.world_half_size,
            params.max_tree_depth,
        );
        tree.calculate_mass();

        let dropped = tree.dropped();
        if dropped > 0 {
            warn!(
                "{dropped} particles outside the ±{} world cube were left out of the tree",
                params.world_half_size
            );
        }

        let tree = Arc::new(tree);
        if let Err(err) = self.compute_forces(particles, &tree, params) {
            clear_forces(particles);
            return Err(err);
        }

        semi_implicit_euler(particles, f64::from(dt), params.distance_scale);

        let elapsed = start.elapsed();
        debug!(
            "barnes-hut step: n = {}, nodes = {}, dropped = {dropped}, {:?}",
            particles.len(),
            tree.nodes().len(),
            elapsed
        );
        self.tree = Some(tree);

        Ok(StepStats { dropped, elapsed })
    }

    fn debug_bounds(&self) -> Vec<DebugBox> {
        self.tree.as_ref().map(|t| t.bounds()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::particle::PVec3;

    fn unit_params() -> Parameters {
        Parameters {
            G: 1.0,
            softening: 0.0,
            theta: 0.0,
            distance_scale: 1.0,
            world_half_size: 100.0,
            max_tree_depth: 16,
            max_workers: 3,
        }
    }

    fn ring(n: usize) -> Vec<Particle> {
        (0..n)
            .map(|i| {
                let a = i as f32 * 0.7;
                Particle::new(PVec3::new(10.0 * a.cos(), 10.0 * a.sin(), (i % 5) as f32), NVec3::zeros(), 1.0)
            })
            .collect()
    }

    #[test]
    fn parallel_forces_match_serial_query() {
        let params = unit_params();
        let mut particles = ring(37);
        let mut sim = BarnesHut::new(&params).unwrap();

        let mut tree = Octree::build(&particles, NVec3::zeros(), params.world_half_size, params.max_tree_depth);
        tree.calculate_mass();
        let tree = Arc::new(tree);
        sim.compute_forces(&mut particles, &tree, &params).unwrap();

        for (i, p) in particles.iter().enumerate() {
            let expected = tree.calculate_force(i, &params.gravity(), params.theta);
            assert_eq!(p.force, expected, "particle {i}");
        }
    }

    #[test]
    fn update_reports_dropped_and_clears_forces() {
        let params = unit_params();
        let mut particles = ring(8);
        particles.push(Particle::new(PVec3::new(500.0, 0.0, 0.0), NVec3::zeros(), 1.0));

        let mut sim = BarnesHut::new(&params).unwrap();
        sim.init(&mut particles).unwrap();
        let stats = sim.update(&mut particles, &params, 0.01).unwrap();

        assert_eq!(stats.dropped, 1);
        assert!(particles.iter().all(|p| p.force == NVec3::zeros()));
        // the outlier still fell toward the ring
        assert!(particles[8].velocity.x < 0.0);
        assert!(!sim.debug_bounds().is_empty());
    }

    #[test]
    fn empty_buffer_is_a_no_op() {
        let params = unit_params();
        let mut sim = BarnesHut::new(&params).unwrap();
        let stats = sim.update(&mut [], &params, 1.0).unwrap();
        assert_eq!(stats.dropped, 0);
    }
}
