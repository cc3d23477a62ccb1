//! Direct O(N²) reference backend
//!
//! Same static stripes as the Barnes–Hut backend, but the threads are scoped
//! and spawned fresh for every call instead of pooled.

use std::ops::Range;
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, Result};
use log::debug;

use crate::simulation::engine::{Simulation, StepStats};
use crate::simulation::integrator::{clear_forces, semi_implicit_euler};
use crate::simulation::params::Parameters;
use crate::simulation::particle::{NVec3, Particle};
use crate::simulation::partition::partition;
use crate::simulation::physics::Gravity;
use crate::simulation::thread_pool::worker_count;

pub struct BruteForceCpu {
    workers: usize,
}

impl BruteForceCpu {
    pub fn new(params: &Parameters) -> Self {
        Self {
            workers: worker_count(params.max_workers),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Exact pairwise force on every particle, without touching the buffer.
    pub fn compute_forces(&self, particles: &[Particle], params: &Parameters) -> Result<Vec<NVec3>> {
        let gravity = params.gravity();
        let bodies: Vec<(NVec3, f64)> = particles.iter().map(|p| (p.position_f64(), p.mass)).collect();
        let plan = partition(bodies.len(), self.workers);
        let mut forces = vec![NVec3::zeros(); bodies.len()];

        thread::scope(|s| -> Result<()> {
            // Stripes are contiguous from 0, so peel them off the front in order
            let mut rest: &mut [NVec3] = &mut forces;
            let mut handles = Vec::with_capacity(plan.slices.len());
            for range in plan.slices.iter().filter(|r| !r.is_empty()) {
                let (out, tail) = std::mem::take(&mut rest).split_at_mut(range.len());
                rest = tail;
                let range = range.clone();
                let bodies = &bodies;
                let gravity = &gravity;
                handles.push(s.spawn(move || accumulate(bodies, range, out, gravity)));
            }

            accumulate(&bodies, plan.remainder.clone(), rest, &gravity);

            // Join all of them so a panic never escapes the scope
            let panicked = handles.into_iter().map(|h| h.join()).filter(Result::is_err).count();
            if panicked > 0 {
                return Err(anyhow!("{panicked} brute-force workers panicked"));
            }
            Ok(())
        })?;

        Ok(forces)
    }
}

/// Sum gravity on bodies `range` from every other body into `out`.
fn accumulate(bodies: &[(NVec3, f64)], range: Range<usize>, out: &mut [NVec3], gravity: &Gravity) {
    for (slot, i) in out.iter_mut().zip(range) {
        let (pi, mi) = bodies[i];
        let mut f = NVec3::zeros();
        for (j, &(pj, mj)) in bodies.iter().enumerate() {
            if j != i {
                f += gravity.force(pi, mi, pj, mj);
            }
        }
        *slot = f;
    }
}

impl Simulation for BruteForceCpu {
    fn name(&self) -> &'static str {
        "brute-force-cpu"
    }

    fn init(&mut self, particles: &mut [Particle]) -> Result<()> {
        debug!("brute-force-cpu: {} particles, {} threads per step", particles.len(), self.workers);
        Ok(())
    }

    fn update(&mut self, particles: &mut [Particle], params: &Parameters, dt: f32) -> Result<StepStats> {
        let start = Instant::now();
        clear_forces(particles);

        let forces = self.compute_forces(particles, params)?;
        for (p, f) in particles.iter_mut().zip(forces) {
            p.force = f;
        }

        semi_implicit_euler(particles, f64::from(dt), params.distance_scale);

        let elapsed = start.elapsed();
        debug!("brute-force-cpu step: n = {}, {:?}", particles.len(), elapsed);
        Ok(StepStats { dropped: 0, elapsed })
    }
}
