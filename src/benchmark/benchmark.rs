use std::time::Instant;

use anyhow::Result;

use crate::simulation::barnes_hut::BarnesHut;
use crate::simulation::brute_force::BruteForceCpu;
use crate::simulation::engine::Simulation;
use crate::simulation::octree::Octree;
use crate::simulation::params::Parameters;
use crate::simulation::particle::{NVec3, PVec3, Particle};

/// Helper to build a deterministic particle buffer of size `n`
fn make_particles(n: usize) -> Vec<Particle> {
    (0..n)
        .map(|i| {
            let i_f = i as f32;
            // deterministic positions, no rand needed
            let x = PVec3::new(
                (i_f * 0.37).sin() * 1000.0,
                (i_f * 0.13).cos() * 1000.0,
                (i_f * 0.07).sin() * 1000.0,
            );
            Particle::new(x, NVec3::zeros(), 1.0e24)
        })
        .collect()
}

/// Time one step of `sim` on a fresh copy of `template`, after one warm-up step.
fn time_step(sim: &mut dyn Simulation, template: &[Particle], params: &Parameters, steps: usize) -> Result<f64> {
    let mut particles = template.to_vec();
    sim.init(&mut particles)?;
    sim.update(&mut particles, params, 1.0)?;

    let t0 = Instant::now();
    for _ in 0..steps {
        sim.update(&mut particles, params, 1.0)?;
    }
    Ok(t0.elapsed().as_secs_f64() / steps as f64)
}

/// Compare direct and Barnes–Hut steps across N
pub fn bench_backends() -> Result<()> {
    let ns = [200, 400, 800, 1600, 3200, 6400, 12800];
    let params = Parameters::default();

    let mut direct = BruteForceCpu::new(&params);
    let mut bh = BarnesHut::new(&params)?;

    for n in ns {
        let template = make_particles(n);
        // Large n: only 1 step to avoid minutes of runtime
        let steps = if n <= 1600 { 3 } else { 1 };

        let dt_direct = time_step(&mut direct, &template, &params, steps)?;
        let dt_bh = time_step(&mut bh, &template, &params, steps)?;

        println!("N = {n:5}, direct step = {dt_direct:8.6} s,   BH step = {dt_bh:8.6} s");
    }
    Ok(())
}

/// Force error and query time against theta for a fixed buffer
/// Paste output directly into a spreadsheet to graph
pub fn bench_theta_curve() -> Result<()> {
    let n = 4000;
    let mut params = Parameters::default();
    let particles = make_particles(n);

    let exact = BruteForceCpu::new(&params).compute_forces(&particles, &params)?;
    let mut tree = Octree::build(&particles, NVec3::zeros(), params.world_half_size, params.max_tree_depth);
    tree.calculate_mass();

    println!("theta,mean_rel_error,ms");
    for step in 0..=12 {
        params.theta = step as f64 * 0.1;
        let gravity = params.gravity();

        let t0 = Instant::now();
        let approx: Vec<NVec3> = (0..n).map(|i| tree.calculate_force(i, &gravity, params.theta)).collect();
        let ms = t0.elapsed().as_secs_f64() * 1000.0;

        let error: f64 = approx
            .iter()
            .zip(&exact)
            .map(|(a, e)| if e.norm() > 0.0 { (a - e).norm() / e.norm() } else { 0.0 })
            .sum::<f64>()
            / n as f64;

        println!("{:.1},{:.6e},{:.3}", params.theta, error, ms);
    }
    Ok(())
}
