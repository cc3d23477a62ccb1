use bhsolver::simulation::octree::Octree;
use bhsolver::simulation::partition::partition;
use bhsolver::simulation::thread_pool::ThreadPool;
use bhsolver::{BarnesHut, BruteForceCpu, Parameters, Particle, Simulation, NVec3, PVec3};
use bhsolver::{GalaxySeeder, ParticleSeeder, RandomSeeder, StarSystemSeeder};
use bhsolver::{create_backend, run_steps, BackendKind};
use bhsolver::{load_scenario_config, nearest_particle, read_snapshot, write_snapshot, Scenario};
use bhsolver::{center_of_mass, load_snapshot, load_snapshot_into, save_snapshot, total_mass};

use std::f64::consts::TAU;

const CENTRAL_MASS: f64 = 1.0e30;
const ORBITER_MASS: f64 = 1.0e24;
const ORBIT_UNITS: f32 = 100.0; // 1e11 m at the default distance scale

/// Default physics parameters for tests: real G, negligible softening
pub fn test_params() -> Parameters {
    Parameters {
        softening: 1.0,
        theta: 0.0,
        max_workers: 4,
        ..Parameters::default()
    }
}

/// Heavy body at rest at the origin, light body on a circular orbit in the xz plane
pub fn two_body_system(p: &Parameters) -> Vec<Particle> {
    let r = f64::from(ORBIT_UNITS) * p.distance_scale;
    let v = (p.G * (CENTRAL_MASS + ORBITER_MASS) / r).sqrt();
    vec![
        Particle::new(PVec3::zeros(), NVec3::zeros(), CENTRAL_MASS),
        Particle::new(PVec3::new(ORBIT_UNITS, 0.0, 0.0), NVec3::new(0.0, 0.0, v), ORBITER_MASS),
    ]
}

/// Kepler's third law for the two-body system above
pub fn orbital_period(p: &Parameters) -> f64 {
    let r = f64::from(ORBIT_UNITS) * p.distance_scale;
    TAU * (r.powi(3) / (p.G * (CENTRAL_MASS + ORBITER_MASS))).sqrt()
}

/// Seeded random cluster inside the default world cube
pub fn random_cluster(n: usize, seed: u64) -> Vec<Particle> {
    let mut particles = vec![Particle::default(); n];
    RandomSeeder::default().seed(&mut particles, seed);
    particles
}

fn relative_error(approx: &[NVec3], exact: &[NVec3]) -> f64 {
    let diff: f64 = approx.iter().zip(exact).map(|(a, e)| (a - e).norm()).sum();
    let total: f64 = exact.iter().map(|e| e.norm()).sum();
    diff / total
}

fn tree_forces(particles: &[Particle], p: &Parameters, theta: f64) -> Vec<NVec3> {
    let mut tree = Octree::build(particles, NVec3::zeros(), p.world_half_size, p.max_tree_depth);
    tree.calculate_mass();
    let gravity = p.gravity();
    (0..particles.len()).map(|i| tree.calculate_force(i, &gravity, theta)).collect()
}

// ==================================================================================
// Octree tests
// ==================================================================================

#[test]
fn octree_conserves_mass() {
    let p = test_params();
    let mut particles = vec![Particle::default(); 1000];
    GalaxySeeder::new(p.gravity()).seed(&mut particles, 5);

    let mut tree = Octree::build(&particles, NVec3::zeros(), p.world_half_size, p.max_tree_depth);
    tree.calculate_mass();

    let expected = total_mass(&particles);
    assert_eq!(tree.dropped(), 0);
    assert_eq!(tree.len(), particles.len());
    assert!(
        (tree.root().mass - expected).abs() <= 1e-12 * expected,
        "root mass {} != {}",
        tree.root().mass,
        expected
    );
    assert!((tree.root().com - center_of_mass(&particles)).norm() < 1e-6);
}

#[test]
fn octree_converges_to_exact_sum() {
    let p = test_params();
    let particles = random_cluster(400, 17);
    let exact = BruteForceCpu::new(&p).compute_forces(&particles, &p).unwrap();

    let err_0 = relative_error(&tree_forces(&particles, &p, 0.0), &exact);
    let err_01 = relative_error(&tree_forces(&particles, &p, 0.1), &exact);
    let err_06 = relative_error(&tree_forces(&particles, &p, 0.6), &exact);

    assert!(err_0 < 1e-10, "theta = 0 should be exact, got {err_0}");
    assert!(err_01 < 1e-3, "theta = 0.1 error too large: {err_01}");
    assert!(err_01 < err_06, "error should shrink with theta: {err_01} vs {err_06}");
}

#[test]
fn nearest_particle_fixtures() {
    let points = [
        (0.0, 0.0, 0.0),
        (1.0, 0.0, 5.0),
        (2.0, 7.0, 0.0),
        (3.0, 16.0, 0.0),
        (60.0, 0.0, 10.0),
    ];
    let particles: Vec<Particle> = points
        .iter()
        .map(|&(x, y, z)| Particle::new(PVec3::new(x, y, z), NVec3::zeros(), 1.0))
        .collect();
    let tree = Octree::build(&particles, NVec3::zeros(), 64.0, 32);

    let q1 = NVec3::new(1.0, 7.0, 1.0);
    let q2 = NVec3::new(50.0, 2.0, 7.0);

    assert_eq!(tree.nearest(q1), Some(2));
    assert_eq!(tree.nearest(q2), Some(4));
    assert_eq!(nearest_particle(&particles, q1), Some(2));
    assert_eq!(nearest_particle(&particles, q2), Some(4));
}

// ==================================================================================
// Backend tests
// ==================================================================================

fn assert_orbit_closes(sim: &mut dyn Simulation) {
    let p = test_params();
    let mut particles = two_body_system(&p);
    let start = particles[1].position;

    let steps = 5000;
    let dt = (orbital_period(&p) / steps as f64) as f32;

    sim.init(&mut particles).unwrap();
    run_steps(sim, &mut particles, &p, dt, steps).unwrap();

    let end = particles[1].position;
    let miss = (end - start).norm();
    assert!(miss < 1.0, "{}: orbit missed start by {miss} units ({:?})", sim.name(), end);

    let radius = (particles[1].position - particles[0].position).norm();
    assert!((radius - ORBIT_UNITS).abs() < 1.0, "{}: radius drifted to {radius}", sim.name());
}

#[test]
fn two_body_orbit_brute_force_cpu() {
    let mut sim = BruteForceCpu::new(&test_params());
    assert_orbit_closes(&mut sim);
}

#[test]
fn two_body_orbit_barnes_hut() {
    let mut sim = BarnesHut::new(&test_params()).unwrap();
    assert_orbit_closes(&mut sim);
}

#[test]
fn backends_are_interchangeable() {
    let p = test_params();
    let template = random_cluster(300, 23);

    let mut direct = template.clone();
    let mut tree = template.clone();
    let mut bf = BruteForceCpu::new(&p);
    let mut bh = BarnesHut::new(&p).unwrap();

    for _ in 0..3 {
        bf.update(&mut direct, &p, 3600.0).unwrap();
        bh.update(&mut tree, &p, 3600.0).unwrap();
    }

    for (a, b) in direct.iter().zip(&tree) {
        assert!((a.position - b.position).norm() < 1e-3);
        assert!((a.velocity - b.velocity).norm() <= 1e-9 * a.velocity.norm().max(1.0));
        assert_eq!(a.force, NVec3::zeros());
        assert_eq!(b.force, NVec3::zeros());
    }
}

#[test]
fn barnes_hut_reports_dropped_particles() {
    let p = test_params();
    let mut particles = random_cluster(32, 2);
    particles.push(Particle::new(PVec3::new(9000.0, 0.0, 0.0), NVec3::zeros(), 1.0e24));

    let mut sim = create_backend(BackendKind::BarnesHut, &p).unwrap();
    sim.init(&mut particles).unwrap();
    let stats = sim.update(&mut particles, &p, 1.0).unwrap();

    assert_eq!(stats.dropped, 1);
    assert_eq!(particles.len(), 33);
}

#[cfg(not(feature = "gpu"))]
#[test]
fn gpu_request_falls_back_to_cpu() {
    let p = test_params();
    let mut particles = random_cluster(8, 1);

    assert!(create_backend(BackendKind::BruteForceGpu, &p).is_err());
    let sim = bhsolver::create_backend_or_fallback(BackendKind::BruteForceGpu, &p, &mut particles).unwrap();
    assert_eq!(sim.name(), "brute-force-cpu");
}

#[cfg(feature = "gpu")]
#[test]
fn gpu_matches_cpu_within_single_precision() {
    let p = test_params();
    let template = random_cluster(256, 8);

    let mut gpu = create_backend(BackendKind::BruteForceGpu, &p).unwrap();
    let mut on_gpu = template.clone();
    if let Err(err) = gpu.init(&mut on_gpu) {
        eprintln!("skipping: no GPU available ({err:#})");
        return;
    }

    let mut on_cpu = template.clone();
    let mut cpu = BruteForceCpu::new(&p);
    gpu.update(&mut on_gpu, &p, 3600.0).unwrap();
    cpu.update(&mut on_cpu, &p, 3600.0).unwrap();

    for (g, c) in on_gpu.iter().zip(&on_cpu) {
        let dv = (g.velocity - c.velocity).norm();
        assert!(dv <= 1e-3 * c.velocity.norm().max(1.0), "velocity mismatch {dv}");
        assert!((g.position - c.position).norm() < 1e-2);
    }
}

// ==================================================================================
// Partition and pool tests
// ==================================================================================

#[test]
fn partition_covers_every_index_once() {
    for n in [0, 1, 7, 64, 1000, 1001] {
        for w in [1, 2, 3, 8, 15] {
            let plan = partition(n, w);
            let mut seen: Vec<usize> = plan
                .slices
                .iter()
                .chain(std::iter::once(&plan.remainder))
                .flat_map(|r| r.clone())
                .collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..n).collect::<Vec<_>>(), "n = {n}, w = {w}");
        }
    }
}

#[test]
fn pool_sums_static_partition() {
    let values: Vec<u64> = (0..10_000).collect();
    let pool = ThreadPool::with_workers(4, |job: &mut (Vec<u64>, u64)| {
        job.1 = job.0.iter().sum();
    })
    .unwrap();

    let plan = partition(values.len(), pool.len());
    for (w, range) in plan.assigned() {
        pool.dispatch(w, (values[range].to_vec(), 0)).unwrap();
    }
    let mut total: u64 = values[plan.remainder.clone()].iter().sum();
    for job in pool.join_all().into_iter().flatten() {
        total += job.1;
    }

    assert_eq!(total, values.iter().sum::<u64>());
}

// ==================================================================================
// Seeder tests
// ==================================================================================

#[test]
fn seeders_are_deterministic() {
    let gravity = test_params().gravity();
    let seeders: Vec<Box<dyn ParticleSeeder>> = vec![
        Box::new(RandomSeeder::default()),
        Box::new(GalaxySeeder::new(gravity)),
        Box::new(StarSystemSeeder::new(gravity)),
    ];

    for seeder in &seeders {
        let mut a = vec![Particle::default(); 256];
        let mut b = vec![Particle::default(); 256];
        let mut c = vec![Particle::default(); 256];
        seeder.seed(&mut a, 42);
        seeder.seed(&mut b, 42);
        seeder.seed(&mut c, 43);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}

// ==================================================================================
// Snapshot tests
// ==================================================================================

#[test]
fn snapshot_round_trip_is_byte_identical() {
    let mut particles = random_cluster(100, 4);
    particles[3].force = NVec3::new(1.5, -2.5, 3.25);

    let mut bytes = Vec::new();
    write_snapshot(&mut bytes, &particles).unwrap();
    assert_eq!(bytes.len(), 100 * 88);

    let loaded = read_snapshot(bytes.as_slice()).unwrap();
    assert_eq!(loaded, particles);

    let mut again = Vec::new();
    write_snapshot(&mut again, &loaded).unwrap();
    assert_eq!(again, bytes);
}

#[test]
fn loading_snapshot_recenters_on_centroid() {
    let mut particles = random_cluster(50, 6);
    for p in particles.iter_mut() {
        p.position += PVec3::new(500.0, -200.0, 100.0);
    }

    let path = std::env::temp_dir().join(format!("bhsolver_recenter_{}.bin", std::process::id()));
    save_snapshot(&path, &particles).unwrap();
    let loaded = load_snapshot(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(loaded.len(), particles.len());
    assert!(center_of_mass(&loaded).norm() < 1e-2);
    assert_eq!(loaded[0].velocity, particles[0].velocity);
}

#[test]
fn truncated_file_leaves_buffer_untouched() {
    let on_disk = random_cluster(4, 9);
    let path = std::env::temp_dir().join(format!("bhsolver_truncated_{}.bin", std::process::id()));
    save_snapshot(&path, &on_disk).unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    bytes.truncate(bytes.len() - 10);
    std::fs::write(&path, &bytes).unwrap();

    let mut particles = random_cluster(7, 2);
    let before = particles.clone();
    let result = load_snapshot_into(&path, &mut particles);
    let _ = std::fs::remove_file(&path);

    assert!(result.is_err());
    assert_eq!(particles, before);
}

// ==================================================================================
// Scenario tests
// ==================================================================================

#[test]
fn default_scenario_builds() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios/default.yaml");
    let cfg = load_scenario_config(&path).unwrap();
    let scenario = Scenario::build_scenario(cfg);

    assert_eq!(scenario.engine.backend, BackendKind::BarnesHut);
    assert_eq!(scenario.particles.len(), 2000);
    assert_eq!(scenario.parameters.max_tree_depth, 32);
}
