//! Deterministic initial conditions
//!
//! A seeder overwrites every particle of a pre-sized buffer. Each one drives
//! a `ChaCha8Rng` seeded from the caller's `u64`, so the same seed always
//! yields the same buffer. Disks lie in the xz plane (y up).

use std::f64::consts::{PI, TAU};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::configuration::config::SeederKind;
use crate::simulation::particle::{NVec3, PVec3, Particle};
use crate::simulation::physics::Gravity;

pub trait ParticleSeeder {
    fn seed(&self, particles: &mut [Particle], seed: u64);
}

/// Build the seeder named by a scenario file.
pub fn seeder_for(kind: SeederKind, gravity: Gravity) -> Box<dyn ParticleSeeder> {
    match kind {
        SeederKind::Random => Box::new(RandomSeeder::default()),
        SeederKind::Galaxy => Box::new(GalaxySeeder::new(gravity)),
        SeederKind::StarSystem => Box::new(StarSystemSeeder::new(gravity)),
    }
}

/// Unit vector tangent to a counter-clockwise orbit in the xz plane.
fn orbit_tangent(position: &NVec3) -> NVec3 {
    let t = NVec3::new(-position.z, 0.0, position.x);
    let n = t.norm();
    if n > 0.0 { t / n } else { NVec3::zeros() }
}

fn random_color(rng: &mut ChaCha8Rng) -> [f32; 4] {
    [rng.gen_range(0.3..1.0), rng.gen_range(0.3..1.0), rng.gen_range(0.3..1.0), 1.0]
}

// ======================================================================================
// Random
// ======================================================================================

/// Uniform cube with radial-outward velocities.
#[derive(Debug, Clone)]
pub struct RandomSeeder {
    pub half_extent: f32,      // cube half size (render units)
    pub max_speed: f64,        // m/s
    pub mass_range: (f64, f64), // kg
}

impl Default for RandomSeeder {
    fn default() -> Self {
        Self {
            half_extent: 2000.0,
            max_speed: 5.0e3,
            mass_range: (1.0e22, 1.0e26),
        }
    }
}

impl ParticleSeeder for RandomSeeder {
    fn seed(&self, particles: &mut [Particle], seed: u64) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let h = self.half_extent;

        for p in particles.iter_mut() {
            let position = PVec3::new(rng.gen_range(-h..h), rng.gen_range(-h..h), rng.gen_range(-h..h));
            let dir = position.cast::<f64>().try_normalize(0.0).unwrap_or_else(NVec3::zeros);
            let speed = rng.gen_range(0.0..self.max_speed);
            let mass = rng.gen_range(self.mass_range.0..self.mass_range.1);

            *p = Particle::new(position, dir * speed, mass).with_color(random_color(&mut rng));
        }
    }
}

// ======================================================================================
// Galaxy
// ======================================================================================

/// Central mass, two logarithmic spiral arms and a scattered disk.
#[derive(Debug, Clone)]
pub struct GalaxySeeder {
    pub gravity: Gravity,       // for orbital speeds
    pub radius: f32,            // disk radius (render units)
    pub central_mass: f64,      // kg
    pub star_mass: (f64, f64),  // kg
    pub arm_fraction: f64,      // share of non-central particles on the arms
    pub arm_tightness: f64,     // b in r = a * e^(b * phi)
    pub thickness: f32,         // half height of the disk (render units)
}

impl GalaxySeeder {
    pub fn new(gravity: Gravity) -> Self {
        Self {
            gravity,
            radius: 3000.0,
            central_mass: 1.0e32,
            star_mass: (1.0e23, 1.0e26),
            arm_fraction: 0.6,
            arm_tightness: 0.3,
            thickness: 20.0,
        }
    }

    fn orbiting(&self, rng: &mut ChaCha8Rng, x: f64, z: f64, color: [f32; 4]) -> Particle {
        let y = rng.gen_range(-self.thickness..=self.thickness);
        let position = PVec3::new(x as f32, y, z as f32);
        let pos = position.cast::<f64>();

        let r_phys = (x * x + z * z).sqrt() * self.gravity.distance_scale;
        let speed = self.gravity.circular_speed(self.central_mass, r_phys);
        let mass = rng.gen_range(self.star_mass.0..self.star_mass.1);

        Particle::new(position, orbit_tangent(&pos) * speed, mass).with_color(color)
    }
}

impl ParticleSeeder for GalaxySeeder {
    fn seed(&self, particles: &mut [Particle], seed: u64) {
        let Some((core, stars)) = particles.split_first_mut() else {
            return;
        };
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        *core = Particle::new(PVec3::zeros(), NVec3::zeros(), self.central_mass)
            .with_color([1.0, 0.9, 0.6, 1.0]);

        let radius = f64::from(self.radius);
        let inner = 0.05 * radius;
        let arm_count = (stars.len() as f64 * self.arm_fraction) as usize;
        let (arms, disk) = stars.split_at_mut(arm_count.min(stars.len()));

        for (k, p) in arms.iter_mut().enumerate() {
            // r = inner * e^(b * phi), arms offset by pi
            let r = rng.gen_range(inner..radius);
            let phi = (r / inner).ln() / self.arm_tightness + (k % 2) as f64 * PI;
            let spread = 0.04 * r;
            let x = r * phi.cos() + rng.gen_range(-spread..=spread);
            let z = r * phi.sin() + rng.gen_range(-spread..=spread);
            *p = self.orbiting(&mut rng, x, z, [0.6, 0.75, 1.0, 1.0]);
        }

        for p in disk.iter_mut() {
            // sqrt for uniform area density
            let r = inner + (radius - inner) * rng.gen::<f64>().sqrt();
            let phi = rng.gen_range(0.0..TAU);
            *p = self.orbiting(&mut rng, r * phi.cos(), r * phi.sin(), [1.0, 1.0, 1.0, 0.8]);
        }
    }
}

// ======================================================================================
// Star system
// ======================================================================================

/// One dominant star at rest with planets on near-circular orbits.
#[derive(Debug, Clone)]
pub struct StarSystemSeeder {
    pub gravity: Gravity,
    pub central_mass: f64,       // kg
    pub orbit_radius: (f64, f64), // render units
    pub planet_mass: (f64, f64),  // kg
    pub perturbation: f32,       // max out-of-plane offset (render units)
}

impl StarSystemSeeder {
    pub fn new(gravity: Gravity) -> Self {
        Self {
            gravity,
            central_mass: 2.0e30,
            orbit_radius: (50.0, 1500.0),
            planet_mass: (1.0e22, 1.0e26),
            perturbation: 5.0,
        }
    }
}

impl ParticleSeeder for StarSystemSeeder {
    fn seed(&self, particles: &mut [Particle], seed: u64) {
        let Some((star, planets)) = particles.split_first_mut() else {
            return;
        };
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        *star = Particle::new(PVec3::zeros(), NVec3::zeros(), self.central_mass)
            .with_color([1.0, 0.85, 0.3, 1.0]);

        for p in planets.iter_mut() {
            let r = rng.gen_range(self.orbit_radius.0..self.orbit_radius.1);
            let phi = rng.gen_range(0.0..TAU);
            let y = rng.gen_range(-self.perturbation..=self.perturbation);
            let position = PVec3::new((r * phi.cos()) as f32, y, (r * phi.sin()) as f32);

            let speed = self.gravity.circular_speed(self.central_mass, r * self.gravity.distance_scale);
            let velocity = orbit_tangent(&position.cast::<f64>()) * speed;
            let mass = rng.gen_range(self.planet_mass.0..self.planet_mass.1);

            *p = Particle::new(position, velocity, mass).with_color(random_color(&mut rng));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::params::Parameters;

    #[test]
    fn galaxy_core_is_heaviest_and_at_rest() {
        let mut ps = vec![Particle::default(); 500];
        GalaxySeeder::new(Parameters::default().gravity()).seed(&mut ps, 7);

        assert_eq!(ps[0].position, PVec3::zeros());
        assert_eq!(ps[0].velocity, NVec3::zeros());
        assert!(ps[1..].iter().all(|p| p.mass < ps[0].mass));
        assert!(ps[1..].iter().all(|p| p.position.xz().norm() <= 3000.0 * 1.1));
    }

    #[test]
    fn star_system_orbits_are_tangential() {
        let mut ps = vec![Particle::default(); 64];
        StarSystemSeeder::new(Parameters::default().gravity()).seed(&mut ps, 3);

        for p in &ps[1..] {
            let radial = p.position_f64().xz().normalize();
            let v = p.velocity.xz();
            assert!(radial.dot(&v).abs() < 1e-6 * v.norm());
        }
    }

    #[test]
    fn random_velocities_point_outward() {
        let mut ps = vec![Particle::default(); 64];
        RandomSeeder::default().seed(&mut ps, 11);
        assert!(ps.iter().all(|p| p.position_f64().dot(&p.velocity) >= 0.0));
        assert!(ps.iter().all(|p| p.position.abs().max() <= 2000.0));
    }

    #[test]
    fn empty_buffer_is_left_alone() {
        let mut ps: Vec<Particle> = Vec::new();
        GalaxySeeder::new(Parameters::default().gravity()).seed(&mut ps, 1);
        StarSystemSeeder::new(Parameters::default().gravity()).seed(&mut ps, 1);
        RandomSeeder::default().seed(&mut ps, 1);
    }
}
