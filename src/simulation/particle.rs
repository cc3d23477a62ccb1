//! Core particle type shared by every backend.
//!
//! Positions are stored in single precision render-space units so they can be
//! handed to a renderer as-is. Velocity, force and mass are double precision
//! physical quantities (m/s, N, kg); `Parameters::distance_scale` converts
//! render units to metres.

use nalgebra::Vector3;

pub type NVec3 = Vector3<f64>;
pub type PVec3 = Vector3<f32>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: PVec3, // render-space position
    pub velocity: NVec3, // m/s
    pub force: NVec3,    // N, only non-zero inside a step
    pub mass: f64,       // kg
    pub color: [f32; 4], // presentation only
}

impl Default for Particle {
    fn default() -> Self {
        Self {
            position: PVec3::zeros(),
            velocity: NVec3::zeros(),
            force: NVec3::zeros(),
            mass: 0.0,
            color: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

impl Particle {
    pub fn new(position: PVec3, velocity: NVec3, mass: f64) -> Self {
        Self {
            position,
            velocity,
            mass,
            ..Default::default()
        }
    }

    pub fn with_color(mut self, color: [f32; 4]) -> Self {
        self.color = color;
        self
    }

    /// Position widened to f64 for tree and force math.
    #[inline]
    pub fn position_f64(&self) -> NVec3 {
        self.position.cast::<f64>()
    }
}

/// Index of the particle closest to `point`, or `None` for an empty slice.
/// Ties resolve to the lowest index.
pub fn nearest_particle(particles: &[Particle], point: NVec3) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, p) in particles.iter().enumerate() {
        let d2 = (p.position_f64() - point).norm_squared();
        match best {
            Some((_, best_d2)) if best_d2 <= d2 => {}
            _ => best = Some((i, d2)),
        }
    }
    best.map(|(i, _)| i)
}

/// Sum of all particle masses.
pub fn total_mass(particles: &[Particle]) -> f64 {
    particles.iter().map(|p| p.mass).sum()
}

/// Mass-weighted centroid in render units. Falls back to the plain average
/// when the total mass is zero, and to the origin for an empty slice.
pub fn center_of_mass(particles: &[Particle]) -> NVec3 {
    if particles.is_empty() {
        return NVec3::zeros();
    }
    let mass = total_mass(particles);
    if mass > 0.0 {
        particles
            .iter()
            .fold(NVec3::zeros(), |acc, p| acc + p.position_f64() * p.mass)
            / mass
    } else {
        particles
            .iter()
            .fold(NVec3::zeros(), |acc, p| acc + p.position_f64())
            / particles.len() as f64
    }
}
