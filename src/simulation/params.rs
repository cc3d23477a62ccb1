//! Numerical and physical parameters for the solver
//!
//! `Parameters` replaces the process-wide tunables (theta, softening, world
//! bounds) with one value that callers pass into backend constructors and
//! into every `update`. Changing `theta` between steps is allowed.

use crate::simulation::physics::Gravity;

#[allow(non_snake_case)]
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub G: f64,               // gravitational constant (m^3 kg^-1 s^-2)
    pub softening: f64,       // added to d^2 (m^2)
    pub theta: f64,           // opening angle, 0 = exact
    pub distance_scale: f64,  // metres per render unit
    pub world_half_size: f64, // root cube half extent (render units)
    pub max_tree_depth: usize, // bucket particles below this depth
    pub max_workers: usize,   // upper bound on pool size
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            G: 6.674e-11,
            softening: 1.0e18,
            theta: 0.5,
            distance_scale: 1.0e9,
            world_half_size: 4000.0,
            max_tree_depth: 32,
            max_workers: 16,
        }
    }
}

impl Parameters {
    /// Gravity law configured from these parameters.
    pub fn gravity(&self) -> Gravity {
        Gravity {
            G: self.G,
            softening: self.softening,
            distance_scale: self.distance_scale,
        }
    }
}
