//! Newtonian gravity with softening
//!
//! Shared by the octree query and the brute-force backends so every backend
//! evaluates exactly the same law:
//!
//! `F = -(G * m1 * m2) / (d^2 + S) * r_hat`, with `r = p1 - p2`
//!
//! Positions come in as render units and are scaled to metres before the law
//! is applied; the result is a force in newtons acting on body 1.

use crate::simulation::particle::NVec3;

#[allow(non_snake_case)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gravity {
    pub G: f64,              // gravitational constant
    pub softening: f64,      // S, in m^2
    pub distance_scale: f64, // metres per render unit
}

impl Gravity {
    /// Force on body 1 (at `p1`, mass `m1`) due to body 2 (at `p2`, mass `m2`).
    ///
    /// Coincident positions have no defined direction and yield zero.
    #[inline]
    pub fn force(&self, p1: NVec3, m1: f64, p2: NVec3, m2: f64) -> NVec3 {
        let r = (p1 - p2) * self.distance_scale;
        let d2 = r.norm_squared();
        if d2 == 0.0 {
            return NVec3::zeros();
        }
        let magnitude = -(self.G * m1 * m2) / (d2 + self.softening);
        r * (magnitude / d2.sqrt())
    }

    /// Physical distance in metres between two render-space points.
    #[inline]
    pub fn distance(&self, p1: NVec3, p2: NVec3) -> f64 {
        (p1 - p2).norm() * self.distance_scale
    }

    /// Speed of a circular orbit of radius `r_phys` metres around `central_mass`.
    #[inline]
    pub fn circular_speed(&self, central_mass: f64, r_phys: f64) -> f64 {
        if r_phys <= 0.0 {
            return 0.0;
        }
        (self.G * central_mass / r_phys).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_gravity() -> Gravity {
        Gravity {
            G: 1.0,
            softening: 0.0,
            distance_scale: 1.0,
        }
    }

    #[test]
    fn force_is_attractive_and_symmetric() {
        let g = unit_gravity();
        let a = NVec3::new(0.0, 0.0, 0.0);
        let b = NVec3::new(1.0, 0.0, 0.0);
        let f_ab = g.force(a, 2.0, b, 3.0);
        let f_ba = g.force(b, 3.0, a, 2.0);

        // body at the origin is pulled toward +x
        assert!(f_ab.x > 0.0);
        assert!((f_ab + f_ba).norm() < 1e-12);
        assert!((f_ab.x - 6.0).abs() < 1e-12);
    }

    #[test]
    fn force_follows_inverse_square() {
        let g = unit_gravity();
        let near = g.force(NVec3::zeros(), 1.0, NVec3::new(1.0, 0.0, 0.0), 1.0);
        let far = g.force(NVec3::zeros(), 1.0, NVec3::new(2.0, 0.0, 0.0), 1.0);
        assert!((near.norm() / far.norm() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn softening_bounds_close_encounters() {
        let g = Gravity {
            softening: 0.1,
            ..unit_gravity()
        };
        let f = g.force(NVec3::zeros(), 1.0, NVec3::new(1e-9, 0.0, 0.0), 1.0);
        assert!(f.norm() <= 10.0 + 1e-9);
    }

    #[test]
    fn coincident_points_give_zero() {
        let g = unit_gravity();
        let p = NVec3::new(3.0, 4.0, 5.0);
        assert_eq!(g.force(p, 1.0, p, 1.0), NVec3::zeros());
    }

    #[test]
    fn distance_scale_converts_render_units() {
        let g = Gravity {
            distance_scale: 1.0e9,
            ..unit_gravity()
        };
        let d = g.distance(NVec3::zeros(), NVec3::new(0.0, 100.0, 0.0));
        assert!((d - 1.0e11).abs() < 1.0);
    }
}
