//! Fixed-step time integration shared by every CPU backend
//!
//! Semi-implicit (symplectic) Euler: velocity is kicked by the accumulated
//! force first, then the position drifts with the new velocity. Positions
//! are in render units, so the drift is divided by `distance_scale`.

use super::particle::{NVec3, Particle};

/// Advance every particle by `dt` seconds using its accumulated `force`,
/// then zero the force so nothing leaks into the next step.
pub fn semi_implicit_euler(particles: &mut [Particle], dt: f64, distance_scale: f64) {
    for p in particles.iter_mut() {
        // Kick: v_n+1 = v_n + (F / m) dt. Massless tracers only drift.
        if p.mass > 0.0 {
            p.velocity += p.force * (dt / p.mass);
        }

        // Drift: x_n+1 = x_n + v_n+1 dt / scale
        let step = p.velocity * (dt / distance_scale);
        p.position += step.cast::<f32>();

        p.force = NVec3::zeros();
    }
}

/// Zero all accumulated forces.
pub fn clear_forces(particles: &mut [Particle]) {
    for p in particles.iter_mut() {
        p.force = NVec3::zeros();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::particle::PVec3;

    #[test]
    fn kick_then_drift() {
        let mut ps = [Particle::new(PVec3::zeros(), NVec3::zeros(), 2.0)];
        ps[0].force = NVec3::new(4.0, 0.0, 0.0);

        semi_implicit_euler(&mut ps, 0.5, 1.0);

        // v = 4/2 * 0.5 = 1, x uses the new velocity: 1 * 0.5
        assert!((ps[0].velocity.x - 1.0).abs() < 1e-12);
        assert!((ps[0].position.x - 0.5).abs() < 1e-6);
        assert_eq!(ps[0].force, NVec3::zeros());
    }

    #[test]
    fn massless_particles_only_drift() {
        let mut ps = [Particle::new(PVec3::zeros(), NVec3::new(0.0, 2.0, 0.0), 0.0)];
        ps[0].force = NVec3::new(1.0e9, 0.0, 0.0);

        semi_implicit_euler(&mut ps, 1.0, 2.0);

        assert_eq!(ps[0].velocity, NVec3::new(0.0, 2.0, 0.0));
        assert!((ps[0].position.y - 1.0).abs() < 1e-6);
    }
}
