//! The particle pool: SoA buffers for position, predicted position,
//! velocity, color and the per-particle solver scalars, plus the scratch
//! buffers the correction passes write into. Created once at startup,
//! mutated every substep, never resized.

use lin_alg::f32::Vec3;
use rand::Rng;

/// Container bounds. Particles are seeded in this cube and collide with
/// its walls.
pub const DOMAIN_MIN: f32 = -5.;
pub const DOMAIN_MAX: f32 = 5.;

pub struct ParticleSet {
    pub positions: Vec<Vec3>,
    /// Tentative positions during constraint iteration; committed to
    /// `positions` at the end of each substep.
    pub predicted: Vec<Vec3>,
    pub velocities: Vec<Vec3>,
    /// Visualization only; carried for the render-facing view.
    pub colors: Vec<Vec3>,
    /// Density-constraint Lagrange multipliers.
    pub lambdas: Vec<f32>,
    /// By-product of the λ pass; read by diagnostics.
    pub densities: Vec<f32>,

    // Scratch written by one pass, read by the next.
    pub deltas: Vec<Vec3>,
    pub omegas: Vec<Vec3>,
    pub vel_corrections: Vec<Vec3>,
}

impl ParticleSet {
    /// Seed `n` particles uniformly in the container cube, at rest, colored
    /// water-blue.
    pub fn new(n: usize) -> Self {
        let mut rng = rand::rng();

        let mut positions = Vec::with_capacity(n);
        for _ in 0..n {
            positions.push(Vec3::new(
                rng.random_range(DOMAIN_MIN..DOMAIN_MAX),
                rng.random_range(DOMAIN_MIN..DOMAIN_MAX),
                rng.random_range(DOMAIN_MIN..DOMAIN_MAX),
            ));
        }

        Self {
            positions,
            predicted: vec![Vec3::new_zero(); n],
            velocities: vec![Vec3::new_zero(); n],
            colors: vec![Vec3::new(0., 0., 1.); n],
            lambdas: vec![0.; n],
            densities: vec![0.; n],
            deltas: vec![Vec3::new_zero(); n],
            omegas: vec![Vec3::new_zero(); n],
            vel_corrections: vec![Vec3::new_zero(); n],
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_inside_the_cube_at_rest() {
        let particles = ParticleSet::new(200);

        assert_eq!(particles.len(), 200);

        for p in &particles.positions {
            assert!(p.x >= DOMAIN_MIN && p.x < DOMAIN_MAX);
            assert!(p.y >= DOMAIN_MIN && p.y < DOMAIN_MAX);
            assert!(p.z >= DOMAIN_MIN && p.z < DOMAIN_MAX);
        }

        for v in &particles.velocities {
            assert_eq!(v.magnitude(), 0.);
        }
    }

    #[test]
    fn buffers_share_the_pool_size() {
        let particles = ParticleSet::new(64);

        assert_eq!(particles.predicted.len(), 64);
        assert_eq!(particles.lambdas.len(), 64);
        assert_eq!(particles.densities.len(), 64);
        assert_eq!(particles.deltas.len(), 64);
        assert_eq!(particles.omegas.len(), 64);
        assert_eq!(particles.vel_corrections.len(), 64);
        assert_eq!(particles.colors.len(), 64);
    }
}
