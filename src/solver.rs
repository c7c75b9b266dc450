//! Density-constraint solver passes. Each pass is a rayon parallel sweep
//! over one output buffer, reading the shared buffers of the previous pass;
//! the pass join is the only synchronization. Per substep the loop runs a
//! fixed number of constraint iterations, then boundary response, velocity
//! derivation, vorticity confinement and XSPH smoothing exactly once.

use lin_alg::f32::Vec3;
use rayon::prelude::*;

use crate::{
    kernel,
    neighbor::NeighborLists,
    params::FluidParams,
    particle::{ParticleSet, DOMAIN_MAX, DOMAIN_MIN},
};

/// One constraint iteration: λ from current predicted densities, pairwise
/// position corrections from the λs, corrections applied. Invoked a fixed
/// number of times per substep; no early exit, no partial application.
pub fn constraint_iteration(
    particles: &mut ParticleSet,
    neighbors: &NeighborLists,
    params: &FluidParams,
) {
    compute_lambdas(particles, neighbors, params);
    compute_deltas(particles, neighbors, params);
    apply_deltas(particles);
}

/// λᵢ = -Cᵢ / (Σ‖∇C‖² + ε), with Cᵢ = ρᵢ/ρ₀ - 1. Densities are kept as a
/// diagnostic by-product.
pub fn compute_lambdas(
    particles: &mut ParticleSet,
    neighbors: &NeighborLists,
    params: &FluidParams,
) {
    let r = params.support_radius();
    let rho0 = params.rest_density;
    let eps = params.epsilon;
    let poly6_coeff = params.poly6_coeff();
    let spiky_coeff = params.spiky_coeff();

    let predicted = &particles.predicted;

    particles
        .lambdas
        .par_iter_mut()
        .zip(particles.densities.par_iter_mut())
        .enumerate()
        .for_each(|(i, (lambda, density))| {
            let pos = predicted[i];

            let mut rho = 0.;
            let mut grad_i = Vec3::new_zero();
            let mut sum_grad_sq = 0.;

            // The row includes i itself: its poly6 term is the self-density,
            // and its gradient term is zero by the kernel's origin guard.
            for &j in neighbors.neighbors(i) {
                let diff = pos - predicted[j as usize];
                rho += kernel::poly6(diff.magnitude_squared(), r, poly6_coeff);

                let grad = kernel::spiky_gradient(diff, r, spiky_coeff) / rho0;
                sum_grad_sq += grad.magnitude_squared();
                grad_i += grad;
            }
            sum_grad_sq += grad_i.magnitude_squared();

            *density = rho;
            let constraint = rho / rho0 - 1.;
            *lambda = -constraint / (sum_grad_sq + eps);
        });
}

/// Δpᵢ = (1/ρ₀) Σⱼ (λᵢ + λⱼ + s_corr)·∇W, where s_corr is the artificial
/// pressure term that keeps under-dense clusters from collapsing.
pub fn compute_deltas(
    particles: &mut ParticleSet,
    neighbors: &NeighborLists,
    params: &FluidParams,
) {
    let r = params.support_radius();
    let rho0 = params.rest_density;
    let poly6_coeff = params.poly6_coeff();
    let spiky_coeff = params.spiky_coeff();
    let tensile_corr = params.tensile_corr();
    let s_corr_strength = params.s_corr;
    let p_corr = params.p_corr;

    let predicted = &particles.predicted;
    let lambdas = &particles.lambdas;

    particles
        .deltas
        .par_iter_mut()
        .enumerate()
        .for_each(|(i, delta)| {
            let pos = predicted[i];
            let lambda_i = lambdas[i];

            let mut correction = Vec3::new_zero();
            for &j in neighbors.neighbors(i) {
                let j = j as usize;
                if j == i {
                    continue;
                }

                let diff = pos - predicted[j];

                let w = kernel::poly6(diff.magnitude_squared(), r, poly6_coeff);
                let s_corr = if tensile_corr > 1e-9 {
                    -s_corr_strength * (w / tensile_corr).powi(p_corr)
                } else {
                    0.
                };

                let grad = kernel::spiky_gradient(diff, r, spiky_coeff);
                correction += grad * (lambda_i + lambdas[j] + s_corr);
            }

            *delta = correction / rho0;
        });
}

pub fn apply_deltas(particles: &mut ParticleSet) {
    let deltas = &particles.deltas;

    particles
        .predicted
        .par_iter_mut()
        .zip(deltas.par_iter())
        .for_each(|(pos, delta)| *pos += *delta);
}

/// Clamp predicted positions into the container, inset by the collision
/// epsilon. Once per substep, after the constraint iterations; the velocity
/// response falls out of the position-based velocity update.
pub fn apply_boundary(particles: &mut ParticleSet, params: &FluidParams) {
    let min = DOMAIN_MIN + params.collision_epsilon;
    let max = DOMAIN_MAX - params.collision_epsilon;

    particles.predicted.par_iter_mut().for_each(|pos| {
        pos.x = pos.x.clamp(min, max);
        pos.y = pos.y.clamp(min, max);
        pos.z = pos.z.clamp(min, max);
    });
}

/// vᵢ = (xᵢ* - xᵢ)/dt.
pub fn update_velocities(particles: &mut ParticleSet, dt: f32) {
    let positions = &particles.positions;
    let predicted = &particles.predicted;

    particles
        .velocities
        .par_iter_mut()
        .enumerate()
        .for_each(|(i, vel)| {
            *vel = (predicted[i] - positions[i]) / dt;
        });
}

/// Vorticity confinement plus XSPH smoothing, once per substep: a curl pass
/// into scratch, a correction pass reading the curls, then the blended
/// correction applied to every velocity.
pub fn smooth_velocities(
    particles: &mut ParticleSet,
    neighbors: &NeighborLists,
    params: &FluidParams,
    dt: f32,
) {
    compute_curls(particles, neighbors, params);
    compute_velocity_corrections(particles, neighbors, params, dt);

    let corrections = &particles.vel_corrections;
    particles
        .velocities
        .par_iter_mut()
        .zip(corrections.par_iter())
        .for_each(|(vel, correction)| *vel += *correction);
}

/// ωᵢ = Σⱼ (vⱼ - vᵢ) × ∇W.
fn compute_curls(particles: &mut ParticleSet, neighbors: &NeighborLists, params: &FluidParams) {
    let r = params.support_radius();
    let spiky_coeff = params.spiky_coeff();

    let predicted = &particles.predicted;
    let velocities = &particles.velocities;

    particles
        .omegas
        .par_iter_mut()
        .enumerate()
        .for_each(|(i, omega)| {
            let pos = predicted[i];
            let vel_i = velocities[i];

            let mut curl = Vec3::new_zero();
            for &j in neighbors.neighbors(i) {
                let j = j as usize;
                if j == i {
                    continue;
                }

                let grad = kernel::spiky_gradient(pos - predicted[j], r, spiky_coeff);
                curl += (velocities[j] - vel_i).cross(grad);
            }

            *omega = curl;
        });
}

/// Per particle: the confinement force vortEps·(η̂ × ωᵢ) with
/// η = Σⱼ |ωⱼ|·∇W, scaled by dt, plus the XSPH blend
/// kXsph·Σⱼ (vⱼ - vᵢ)·W. Written to scratch so no pass reads velocities it
/// is also writing.
fn compute_velocity_corrections(
    particles: &mut ParticleSet,
    neighbors: &NeighborLists,
    params: &FluidParams,
    dt: f32,
) {
    let r = params.support_radius();
    let poly6_coeff = params.poly6_coeff();
    let spiky_coeff = params.spiky_coeff();
    let k_xsph = params.k_xsph;
    let vort_epsilon = params.vort_epsilon;

    let predicted = &particles.predicted;
    let velocities = &particles.velocities;
    let omegas = &particles.omegas;

    particles
        .vel_corrections
        .par_iter_mut()
        .enumerate()
        .for_each(|(i, correction)| {
            let pos = predicted[i];
            let vel_i = velocities[i];

            let mut eta = Vec3::new_zero();
            let mut xsph = Vec3::new_zero();

            for &j in neighbors.neighbors(i) {
                let j = j as usize;
                if j == i {
                    continue;
                }

                let diff = pos - predicted[j];
                let grad = kernel::spiky_gradient(diff, r, spiky_coeff);

                eta += grad * omegas[j].magnitude();
                xsph += (velocities[j] - vel_i)
                    * kernel::poly6(diff.magnitude_squared(), r, poly6_coeff);
            }

            let mut result = xsph * k_xsph;

            let eta_mag = eta.magnitude();
            if eta_mag > 1e-6 {
                result += (eta / eta_mag).cross(omegas[i]) * (vort_epsilon * dt);
            }

            *correction = result;
        });
}

/// Commit the substep: positions take the corrected predictions.
pub fn commit_positions(particles: &mut ParticleSet) {
    let predicted = &particles.predicted;

    particles
        .positions
        .par_iter_mut()
        .zip(predicted.par_iter())
        .for_each(|(pos, pred)| *pos = *pred);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial_hash::SpatialHashGrid;

    /// Pool with hand-placed positions, predictions equal to positions, at
    /// rest.
    fn pool_at(positions: Vec<Vec3>) -> ParticleSet {
        let mut particles = ParticleSet::new(positions.len());
        particles.predicted = positions.clone();
        particles.positions = positions;
        for vel in &mut particles.velocities {
            *vel = Vec3::new_zero();
        }
        particles
    }

    fn neighbors_for(particles: &ParticleSet, params: &FluidParams, cap: usize) -> NeighborLists {
        let grid = SpatialHashGrid::new(particles.len().max(8), particles.len());
        grid.build(&particles.predicted, params.support_radius());

        let mut lists = NeighborLists::new(particles.len(), cap);
        lists.find(&grid, &particles.predicted, params.support_radius());
        lists
    }

    #[test]
    fn overdense_cluster_gets_negative_lambda() {
        // Rest density of 1 makes any contact overdense.
        let params = FluidParams::new(1., 6_000., 0.5);

        let positions = vec![
            Vec3::new(0., 0., 0.),
            Vec3::new(0.1, 0., 0.),
            Vec3::new(0., 0.1, 0.),
            Vec3::new(0., 0., 0.1),
        ];
        let mut particles = pool_at(positions);
        let neighbors = neighbors_for(&particles, &params, 16);

        compute_lambdas(&mut particles, &neighbors, &params);

        for i in 0..particles.len() {
            assert!(particles.densities[i] > 1., "density {i} not overdense");
            assert!(particles.lambdas[i] < 0., "lambda {i} not negative");
        }
    }

    #[test]
    fn lone_particle_density_is_the_self_term() {
        let params = FluidParams::default();
        let mut particles = pool_at(vec![Vec3::new(1., 1., 1.)]);
        let neighbors = neighbors_for(&particles, &params, 8);

        compute_lambdas(&mut particles, &neighbors, &params);

        let r = params.support_radius();
        let expected = params.poly6_coeff() * (r * r).powi(3);
        assert!((particles.densities[0] - expected).abs() < 1e-2);
    }

    #[test]
    fn constraint_iteration_pushes_an_overdense_pair_apart() {
        let params = FluidParams::new(1., 6_000., 0.5);

        let positions = vec![Vec3::new(0., 0., 0.), Vec3::new(0.1, 0., 0.)];
        let mut particles = pool_at(positions);
        let neighbors = neighbors_for(&particles, &params, 8);

        let before = (particles.predicted[1] - particles.predicted[0]).magnitude();
        constraint_iteration(&mut particles, &neighbors, &params);
        let after = (particles.predicted[1] - particles.predicted[0]).magnitude();

        assert!(after > before, "separation {before} -> {after}");
    }

    #[test]
    fn boundary_clamps_escapees_inside_the_inset_walls() {
        let params = FluidParams::default();
        let mut particles = pool_at(vec![
            Vec3::new(-7., 0., 0.),
            Vec3::new(0., 5.5, 0.),
            Vec3::new(0., 0., 0.),
        ]);

        apply_boundary(&mut particles, &params);

        let min = DOMAIN_MIN + params.collision_epsilon;
        let max = DOMAIN_MAX - params.collision_epsilon;
        for pos in &particles.predicted {
            assert!(pos.x >= min && pos.x <= max);
            assert!(pos.y >= min && pos.y <= max);
            assert!(pos.z >= min && pos.z <= max);
        }
        // The interior particle is untouched.
        assert_eq!(particles.predicted[2].magnitude(), 0.);
    }

    #[test]
    fn velocities_derive_from_position_change() {
        let mut particles = pool_at(vec![Vec3::new_zero()]);
        particles.predicted[0] = Vec3::new(0.1, 0., 0.);

        update_velocities(&mut particles, 0.05);

        assert!((particles.velocities[0].x - 2.).abs() < 1e-5);
        assert_eq!(particles.velocities[0].y, 0.);
    }

    #[test]
    fn xsph_contracts_the_velocity_spread() {
        // Default blend; vorticity off so only XSPH acts.
        let mut params = FluidParams::default();
        params.vort_epsilon = 0.;

        let positions = vec![Vec3::new(0., 0., 0.), Vec3::new(0.1, 0., 0.)];
        let mut particles = pool_at(positions);
        particles.velocities[0] = Vec3::new(1., 0., 0.);
        particles.velocities[1] = Vec3::new(-1., 0., 0.);

        let neighbors = neighbors_for(&particles, &params, 8);

        let before = (particles.velocities[0] - particles.velocities[1]).magnitude();
        smooth_velocities(&mut particles, &neighbors, &params, 0.008);
        let after = (particles.velocities[0] - particles.velocities[1]).magnitude();

        assert!(after < before, "spread {before} -> {after}");
    }

    #[test]
    fn commit_copies_predictions_into_positions() {
        let mut particles = pool_at(vec![Vec3::new_zero(), Vec3::new(1., 1., 1.)]);
        particles.predicted[0] = Vec3::new(0.5, -0.5, 0.25);

        commit_positions(&mut particles);

        assert_eq!(particles.positions[0].x, 0.5);
        assert_eq!(particles.positions[0].y, -0.5);
        assert_eq!(particles.positions[1].x, 1.);
    }
}
