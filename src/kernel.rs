//! Smoothing-kernel evaluation for the density constraint and its gradient.
//! Poly6 for density estimates, the spiky gradient for position corrections;
//! both take their coefficient precomputed from the support radius, so the
//! hot loops never touch `powi`.

use lin_alg::f32::Vec3;

/// Poly6 density kernel: coeff · (r² − d²)³ inside the support radius, 0 outside.
/// Maximal at zero distance; this is the self-density term when d = 0.
pub fn poly6(dist_sq: f32, support_radius: f32, coeff: f32) -> f32 {
    let r_sq = support_radius * support_radius;
    if dist_sq >= r_sq {
        return 0.;
    }

    let diff = r_sq - dist_sq;
    coeff * diff * diff * diff
}

/// Gradient of the spiky kernel: coeff · (r − |d|)² · d̂ inside the support
/// radius. Zero at the origin, where the direction is undefined, and outside
/// the radius. The coefficient is negative, so the result points from the
/// neighbor toward the evaluation point scaled into a repulsive correction.
pub fn spiky_gradient(diff: Vec3, support_radius: f32, coeff: f32) -> Vec3 {
    let dist = diff.magnitude();
    if dist >= support_radius || dist < 1e-6 {
        return Vec3::new_zero();
    }

    let falloff = support_radius - dist;
    diff * (coeff * falloff * falloff / dist)
}
