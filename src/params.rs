//! Tunable fluid parameters and their radius-derived kernel coefficients.
//! The derived group is private and only writable through the radius setter,
//! so the coefficients can never go stale relative to the radius that
//! defines them. Passed by reference into the solver each substep.

use std::f32::consts::PI;

pub const REST_DENSITY_DEFAULT: f32 = 600.;
pub const EPSILON_DEFAULT: f32 = 6_000.;
pub const SUPPORT_RADIUS_DEFAULT: f32 = 0.5;
pub const S_CORR_DEFAULT: f32 = 0.01;
pub const P_CORR_DEFAULT: i32 = 4;
pub const K_XSPH_DEFAULT: f32 = 0.003;
pub const VORT_EPSILON_DEFAULT: f32 = 0.0013;
pub const COLLISION_EPSILON_DEFAULT: f32 = 0.0001;

#[derive(Clone, Debug)]
pub struct FluidParams {
    /// Target density the constraint pulls toward.
    pub rest_density: f32,
    /// Relaxation term in the λ denominator; larger is softer.
    pub epsilon: f32,
    /// Tensile-correction (artificial pressure) strength.
    pub s_corr: f32,
    /// Tensile-correction power.
    pub p_corr: i32,
    /// XSPH velocity-smoothing blend.
    pub k_xsph: f32,
    /// Vorticity-confinement strength.
    pub vort_epsilon: f32,
    /// Inset for the container walls.
    pub collision_epsilon: f32,

    support_radius: f32,
    // Derived from the support radius; refreshed as a group.
    poly6_coeff: f32,
    spiky_coeff: f32,
    pressure_radius: f32,
    tensile_corr: f32,
}

impl Default for FluidParams {
    fn default() -> Self {
        Self::new(REST_DENSITY_DEFAULT, EPSILON_DEFAULT, SUPPORT_RADIUS_DEFAULT)
    }
}

impl FluidParams {
    pub fn new(rest_density: f32, epsilon: f32, support_radius: f32) -> Self {
        let mut result = Self {
            rest_density,
            epsilon,
            s_corr: S_CORR_DEFAULT,
            p_corr: P_CORR_DEFAULT,
            k_xsph: K_XSPH_DEFAULT,
            vort_epsilon: VORT_EPSILON_DEFAULT,
            collision_epsilon: COLLISION_EPSILON_DEFAULT,
            support_radius,
            poly6_coeff: 0.,
            spiky_coeff: 0.,
            pressure_radius: 0.,
            tensile_corr: 0.,
        };

        result.refresh_kernel_coeffs();
        result
    }

    pub fn support_radius(&self) -> f32 {
        self.support_radius
    }

    pub fn poly6_coeff(&self) -> f32 {
        self.poly6_coeff
    }

    pub fn spiky_coeff(&self) -> f32 {
        self.spiky_coeff
    }

    pub fn pressure_radius(&self) -> f32 {
        self.pressure_radius
    }

    pub fn tensile_corr(&self) -> f32 {
        self.tensile_corr
    }

    /// Replace the support radius and recompute every coefficient that
    /// depends on it in the same update.
    pub fn set_support_radius(&mut self, radius: f32) {
        self.support_radius = radius;
        self.refresh_kernel_coeffs();
    }

    /// Closed forms for the derived group:
    /// poly6 = 315/(64·π·r⁹), spiky = -45/(π·r⁶), pressureRadius = 0.1·r,
    /// tensileCorr = poly6·(r² − pressureRadius²)³.
    fn refresh_kernel_coeffs(&mut self) {
        let r = self.support_radius;

        self.poly6_coeff = 315. / (64. * PI * r.powi(9));
        self.spiky_coeff = -45. / (PI * r.powi(6));
        self.pressure_radius = 0.1 * r;
        self.tensile_corr =
            self.poly6_coeff * (r * r - self.pressure_radius * self.pressure_radius).powi(3);
    }

    // Interactive tuning surface. Each lower op pre-checks the floor and
    // skips the mutation entirely when the step would cross it. `dt` is the
    // wall-clock delta of the adjustment tick.

    pub fn raise_rest_density(&mut self, dt: f32) {
        self.rest_density += (100. * dt).ceil();
    }

    pub fn lower_rest_density(&mut self, dt: f32) {
        let step = (100. * dt).ceil();
        if self.rest_density > step {
            self.rest_density -= step;
        }
    }

    pub fn raise_epsilon(&mut self, dt: f32) {
        self.epsilon += (100. * dt).ceil();
    }

    pub fn lower_epsilon(&mut self, dt: f32) {
        let step = (100. * dt).ceil();
        if self.epsilon > step {
            self.epsilon -= step;
        }
    }

    pub fn raise_support_radius(&mut self, dt: f32) {
        self.set_support_radius(self.support_radius + dt / 100.);
    }

    pub fn lower_support_radius(&mut self, dt: f32) {
        let step = dt / 100.;
        if self.support_radius > step {
            self.set_support_radius(self.support_radius - step);
        }
    }

    pub fn raise_s_corr(&mut self, dt: f32) {
        self.s_corr += dt / 100.;
    }

    pub fn lower_s_corr(&mut self, dt: f32) {
        let step = dt / 100.;
        if self.s_corr > step {
            self.s_corr -= step;
        }
    }

    pub fn raise_k_xsph(&mut self, dt: f32) {
        self.k_xsph += dt / 100.;
    }

    pub fn lower_k_xsph(&mut self, dt: f32) {
        let step = dt / 100.;
        if self.k_xsph > step {
            self.k_xsph -= step;
        }
    }

    pub fn raise_vort_epsilon(&mut self, dt: f32) {
        self.vort_epsilon += dt / 100.;
    }

    pub fn lower_vort_epsilon(&mut self, dt: f32) {
        let step = dt / 100.;
        if self.vort_epsilon > step {
            self.vort_epsilon -= step;
        }
    }
}
