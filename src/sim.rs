//! The staged substep pipeline: Clear → Hash → FindNeighbors → Solve×K →
//! Integrate, strictly in order. Every stage is a rayon parallel pass whose
//! join is a full barrier: no stage begins until the previous one has
//! retired all workers and committed its writes. Hash and FindNeighbors
//! walk the same table, so partial visibility between them would corrupt
//! neighborhoods silently.

use std::time::Instant;

use lin_alg::f32::Vec3;
use rayon::prelude::*;

use crate::{
    neighbor::NeighborLists, params::FluidParams, particle::ParticleSet, solver,
    spatial_hash::SpatialHashGrid, Config,
};

/// Constant external acceleration, y-down.
pub const GRAVITY: f32 = -9.8;

pub struct FluidSim {
    pub particles: ParticleSet,
    pub grid: SpatialHashGrid,
    pub neighbors: NeighborLists,

    substeps: u32,
    solver_iters: u32,
    max_dt: f32,

    sim_time: f32,
    last_step: Instant,
}

impl FluidSim {
    pub fn new(cfg: &Config) -> Self {
        let particles = ParticleSet::new(cfg.num_particles);
        let n = particles.len();

        Self {
            particles,
            grid: SpatialHashGrid::new(cfg.hash_size, n),
            neighbors: NeighborLists::new(n, cfg.max_neighbors),
            substeps: cfg.substeps,
            solver_iters: cfg.solver_iters,
            max_dt: cfg.max_dt,
            sim_time: 0.,
            last_step: Instant::now(),
        }
    }

    /// One rendered frame: the configured substep count, each substep timed
    /// off the wall clock. A frame runs every substep to completion; readers
    /// observe the buffers only between frames.
    pub fn step_frame(&mut self, params: &FluidParams) {
        for _ in 0..self.substeps {
            let measured = self.last_step.elapsed().as_secs_f32();
            self.last_step = Instant::now();

            self.substep_timed(measured, params);
        }
    }

    /// One substep against an externally measured delta. Returns the delta
    /// actually consumed. The simulation clock advances by the clamped value
    /// whether or not clamping occurred, so simulated time lags wall time
    /// only during stalls.
    pub fn substep_timed(&mut self, measured_dt: f32, params: &FluidParams) -> f32 {
        let dt = measured_dt.min(self.max_dt);
        self.sim_time += dt;

        if dt > 0. {
            self.substep(dt, params);
        }
        dt
    }

    fn substep(&mut self, dt: f32, params: &FluidParams) {
        // Clear: the table must be fully reset before any insert lands.
        self.grid.clear();

        // Hash: predict under gravity, then push the predicted position
        // into the rebuilt table.
        self.predict_and_hash(dt, params);

        // FindNeighbors: bounded candidate rows over the finished table.
        self.neighbors
            .find(&self.grid, &self.particles.predicted, params.support_radius());

        // Solve: fixed iteration count, no early exit.
        for _ in 0..self.solver_iters {
            solver::constraint_iteration(&mut self.particles, &self.neighbors, params);
        }

        // Integrate: boundary response, velocity derivation, vorticity and
        // XSPH smoothing, then the commit.
        solver::apply_boundary(&mut self.particles, params);
        solver::update_velocities(&mut self.particles, dt);
        solver::smooth_velocities(&mut self.particles, &self.neighbors, params, dt);
        solver::commit_positions(&mut self.particles);
    }

    fn predict_and_hash(&mut self, dt: f32, params: &FluidParams) {
        let gravity = Vec3::new(0., GRAVITY, 0.);
        let cell_size = params.support_radius();

        let positions = &self.particles.positions;
        let grid = &self.grid;

        self.particles
            .velocities
            .par_iter_mut()
            .zip(self.particles.predicted.par_iter_mut())
            .enumerate()
            .for_each(|(i, (vel, pred))| {
                *vel += gravity * dt;
                *pred = positions[i] + *vel * dt;

                grid.insert(i as u32, *pred, cell_size);
            });
    }

    // Read-only views for the render-facing layer, valid between frames.

    pub fn positions(&self) -> &[Vec3] {
        &self.particles.positions
    }

    pub fn velocities(&self) -> &[Vec3] {
        &self.particles.velocities
    }

    #[allow(unused)]
    pub fn colors(&self) -> &[Vec3] {
        &self.particles.colors
    }

    /// The running simulation clock.
    pub fn time(&self) -> f32 {
        self.sim_time
    }
}
