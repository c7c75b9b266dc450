use std::{
    io,
    path::{Path, PathBuf},
    str::FromStr,
    time::Instant,
};

use bincode::{Decode, Encode};

use crate::{
    params::{FluidParams, EPSILON_DEFAULT, REST_DENSITY_DEFAULT, SUPPORT_RADIUS_DEFAULT},
    sim::FluidSim,
};

mod kernel;
mod neighbor;
mod params;
mod particle;
mod properties;
mod sim;
mod solver;
mod spatial_hash;
mod util;

const SAVE_FILE: &str = "config.fluid";

#[derive(Encode, Decode)]
pub struct Config {
    pub num_particles: usize,
    /// Bucket count of the spatial hash table.
    pub hash_size: usize,
    /// Per-particle neighbor row capacity; rows truncate silently past this.
    pub max_neighbors: usize,
    pub substeps: u32,
    pub solver_iters: u32,
    /// Unit: seconds. Measured frame deltas are clamped to this before
    /// integration.
    pub max_dt: f32,
    pub rest_density: f32,
    pub support_radius: f32,
    /// Constraint-force mixing term in the λ denominator.
    pub epsilon: f32,
    pub num_frames: usize,
}

impl Default for Config {
    fn default() -> Self {
        let num_particles = 15_360;

        Self {
            num_particles,
            // One bucket per particle keeps chains short at rest density.
            hash_size: num_particles,
            max_neighbors: 500,
            substeps: 2,
            solver_iters: 4,
            max_dt: 0.0083,
            rest_density: REST_DENSITY_DEFAULT,
            support_radius: SUPPORT_RADIUS_DEFAULT,
            epsilon: EPSILON_DEFAULT,
            num_frames: 1_200,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> io::Result<Self> {
        util::load(path)
    }
}

struct State {
    config: Config,
    params: FluidParams,
    sim: FluidSim,
    /// (frame, mean density error) samples for the post-run plot.
    density_trace: Vec<(f64, f64)>,
}

impl State {
    fn new(config: Config) -> Self {
        // todo: Wire the raise/lower param steps to an interactive frontend.
        let params = FluidParams::new(
            config.rest_density,
            config.epsilon,
            config.support_radius,
        );
        let sim = FluidSim::new(&config);

        Self {
            config,
            params,
            sim,
            density_trace: Vec::new(),
        }
    }
}

/// Entry point for computation; runs the configured number of frames.
fn build(state: &mut State) {
    println!("Building...");
    println!(
        "Particles: {} Hash buckets: {} Threads: {}",
        state.config.num_particles,
        state.config.hash_size,
        rayon::current_num_threads()
    );

    const BENCH_RATIO: usize = 100;
    let mut start_time_frame = Instant::now();

    for t in 0..state.config.num_frames {
        if t % BENCH_RATIO == 0 {
            start_time_frame = Instant::now();
        }

        state.sim.step_frame(&state.params);

        if !state.sim.positions()[0].magnitude_squared().is_finite() {
            eprintln!("Error: NaN");
            return;
        }

        let err =
            properties::density_error(&state.sim.particles.densities, state.params.rest_density);
        state.density_trace.push((t as f64, err as f64));

        if t % BENCH_RATIO == 0 {
            let neighbors = properties::neighbor_stats(&state.sim.neighbors);
            let max_speed = state
                .sim
                .velocities()
                .iter()
                .map(|v| v.magnitude())
                .fold(0., f32::max);

            println!(
                "t: {t} Frame time: {}μs Sim time: {:.2}s Density err: {err:.4} \
                 Max speed: {max_speed:.2} Max neighbors: {} ({} at cap)",
                start_time_frame.elapsed().as_micros(),
                state.sim.time(),
                neighbors.max_count,
                neighbors.at_cap,
            );
        }
    }

    let grid = properties::grid_stats(&state.sim.grid);
    println!(
        "Hash buckets used: {}/{} Longest chain: {} x{} Broken: {}",
        grid.used_buckets,
        state.sim.grid.table_size(),
        grid.max_chain,
        grid.chains_at_max,
        grid.broken_chains
    );

    properties::plot_density_error(&state.density_trace);
    properties::plot_neighbor_distribution(&state.sim.neighbors);

    println!("Sim time elapsed: {:.3}s", state.sim.time());
    println!("Build complete.");
}

fn main() {
    let mut config = Config::default();
    if let Ok(cfg) = Config::load(&PathBuf::from_str(SAVE_FILE).unwrap()) {
        config = cfg;
        println!("Config loaded: {} particles", config.num_particles);
    }

    let mut state = State::new(config);
    build(&mut state);

    if let Err(e) = util::save(&PathBuf::from(SAVE_FILE), &state.config) {
        eprintln!("Error saving config: {e}");
    }
}
