//! Probes over the hash table, the neighbor rows and the density field,
//! plus 2d plots of run diagnostics.

use plotters::{
    element::PathElement,
    prelude::{BitMapBackend, ChartBuilder, Color, IntoDrawingArea, BLACK, BLUE, WHITE},
    series::LineSeries,
};

use crate::{
    neighbor::NeighborLists,
    spatial_hash::{SpatialHashGrid, NONE},
    util,
};

#[derive(Debug, Default, PartialEq)]
pub struct GridStats {
    /// Buckets with at least one entry.
    pub used_buckets: usize,
    /// Longest chain found.
    pub max_chain: usize,
    /// How many buckets carry a chain of that length.
    pub chains_at_max: usize,
    /// Chains that did not terminate within the pool size. Zero on a healthy
    /// table.
    pub broken_chains: usize,
}

/// Walk every bucket chain and tally occupancy. Walks are bounded by the
/// pool size so a cyclic chain is reported rather than spun on.
pub fn grid_stats(grid: &SpatialHashGrid) -> GridStats {
    let mut stats = GridStats::default();
    let bound = grid.node_count();

    for bucket in 0..grid.table_size() as u32 {
        let mut cur = grid.head_of(bucket);
        if cur == NONE {
            continue;
        }
        stats.used_buckets += 1;

        let mut len = 0;
        while cur != NONE && len <= bound {
            len += 1;
            cur = grid.next_of(cur);
        }

        if cur != NONE {
            stats.broken_chains += 1;
        } else if len > stats.max_chain {
            stats.max_chain = len;
            stats.chains_at_max = 1;
        } else if len == stats.max_chain {
            stats.chains_at_max += 1;
        }
    }

    stats
}

#[derive(Debug, Default, PartialEq)]
pub struct NeighborStats {
    pub max_count: usize,
    /// Particles whose row filled to capacity (truncation candidates).
    pub at_cap: usize,
    pub mean_count: f32,
}

pub fn neighbor_stats(lists: &NeighborLists) -> NeighborStats {
    let mut stats = NeighborStats::default();
    let n = lists.counts().len();

    let mut total = 0_usize;
    for &count in lists.counts() {
        let count = count as usize;
        total += count;

        if count > stats.max_count {
            stats.max_count = count;
        }
        if count == lists.cap() {
            stats.at_cap += 1;
        }
    }

    if n > 0 {
        stats.mean_count = total as f32 / n as f32;
    }
    stats
}

/// Mean relative constraint error |ρ/ρ₀ − 1| over the pool.
pub fn density_error(densities: &[f32], rest_density: f32) -> f32 {
    let errors: Vec<f32> = densities
        .iter()
        .map(|&rho| (rho - rest_density).abs() / rest_density)
        .collect();

    util::mean(&errors)
}

/// Display a 2d plot of run diagnostics, e.g. density error over frames.
pub fn plot(data: &[(f64, f64)], x_label: &str, y_label: &str, plot_title: &str, filename: &str) {
    let x_range = data
        .iter()
        .map(|(x, _)| *x)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), x| {
            (min.min(x), max.max(x))
        });

    let y_range = data
        .iter()
        .map(|(_, y)| *y)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), y| {
            (min.min(y), max.max(y))
        });

    let fname = format!("{filename}.png");
    let root = BitMapBackend::new(&fname, (800, 600)).into_drawing_area();
    root.fill(&WHITE).unwrap();

    let mut chart = ChartBuilder::on(&root)
        .caption(plot_title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(30)
        .build_cartesian_2d(x_range.0..x_range.1, y_range.0..y_range.1)
        .unwrap();

    chart
        .configure_mesh()
        .x_desc(x_label)
        .y_desc(y_label)
        .draw()
        .unwrap();

    chart
        .draw_series(LineSeries::new(data.iter().cloned(), BLUE))
        .unwrap()
        .label("Data")
        .legend(|(x, y)| PathElement::new([(x, y), (x + 20, y)], BLUE));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .unwrap();
}

pub fn plot_density_error(data: &[(f64, f64)]) {
    plot(
        data,
        "frame",
        "mean |ρ/ρ₀ − 1|",
        "Density constraint error",
        "density_error",
    );
}

/// Neighbor-count distribution: how many particles carry each count.
pub fn plot_neighbor_distribution(lists: &NeighborLists) {
    let mut histogram = vec![0_usize; lists.cap() + 1];
    for &count in lists.counts() {
        histogram[count as usize] += 1;
    }

    let data: Vec<(f64, f64)> = histogram
        .iter()
        .enumerate()
        .map(|(count, &particles)| (count as f64, particles as f64))
        .collect();

    plot(
        &data,
        "neighbors",
        "particles",
        "Neighbor count distribution",
        "neighbor_counts",
    );
}
