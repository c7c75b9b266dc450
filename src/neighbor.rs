//! Bounded neighbor gathering: for each particle, walk the 27 buckets of
//! its 3×3×3 cell neighborhood, distance-filter the candidates and record up
//! to `cap` of them in a flat per-particle row. Rows are written strictly
//! per-particle, so the pass needs no synchronization beyond the joins
//! around it.

use lin_alg::f32::Vec3;
use rayon::prelude::*;

use crate::spatial_hash::{SpatialHashGrid, NONE};

pub struct NeighborLists {
    /// Valid entries per row.
    counts: Vec<u32>,
    /// N rows of `cap` slots each.
    lists: Vec<u32>,
    cap: usize,
}

impl NeighborLists {
    pub fn new(num_particles: usize, cap: usize) -> Self {
        Self {
            counts: vec![0; num_particles],
            lists: vec![NONE; num_particles * cap],
            cap,
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn count(&self, i: usize) -> usize {
        self.counts[i] as usize
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Recorded neighbors of particle i, its own index among them.
    pub fn neighbors(&self, i: usize) -> &[u32] {
        let row = i * self.cap;
        &self.lists[row..row + self.counts[i] as usize]
    }

    /// Rebuild every row from a fully-built grid. A candidate within the
    /// support radius is appended until the row is full; past that the row
    /// truncates silently and the count underestimates the true set.
    pub fn find(&mut self, grid: &SpatialHashGrid, positions: &[Vec3], support_radius: f32) {
        let cap = self.cap;
        let r_sq = support_radius * support_radius;

        self.counts
            .par_iter_mut()
            .zip(self.lists.par_chunks_mut(cap))
            .enumerate()
            .for_each(|(i, (count, row))| {
                let pos = positions[i];
                let cell = SpatialHashGrid::cell_coord(pos, support_radius);

                // Two neighborhood cells can collide into one bucket; walk
                // each bucket once or near candidates would be recorded twice.
                let mut visited = [0_u32; 27];
                let mut visited_n = 0;

                let mut n = 0;
                'cells: for dx in -1..=1_i32 {
                    for dy in -1..=1_i32 {
                        for dz in -1..=1_i32 {
                            let bucket =
                                grid.hash_cell((cell.0 + dx, cell.1 + dy, cell.2 + dz));
                            if visited[..visited_n].contains(&bucket) {
                                continue;
                            }
                            visited[visited_n] = bucket;
                            visited_n += 1;

                            for j in grid.iter_bucket(bucket) {
                                let diff = positions[j as usize] - pos;
                                if diff.magnitude_squared() <= r_sq {
                                    row[n] = j;
                                    n += 1;
                                    if n == cap {
                                        break 'cells;
                                    }
                                }
                            }
                        }
                    }
                }

                *count = n as u32;
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_grid(positions: &[Vec3], table_size: usize, radius: f32) -> SpatialHashGrid {
        let grid = SpatialHashGrid::new(table_size, positions.len());
        grid.build(positions, radius);
        grid
    }

    #[test]
    fn lone_particle_sees_only_itself() {
        let positions = vec![Vec3::new(1., 2., 3.)];
        let grid = build_grid(&positions, 16, 0.5);

        let mut lists = NeighborLists::new(1, 8);
        lists.find(&grid, &positions, 0.5);

        assert_eq!(lists.count(0), 1);
        assert_eq!(lists.neighbors(0), &[0]);
    }

    #[test]
    fn pair_across_a_cell_boundary_is_found() {
        // Cells (0,..) and (1,..) with 0.1 separation; the 27-cell walk must
        // cross the boundary.
        let positions = vec![Vec3::new(0.45, 0.1, 0.1), Vec3::new(0.55, 0.1, 0.1)];
        let grid = build_grid(&positions, 32, 0.5);

        let mut lists = NeighborLists::new(2, 8);
        lists.find(&grid, &positions, 0.5);

        assert!(lists.neighbors(0).contains(&1));
        assert!(lists.neighbors(1).contains(&0));
    }

    #[test]
    fn far_candidate_in_adjacent_cell_is_filtered() {
        // Adjacent cells, but 0.9 apart with a 0.5 radius.
        let positions = vec![Vec3::new(0.05, 0.1, 0.1), Vec3::new(0.95, 0.1, 0.1)];
        let grid = build_grid(&positions, 32, 0.5);

        let mut lists = NeighborLists::new(2, 8);
        lists.find(&grid, &positions, 0.5);

        assert_eq!(lists.neighbors(0), &[0]);
        assert_eq!(lists.neighbors(1), &[1]);
    }

    #[test]
    fn no_false_negatives_against_brute_force() {
        use rand::Rng;
        let mut rng = rand::rng();

        let radius = 0.5;
        let positions: Vec<Vec3> = (0..150)
            .map(|_| {
                Vec3::new(
                    rng.random_range(-2.0..2.0),
                    rng.random_range(-2.0..2.0),
                    rng.random_range(-2.0..2.0),
                )
            })
            .collect();

        let grid = build_grid(&positions, positions.len(), radius);
        let mut lists = NeighborLists::new(positions.len(), 256);
        lists.find(&grid, &positions, radius);

        for i in 0..positions.len() {
            for j in 0..positions.len() {
                let dist = (positions[j] - positions[i]).magnitude();
                if dist <= radius {
                    assert!(
                        lists.neighbors(i).contains(&(j as u32)),
                        "pair ({i}, {j}) at distance {dist} missed"
                    );
                }
            }
        }
    }

    #[test]
    fn truncation_is_silent_and_capped() {
        use rand::Rng;
        let mut rng = rand::rng();

        // 50 particles crammed inside one support radius, capacity 8.
        let positions: Vec<Vec3> = (0..50)
            .map(|_| {
                Vec3::new(
                    rng.random_range(0.0..0.1),
                    rng.random_range(0.0..0.1),
                    rng.random_range(0.0..0.1),
                )
            })
            .collect();

        let grid = build_grid(&positions, 64, 0.5);
        let mut lists = NeighborLists::new(positions.len(), 8);
        lists.find(&grid, &positions, 0.5);

        for i in 0..positions.len() {
            assert!(lists.count(i) <= 8);
        }
        assert!(lists.count(0) == 8, "dense cluster should fill the row");
    }

    #[test]
    fn rows_hold_no_duplicates_under_bucket_collisions() {
        use rand::Rng;
        let mut rng = rand::rng();

        // A tiny table forces distinct neighborhood cells onto shared buckets.
        let positions: Vec<Vec3> = (0..100)
            .map(|_| {
                Vec3::new(
                    rng.random_range(-3.0..3.0),
                    rng.random_range(-3.0..3.0),
                    rng.random_range(-3.0..3.0),
                )
            })
            .collect();

        let grid = build_grid(&positions, 16, 0.5);
        let mut lists = NeighborLists::new(positions.len(), 128);
        lists.find(&grid, &positions, 0.5);

        for i in 0..positions.len() {
            let mut row: Vec<u32> = lists.neighbors(i).to_vec();
            row.sort_unstable();
            let len_before = row.len();
            row.dedup();
            assert_eq!(row.len(), len_before, "duplicate neighbors for {i}");
        }
    }
}
