//! Lock-free spatial hash over an unbounded domain: a fixed table of bucket
//! heads plus one chain slot per particle, rebuilt from scratch every
//! substep. Insertion is a concurrent-stack push onto the bucket head; the
//! table is sized to the particle count rather than the grid, so distinct
//! cells may share a bucket and the neighbor pass filters by distance.
//!
//! All atomics are Relaxed: every build/query phase is bracketed by a rayon
//! pass join, which is the visibility barrier between stages.

use std::sync::atomic::{AtomicU32, Ordering};

use lin_alg::f32::Vec3;
use rayon::prelude::*;

/// Empty-bucket and end-of-chain sentinel.
pub const NONE: u32 = 0xffff_ffff;

// Teschner et al. spatial hashing primes.
const P1: u32 = 73_856_093;
const P2: u32 = 19_349_663;
const P3: u32 = 83_492_791;

pub struct SpatialHashGrid {
    /// One head per bucket.
    heads: Vec<AtomicU32>,
    /// One chain slot per particle; slot i always belongs to particle i.
    next: Vec<AtomicU32>,
    /// Pushes since the last clear.
    inserted: AtomicU32,
}

impl SpatialHashGrid {
    pub fn new(table_size: usize, num_particles: usize) -> Self {
        Self {
            heads: (0..table_size).map(|_| AtomicU32::new(NONE)).collect(),
            next: (0..num_particles).map(|_| AtomicU32::new(NONE)).collect(),
            inserted: AtomicU32::new(0),
        }
    }

    pub fn table_size(&self) -> usize {
        self.heads.len()
    }

    pub fn node_count(&self) -> usize {
        self.next.len()
    }

    /// Pushes since the last clear.
    pub fn inserted(&self) -> u32 {
        self.inserted.load(Ordering::Relaxed)
    }

    /// Reset every bucket head, every chain slot and the insertion counter.
    /// Runs as its own parallel pass; no insert may race with it.
    pub fn clear(&self) {
        self.heads
            .par_iter()
            .for_each(|head| head.store(NONE, Ordering::Relaxed));
        self.next
            .par_iter()
            .for_each(|slot| slot.store(NONE, Ordering::Relaxed));
        self.inserted.store(0, Ordering::Relaxed);
    }

    /// Integer cell coordinate of a position; cell size equals the support
    /// radius.
    pub fn cell_coord(pos: Vec3, cell_size: f32) -> (i32, i32, i32) {
        (
            (pos.x / cell_size).floor() as i32,
            (pos.y / cell_size).floor() as i32,
            (pos.z / cell_size).floor() as i32,
        )
    }

    /// Deterministic bucket for a cell coordinate.
    pub fn hash_cell(&self, cell: (i32, i32, i32)) -> u32 {
        let (x, y, z) = (cell.0 as u32, cell.1 as u32, cell.2 as u32);

        (x.wrapping_mul(P1) ^ y.wrapping_mul(P2) ^ z.wrapping_mul(P3))
            % self.heads.len() as u32
    }

    pub fn bucket_of(&self, pos: Vec3, cell_size: f32) -> u32 {
        self.hash_cell(Self::cell_coord(pos, cell_size))
    }

    /// Push particle `i` onto its cell's bucket chain. The head swap is a
    /// single atomic exchange, so two racing inserters can never read the
    /// same previous head; order within a bucket is unspecified.
    pub fn insert(&self, i: u32, pos: Vec3, cell_size: f32) {
        let bucket = self.bucket_of(pos, cell_size);

        let prev = self.heads[bucket as usize].swap(i, Ordering::Relaxed);
        self.next[i as usize].store(prev, Ordering::Relaxed);
        self.inserted.fetch_add(1, Ordering::Relaxed);
    }

    /// Clear, then insert every position in parallel.
    pub fn build(&self, positions: &[Vec3], cell_size: f32) {
        self.clear();

        positions
            .par_iter()
            .enumerate()
            .for_each(|(i, pos)| self.insert(i as u32, *pos, cell_size));
    }

    pub fn head_of(&self, bucket: u32) -> u32 {
        self.heads[bucket as usize].load(Ordering::Relaxed)
    }

    pub fn next_of(&self, i: u32) -> u32 {
        self.next[i as usize].load(Ordering::Relaxed)
    }

    /// Walk a bucket chain. Hop-bounded at the pool size so a corrupted
    /// chain terminates instead of spinning; diagnostics report such chains.
    pub fn iter_bucket(&self, bucket: u32) -> BucketIter {
        BucketIter {
            grid: self,
            cur: self.head_of(bucket),
            hops: 0,
        }
    }
}

pub struct BucketIter<'a> {
    grid: &'a SpatialHashGrid,
    cur: u32,
    hops: usize,
}

impl Iterator for BucketIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.cur == NONE || self.hops >= self.grid.node_count() {
            return None;
        }

        let i = self.cur;
        self.hops += 1;
        self.cur = self.grid.next_of(i);
        Some(i)
    }
}
