#![allow(dead_code)]

use std::collections::BTreeSet;

use proxima::{NeighborList, Vector3D};

/// Small deterministic generator for test configurations, so failures are
/// reproducible without an external RNG crate
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Lcg {
        Lcg(seed)
    }

    /// uniform in [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }

    pub fn position(&mut self, lo: f64, hi: f64) -> Vector3D {
        Vector3D::new(
            lo + (hi - lo) * self.next_f64(),
            lo + (hi - lo) * self.next_f64(),
            lo + (hi - lo) * self.next_f64(),
        )
    }
}

pub fn random_positions(n: usize, lo: f64, hi: f64, seed: u64) -> Vec<Vector3D> {
    let mut lcg = Lcg::new(seed);
    (0..n).map(|_| lcg.position(lo, hi)).collect()
}

/// All unordered pairs within the per-pair cutoff, by direct O(N²) distance
/// checks
pub fn brute_force_pairs(
    positions: &[Vector3D],
    cutoff: impl Fn(usize, usize) -> f64,
) -> BTreeSet<(usize, usize)> {
    let mut pairs = BTreeSet::new();
    for i in 0..positions.len() {
        for j in (i + 1)..positions.len() {
            let cutoff = cutoff(i, j);
            if (positions[i] - positions[j]).norm2() <= cutoff * cutoff {
                pairs.insert((i, j));
            }
        }
    }
    return pairs;
}

/// Collect every emitted pair as `(min, max)`, keeping duplicates so the
/// exactly-once property can be checked
pub fn emitted_pairs(list: &NeighborList) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for &i in list.ilist() {
        for (j, _) in list.decoded(i) {
            pairs.push((usize::min(i, j), usize::max(i, j)));
        }
    }
    pairs.sort_unstable();
    return pairs;
}

/// Check that `list` contains each pair of `expected` exactly once, and
/// nothing else
pub fn assert_exactly_once(list: &NeighborList, expected: &BTreeSet<(usize, usize)>) {
    let emitted = emitted_pairs(list);
    let unique: BTreeSet<_> = emitted.iter().copied().collect();

    assert_eq!(emitted.len(), unique.len(), "some pair was emitted more than once");
    assert_eq!(&unique, expected);
}

/// Per-atom neighbor sets, decoded and sorted, for determinism comparisons
pub fn neighbor_sets(list: &NeighborList) -> Vec<Vec<(usize, u32)>> {
    list.ilist()
        .iter()
        .map(|&i| {
            let mut neighbors: Vec<_> = list.decoded(i).collect();
            neighbors.sort_unstable();
            neighbors
        })
        .collect()
}
