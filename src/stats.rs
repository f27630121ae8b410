//! Helpers for collecting statistics while evaluating a prefetcher.

use std::collections::*;
use itertools::*;

/// Counters embedded in each prefetcher front-end.
#[derive(Clone, Copy, Debug, Default)]
pub struct PrefetchStats {
    /// Call/return branch events observed
    pub branches: usize,

    /// Branch events suppressed by the history front-of-queue test
    pub suppressed: usize,

    /// Signature lookups that replayed at least one address
    pub replays: usize,

    /// Prefetches issued from miss-table replay
    pub directed: usize,

    /// Prefetches issued by the next-line fallback
    pub fallback: usize,

    /// Demand misses observed
    pub misses: usize,

    /// Miss addresses no structure could record
    pub dropped: usize,
}
impl PrefetchStats {
    pub fn new() -> Self { Self::default() }

    /// Total prefetch requests handed to the host.
    pub fn issued(&self) -> usize {
        self.directed + self.fallback
    }
}

/// Per-line miss counts for a whole evaluation run.
pub struct MissProfile {
    /// Miss counts indexed by line address
    pub data: BTreeMap<u64, usize>,

    /// Number of misses recorded
    pub total: usize,
}
impl MissProfile {
    pub fn new() -> Self {
        Self { data: BTreeMap::new(), total: 0 }
    }

    pub fn record(&mut self, line: u64) {
        *self.data.entry(line).or_insert(0) += 1;
        self.total += 1;
    }

    /// Returns the number of unique missing lines.
    pub fn num_unique_lines(&self) -> usize {
        self.data.len()
    }

    /// Returns the `n` most frequently missing lines.
    pub fn top_lines(&self, n: usize) -> Vec<(u64, usize)> {
        let iter = self.data.iter()
            .sorted_by(|x, y| { x.1.partial_cmp(y.1).unwrap() })
            .rev()
            .take(n);
        let res: Vec<(u64, usize)> = iter.map(|(line, occ)| (*line, *occ))
            .collect();
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_orders_by_frequency() {
        let mut p = MissProfile::new();
        for line in [0x10u64, 0x20, 0x10, 0x30, 0x10, 0x20] {
            p.record(line);
        }
        assert_eq!(p.total, 6);
        assert_eq!(p.num_unique_lines(), 3);
        let top = p.top_lines(2);
        assert_eq!(top[0], (0x10, 3));
        assert_eq!(top[1], (0x20, 2));
    }
}
