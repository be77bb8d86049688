//! Nearest neighbor bookkeeping and the distance ratio test.

use crate::matches::{IndMatch, IndMatches};
use std::cmp::Ordering;

/// Candidate neighbor of a query descriptor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    /// Index of the descriptor in the searched set.
    pub index: u32,
    /// Distance to the query in the metric's units.
    pub distance: f32,
}

fn neighbor_cmp(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.index.cmp(&b.index))
}

/// Sorts neighbors by ascending distance, ties broken by index.
pub(crate) fn sort_neighbors(neighbors: &mut [Neighbor]) {
    neighbors.sort_by(neighbor_cmp);
}

/// Bounded collector of the `k` closest neighbors with O(k) insertion.
#[derive(Clone, Debug)]
pub struct TopK {
    k: usize,
    items: Vec<Neighbor>,
}

impl TopK {
    /// Creates a collector keeping `k` neighbors.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            items: Vec::with_capacity(k),
        }
    }

    /// True once `k` neighbors are held.
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.k
    }

    /// Distance of the farthest kept neighbor once full.
    pub fn worst_distance(&self) -> Option<f32> {
        if !self.is_full() {
            return None;
        }
        self.items.iter().map(|n| n.distance).max_by(f32::total_cmp)
    }

    /// Offers a neighbor, replacing the farthest one when at capacity.
    pub fn push(&mut self, neighbor: Neighbor) {
        if self.k == 0 {
            return;
        }
        if self.items.len() < self.k {
            self.items.push(neighbor);
            return;
        }

        let mut worst_idx = 0usize;
        for (idx, item) in self.items.iter().enumerate().skip(1) {
            if neighbor_cmp(item, &self.items[worst_idx]) == Ordering::Greater {
                worst_idx = idx;
            }
        }

        if neighbor_cmp(&neighbor, &self.items[worst_idx]) == Ordering::Less {
            self.items[worst_idx] = neighbor;
        }
    }

    /// Returns neighbors sorted by ascending distance.
    pub fn into_sorted(mut self) -> Vec<Neighbor> {
        sort_neighbors(&mut self.items);
        self.items
    }
}

/// Accepts the nearest neighbor when it beats the second one by `bound`.
///
/// `neighbors` must be sorted ascending. Fewer than two neighbors never pass.
pub fn ratio_test(neighbors: &[Neighbor], bound: f32) -> Option<u32> {
    match neighbors {
        [best, second, ..] if best.distance < bound * second.distance => Some(best.index),
        _ => None,
    }
}

/// Runs `knn2` for every query index and keeps the ratio-test survivors, in
/// query order.
pub(crate) fn ratio_matches<F>(query_count: usize, bound: f32, mut knn2: F) -> IndMatches
where
    F: FnMut(usize) -> Vec<Neighbor>,
{
    let mut matches = IndMatches::new();
    for i in 0..query_count {
        let neighbors = knn2(i);
        if let Some(j) = ratio_test(&neighbors, bound) {
            matches.push(IndMatch::new(i as u32, j));
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(index: u32, distance: f32) -> Neighbor {
        Neighbor { index, distance }
    }

    #[test]
    fn topk_keeps_closest_with_index_ties() {
        let mut top = TopK::new(2);
        for nb in [n(4, 3.0), n(1, 1.0), n(2, 1.0), n(0, 0.5)] {
            top.push(nb);
        }
        assert_eq!(top.worst_distance(), Some(1.0));
        assert_eq!(top.into_sorted(), vec![n(0, 0.5), n(1, 1.0)]);
    }

    #[test]
    fn ratio_test_rejects_ambiguous() {
        assert_eq!(ratio_test(&[n(3, 1.0), n(5, 2.0)], 0.8), Some(3));
        assert_eq!(ratio_test(&[n(3, 1.0), n(5, 1.2)], 0.8), None);
        assert_eq!(ratio_test(&[n(3, 0.0), n(5, 0.0)], 0.8), None);
        assert_eq!(ratio_test(&[n(3, 1.0)], 0.8), None);
    }
}
