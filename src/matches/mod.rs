//! Pairwise correspondence collections.
//!
//! `PairwiseMatches` is the match graph: each canonical `Pair` maps to the
//! ordered correspondences found between its two views. The matcher creates
//! it; every later step only removes pairs or shrinks their correspondence
//! lists.

pub mod io;

use crate::pairs::{Pair, PairSet};
use std::collections::{BTreeMap, HashSet};

/// One correspondence: feature `i` of the first view and feature `j` of the
/// second view of a pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndMatch {
    pub i: u32,
    pub j: u32,
}

impl IndMatch {
    /// Creates a correspondence.
    pub fn new(i: u32, j: u32) -> Self {
        Self { i, j }
    }
}

/// Correspondences of one pair, in emission order.
pub type IndMatches = Vec<IndMatch>;

/// Match graph keyed by canonical pair.
pub type PairwiseMatches = BTreeMap<Pair, IndMatches>;

/// Pairs present in a collection.
pub fn pairs_of(matches: &PairwiseMatches) -> PairSet {
    matches.keys().copied().collect()
}

/// Total number of correspondences over all pairs.
pub fn correspondence_count(matches: &PairwiseMatches) -> usize {
    matches.values().map(Vec::len).sum()
}

/// Keeps only the pairs listed in `pairs`.
pub fn restrict_to(matches: &mut PairwiseMatches, pairs: &PairSet) {
    matches.retain(|pair, _| pairs.contains(pair));
}

/// Removes repeated correspondences, keeping the first occurrence of each.
pub fn dedup_matches(matches: &mut IndMatches) {
    let mut seen = HashSet::with_capacity(matches.len());
    matches.retain(|m| seen.insert(*m));
}

/// Smallest match count a pair needs to survive pre-emptive filtering.
pub fn preemptive_cutoff(feature_count: usize, fraction: f64) -> usize {
    // Guard against products like 0.08 * 200 landing a hair above 16.
    let raw = fraction * feature_count as f64;
    (raw - 1e-9).ceil().max(0.0) as usize
}

/// Drops pairs with fewer than `fraction * feature_count` correspondences.
///
/// Returns the number of dropped pairs.
pub fn preemptive_filter(
    matches: &mut PairwiseMatches,
    feature_count: usize,
    fraction: f64,
) -> usize {
    let cutoff = preemptive_cutoff(feature_count, fraction);
    let before = matches.len();
    matches.retain(|_, m| m.len() >= cutoff);
    before - matches.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(n: u32) -> IndMatches {
        (0..n).map(|k| IndMatch::new(k, k)).collect()
    }

    #[test]
    fn preemptive_cutoff_boundary() {
        assert_eq!(preemptive_cutoff(200, 0.08), 16);
        let mut matches = PairwiseMatches::new();
        matches.insert(Pair::new(0, 1).unwrap(), block(15));
        matches.insert(Pair::new(0, 2).unwrap(), block(16));
        let dropped = preemptive_filter(&mut matches, 200, 0.08);
        assert_eq!(dropped, 1);
        assert!(matches.contains_key(&Pair::new(0, 2).unwrap()));
        assert!(!matches.contains_key(&Pair::new(0, 1).unwrap()));
    }

    #[test]
    fn dedup_keeps_first_emission() {
        let mut m = vec![
            IndMatch::new(3, 1),
            IndMatch::new(0, 2),
            IndMatch::new(3, 1),
            IndMatch::new(1, 1),
        ];
        dedup_matches(&mut m);
        assert_eq!(
            m,
            vec![IndMatch::new(3, 1), IndMatch::new(0, 2), IndMatch::new(1, 1)]
        );
    }

    #[test]
    fn restrict_drops_unlisted_pairs() {
        let mut matches = PairwiseMatches::new();
        matches.insert(Pair::new(0, 1).unwrap(), block(2));
        matches.insert(Pair::new(1, 2).unwrap(), block(3));
        let keep: PairSet = [Pair::new(1, 2).unwrap()].into_iter().collect();
        restrict_to(&mut matches, &keep);
        assert_eq!(pairs_of(&matches), keep);
        assert_eq!(correspondence_count(&matches), 3);
    }
}
