//! Candidate view pairs.
//!
//! A `Pair` is an unordered pair of distinct view ids stored in canonical
//! `(min, max)` order, so a `PairSet` cannot hold symmetric duplicates.

pub mod io;

use crate::scene::ViewId;
use crate::util::{PairMatchError, PairMatchResult};
use std::collections::BTreeSet;
use std::fmt;

/// Unordered pair of distinct views, stored as `first < second`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pair {
    first: ViewId,
    second: ViewId,
}

impl Pair {
    /// Canonicalizes `(a, b)`; returns `None` for a self pair.
    pub fn new(a: ViewId, b: ViewId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self {
                first: a,
                second: b,
            }),
            std::cmp::Ordering::Greater => Some(Self {
                first: b,
                second: a,
            }),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Smaller view id.
    pub fn first(&self) -> ViewId {
        self.first
    }

    /// Larger view id.
    pub fn second(&self) -> ViewId {
        self.second
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.first, self.second)
    }
}

/// Set of candidate pairs, iterated in ascending order.
pub type PairSet = BTreeSet<Pair>;

/// Pair generation policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PairMode {
    /// Every pair of distinct views.
    Exhaustive,
    /// Each view with its `overlap` successors, for ordered sequences.
    Contiguous { overlap: usize },
}

impl PairMode {
    /// Parses `EXHAUSTIVE` or `CONTIGUOUS`; the latter needs an overlap count.
    pub fn parse(name: &str, overlap: Option<usize>) -> PairMatchResult<Self> {
        match name.to_ascii_uppercase().as_str() {
            "EXHAUSTIVE" => Ok(PairMode::Exhaustive),
            "CONTIGUOUS" => match overlap {
                Some(overlap) if overlap >= 1 => Ok(PairMode::Contiguous { overlap }),
                _ => Err(PairMatchError::InvalidInput(
                    "contiguous pair mode needs an overlap count >= 1",
                )),
            },
            _ => Err(PairMatchError::UnknownPairMode(name.to_string())),
        }
    }

    /// Generates the pairs for `n` views indexed `0..n`.
    pub fn generate(&self, n: usize) -> PairSet {
        match *self {
            PairMode::Exhaustive => exhaustive_pairs(n),
            PairMode::Contiguous { overlap } => contiguous_with_overlap(n, overlap),
        }
    }
}

/// All `n * (n - 1) / 2` pairs of distinct indices in `[0, n)`.
pub fn exhaustive_pairs(n: usize) -> PairSet {
    let n = n as ViewId;
    (0..n)
        .flat_map(|i| ((i + 1)..n).map(move |j| Pair { first: i, second: j }))
        .collect()
}

/// Pairs `(i, i + k)` for `1 <= k <= overlap`, clipped to `[0, n)`.
pub fn contiguous_with_overlap(n: usize, overlap: usize) -> PairSet {
    let mut pairs = PairSet::new();
    for i in 0..n {
        let last = i.saturating_add(overlap).min(n.saturating_sub(1));
        for j in (i + 1)..=last {
            pairs.insert(Pair {
                first: i as ViewId,
                second: j as ViewId,
            });
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::{contiguous_with_overlap, exhaustive_pairs, Pair, PairMode};

    #[test]
    fn pair_is_canonical() {
        assert_eq!(Pair::new(5, 2), Pair::new(2, 5));
        assert_eq!(Pair::new(5, 2).unwrap().first(), 2);
        assert!(Pair::new(3, 3).is_none());
    }

    #[test]
    fn exhaustive_small_cases() {
        assert!(exhaustive_pairs(0).is_empty());
        assert!(exhaustive_pairs(1).is_empty());
        let pairs: Vec<_> = exhaustive_pairs(3).into_iter().collect();
        assert_eq!(
            pairs,
            vec![
                Pair::new(0, 1).unwrap(),
                Pair::new(0, 2).unwrap(),
                Pair::new(1, 2).unwrap()
            ]
        );
    }

    #[test]
    fn contiguous_clips_at_the_end() {
        let pairs: Vec<_> = contiguous_with_overlap(4, 2)
            .into_iter()
            .map(|p| (p.first(), p.second()))
            .collect();
        assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 2), (1, 3), (2, 3)]);
    }

    #[test]
    fn mode_parsing() {
        assert_eq!(
            PairMode::parse("exhaustive", None).unwrap(),
            PairMode::Exhaustive
        );
        assert_eq!(
            PairMode::parse("CONTIGUOUS", Some(3)).unwrap(),
            PairMode::Contiguous { overlap: 3 }
        );
        assert!(PairMode::parse("CONTIGUOUS", None).is_err());
        assert!(PairMode::parse("SPATIAL", None).is_err());
    }
}
