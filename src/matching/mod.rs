//! Putative matching of descriptor sets.
//!
//! A run uses a single [`MatcherKind`] for every pair. Each strategy finds
//! the two nearest train descriptors of every query descriptor and keeps the
//! nearest one when it passes the distance ratio test.
//!
//! Exact strategies (`BRUTEFORCE*`) are fully deterministic. Approximate ones
//! draw their randomness from seeded generators, so they are deterministic
//! for a fixed configuration but may miss a true nearest neighbor.

pub mod brute;
pub mod cascade;
pub mod hnsw;
pub mod kdtree;
pub mod metric;
pub mod neighbors;

pub use cascade::CascadeHashingParams;
pub use self::hnsw::HnswParams;
pub use kdtree::KdTreeParams;

use crate::matches::{dedup_matches, IndMatches, PairwiseMatches};
use crate::pairs::{Pair, PairSet};
use crate::progress::Progress;
use crate::regions::{Descriptors, Regions, RegionsProvider, RegionsType};
use crate::scene::ViewId;
use crate::trace::{trace_debug, trace_event, trace_span};
use crate::util::{PairMatchError, PairMatchResult};
use cascade::{CascadeHasher, DescriptorMean, HashedDescriptors};
use metric::{DescriptorView, Hamming, SquaredL2, L1};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Nearest neighbor strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatcherKind {
    /// Picked from the descriptor kind at run time.
    Auto,
    /// Exhaustive squared L2 search.
    BruteForceL2,
    /// Exhaustive Hamming search.
    BruteForceHamming,
    /// Randomized kd-tree forest, L2.
    AnnL2,
    /// HNSW graph, L2.
    HnswL2,
    /// HNSW graph, L1.
    HnswL1,
    /// HNSW graph, Hamming.
    HnswHamming,
    /// Cascade hashing, hashes recomputed per pair.
    CascadeHashingL2,
    /// Cascade hashing, hashes computed once per view.
    FastCascadeHashingL2,
}

impl MatcherKind {
    /// Every selectable strategy.
    pub const ALL: [MatcherKind; 9] = [
        MatcherKind::Auto,
        MatcherKind::BruteForceL2,
        MatcherKind::BruteForceHamming,
        MatcherKind::AnnL2,
        MatcherKind::HnswL2,
        MatcherKind::HnswL1,
        MatcherKind::HnswHamming,
        MatcherKind::CascadeHashingL2,
        MatcherKind::FastCascadeHashingL2,
    ];

    /// Canonical upper-case name.
    pub fn name(&self) -> &'static str {
        match self {
            MatcherKind::Auto => "AUTO",
            MatcherKind::BruteForceL2 => "BRUTEFORCEL2",
            MatcherKind::BruteForceHamming => "BRUTEFORCEHAMMING",
            MatcherKind::AnnL2 => "ANNL2",
            MatcherKind::HnswL2 => "HNSWL2",
            MatcherKind::HnswL1 => "HNSWL1",
            MatcherKind::HnswHamming => "HNSWHAMMING",
            MatcherKind::CascadeHashingL2 => "CASCADEHASHINGL2",
            MatcherKind::FastCascadeHashingL2 => "FASTCASCADEHASHINGL2",
        }
    }

    /// True for strategies working on binary descriptors.
    pub fn is_binary(&self) -> bool {
        matches!(self, MatcherKind::BruteForceHamming | MatcherKind::HnswHamming)
    }

    /// True for strategies that may miss the exact nearest neighbor.
    pub fn is_approximate(&self) -> bool {
        !matches!(
            self,
            MatcherKind::BruteForceL2 | MatcherKind::BruteForceHamming
        )
    }

    /// Replaces `Auto` by the default for `regions_type` and checks that the
    /// strategy fits the descriptor kind.
    pub fn resolve(self, regions_type: RegionsType) -> PairMatchResult<MatcherKind> {
        let kind = match self {
            MatcherKind::Auto if regions_type.is_binary() => MatcherKind::HnswHamming,
            MatcherKind::Auto => MatcherKind::FastCascadeHashingL2,
            other => other,
        };
        match (kind.is_binary(), regions_type.is_binary()) {
            (true, false) => Err(PairMatchError::DescriptorMismatch {
                expected: "binary",
                got: "scalar",
            }),
            (false, true) => Err(PairMatchError::DescriptorMismatch {
                expected: "scalar",
                got: "binary",
            }),
            _ => Ok(kind),
        }
    }
}

impl fmt::Display for MatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MatcherKind {
    type Err = PairMatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        MatcherKind::ALL
            .into_iter()
            .find(|kind| kind.name() == upper)
            .ok_or_else(|| PairMatchError::UnknownMatcher(s.to_string()))
    }
}

/// Configuration of the matching stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchingConfig {
    /// Distance ratio threshold; a match is kept when
    /// `d(nearest) < ratio * d(second)`.
    pub ratio: f32,
    /// Process pairs on the rayon pool when the `rayon` feature is enabled.
    pub parallel: bool,
    pub kd_tree: KdTreeParams,
    pub hnsw: HnswParams,
    pub cascade: CascadeHashingParams,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            ratio: 0.8,
            parallel: true,
            kd_tree: KdTreeParams::default(),
            hnsw: HnswParams::default(),
            cascade: CascadeHashingParams::default(),
        }
    }
}

fn scalar_views<'a>(
    a: &'a Regions,
    b: &'a Regions,
) -> PairMatchResult<(DescriptorView<'a, f32>, DescriptorView<'a, f32>)> {
    let (data_a, dim_a) = a.descriptors().as_scalar()?;
    let (data_b, dim_b) = b.descriptors().as_scalar()?;
    if dim_a != dim_b || dim_a == 0 {
        return Err(PairMatchError::InvalidInput("descriptor dimensions differ"));
    }
    Ok((DescriptorView::new(data_a, dim_a), DescriptorView::new(data_b, dim_b)))
}

fn binary_views<'a>(
    a: &'a Regions,
    b: &'a Regions,
) -> PairMatchResult<(DescriptorView<'a, u8>, DescriptorView<'a, u8>)> {
    let (data_a, bytes_a) = a.descriptors().as_binary()?;
    let (data_b, bytes_b) = b.descriptors().as_binary()?;
    if bytes_a != bytes_b || bytes_a == 0 {
        return Err(PairMatchError::InvalidInput("descriptor sizes differ"));
    }
    Ok((DescriptorView::new(data_a, bytes_a), DescriptorView::new(data_b, bytes_b)))
}

/// Matches the descriptors of `a` (queries) against those of `b`.
///
/// `FastCascadeHashingL2` behaves like `CascadeHashingL2` here since there
/// is no collection to precompute hashes for.
pub fn match_regions(
    kind: MatcherKind,
    a: &Regions,
    b: &Regions,
    config: &MatchingConfig,
) -> PairMatchResult<IndMatches> {
    let regions_type = match a.descriptors() {
        Descriptors::Scalar { dimension, .. } => RegionsType::Scalar {
            dimension: *dimension,
        },
        Descriptors::Binary { bytes, .. } => RegionsType::Binary { bits: bytes * 8 },
    };
    let ratio = config.ratio;
    let matches = match kind.resolve(regions_type)? {
        MatcherKind::Auto => return Err(PairMatchError::InvalidInput("matcher kind is unresolved")),
        MatcherKind::BruteForceL2 => {
            let (q, t) = scalar_views(a, b)?;
            brute::match_brute_force::<SquaredL2>(q, t, ratio)
        }
        MatcherKind::BruteForceHamming => {
            let (q, t) = binary_views(a, b)?;
            brute::match_brute_force::<Hamming>(q, t, ratio)
        }
        MatcherKind::AnnL2 => {
            let (q, t) = scalar_views(a, b)?;
            kdtree::match_kdtree(q, t, ratio, config.kd_tree)
        }
        MatcherKind::HnswL2 => {
            let (q, t) = scalar_views(a, b)?;
            self::hnsw::match_hnsw::<SquaredL2>(q, t, ratio, config.hnsw)
        }
        MatcherKind::HnswL1 => {
            let (q, t) = scalar_views(a, b)?;
            self::hnsw::match_hnsw::<L1>(q, t, ratio, config.hnsw)
        }
        MatcherKind::HnswHamming => {
            let (q, t) = binary_views(a, b)?;
            self::hnsw::match_hnsw::<Hamming>(q, t, ratio, config.hnsw)
        }
        MatcherKind::CascadeHashingL2 | MatcherKind::FastCascadeHashingL2 => {
            let (q, t) = scalar_views(a, b)?;
            cascade::match_cascade(q, t, ratio, config.cascade)
        }
    };
    Ok(matches)
}

/// Hash codes of every view, sharing one hasher and one mean.
struct PrecomputedHashes {
    hasher: CascadeHasher,
    codes: BTreeMap<ViewId, HashedDescriptors>,
}

/// Runs one matcher over a whole pair set.
#[derive(Clone, Copy, Debug)]
pub struct CollectionMatcher {
    kind: MatcherKind,
    config: MatchingConfig,
}

impl CollectionMatcher {
    /// Creates a matcher for regions of `regions_type`, resolving `Auto`.
    pub fn new(
        kind: MatcherKind,
        regions_type: RegionsType,
        config: MatchingConfig,
    ) -> PairMatchResult<Self> {
        if !(config.ratio > 0.0 && config.ratio <= 1.0) {
            return Err(PairMatchError::InvalidInput("distance ratio must be in (0, 1]"));
        }
        Ok(Self {
            kind: kind.resolve(regions_type)?,
            config,
        })
    }

    /// Resolved strategy.
    pub fn kind(&self) -> MatcherKind {
        self.kind
    }

    /// Matching configuration.
    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Matches every pair of `pairs`.
    ///
    /// Pairs whose regions cannot be fetched are skipped; pairs without any
    /// surviving correspondence are left out of the result. `progress`
    /// advances once per pair.
    pub fn match_pairs(
        &self,
        provider: &RegionsProvider,
        pairs: &PairSet,
        progress: &Progress,
    ) -> PairwiseMatches {
        let _span = trace_span!("match_pairs", pairs = pairs.len()).entered();
        let precomputed = match self.kind {
            MatcherKind::FastCascadeHashingL2 => self.precompute_hashes(provider, pairs),
            _ => None,
        };

        progress.restart(pairs.len());
        let pair_list: Vec<Pair> = pairs.iter().copied().collect();
        let run = |pair: &Pair| -> (Pair, Option<IndMatches>) {
            let result = self.match_pair(provider, *pair, precomputed.as_ref());
            progress.inc();
            match result {
                Ok(matches) => (*pair, Some(matches)),
                Err(_err) => {
                    trace_debug!("pair_skipped", first = pair.first(), second = pair.second());
                    (*pair, None)
                }
            }
        };

        #[cfg(feature = "rayon")]
        let results: Vec<(Pair, Option<IndMatches>)> = if self.config.parallel {
            pair_list.par_iter().map(&run).collect()
        } else {
            pair_list.iter().map(&run).collect()
        };
        #[cfg(not(feature = "rayon"))]
        let results: Vec<(Pair, Option<IndMatches>)> = pair_list.iter().map(&run).collect();

        let mut out = PairwiseMatches::new();
        let mut skipped = 0usize;
        for (pair, result) in results {
            match result {
                Some(matches) if !matches.is_empty() => {
                    out.insert(pair, matches);
                }
                Some(_) => {}
                None => skipped += 1,
            }
        }
        trace_event!(
            "match_pairs_done",
            pairs = pairs.len(),
            matched = out.len(),
            skipped = skipped
        );
        out
    }

    fn match_pair(
        &self,
        provider: &RegionsProvider,
        pair: Pair,
        precomputed: Option<&PrecomputedHashes>,
    ) -> PairMatchResult<IndMatches> {
        let a = provider.get(pair.first())?;
        let b = provider.get(pair.second())?;
        let mut matches = match precomputed {
            Some(pre) => {
                let hash_a = pre
                    .codes
                    .get(&pair.first())
                    .ok_or(PairMatchError::UnknownView(pair.first()))?;
                let hash_b = pre
                    .codes
                    .get(&pair.second())
                    .ok_or(PairMatchError::UnknownView(pair.second()))?;
                let (q, t) = scalar_views(&a, &b)?;
                pre.hasher
                    .match_hashed((hash_a, q), (hash_b, t), self.config.ratio)
            }
            None => match_regions(self.kind, &a, &b, &self.config)?,
        };
        dedup_matches(&mut matches);
        Ok(matches)
    }

    fn precompute_hashes(
        &self,
        provider: &RegionsProvider,
        pairs: &PairSet,
    ) -> Option<PrecomputedHashes> {
        let _span = trace_span!("precompute_hashes").entered();
        let dim = match provider.regions_type() {
            RegionsType::Scalar { dimension } => dimension,
            RegionsType::Binary { .. } => return None,
        };
        let views: Vec<ViewId> = pairs
            .iter()
            .flat_map(|p| [p.first(), p.second()])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut mean = DescriptorMean::new(dim);
        for &view in &views {
            if let Ok(regions) = provider.get(view) {
                if let Ok((data, d)) = regions.descriptors().as_scalar() {
                    if d == dim {
                        mean.add(DescriptorView::new(data, d));
                    }
                }
            }
        }
        let mean = mean.finish();
        let hasher = CascadeHasher::new(dim, self.config.cascade);

        let hash_view = |view: &ViewId| -> Option<(ViewId, HashedDescriptors)> {
            let regions: Arc<Regions> = provider.get(*view).ok()?;
            let (data, d) = regions.descriptors().as_scalar().ok()?;
            (d == dim).then(|| (*view, hasher.hash(DescriptorView::new(data, d), &mean)))
        };
        #[cfg(feature = "rayon")]
        let hashed: Vec<_> = if self.config.parallel {
            views.par_iter().filter_map(&hash_view).collect()
        } else {
            views.iter().filter_map(&hash_view).collect()
        };
        #[cfg(not(feature = "rayon"))]
        let hashed: Vec<_> = views.iter().filter_map(&hash_view).collect();

        trace_event!("hashed_views", views = hashed.len());
        Some(PrecomputedHashes {
            hasher,
            codes: hashed.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matches::IndMatch;
    use crate::regions::Feature;

    fn regions_from_rows(rows: &[[f32; 4]]) -> Regions {
        let features = (0..rows.len())
            .map(|k| Feature::new(k as f32, 0.0, 1.0, 0.0))
            .collect();
        let data = rows.iter().flatten().copied().collect();
        Regions::new(features, Descriptors::Scalar { dimension: 4, data }).unwrap()
    }

    #[test]
    fn names_round_trip_case_insensitively() {
        for kind in MatcherKind::ALL {
            assert_eq!(kind.name().to_lowercase().parse::<MatcherKind>().unwrap(), kind);
        }
        assert!("FLANN".parse::<MatcherKind>().is_err());
    }

    #[test]
    fn auto_follows_descriptor_kind() {
        let scalar = RegionsType::Scalar { dimension: 128 };
        let binary = RegionsType::Binary { bits: 256 };
        assert_eq!(
            MatcherKind::Auto.resolve(scalar).unwrap(),
            MatcherKind::FastCascadeHashingL2
        );
        assert_eq!(MatcherKind::Auto.resolve(binary).unwrap(), MatcherKind::HnswHamming);
        assert!(MatcherKind::BruteForceHamming.resolve(scalar).is_err());
        assert!(MatcherKind::HnswL2.resolve(binary).is_err());
    }

    #[test]
    fn exact_match_is_repeatable() {
        let a = regions_from_rows(&[[0.0, 0.0, 1.0, 0.0], [5.0, 5.0, 0.0, 0.0]]);
        let b = regions_from_rows(&[
            [5.1, 5.0, 0.0, 0.0],
            [9.0, 9.0, 9.0, 9.0],
            [0.0, 0.1, 1.0, 0.0],
        ]);
        let config = MatchingConfig::default();
        let first = match_regions(MatcherKind::BruteForceL2, &a, &b, &config).unwrap();
        assert_eq!(first, vec![IndMatch::new(0, 2), IndMatch::new(1, 0)]);
        let second = match_regions(MatcherKind::BruteForceL2, &a, &b, &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn ratio_outside_unit_interval_is_rejected() {
        let config = MatchingConfig {
            ratio: 1.5,
            ..MatchingConfig::default()
        };
        let scalar = RegionsType::Scalar { dimension: 4 };
        assert!(CollectionMatcher::new(MatcherKind::BruteForceL2, scalar, config).is_err());
    }
}
