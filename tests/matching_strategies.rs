mod common;

use pairmatch::matching::match_regions;
use pairmatch::{
    CollectionMatcher, Descriptors, Feature, IndMatches, MatcherKind, MatchingConfig, Pair,
    PairSet, Progress, Regions, RegionsProvider, RegionsType,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const COUNT: usize = 400;
const SCALAR_DIM: usize = 64;
const BINARY_BYTES: usize = 32;

fn features(count: usize) -> Vec<Feature> {
    (0..count)
        .map(|k| Feature::new(k as f32, 0.0, 1.0, 0.0))
        .collect()
}

/// Random scalar descriptors and a slightly perturbed copy.
fn scalar_pair(seed: u64) -> (Regions, Regions) {
    let mut rng = StdRng::seed_from_u64(seed);
    let a: Vec<f32> = (0..COUNT * SCALAR_DIM).map(|_| rng.random::<f32>()).collect();
    let b: Vec<f32> = a.iter().map(|v| v + rng.random_range(-0.01..0.01)).collect();
    let wrap = |data| {
        Regions::new(
            features(COUNT),
            Descriptors::Scalar {
                dimension: SCALAR_DIM,
                data,
            },
        )
        .unwrap()
    };
    (wrap(a), wrap(b))
}

/// Random binary descriptors and a copy with a few flipped bits.
fn binary_pair(seed: u64) -> (Regions, Regions) {
    let mut rng = StdRng::seed_from_u64(seed);
    let a: Vec<u8> = (0..COUNT * BINARY_BYTES).map(|_| rng.random::<u8>()).collect();
    let mut b = a.clone();
    for row in b.chunks_mut(BINARY_BYTES) {
        for _ in 0..6 {
            let bit = rng.random_range(0..BINARY_BYTES * 8);
            row[bit / 8] ^= 1 << (bit % 8);
        }
    }
    let wrap = |data| {
        Regions::new(
            features(COUNT),
            Descriptors::Binary {
                bytes: BINARY_BYTES,
                data,
            },
        )
        .unwrap()
    };
    (wrap(a), wrap(b))
}

fn correct(matches: &IndMatches) -> usize {
    matches.iter().filter(|m| m.i == m.j).count()
}

#[test]
fn exact_matchers_find_every_twin() {
    let config = MatchingConfig::default();
    let (a, b) = scalar_pair(1);
    let l2 = match_regions(MatcherKind::BruteForceL2, &a, &b, &config).unwrap();
    assert_eq!(l2.len(), COUNT);
    assert_eq!(correct(&l2), COUNT);

    let (a, b) = binary_pair(2);
    let hamming = match_regions(MatcherKind::BruteForceHamming, &a, &b, &config).unwrap();
    assert_eq!(hamming.len(), COUNT);
    assert_eq!(correct(&hamming), COUNT);
}

#[test]
fn approximate_matchers_reach_high_recall() {
    let config = MatchingConfig::default();
    let (a, b) = scalar_pair(3);
    for kind in [
        MatcherKind::AnnL2,
        MatcherKind::HnswL2,
        MatcherKind::HnswL1,
        MatcherKind::CascadeHashingL2,
        MatcherKind::FastCascadeHashingL2,
    ] {
        let matches = match_regions(kind, &a, &b, &config).unwrap();
        let hits = correct(&matches);
        assert!(hits * 10 >= COUNT * 8, "{kind}: {hits} of {COUNT}");
        assert!(hits * 20 >= matches.len() * 19, "{kind}: {} wrong", matches.len() - hits);
    }

    let (a, b) = binary_pair(4);
    let matches = match_regions(MatcherKind::HnswHamming, &a, &b, &config).unwrap();
    assert!(correct(&matches) * 10 >= COUNT * 8);
}

#[test]
fn approximate_matchers_are_deterministic() {
    let config = MatchingConfig::default();
    let (a, b) = scalar_pair(5);
    for kind in [MatcherKind::AnnL2, MatcherKind::HnswL2, MatcherKind::CascadeHashingL2] {
        let first = match_regions(kind, &a, &b, &config).unwrap();
        let second = match_regions(kind, &a, &b, &config).unwrap();
        assert_eq!(first, second, "{kind}");
    }
}

#[test]
fn strict_ratio_keeps_fewer_matches() {
    let (a, b) = scalar_pair(6);
    let loose =
        match_regions(MatcherKind::BruteForceL2, &a, &b, &MatchingConfig::default()).unwrap();
    let strict = match_regions(
        MatcherKind::BruteForceL2,
        &a,
        &b,
        &MatchingConfig {
            ratio: 0.01,
            ..MatchingConfig::default()
        },
    )
    .unwrap();
    assert!(strict.len() <= loose.len());
    assert!(strict.iter().all(|m| loose.contains(m)));
}

#[test]
fn kind_mismatch_is_an_error() {
    let (a, b) = scalar_pair(7);
    let config = MatchingConfig::default();
    assert!(match_regions(MatcherKind::BruteForceHamming, &a, &b, &config).is_err());
    let (a, b) = binary_pair(8);
    assert!(match_regions(MatcherKind::CascadeHashingL2, &a, &b, &config).is_err());
    assert!("NOT_A_MATCHER".parse::<MatcherKind>().is_err());
}

#[test]
fn collection_matcher_uses_one_strategy_for_all_pairs() {
    let regions = common::four_view_regions();
    let provider =
        RegionsProvider::from_regions(RegionsType::Scalar { dimension: common::DIM }, regions);
    let pairs: PairSet = pairmatch::pairs::exhaustive_pairs(4);
    let matcher = CollectionMatcher::new(
        MatcherKind::Auto,
        provider.regions_type(),
        MatchingConfig::default(),
    )
    .unwrap();
    assert_eq!(matcher.kind(), MatcherKind::FastCascadeHashingL2);

    let progress = Progress::new();
    let matches = matcher.match_pairs(&provider, &pairs, &progress);
    assert_eq!(progress.done(), 6);
    assert!(matches.keys().all(|p| p.second() != 3));
    let strong = &matches[&Pair::new(0, 1).unwrap()];
    assert!(correct_by_point(strong, 0, 0) * 10 >= 50 * 8);
}

/// Correspondences linking the same world point; `offset_*` is the first
/// point observed by each view.
fn correct_by_point(matches: &IndMatches, offset_a: u32, offset_b: u32) -> usize {
    matches
        .iter()
        .filter(|m| m.i + offset_a == m.j + offset_b)
        .count()
}
