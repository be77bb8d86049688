mod common;

use pairmatch::matches::io::{load_matches, save_matches};
use pairmatch::regions::io::{read_regions, region_paths, write_regions};
use pairmatch::{
    IndMatch, Pair, PairMatchError, PairwiseMatches, ProviderMode, Progress, RegionsProvider,
    RegionsType,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_matches(seed: u64) -> PairwiseMatches {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut matches = PairwiseMatches::new();
    for _ in 0..20 {
        let a = rng.random_range(0..30u32);
        let b = rng.random_range(0..30u32);
        let Some(pair) = Pair::new(a, b) else { continue };
        let count = rng.random_range(1..50);
        let list = (0..count)
            .map(|_| IndMatch::new(rng.random_range(0..5000), rng.random_range(0..5000)))
            .collect();
        matches.insert(pair, list);
    }
    matches
}

#[test]
fn matches_survive_both_formats() {
    let dir = tempfile::tempdir().unwrap();
    let matches = random_matches(9);
    assert!(!matches.is_empty());
    for name in ["m.txt", "m.json"] {
        let path = dir.path().join(name);
        save_matches(&path, &matches).unwrap();
        assert_eq!(load_matches(&path).unwrap(), matches);

        save_matches(&path, &PairwiseMatches::new()).unwrap();
        assert!(load_matches(&path).unwrap().is_empty());
    }
}

#[test]
fn unknown_matches_extension_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = save_matches(dir.path().join("m.bin"), &PairwiseMatches::new()).unwrap_err();
    assert!(matches!(err, PairMatchError::UnsupportedFormat { .. }));
}

#[test]
fn regions_survive_disk() {
    let dir = tempfile::tempdir().unwrap();
    let view = common::view(0);
    let regions = common::four_view_regions().remove(1).1;
    write_regions(dir.path(), &view, &regions).unwrap();
    let (feat, desc) = region_paths(dir.path(), &view).unwrap();
    let kind = RegionsType::Scalar { dimension: common::DIM };
    let loaded = read_regions(&feat, &desc, kind).unwrap();
    assert_eq!(loaded, regions);
}

#[test]
fn descriptor_count_mismatch_fails_the_load() {
    let fixture = common::write_fixture(&common::four_view_regions());
    let view = common::view(2);
    let (feat, _) = region_paths(&fixture.matches_dir(), &view).unwrap();
    // Drop the last feature line: 54 features against 55 descriptors.
    let text = std::fs::read_to_string(&feat).unwrap();
    let kept: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    std::fs::write(&feat, kept[..kept.len() - 1].join("\n")).unwrap();

    let scene = common::scene(4);
    let result = RegionsProvider::load(
        &scene,
        &fixture.matches_dir(),
        RegionsType::Scalar { dimension: common::DIM },
        ProviderMode::Eager,
        &Progress::new(),
    );
    assert!(matches!(result, Err(PairMatchError::Parse { .. })));
}

#[test]
fn missing_region_file_fails_the_load() {
    let fixture = common::write_fixture(&common::four_view_regions());
    std::fs::remove_file(fixture.matches_path("view3.feat")).unwrap();
    let result = RegionsProvider::load(
        &common::scene(4),
        &fixture.matches_dir(),
        RegionsType::Scalar { dimension: common::DIM },
        ProviderMode::Cached { capacity: 2 },
        &Progress::new(),
    );
    assert!(matches!(
        result,
        Err(PairMatchError::MissingRegions { view_id: 3, .. })
    ));
}
