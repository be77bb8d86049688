use criterion::{criterion_group, criterion_main, Criterion};
use pairmatch::geometry::kernel::{FundamentalKernel, ImageSize};
use pairmatch::lowlevel::{acransac, RansacConfig};
use pairmatch::matching::match_regions;
use pairmatch::{Descriptors, Feature, MatcherKind, MatchingConfig, Regions};
use nalgebra::Vector2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

fn make_regions(rng: &mut StdRng, count: usize, dimension: usize) -> Regions {
    let features = (0..count)
        .map(|_| Feature::new(rng.random_range(0.0..640.0), rng.random_range(0.0..480.0), 1.0, 0.0))
        .collect();
    let data = (0..count * dimension).map(|_| rng.random::<f32>()).collect();
    Regions::new(features, Descriptors::Scalar { dimension, data }).unwrap()
}

/// Copy of `base` with every descriptor slightly perturbed.
fn perturbed(rng: &mut StdRng, base: &Regions) -> Regions {
    let Descriptors::Scalar { dimension, data } = base.descriptors() else {
        unreachable!("scalar regions")
    };
    let data = data
        .iter()
        .map(|v| v + rng.random_range(-0.02..0.02))
        .collect();
    Regions::new(
        base.features().to_vec(),
        Descriptors::Scalar {
            dimension: *dimension,
            data,
        },
    )
    .unwrap()
}

fn bench_matchers(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let a = make_regions(&mut rng, 2000, 128);
    let b = perturbed(&mut rng, &a);
    let config = MatchingConfig {
        parallel: false,
        ..MatchingConfig::default()
    };

    for kind in [
        MatcherKind::BruteForceL2,
        MatcherKind::AnnL2,
        MatcherKind::HnswL2,
        MatcherKind::CascadeHashingL2,
    ] {
        c.bench_function(&format!("match_{}", kind.name()), |bench| {
            bench.iter(|| black_box(match_regions(kind, &a, &b, &config).unwrap()));
        });
    }
}

fn bench_acransac(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(11);
    // Pure translation along x: epipolar lines are image rows.
    let mut xa = Vec::new();
    let mut xb = Vec::new();
    for k in 0..400 {
        let p = Vector2::new(rng.random_range(0.0..640.0), rng.random_range(0.0..480.0));
        let q = if k % 2 == 0 {
            Vector2::new(p.x + rng.random_range(5.0..40.0), p.y)
        } else {
            Vector2::new(rng.random_range(0.0..640.0), rng.random_range(0.0..480.0))
        };
        xa.push(p);
        xb.push(q);
    }
    let kernel = FundamentalKernel::new(xa, xb, ImageSize::new(640, 480));
    let config = RansacConfig::default();
    c.bench_function("acransac_fundamental_50pct_outliers", |bench| {
        bench.iter(|| black_box(acransac(&kernel, &config)));
    });
}

criterion_group!(benches, bench_matchers, bench_acransac);
criterion_main!(benches);
