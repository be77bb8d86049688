//! Fixed-threshold RANSAC maximizing the inlier count.

use crate::robust::{draw_sample, Kernel, RansacConfig, RobustResult};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Iterations needed to draw an all-inlier sample with `confidence`, given
/// an inlier ratio.
fn required_iterations(inlier_ratio: f64, sample_size: usize, confidence: f64) -> usize {
    let good_sample = inlier_ratio.powi(sample_size as i32);
    if good_sample >= 1.0 {
        return 1;
    }
    if good_sample <= f64::EPSILON {
        return usize::MAX;
    }
    let needed = (1.0 - confidence).ln() / (1.0 - good_sample).ln();
    if needed.is_finite() && needed > 0.0 {
        needed.ceil() as usize
    } else {
        usize::MAX
    }
}

/// Runs RANSAC with `config.max_error` as the inlier bound. Returns `None`
/// when no sample produced a model.
pub fn ransac<K: Kernel>(kernel: &K, config: &RansacConfig) -> Option<RobustResult<K::Model>> {
    let n = kernel.len();
    let s = kernel.sample_size();
    if s == 0 || n < s {
        return None;
    }
    let pool: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut iterations = config.max_iterations.max(1);
    let mut best: Option<RobustResult<K::Model>> = None;
    let mut models = Vec::with_capacity(kernel.max_models());

    let mut iter = 0usize;
    while iter < iterations {
        let sample = draw_sample(&mut rng, &pool, s);
        models.clear();
        kernel.fit(&sample, &mut models);
        for model in &models {
            let mut scored: Vec<(f64, usize)> = (0..n)
                .map(|idx| (kernel.error(model, idx), idx))
                .filter(|(err, _)| *err <= config.max_error)
                .collect();
            let count = scored.len();
            if best.as_ref().map_or(true, |b| count > b.inliers.len()) {
                scored.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
                let error_bound = scored.last().map_or(0.0, |&(err, _)| err);
                best = Some(RobustResult {
                    model: model.clone(),
                    inliers: scored.into_iter().map(|(_, idx)| idx).collect(),
                    score: count as f64,
                    error_bound,
                });
                let needed = required_iterations(count as f64 / n as f64, s, config.confidence);
                iterations = iterations.min(needed.max(iter + 1));
            }
        }
        iter += 1;
    }
    best
}
