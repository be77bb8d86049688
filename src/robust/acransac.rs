//! A-contrario RANSAC.
//!
//! For a candidate model the residuals are sorted and, for every prefix of
//! `k` correspondences, the number of false alarms
//!
//! `NFA(k) = n_models (n - s) C(n, k) C(k, s) (alpha0 e_k^mult)^(k - s)`
//!
//! is evaluated, `e_k` being the k-th smallest residual. The model and prefix
//! with the smallest NFA win; the result is meaningful when `NFA < 1`.
//! The first nine tenths of the iteration budget sample from every
//! correspondence; the last tenth samples from the inliers of the best
//! meaningful model found so far, if any.

use crate::robust::{draw_sample, Kernel, RansacConfig, RobustResult};
use crate::util::math::{log10_binomial, log10_factorials};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Added to residuals before taking their logarithm.
const RESIDUAL_FLOOR: f64 = f32::EPSILON as f64;

struct NfaContext<'a> {
    factorials: &'a [f64],
    sample_size: usize,
    max_error: f64,
    log_e0: f64,
    log_alpha0: f64,
    mult: f64,
}

impl NfaContext<'_> {
    /// Smallest `log10(NFA)` over prefixes of `sorted` and its prefix length.
    fn best(&self, sorted: &[(f64, usize)]) -> Option<(f64, usize)> {
        let n = sorted.len();
        let s = self.sample_size;
        let mut best: Option<(f64, usize)> = None;
        for k in (s + 1)..=n {
            let err = sorted[k - 1].0;
            if err.is_nan() || err > self.max_error {
                break;
            }
            let log_alpha = self.log_alpha0 + self.mult * (err + RESIDUAL_FLOOR).log10();
            let nfa = self.log_e0
                + log_alpha * (k - s) as f64
                + log10_binomial(self.factorials, n, k)
                + log10_binomial(self.factorials, k, s);
            if best.map_or(true, |(b, _)| nfa < b) {
                best = Some((nfa, k));
            }
        }
        best
    }
}

/// Runs a-contrario RANSAC; returns `None` when no meaningful model exists.
pub fn acransac<K: Kernel>(kernel: &K, config: &RansacConfig) -> Option<RobustResult<K::Model>> {
    let n = kernel.len();
    let s = kernel.sample_size();
    if s == 0 || n <= s {
        return None;
    }
    let factorials = log10_factorials(n);
    let ctx = NfaContext {
        factorials: &factorials,
        sample_size: s,
        max_error: config.max_error,
        log_e0: ((kernel.max_models().max(1) * (n - s)) as f64).log10(),
        log_alpha0: kernel.alpha0().log10(),
        mult: kernel.mult_error(),
    };

    let mut rng = StdRng::seed_from_u64(config.seed);
    let all: Vec<usize> = (0..n).collect();
    // Inliers of the best meaningful model, sampled during the last tenth.
    let mut refined: Vec<usize> = Vec::new();
    let budget = config.max_iterations.max(1);
    let refine_from = budget - budget / 10;
    let mut best: Option<RobustResult<K::Model>> = None;
    let mut models = Vec::with_capacity(kernel.max_models());
    let mut residuals: Vec<(f64, usize)> = Vec::with_capacity(n);

    for iter in 0..budget {
        let pool = if iter >= refine_from && refined.len() > s {
            &refined
        } else {
            &all
        };
        let sample = draw_sample(&mut rng, pool, s);
        models.clear();
        kernel.fit(&sample, &mut models);

        for model in &models {
            residuals.clear();
            residuals.extend((0..n).map(|idx| (kernel.error(model, idx), idx)));
            residuals.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
            let Some((nfa, k)) = ctx.best(&residuals) else {
                continue;
            };
            if best.as_ref().map_or(true, |b| nfa < b.score) {
                let inliers: Vec<usize> = residuals[..k].iter().map(|&(_, idx)| idx).collect();
                if nfa < 0.0 {
                    refined.clone_from(&inliers);
                }
                best = Some(RobustResult {
                    model: model.clone(),
                    inliers,
                    score: nfa,
                    error_bound: residuals[k - 1].0,
                });
            }
        }
    }

    best.filter(|b| b.score < 0.0)
}
