//! Robust model estimation.
//!
//! A [`Kernel`] bundles the data of one estimation problem with its minimal
//! solver and residual. [`acransac`] picks the model with the smallest
//! number of false alarms and adapts its inlier threshold; [`ransac`] uses a
//! fixed threshold and maximizes the inlier count.

pub mod acransac;
pub mod ransac;

pub use acransac::acransac;
pub use ransac::ransac;

/// Estimation problem over `len()` indexed correspondences.
pub trait Kernel {
    /// Estimated model.
    type Model: Clone;

    /// Correspondences consumed by one minimal solve.
    fn sample_size(&self) -> usize;

    /// Upper bound on the models one minimal solve can return.
    fn max_models(&self) -> usize;

    /// Number of correspondences.
    fn len(&self) -> usize;

    /// Returns true when there is no correspondence.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends the models fitting the correspondences in `sample`.
    fn fit(&self, sample: &[usize], models: &mut Vec<Self::Model>);

    /// Squared residual of correspondence `idx` under `model`.
    fn error(&self, model: &Self::Model, idx: usize) -> f64;

    /// Probability that a random correspondence has a residual of one unit.
    fn alpha0(&self) -> f64;

    /// Exponent turning a squared residual into the rejection region scale.
    fn mult_error(&self) -> f64;
}

/// Estimator settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RansacConfig {
    /// Iteration budget.
    pub max_iterations: usize,
    /// Largest squared residual an inlier may have.
    pub max_error: f64,
    /// Seed of the sampling generator.
    pub seed: u64,
    /// Success probability used to shorten plain RANSAC.
    pub confidence: f64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2048,
            max_error: 16.0,
            seed: 0,
            confidence: 0.99,
        }
    }
}

/// Best model with the indices of its inliers.
#[derive(Clone, Debug, PartialEq)]
pub struct RobustResult<M> {
    pub model: M,
    /// Inlier indices, sorted by increasing residual.
    pub inliers: Vec<usize>,
    /// `log10(NFA)` for a-contrario estimation, the inlier count otherwise.
    pub score: f64,
    /// Largest inlier residual.
    pub error_bound: f64,
}

/// Draws `amount` distinct entries of `pool`.
pub(crate) fn draw_sample<R: rand::Rng + ?Sized>(
    rng: &mut R,
    pool: &[usize],
    amount: usize,
) -> Vec<usize> {
    rand::seq::index::sample(rng, pool.len(), amount)
        .into_iter()
        .map(|k| pool[k])
        .collect()
}
