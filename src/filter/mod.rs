//! Geometric verification of putative matches.
//!
//! Every pair is verified independently: its correspondences are lifted to
//! pixel positions (or bearings), a robust estimator fits the requested
//! model, and only the inliers of that model survive. Pairs that cannot be
//! verified are dropped from the output.

pub mod guided;

pub use guided::{guided_match, GuidedMatching};

use crate::geometry::kernel::{
    BearingKernel, BearingSolver, EssentialKernel, FundamentalKernel, HomographyKernel, ImageSize,
    OrthographicKernel, PairGeometry,
};
use crate::geometry::GeometricModelKind;
use crate::matches::{IndMatches, PairwiseMatches};
use crate::pairs::Pair;
use crate::progress::Progress;
use crate::regions::{Regions, RegionsProvider};
use crate::robust::{acransac, ransac, Kernel, RansacConfig, RobustResult};
use crate::scene::{Camera, Scene, View};
use crate::trace::{trace_debug, trace_event, trace_span};
use crate::util::{PairMatchError, PairMatchResult};
use nalgebra::{Matrix3, Vector2, Vector3};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Post-estimation pruning of essential matrix pairs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EssentialPruning {
    /// Fewest inliers a pair may keep.
    pub min_inliers: usize,
    /// Smallest inlier to putative ratio a pair may keep.
    pub min_ratio: f64,
}

impl Default for EssentialPruning {
    fn default() -> Self {
        Self {
            min_inliers: 50,
            min_ratio: 0.3,
        }
    }
}

impl EssentialPruning {
    /// Returns true when `inliers` out of `putative` survive pruning.
    pub fn keeps(&self, inliers: usize, putative: usize) -> bool {
        putative > 0
            && inliers >= self.min_inliers
            && inliers as f64 >= self.min_ratio * putative as f64
    }
}

/// Geometric filter configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeometricFilterConfig {
    /// Sampling budget of the robust estimator.
    pub max_iterations: usize,
    /// Inlier threshold in pixels; `None` uses the model default.
    pub threshold: Option<f64>,
    /// Base seed; every pair derives its own generator from it.
    pub seed: u64,
    /// A model is valid when its inliers exceed this multiple of its
    /// minimal sample size.
    pub min_inlier_factor: f64,
    /// Pruning applied to essential matrix results.
    pub essential_pruning: Option<EssentialPruning>,
    /// Verify pairs on the rayon pool when the feature is enabled.
    pub parallel: bool,
}

impl Default for GeometricFilterConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2048,
            threshold: None,
            seed: 0,
            min_inlier_factor: 2.5,
            essential_pruning: Some(EssentialPruning::default()),
            parallel: true,
        }
    }
}

/// Verification result of one pair.
type PairOutcome = (Pair, PairMatchResult<Option<IndMatches>>);

/// Estimated model of one pair.
struct Verified {
    geometry: PairGeometry,
    /// Indices into the putative list, sorted.
    inliers: Vec<usize>,
    /// Squared residual bound of the estimation, reused by guided matching.
    max_error: f64,
}

/// Verifies putative matches against a two-view model.
pub struct GeometricFilter<'a> {
    scene: &'a Scene,
    provider: &'a RegionsProvider,
    config: GeometricFilterConfig,
}

impl<'a> GeometricFilter<'a> {
    /// Creates a filter over the views of `scene` and the regions of
    /// `provider`.
    pub fn new(
        scene: &'a Scene,
        provider: &'a RegionsProvider,
        config: GeometricFilterConfig,
    ) -> PairMatchResult<Self> {
        if config.max_iterations == 0 {
            return Err(PairMatchError::InvalidInput("max_iterations must be >= 1"));
        }
        if let Some(threshold) = config.threshold {
            if !(threshold.is_finite() && threshold > 0.0) {
                return Err(PairMatchError::InvalidInput("threshold must be positive"));
            }
        }
        Ok(Self {
            scene,
            provider,
            config,
        })
    }

    /// Filter configuration.
    pub fn config(&self) -> &GeometricFilterConfig {
        &self.config
    }

    /// Fits `kind` to every pair of `putative` and keeps the inliers.
    ///
    /// With guidance enabled, the inliers are replaced by a re-matching of
    /// the whole pair constrained by the estimated model. Pairs whose
    /// estimation fails, is too weak or ends empty are left out. `progress`
    /// advances once per pair.
    pub fn robust_model_estimation(
        &self,
        kind: GeometricModelKind,
        putative: &PairwiseMatches,
        guidance: GuidedMatching,
        progress: &Progress,
    ) -> PairwiseMatches {
        let _span = trace_span!("geometric_filter", pairs = putative.len()).entered();
        progress.restart(putative.len());
        let entries: Vec<(&Pair, &IndMatches)> = putative.iter().collect();
        let verify_pair = |&(pair, matches): &(&Pair, &IndMatches)| -> PairOutcome {
            let result = self.filter_pair(kind, *pair, matches, guidance);
            progress.inc();
            (*pair, result)
        };

        #[cfg(feature = "rayon")]
        let results: Vec<PairOutcome> = if self.config.parallel {
            entries.par_iter().map(&verify_pair).collect()
        } else {
            entries.iter().map(&verify_pair).collect()
        };
        #[cfg(not(feature = "rayon"))]
        let results: Vec<PairOutcome> = entries.iter().map(&verify_pair).collect();

        let mut out = PairwiseMatches::new();
        let mut rejected = 0usize;
        let mut skipped = 0usize;
        for (pair, result) in results {
            match result {
                Ok(Some(matches)) => {
                    out.insert(pair, matches);
                }
                Ok(None) => rejected += 1,
                Err(_err) => {
                    trace_debug!("pair_skipped", first = pair.first(), second = pair.second());
                    skipped += 1;
                }
            }
        }
        trace_event!(
            "geometric_filter_done",
            pairs = putative.len(),
            accepted = out.len(),
            rejected = rejected,
            skipped = skipped
        );
        out
    }

    /// Verifies one pair.
    ///
    /// Returns `Ok(None)` when the pair is rejected and an error when its
    /// views, cameras or regions are unusable for `kind`.
    pub fn filter_pair(
        &self,
        kind: GeometricModelKind,
        pair: Pair,
        putative: &IndMatches,
        guidance: GuidedMatching,
    ) -> PairMatchResult<Option<IndMatches>> {
        if putative.len() < kind.min_sample() {
            return Ok(None);
        }
        let view_a = self.view(pair.first())?;
        let view_b = self.view(pair.second())?;
        let regions_a = self.provider.get(pair.first())?;
        let regions_b = self.provider.get(pair.second())?;
        let (xa, xb) = positions(&regions_a, &regions_b, putative)?;

        let Some(verified) = self.estimate(kind, pair, (view_a, view_b), xa, xb)? else {
            return Ok(None);
        };
        let required = self.config.min_inlier_factor * kind.min_sample() as f64;
        if verified.inliers.len() as f64 <= required {
            return Ok(None);
        }

        let matches: IndMatches = if guidance.is_enabled() {
            guided_match(
                &verified.geometry,
                &regions_a,
                &regions_b,
                verified.max_error,
                guidance,
            )?
        } else {
            verified.inliers.iter().map(|&k| putative[k]).collect()
        };

        if kind == GeometricModelKind::Essential {
            if let Some(pruning) = self.config.essential_pruning {
                if !pruning.keeps(matches.len(), putative.len()) {
                    return Ok(None);
                }
            }
        }
        Ok((!matches.is_empty()).then_some(matches))
    }

    fn view(&self, id: u32) -> PairMatchResult<&View> {
        self.scene.view(id).ok_or(PairMatchError::UnknownView(id))
    }

    fn camera(&self, id: u32) -> PairMatchResult<&Camera> {
        self.scene.camera_of(id).ok_or(PairMatchError::Estimation {
            reason: "view has no intrinsic",
        })
    }

    fn ransac_config(&self, pair: Pair, max_error: f64) -> RansacConfig {
        let pair_key = (u64::from(pair.first()) << 32) | u64::from(pair.second());
        RansacConfig {
            max_iterations: self.config.max_iterations,
            max_error,
            seed: self.config.seed ^ pair_key,
            ..RansacConfig::default()
        }
    }

    fn estimate(
        &self,
        kind: GeometricModelKind,
        pair: Pair,
        (_, view_b): (&View, &View),
        xa: Vec<Vector2<f64>>,
        xb: Vec<Vector2<f64>>,
    ) -> PairMatchResult<Option<Verified>> {
        let threshold = self.config.threshold.unwrap_or_else(|| kind.default_threshold());
        let size_b = ImageSize::new(view_b.width, view_b.height);
        let pixel_config = self.ransac_config(pair, threshold * threshold);
        let verified = match kind {
            GeometricModelKind::Fundamental => {
                let kernel = FundamentalKernel::new(xa, xb, size_b);
                run(&kernel, &pixel_config, true)
                    .map(|r| verify(r, &pixel_config, PairGeometry::Epipolar))
            }
            GeometricModelKind::Homography => {
                let kernel = HomographyKernel::new(xa, xb, size_b);
                run(&kernel, &pixel_config, true)
                    .map(|r| verify(r, &pixel_config, PairGeometry::Homography))
            }
            GeometricModelKind::Essential | GeometricModelKind::EssentialOrtho => {
                let ka = pinhole(self.camera(pair.first())?)?;
                let kb = pinhole(self.camera(pair.second())?)?;
                let singular = PairMatchError::Estimation {
                    reason: "calibration matrix is singular",
                };
                if kind == GeometricModelKind::Essential {
                    let kernel = EssentialKernel::new(xa, xb, &ka, &kb, size_b).ok_or(singular)?;
                    run(&kernel, &pixel_config, true)
                        .map(|r| verify(r, &pixel_config, PairGeometry::Epipolar))
                } else {
                    let kernel = OrthographicKernel::new(xa, xb, &ka, &kb, size_b).ok_or(singular)?;
                    run(&kernel, &pixel_config, kind.uses_acransac())
                        .map(|r| verify(r, &pixel_config, PairGeometry::Epipolar))
                }
            }
            GeometricModelKind::EssentialAngular | GeometricModelKind::EssentialUpright => {
                let camera_a = spherical(self.camera(pair.first())?)?;
                let camera_b = spherical(self.camera(pair.second())?)?;
                let ba = bearings(camera_a, &xa)?;
                let bb = bearings(camera_b, &xb)?;
                let solver = if kind == GeometricModelKind::EssentialUpright {
                    BearingSolver::Upright
                } else {
                    BearingSolver::General
                };
                // A pixel threshold becomes an angle through the sphere's
                // horizontal resolution.
                let angle = threshold * std::f64::consts::TAU / f64::from(camera_a.width().max(1));
                let config = self.ransac_config(pair, angle.sin().powi(2));
                let kernel = BearingKernel::new(ba, bb, solver);
                run(&kernel, &config, true).map(|r| {
                    verify(r, &config, |essential| PairGeometry::Spherical {
                        essential,
                        camera_a: camera_a.clone(),
                        camera_b: camera_b.clone(),
                    })
                })
            }
        };
        Ok(verified)
    }
}

fn run<K: Kernel>(
    kernel: &K,
    config: &RansacConfig,
    a_contrario: bool,
) -> Option<RobustResult<K::Model>> {
    if a_contrario {
        acransac(kernel, config)
    } else {
        ransac(kernel, config)
    }
}

fn verify(
    result: RobustResult<Matrix3<f64>>,
    config: &RansacConfig,
    geometry: impl FnOnce(Matrix3<f64>) -> PairGeometry,
) -> Verified {
    let mut inliers = result.inliers;
    inliers.sort_unstable();
    Verified {
        geometry: geometry(result.model),
        inliers,
        max_error: config.max_error,
    }
}

fn positions(
    a: &Regions,
    b: &Regions,
    matches: &IndMatches,
) -> PairMatchResult<(Vec<Vector2<f64>>, Vec<Vector2<f64>>)> {
    let lookup = |regions: &Regions, idx: u32| {
        regions
            .point(idx as usize)
            .map(|(x, y)| Vector2::new(x, y))
            .ok_or(PairMatchError::InvalidInput("match refers to a missing feature"))
    };
    let mut xa = Vec::with_capacity(matches.len());
    let mut xb = Vec::with_capacity(matches.len());
    for m in matches {
        xa.push(lookup(a, m.i)?);
        xb.push(lookup(b, m.j)?);
    }
    Ok((xa, xb))
}

fn pinhole(camera: &Camera) -> PairMatchResult<Matrix3<f64>> {
    camera.k_matrix().ok_or(PairMatchError::Estimation {
        reason: "model needs pinhole intrinsics",
    })
}

fn spherical(camera: &Camera) -> PairMatchResult<&Camera> {
    match camera {
        Camera::Spherical { .. } => Ok(camera),
        Camera::Pinhole { .. } => Err(PairMatchError::Estimation {
            reason: "model needs spherical intrinsics",
        }),
    }
}

fn bearings(camera: &Camera, points: &[Vector2<f64>]) -> PairMatchResult<Vec<Vector3<f64>>> {
    points
        .iter()
        .map(|p| {
            camera.bearing(p.x, p.y).ok_or(PairMatchError::Estimation {
                reason: "model needs spherical intrinsics",
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn essential_pruning_thresholds() {
        let pruning = EssentialPruning::default();
        assert!(!pruning.keeps(40, 100));
        assert!(pruning.keeps(60, 120));
        assert!(!pruning.keeps(60, 250));
        assert!(!pruning.keeps(0, 0));
    }

    #[test]
    fn filter_rejects_bad_configuration() {
        let scene = Scene::default();
        let provider = RegionsProvider::from_regions(
            crate::regions::RegionsType::Binary { bits: 8 },
            std::iter::empty(),
        );
        let config = GeometricFilterConfig {
            threshold: Some(-1.0),
            ..Default::default()
        };
        assert!(GeometricFilter::new(&scene, &provider, config).is_err());
        let config = GeometricFilterConfig {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(GeometricFilter::new(&scene, &provider, config).is_err());
    }
}
