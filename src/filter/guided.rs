//! Re-matching of a pair under a verified geometry.
//!
//! Every feature of view A is compared only against the features of view B
//! whose residual under the pair geometry stays below the threshold. The
//! nearest of those candidates in descriptor space becomes the match, subject
//! to an optional distance ratio test.

use crate::geometry::kernel::PairGeometry;
use crate::matches::{dedup_matches, IndMatch, IndMatches};
use crate::matching::metric::{DescriptorView, Hamming, Metric, SquaredL2};
use crate::regions::{Descriptors, Regions};
use crate::trace::trace_span;
use crate::util::{PairMatchError, PairMatchResult};

/// Descriptor test applied among geometrically consistent candidates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GuidedMatching {
    /// Keep the estimation inliers as they are.
    Disabled,
    /// Nearest consistent descriptor, no ratio test.
    GeometryOnly,
    /// Nearest consistent descriptor when it passes the ratio test.
    DistanceRatio(f32),
}

impl GuidedMatching {
    /// Guidance used for a model when guided matching is requested.
    pub fn for_model(kind: crate::geometry::GeometricModelKind) -> Self {
        match kind.guided_ratio() {
            Some(ratio) => GuidedMatching::DistanceRatio(ratio),
            None => GuidedMatching::GeometryOnly,
        }
    }

    /// Returns true unless guidance is disabled.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, GuidedMatching::Disabled)
    }

    fn ratio(&self) -> Option<f32> {
        match *self {
            GuidedMatching::DistanceRatio(ratio) => Some(ratio),
            _ => None,
        }
    }
}

/// Matches `a` against `b` among pairs with `geometry.error <= max_error`.
///
/// `max_error` is squared, in the units of the geometry. Returns an error
/// when the descriptor kinds of the two views differ.
pub fn guided_match(
    geometry: &PairGeometry,
    a: &Regions,
    b: &Regions,
    max_error: f64,
    guidance: GuidedMatching,
) -> PairMatchResult<IndMatches> {
    let _span = trace_span!("guided_matching", features = a.len()).entered();
    let points_a: Vec<(f64, f64)> = (0..a.len()).filter_map(|i| a.point(i)).collect();
    let points_b: Vec<(f64, f64)> = (0..b.len()).filter_map(|j| b.point(j)).collect();
    let ratio = guidance.ratio();
    let mut matches = match (a.descriptors(), b.descriptors()) {
        (
            Descriptors::Scalar {
                dimension: da,
                data: xa,
            },
            Descriptors::Scalar {
                dimension: db,
                data: xb,
            },
        ) if da == db && *da > 0 => consistent_nearest::<SquaredL2>(
            geometry,
            (&points_a, DescriptorView::new(xa, *da)),
            (&points_b, DescriptorView::new(xb, *db)),
            max_error,
            ratio,
        ),
        (
            Descriptors::Binary {
                bytes: ba,
                data: xa,
            },
            Descriptors::Binary {
                bytes: bb,
                data: xb,
            },
        ) if ba == bb && *ba > 0 => consistent_nearest::<Hamming>(
            geometry,
            (&points_a, DescriptorView::new(xa, *ba)),
            (&points_b, DescriptorView::new(xb, *bb)),
            max_error,
            ratio,
        ),
        _ => return Err(PairMatchError::InvalidInput("descriptor kinds differ")),
    };
    dedup_matches(&mut matches);
    Ok(matches)
}

fn consistent_nearest<M: Metric>(
    geometry: &PairGeometry,
    (points_a, desc_a): (&[(f64, f64)], DescriptorView<'_, M::Element>),
    (points_b, desc_b): (&[(f64, f64)], DescriptorView<'_, M::Element>),
    max_error: f64,
    ratio: Option<f32>,
) -> IndMatches {
    let bound = ratio.map(M::ratio_bound);
    let mut out = IndMatches::new();
    for (i, &pa) in points_a.iter().enumerate() {
        let mut best: Option<(usize, f32)> = None;
        let mut second = f32::INFINITY;
        for (j, &pb) in points_b.iter().enumerate() {
            if geometry.error(pa, pb) > max_error {
                continue;
            }
            let d = M::distance(desc_a.get(i), desc_b.get(j));
            match best {
                Some((_, best_d)) if d >= best_d => second = second.min(d),
                Some((_, best_d)) => {
                    second = best_d;
                    best = Some((j, d));
                }
                None => best = Some((j, d)),
            }
        }
        let Some((j, d)) = best else { continue };
        let accepted = match bound {
            Some(bound) => !second.is_finite() || d < bound * second,
            None => true,
        };
        if accepted {
            out.push(IndMatch::new(i as u32, j as u32));
        }
    }
    out
}
