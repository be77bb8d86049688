//! Two-view geometric models and their minimal solvers.
//!
//! Every solver works on the constraint `x_bᵀ M x_a = 0` (or `x_b ~ H x_a`)
//! and returns all candidate models a minimal sample admits. Residuals are
//! squared so robust estimators can compare them against squared thresholds.

pub mod essential;
pub mod fundamental;
pub mod homography;
pub mod kernel;
pub mod ortho;
pub(crate) mod poly;
pub mod spherical;

use crate::util::PairMatchError;
use nalgebra::{DMatrix, DVector, Matrix3, Vector2, Vector3};
use std::fmt;
use std::str::FromStr;

/// Geometric model used to verify a pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GeometricModelKind {
    /// Fundamental matrix, uncalibrated general motion.
    Fundamental,
    /// Essential matrix, calibrated pinhole cameras.
    Essential,
    /// Homography, planar scenes or pure rotation.
    Homography,
    /// Essential matrix on bearings of spherical cameras.
    EssentialAngular,
    /// Essential matrix on bearings, rotation about the vertical axis only.
    EssentialUpright,
    /// Affine epipolar geometry of orthographic cameras.
    EssentialOrtho,
}

impl GeometricModelKind {
    /// Every supported model.
    pub const ALL: [GeometricModelKind; 6] = [
        GeometricModelKind::Fundamental,
        GeometricModelKind::Essential,
        GeometricModelKind::Homography,
        GeometricModelKind::EssentialAngular,
        GeometricModelKind::EssentialUpright,
        GeometricModelKind::EssentialOrtho,
    ];

    /// Descriptive lower-case name.
    pub fn name(&self) -> &'static str {
        match self {
            GeometricModelKind::Fundamental => "fundamental",
            GeometricModelKind::Essential => "essential",
            GeometricModelKind::Homography => "homography",
            GeometricModelKind::EssentialAngular => "angular",
            GeometricModelKind::EssentialUpright => "upright",
            GeometricModelKind::EssentialOrtho => "orthographic",
        }
    }

    /// Correspondences consumed by one minimal solve.
    pub fn min_sample(&self) -> usize {
        match self {
            GeometricModelKind::Fundamental => 7,
            GeometricModelKind::Essential => 5,
            GeometricModelKind::Homography => 4,
            GeometricModelKind::EssentialAngular => 8,
            GeometricModelKind::EssentialUpright => 5,
            GeometricModelKind::EssentialOrtho => 4,
        }
    }

    /// Default residual threshold in pixels.
    pub fn default_threshold(&self) -> f64 {
        match self {
            GeometricModelKind::EssentialOrtho => 2.0,
            _ => 4.0,
        }
    }

    /// True for models estimated with the a-contrario estimator.
    pub fn uses_acransac(&self) -> bool {
        !matches!(self, GeometricModelKind::EssentialOrtho)
    }

    /// Descriptor ratio used when guided matching is enabled; `None` means
    /// geometry-only guided matching.
    pub fn guided_ratio(&self) -> Option<f32> {
        match self {
            GeometricModelKind::Homography => None,
            _ => Some(0.6),
        }
    }
}

impl fmt::Display for GeometricModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GeometricModelKind {
    type Err = PairMatchError;

    /// Selects a model by the first letter of its name (`f`, `e`, `h`, `a`,
    /// `u` or `o`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let first = s.trim().chars().next().map(|c| c.to_ascii_lowercase());
        match first {
            Some('f') => Ok(GeometricModelKind::Fundamental),
            Some('e') => Ok(GeometricModelKind::Essential),
            Some('h') => Ok(GeometricModelKind::Homography),
            Some('a') => Ok(GeometricModelKind::EssentialAngular),
            Some('u') => Ok(GeometricModelKind::EssentialUpright),
            Some('o') => Ok(GeometricModelKind::EssentialOrtho),
            _ => Err(PairMatchError::UnknownModel(s.to_string())),
        }
    }
}

#[inline]
pub(crate) fn homogeneous(p: &Vector2<f64>) -> Vector3<f64> {
    Vector3::new(p.x, p.y, 1.0)
}

/// Similarity moving the centroid to the origin and the mean distance to
/// `sqrt(2)`, with the transformed points.
pub(crate) fn hartley_normalize(points: &[Vector2<f64>]) -> (Matrix3<f64>, Vec<Vector2<f64>>) {
    let n = points.len().max(1) as f64;
    let centroid = points.iter().fold(Vector2::zeros(), |acc, p| acc + p) / n;
    let mean_dist = points.iter().map(|p| (p - centroid).norm()).sum::<f64>() / n;
    let scale = if mean_dist > f64::EPSILON {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    let t = Matrix3::new(
        scale,
        0.0,
        -scale * centroid.x,
        0.0,
        scale,
        -scale * centroid.y,
        0.0,
        0.0,
        1.0,
    );
    let normalized = points.iter().map(|p| (p - centroid) * scale).collect();
    (t, normalized)
}

/// Coefficients of `p_bᵀ M p_a` in the row-major entries of `M`.
#[inline]
pub(crate) fn epipolar_row(pa: &Vector3<f64>, pb: &Vector3<f64>) -> [f64; 9] {
    [
        pb.x * pa.x,
        pb.x * pa.y,
        pb.x * pa.z,
        pb.y * pa.x,
        pb.y * pa.y,
        pb.y * pa.z,
        pb.z * pa.x,
        pb.z * pa.y,
        pb.z * pa.z,
    ]
}

/// Right singular vectors of the `count` smallest singular values of `a`.
///
/// Short matrices are padded with zero rows so the full right basis exists.
pub(crate) fn nullspace(a: &DMatrix<f64>, count: usize) -> Vec<DVector<f64>> {
    nullspace_with_gap(a, count).map(|(basis, _)| basis).unwrap_or_default()
}

/// Like [`nullspace`], but returns `None` when the nullspace is larger than
/// `count` (the next singular value is negligible).
pub(crate) fn exact_nullspace(a: &DMatrix<f64>, count: usize) -> Option<Vec<DVector<f64>>> {
    let (basis, gap) = nullspace_with_gap(a, count)?;
    (gap > 1e-9).then_some(basis)
}

/// Basis plus the ratio between the first excluded singular value and the
/// largest one.
fn nullspace_with_gap(a: &DMatrix<f64>, count: usize) -> Option<(Vec<DVector<f64>>, f64)> {
    let cols = a.ncols();
    let rows = a.nrows().max(cols);
    let mut padded = DMatrix::zeros(rows, cols);
    padded.view_mut((0, 0), (a.nrows(), cols)).copy_from(a);
    let svd = padded.svd(false, true);
    let v_t = svd.v_t?;
    let values = svd.singular_values;
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));
    let largest = values.max();
    let gap = match order.get(count) {
        Some(&next) if largest > 0.0 => values[next] / largest,
        Some(_) => 0.0,
        None => f64::INFINITY,
    };
    let basis = order
        .into_iter()
        .take(count)
        .map(|i| v_t.row(i).transpose())
        .collect();
    Some((basis, gap))
}

/// Forces the smallest singular value of `m` to zero.
pub(crate) fn enforce_rank2(m: &Matrix3<f64>) -> Matrix3<f64> {
    let svd = m.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return *m;
    };
    let mut s = svd.singular_values;
    let min_idx = s.imin();
    s[min_idx] = 0.0;
    u * Matrix3::from_diagonal(&s) * v_t
}

/// Projects `m` onto the essential manifold: two equal singular values and
/// one zero.
pub(crate) fn enforce_essential(m: &Matrix3<f64>) -> Matrix3<f64> {
    let svd = m.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return *m;
    };
    let mut s = svd.singular_values;
    let min_idx = s.imin();
    let mean = (s.sum() - s[min_idx]) / 2.0;
    for (idx, value) in s.iter_mut().enumerate() {
        *value = if idx == min_idx { 0.0 } else { mean };
    }
    u * Matrix3::from_diagonal(&s) * v_t
}

/// Squared distance from `xb` to the epipolar line `f * xa` in view B.
pub fn epipolar_distance_sq(f: &Matrix3<f64>, xa: &Vector2<f64>, xb: &Vector2<f64>) -> f64 {
    let line = f * homogeneous(xa);
    let den = line.x * line.x + line.y * line.y;
    if den <= f64::EPSILON {
        return f64::INFINITY;
    }
    let num = homogeneous(xb).dot(&line);
    num * num / den
}

/// Squared distance between `h * xa` and `xb`.
pub fn transfer_error_sq(h: &Matrix3<f64>, xa: &Vector2<f64>, xb: &Vector2<f64>) -> f64 {
    let p = h * homogeneous(xa);
    if p.z.abs() <= f64::EPSILON {
        return f64::INFINITY;
    }
    let dx = p.x / p.z - xb.x;
    let dy = p.y / p.z - xb.y;
    dx * dx + dy * dy
}

/// Squared sine of the angle between bearing `bb` and the epipolar plane
/// with normal `e * ba`.
pub fn angular_error_sq(e: &Matrix3<f64>, ba: &Vector3<f64>, bb: &Vector3<f64>) -> f64 {
    let normal = e * ba;
    let den = normal.norm_squared() * bb.norm_squared();
    if den <= f64::EPSILON * f64::EPSILON {
        return f64::INFINITY;
    }
    let num = bb.dot(&normal);
    num * num / den
}

/// Reshapes a row-major 9-vector into a matrix.
#[inline]
pub(crate) fn matrix_from_vector(v: &DVector<f64>) -> Matrix3<f64> {
    Matrix3::from_row_slice(v.as_slice())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Synthetic two-view scenes for solver tests.

    use nalgebra::{Matrix3, Rotation3, Vector2, Vector3};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    pub struct TwoView {
        pub rotation: Matrix3<f64>,
        pub translation: Vector3<f64>,
        /// Camera-frame points of view A.
        pub points: Vec<Vector3<f64>>,
    }

    impl TwoView {
        pub fn random(seed: u64, count: usize) -> Self {
            let mut rng = StdRng::seed_from_u64(seed);
            let rotation = Rotation3::from_euler_angles(
                rng.random_range(-0.2..0.2),
                rng.random_range(-0.3..0.3),
                rng.random_range(-0.2..0.2),
            )
            .into_inner();
            let translation = Vector3::new(
                rng.random_range(0.5..1.0),
                rng.random_range(-0.2..0.2),
                rng.random_range(-0.1..0.1),
            );
            let points = (0..count)
                .map(|_| {
                    Vector3::new(
                        rng.random_range(-2.0..2.0),
                        rng.random_range(-2.0..2.0),
                        rng.random_range(4.0..8.0),
                    )
                })
                .collect();
            Self {
                rotation,
                translation,
                points,
            }
        }

        pub fn essential(&self) -> Matrix3<f64> {
            self.translation.cross_matrix() * self.rotation
        }

        pub fn in_b(&self, p: &Vector3<f64>) -> Vector3<f64> {
            self.rotation * p + self.translation
        }

        /// Normalized image coordinates in both views.
        pub fn normalized(&self) -> (Vec<Vector2<f64>>, Vec<Vector2<f64>>) {
            self.points
                .iter()
                .map(|p| {
                    let q = self.in_b(p);
                    (Vector2::new(p.x / p.z, p.y / p.z), Vector2::new(q.x / q.z, q.y / q.z))
                })
                .unzip()
        }

        /// Pixel coordinates through `k` in both views.
        pub fn pixels(&self, k: &Matrix3<f64>) -> (Vec<Vector2<f64>>, Vec<Vector2<f64>>) {
            let (a, b) = self.normalized();
            let project = |p: &Vector2<f64>| {
                let h = k * Vector3::new(p.x, p.y, 1.0);
                Vector2::new(h.x / h.z, h.y / h.z)
            };
            (a.iter().map(project).collect(), b.iter().map(project).collect())
        }
    }

    pub fn k_matrix() -> Matrix3<f64> {
        Matrix3::new(800.0, 0.0, 320.0, 0.0, 800.0, 240.0, 0.0, 0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_uses_first_letter() {
        assert_eq!(
            "fundamental".parse::<GeometricModelKind>().unwrap(),
            GeometricModelKind::Fundamental
        );
        assert_eq!("E".parse::<GeometricModelKind>().unwrap(), GeometricModelKind::Essential);
        assert_eq!(
            "o".parse::<GeometricModelKind>().unwrap(),
            GeometricModelKind::EssentialOrtho
        );
        assert!("x".parse::<GeometricModelKind>().is_err());
        assert!("".parse::<GeometricModelKind>().is_err());
    }

    #[test]
    fn thresholds_and_guided_ratios() {
        for kind in GeometricModelKind::ALL {
            let expected = if kind == GeometricModelKind::EssentialOrtho { 2.0 } else { 4.0 };
            assert_eq!(kind.default_threshold(), expected);
        }
        assert_eq!(GeometricModelKind::Homography.guided_ratio(), None);
        assert_eq!(GeometricModelKind::Fundamental.guided_ratio(), Some(0.6));
    }

    #[test]
    fn hartley_normalization_statistics() {
        let pts = vec![
            Vector2::new(10.0, 20.0),
            Vector2::new(30.0, 25.0),
            Vector2::new(15.0, 60.0),
            Vector2::new(40.0, 45.0),
        ];
        let (t, normalized) = hartley_normalize(&pts);
        let centroid = normalized.iter().fold(Vector2::zeros(), |acc, p| acc + p) / 4.0;
        assert!(centroid.norm() < 1e-12);
        let mean = normalized.iter().map(|p| p.norm()).sum::<f64>() / 4.0;
        assert!((mean - std::f64::consts::SQRT_2).abs() < 1e-12);
        let mapped = t * homogeneous(&pts[2]);
        assert!((mapped.xy() - normalized[2]).norm() < 1e-12);
    }

    #[test]
    fn nullspace_of_rank_deficient_matrix() {
        let a = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        let basis = nullspace(&a, 1);
        assert_eq!(basis.len(), 1);
        assert!((basis[0][2].abs() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn residuals_vanish_on_consistent_points() {
        let scene = testing::TwoView::random(5, 10);
        let e = scene.essential();
        let (a, b) = scene.normalized();
        for (pa, pb) in a.iter().zip(&b) {
            assert!(epipolar_distance_sq(&e, pa, pb) < 1e-20);
            let ba = homogeneous(pa).normalize();
            let bb = homogeneous(pb).normalize();
            assert!(angular_error_sq(&e, &ba, &bb) < 1e-20);
        }
    }
}
