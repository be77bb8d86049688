//! Seven-point fundamental matrix solver.

use crate::geometry::{epipolar_row, hartley_normalize, homogeneous, matrix_from_vector, nullspace};
use crate::util::math::solve_cubic_real;
use nalgebra::{DMatrix, Matrix3, Vector2};

/// Fundamental matrices consistent with seven correspondences.
///
/// Returns up to three solutions, each scaled to unit Frobenius norm. Points
/// are Hartley-normalized internally.
pub fn seven_point(xa: &[Vector2<f64>], xb: &[Vector2<f64>]) -> Vec<Matrix3<f64>> {
    if xa.len() < 7 || xa.len() != xb.len() {
        return Vec::new();
    }
    let (ta, na) = hartley_normalize(xa);
    let (tb, nb) = hartley_normalize(xb);

    let mut a = DMatrix::zeros(na.len(), 9);
    for (row, (pa, pb)) in na.iter().zip(&nb).enumerate() {
        let coeffs = epipolar_row(&homogeneous(pa), &homogeneous(pb));
        for (col, value) in coeffs.into_iter().enumerate() {
            a[(row, col)] = value;
        }
    }
    let basis = nullspace(&a, 2);
    if basis.len() < 2 {
        return Vec::new();
    }
    let f1 = matrix_from_vector(&basis[0]);
    let f2 = matrix_from_vector(&basis[1]);

    // det(f2 + t (f1 - f2)) is a cubic in t, recovered from four samples.
    let diff = f1 - f2;
    let det_at = |t: f64| (f2 + diff * t).determinant();
    let (p0, p1, pm1, p2) = (det_at(0.0), det_at(1.0), det_at(-1.0), det_at(2.0));
    let d = p0;
    let b = (p1 + pm1) / 2.0 - d;
    let odd = (p1 - pm1) / 2.0;
    let a3 = (p2 - 4.0 * b - d - 2.0 * odd) / 6.0;
    let c = odd - a3;

    solve_cubic_real(a3, b, c, d)
        .into_iter()
        .filter_map(|t| {
            let f_norm = f2 + diff * t;
            let f = tb.transpose() * f_norm * ta;
            let norm = f.norm();
            (norm > f64::EPSILON).then(|| f / norm)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::seven_point;
    use crate::geometry::testing::{k_matrix, TwoView};
    use crate::geometry::epipolar_distance_sq;

    #[test]
    fn recovers_a_consistent_model() {
        let scene = TwoView::random(21, 30);
        let (a, b) = scene.pixels(&k_matrix());
        let models = seven_point(&a[..7], &b[..7]);
        assert!(!models.is_empty());
        let best = models
            .iter()
            .map(|f| {
                a.iter()
                    .zip(&b)
                    .map(|(pa, pb)| epipolar_distance_sq(f, pa, pb))
                    .fold(0.0f64, f64::max)
            })
            .fold(f64::INFINITY, f64::min);
        assert!(best < 1e-6, "max residual {best}");
    }

    #[test]
    fn rank_two_solutions() {
        let scene = TwoView::random(22, 7);
        let (a, b) = scene.pixels(&k_matrix());
        for f in seven_point(&a, &b) {
            assert!(f.determinant().abs() < 1e-8);
        }
    }
}
