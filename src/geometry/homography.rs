//! Normalized DLT homography solver.

use crate::geometry::{exact_nullspace, hartley_normalize, matrix_from_vector};
use nalgebra::{DMatrix, Matrix3, Vector2};

/// Homography mapping `xa` onto `xb` from four or more correspondences.
///
/// Returns `None` for degenerate configurations (for instance three
/// collinear points among four).
pub fn four_point(xa: &[Vector2<f64>], xb: &[Vector2<f64>]) -> Option<Matrix3<f64>> {
    if xa.len() < 4 || xa.len() != xb.len() {
        return None;
    }
    let (ta, na) = hartley_normalize(xa);
    let (tb, nb) = hartley_normalize(xb);

    let mut a = DMatrix::zeros(2 * na.len(), 9);
    for (k, (pa, pb)) in na.iter().zip(&nb).enumerate() {
        let r = 2 * k;
        let rows = [
            [0.0, 0.0, 0.0, -pa.x, -pa.y, -1.0, pb.y * pa.x, pb.y * pa.y, pb.y],
            [pa.x, pa.y, 1.0, 0.0, 0.0, 0.0, -pb.x * pa.x, -pb.x * pa.y, -pb.x],
        ];
        for (offset, row) in rows.iter().enumerate() {
            for (col, value) in row.iter().enumerate() {
                a[(r + offset, col)] = *value;
            }
        }
    }
    let h_norm = matrix_from_vector(exact_nullspace(&a, 1)?.first()?);
    let h = tb.try_inverse()? * h_norm * ta;
    if h.determinant().abs() < 1e-12 * h.norm().powi(3) {
        return None;
    }
    let scale = h[(2, 2)];
    if scale.abs() > f64::EPSILON {
        Some(h / scale)
    } else {
        Some(h / h.norm())
    }
}

#[cfg(test)]
mod tests {
    use super::four_point;
    use crate::geometry::transfer_error_sq;
    use nalgebra::{Matrix3, Vector2, Vector3};

    #[test]
    fn recovers_a_projective_warp() {
        let truth = Matrix3::new(1.1, 0.05, 12.0, -0.03, 0.95, -7.0, 1e-4, -2e-4, 1.0);
        let xa: Vec<Vector2<f64>> = [
            (10.0, 20.0),
            (300.0, 40.0),
            (280.0, 260.0),
            (30.0, 240.0),
            (150.0, 130.0),
        ]
        .iter()
            .map(|&(x, y)| Vector2::new(x, y))
            .collect();
        let xb: Vec<Vector2<f64>> = xa
            .iter()
            .map(|p| {
                let q = truth * Vector3::new(p.x, p.y, 1.0);
                Vector2::new(q.x / q.z, q.y / q.z)
            })
            .collect();
        let h = four_point(&xa[..4], &xb[..4]).unwrap();
        assert!((h - truth).norm() < 1e-6);
        assert!(transfer_error_sq(&h, &xa[4], &xb[4]) < 1e-12);
    }

    #[test]
    fn collinear_points_are_degenerate() {
        let xa: Vec<Vector2<f64>> =
            (0..4).map(|k| Vector2::new(k as f64, 2.0 * k as f64)).collect();
        let xb = xa.clone();
        assert!(four_point(&xa, &xb).is_none());
    }
}
