//! Affine epipolar geometry for orthographic cameras.

use crate::geometry::{exact_nullspace, hartley_normalize};
use nalgebra::{DMatrix, Matrix3, Vector2};

/// Affine fundamental matrix `[[0, 0, a], [0, 0, b], [c, d, e]]` from four or
/// more correspondences.
pub fn affine_epipolar(xa: &[Vector2<f64>], xb: &[Vector2<f64>]) -> Option<Matrix3<f64>> {
    if xa.len() < 4 || xa.len() != xb.len() {
        return None;
    }
    let (ta, na) = hartley_normalize(xa);
    let (tb, nb) = hartley_normalize(xb);
    let mut a = DMatrix::zeros(na.len(), 5);
    for (row, (pa, pb)) in na.iter().zip(&nb).enumerate() {
        for (col, value) in [pb.x, pb.y, pa.x, pa.y, 1.0].into_iter().enumerate() {
            a[(row, col)] = value;
        }
    }
    let v = exact_nullspace(&a, 1)?.into_iter().next()?;
    let f_norm = Matrix3::new(0.0, 0.0, v[0], 0.0, 0.0, v[1], v[2], v[3], v[4]);
    let f = tb.transpose() * f_norm * ta;
    let norm = f.norm();
    (norm > f64::EPSILON).then(|| f / norm)
}

#[cfg(test)]
mod tests {
    use super::affine_epipolar;
    use crate::geometry::epipolar_distance_sq;
    use nalgebra::{Matrix2, Vector2};

    #[test]
    fn fits_affine_camera_pairs() {
        // View B sees the points through an affine map plus a depth-dependent
        // shift along x, which is what an orthographic camera produces.
        let warp = Matrix2::new(0.98, -0.1, 0.12, 1.01);
        let points: Vec<(Vector2<f64>, f64)> = (0..10)
            .map(|k| {
                let t = k as f64;
                (Vector2::new(20.0 + 17.0 * t, 300.0 - 11.0 * t * t % 97.0), (t * 7.3) % 5.0)
            })
            .collect();
        let xa: Vec<_> = points.iter().map(|(p, _)| *p).collect();
        let xb: Vec<_> = points
            .iter()
            .map(|(p, depth)| warp * p + Vector2::new(5.0 + 3.0 * depth, -4.0))
            .collect();
        let f = affine_epipolar(&xa[..4], &xb[..4]).unwrap();
        for (pa, pb) in xa.iter().zip(&xb) {
            assert!(epipolar_distance_sq(&f, pa, pb) < 1e-12);
        }
    }
}
