//! Essential matrix solvers on unit bearing vectors.

use crate::geometry::{enforce_essential, epipolar_row, matrix_from_vector, nullspace};
use nalgebra::{DMatrix, Matrix3, Vector3};

/// Eight-point essential matrix from bearings, projected onto the essential
/// manifold.
pub fn eight_point(ba: &[Vector3<f64>], bb: &[Vector3<f64>]) -> Option<Matrix3<f64>> {
    if ba.len() < 8 || ba.len() != bb.len() {
        return None;
    }
    let mut a = DMatrix::zeros(ba.len(), 9);
    for (row, (pa, pb)) in ba.iter().zip(bb).enumerate() {
        for (col, value) in epipolar_row(pa, pb).into_iter().enumerate() {
            a[(row, col)] = value;
        }
    }
    let e = enforce_essential(&matrix_from_vector(nullspace(&a, 1).first()?));
    let norm = e.norm();
    (norm > f64::EPSILON).then(|| e / norm)
}

/// Essential matrix for a rotation about the vertical (y) axis.
///
/// Such a matrix has the form `[[a, b, c], [d, 0, f], [-c, g, a]]`, leaving
/// six homogeneous unknowns solved linearly from five bearings.
pub fn upright(ba: &[Vector3<f64>], bb: &[Vector3<f64>]) -> Option<Matrix3<f64>> {
    if ba.len() < 5 || ba.len() != bb.len() {
        return None;
    }
    let mut a = DMatrix::zeros(ba.len(), 6);
    for (row, (pa, pb)) in ba.iter().zip(bb).enumerate() {
        let coeffs = [
            pb.x * pa.x + pb.z * pa.z,
            pb.x * pa.y,
            pb.x * pa.z - pb.z * pa.x,
            pb.y * pa.x,
            pb.y * pa.z,
            pb.z * pa.y,
        ];
        for (col, value) in coeffs.into_iter().enumerate() {
            a[(row, col)] = value;
        }
    }
    let v = nullspace(&a, 1).into_iter().next()?;
    let (ea, eb, ec, ed, ef, eg) = (v[0], v[1], v[2], v[3], v[4], v[5]);
    let e = Matrix3::new(ea, eb, ec, ed, 0.0, ef, -ec, eg, ea);
    let norm = e.norm();
    (norm > f64::EPSILON).then(|| e / norm)
}
