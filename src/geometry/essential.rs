//! Five-point essential matrix solver.
//!
//! The four-dimensional nullspace of the epipolar constraints parametrizes
//! `E = x X + y Y + z Z + W`. The cubic trace constraint
//! `2 E Eᵀ E - tr(E Eᵀ) E = 0` and `det(E) = 0` give ten equations in twenty
//! monomials; after Gauss-Jordan elimination the multiplication-by-`x` action
//! matrix on the remaining ten monomials has the solutions as eigenvectors.

use crate::geometry::poly::Poly3;
use crate::geometry::{epipolar_row, homogeneous, nullspace};
use nalgebra::{DMatrix, DVector, Matrix3, Vector2};

const PIVOT_EPS: f64 = 1e-12;

/// Essential matrices consistent with five correspondences in normalized
/// camera coordinates.
///
/// Returns up to ten solutions, each scaled to unit Frobenius norm.
pub fn five_point(xa: &[Vector2<f64>], xb: &[Vector2<f64>]) -> Vec<Matrix3<f64>> {
    if xa.len() < 5 || xa.len() != xb.len() {
        return Vec::new();
    }
    let mut a = DMatrix::zeros(xa.len(), 9);
    for (row, (pa, pb)) in xa.iter().zip(xb).enumerate() {
        let coeffs = epipolar_row(&homogeneous(pa), &homogeneous(pb));
        for (col, value) in coeffs.into_iter().enumerate() {
            a[(row, col)] = value;
        }
    }
    let basis = nullspace(&a, 4);
    if basis.len() < 4 {
        return Vec::new();
    }

    let mut coeffs = constraint_matrix(&basis);
    if !gauss_jordan(&mut coeffs) {
        return Vec::new();
    }

    // Rows of x * [x², xy, xz, y², yz, z², x, y, z, 1] in that same basis.
    let mut action = DMatrix::<f64>::zeros(10, 10);
    for row in 0..6 {
        for col in 0..10 {
            action[(row, col)] = -coeffs[(row, 10 + col)];
        }
    }
    action[(6, 0)] = 1.0;
    action[(7, 1)] = 1.0;
    action[(8, 2)] = 1.0;
    action[(9, 6)] = 1.0;

    let mut solutions = Vec::new();
    for lambda in action.complex_eigenvalues().iter() {
        if lambda.im.abs() > 1e-8 * (1.0 + lambda.re.abs()) {
            continue;
        }
        let shifted = &action - DMatrix::<f64>::identity(10, 10) * lambda.re;
        let Some(v) = nullspace(&shifted, 1).into_iter().next() else {
            continue;
        };
        if v[9].abs() < PIVOT_EPS {
            continue;
        }
        let (x, y, z) = (v[6] / v[9], v[7] / v[9], v[8] / v[9]);
        let e: DVector<f64> = &basis[0] * x + &basis[1] * y + &basis[2] * z + &basis[3];
        let e = Matrix3::from_row_slice(e.as_slice());
        let norm = e.norm();
        if norm > f64::EPSILON {
            solutions.push(e / norm);
        }
    }
    solutions
}

fn constraint_matrix(basis: &[DVector<f64>]) -> DMatrix<f64> {
    let entry = |r: usize, c: usize| {
        let k = 3 * r + c;
        Poly3::linear(basis[0][k], basis[1][k], basis[2][k], basis[3][k])
    };
    let e: [[Poly3; 3]; 3] = std::array::from_fn(|r| std::array::from_fn(|c| entry(r, c)));

    let mut eet = [[Poly3::zero(); 3]; 3];
    for (i, row) in eet.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            for k in 0..3 {
                *cell = *cell + e[i][k] * e[j][k];
            }
        }
    }
    let trace = eet[0][0] + eet[1][1] + eet[2][2];

    let mut out = DMatrix::zeros(10, 20);
    let det = e[0][0] * (e[1][1] * e[2][2] - e[1][2] * e[2][1])
        - e[0][1] * (e[1][0] * e[2][2] - e[1][2] * e[2][0])
        + e[0][2] * (e[1][0] * e[2][1] - e[1][1] * e[2][0]);
    for (col, value) in det.0.iter().enumerate() {
        out[(0, col)] = *value;
    }
    for i in 0..3 {
        for j in 0..3 {
            let mut poly = (e[i][j] * trace).scale(-0.5);
            for k in 0..3 {
                poly = poly + eet[i][k] * e[k][j];
            }
            for (col, value) in poly.0.iter().enumerate() {
                out[(1 + 3 * i + j, col)] = *value;
            }
        }
    }
    out
}

/// Reduces the leading square block of `m` to the identity. Returns false
/// when a pivot vanishes.
fn gauss_jordan(m: &mut DMatrix<f64>) -> bool {
    let rows = m.nrows();
    for col in 0..rows {
        let pivot = (col..rows)
            .max_by(|&a, &b| m[(a, col)].abs().total_cmp(&m[(b, col)].abs()))
            .unwrap_or(col);
        if m[(pivot, col)].abs() < PIVOT_EPS {
            return false;
        }
        m.swap_rows(pivot, col);
        let inv = 1.0 / m[(col, col)];
        m.row_mut(col).scale_mut(inv);
        for row in 0..rows {
            if row == col {
                continue;
            }
            let factor = m[(row, col)];
            if factor != 0.0 {
                let pivot_row = m.row(col).clone_owned();
                let mut target = m.row_mut(row);
                target -= pivot_row * factor;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::{five_point, gauss_jordan};
    use crate::geometry::testing::TwoView;
    use crate::geometry::homogeneous;
    use nalgebra::DMatrix;

    #[test]
    fn gauss_jordan_reduces_leading_block() {
        // [A | b] with A invertible; the right column becomes A^-1 b.
        let mut m = DMatrix::from_row_slice(3, 4, &[
            2.0, 1.0, 0.0, 3.0, //
            0.0, 3.0, 1.0, 5.0, //
            1.0, 0.0, 4.0, 6.0,
        ]);
        assert!(gauss_jordan(&mut m));
        for r in 0..3 {
            for c in 0..3 {
                let expected = if r == c { 1.0 } else { 0.0 };
                assert!((m[(r, c)] - expected).abs() < 1e-12);
            }
        }
        let a = DMatrix::from_row_slice(3, 3, &[2.0, 1.0, 0.0, 0.0, 3.0, 1.0, 1.0, 0.0, 4.0]);
        let x = m.column(3).clone_owned();
        let b = &a * x;
        assert!((b[0] - 3.0).abs() < 1e-12);
        assert!((b[1] - 5.0).abs() < 1e-12);
        assert!((b[2] - 6.0).abs() < 1e-12);

        let mut singular = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 0.0, 2.0, 4.0, 1.0]);
        assert!(!gauss_jordan(&mut singular));
    }

    #[test]
    fn true_essential_is_among_solutions() {
        let scene = TwoView::random(31, 20);
        let (a, b) = scene.normalized();
        let models = five_point(&a[..5], &b[..5]);
        assert!(!models.is_empty());
        let truth = scene.essential().normalize();
        let closest = models
            .iter()
            .map(|e| (e - truth).norm().min((e + truth).norm()))
            .fold(f64::INFINITY, f64::min);
        assert!(closest < 1e-6, "distance to truth {closest}");
    }

    #[test]
    fn every_solution_fits_the_sample() {
        let scene = TwoView::random(32, 5);
        let (a, b) = scene.normalized();
        for e in five_point(&a, &b) {
            for (pa, pb) in a.iter().zip(&b) {
                assert!(homogeneous(pb).dot(&(e * homogeneous(pa))).abs() < 1e-8);
            }
        }
    }
}
