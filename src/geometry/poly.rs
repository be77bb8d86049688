//! Polynomials of degree at most three in `(x, y, z)`.
//!
//! Coefficients are stored in graded reverse lexicographic order, so the ten
//! cubic monomials come first and the constant term last.

use std::ops::{Add, Mul, Sub};

pub(crate) const MONOMIALS: [[u8; 3]; 20] = [
    [3, 0, 0],
    [2, 1, 0],
    [2, 0, 1],
    [1, 2, 0],
    [1, 1, 1],
    [1, 0, 2],
    [0, 3, 0],
    [0, 2, 1],
    [0, 1, 2],
    [0, 0, 3],
    [2, 0, 0],
    [1, 1, 0],
    [1, 0, 1],
    [0, 2, 0],
    [0, 1, 1],
    [0, 0, 2],
    [1, 0, 0],
    [0, 1, 0],
    [0, 0, 1],
    [0, 0, 0],
];

fn index_of(exponents: [u8; 3]) -> Option<usize> {
    MONOMIALS.iter().position(|m| *m == exponents)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Poly3(pub [f64; 20]);

impl Poly3 {
    pub(crate) fn zero() -> Self {
        Poly3([0.0; 20])
    }

    /// `a x + b y + c z + d`.
    pub(crate) fn linear(a: f64, b: f64, c: f64, d: f64) -> Self {
        let mut p = Self::zero();
        p.0[16] = a;
        p.0[17] = b;
        p.0[18] = c;
        p.0[19] = d;
        p
    }

    pub(crate) fn scale(self, s: f64) -> Self {
        Poly3(self.0.map(|c| c * s))
    }

    pub(crate) fn eval(&self, x: f64, y: f64, z: f64) -> f64 {
        self.0
            .iter()
            .zip(MONOMIALS.iter())
            .map(|(c, [i, j, k])| c * x.powi(*i as i32) * y.powi(*j as i32) * z.powi(*k as i32))
            .sum()
    }
}

impl Add for Poly3 {
    type Output = Poly3;

    fn add(self, rhs: Poly3) -> Poly3 {
        let mut out = self;
        for (o, r) in out.0.iter_mut().zip(rhs.0) {
            *o += r;
        }
        out
    }
}

impl Sub for Poly3 {
    type Output = Poly3;

    fn sub(self, rhs: Poly3) -> Poly3 {
        self + rhs.scale(-1.0)
    }
}

impl Mul for Poly3 {
    type Output = Poly3;

    /// Terms whose degree would exceed three are dropped; callers only
    /// multiply operands whose degrees sum to at most three.
    fn mul(self, rhs: Poly3) -> Poly3 {
        let mut out = Poly3::zero();
        for (i, &a) in self.0.iter().enumerate() {
            if a == 0.0 {
                continue;
            }
            for (j, &b) in rhs.0.iter().enumerate() {
                if b == 0.0 {
                    continue;
                }
                let (ma, mb) = (MONOMIALS[i], MONOMIALS[j]);
                let exps = [ma[0] + mb[0], ma[1] + mb[1], ma[2] + mb[2]];
                if let Some(k) = index_of(exps) {
                    out.0[k] += a * b;
                }
            }
        }
        out
    }
}
