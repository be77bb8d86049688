//! Numeric helpers for robust estimation and hashing.

use rand::Rng;

/// Returns `log10(k!)` for every `k` in `[0, n]`.
pub(crate) fn log10_factorials(n: usize) -> Vec<f64> {
    let mut table = Vec::with_capacity(n + 1);
    let mut acc = 0.0f64;
    table.push(acc);
    for k in 1..=n {
        acc += (k as f64).log10();
        table.push(acc);
    }
    table
}

/// `log10(C(n, k))` from a factorial table; `-inf` when `k > n`.
pub(crate) fn log10_binomial(factorials: &[f64], n: usize, k: usize) -> f64 {
    if k > n {
        return f64::NEG_INFINITY;
    }
    factorials[n] - factorials[k] - factorials[n - k]
}

/// Real roots of `a x^3 + b x^2 + c x + d = 0`.
///
/// Falls back to the quadratic or linear case when leading coefficients
/// vanish.
pub(crate) fn solve_cubic_real(a: f64, b: f64, c: f64, d: f64) -> Vec<f64> {
    const EPS: f64 = 1e-14;
    if a.abs() < EPS {
        return solve_quadratic_real(b, c, d);
    }
    let (b, c, d) = (b / a, c / a, d / a);
    // Depressed cubic t^3 + p t + q with x = t - b/3.
    let shift = b / 3.0;
    let p = c - b * b / 3.0;
    let q = 2.0 * b * b * b / 27.0 - b * c / 3.0 + d;
    let disc = (q / 2.0).powi(2) + (p / 3.0).powi(3);

    let mut roots = Vec::with_capacity(3);
    if disc > EPS {
        let sq = disc.sqrt();
        let u = (-q / 2.0 + sq).cbrt();
        let v = (-q / 2.0 - sq).cbrt();
        roots.push(u + v - shift);
    } else if disc.abs() <= EPS {
        let u = (-q / 2.0).cbrt();
        roots.push(2.0 * u - shift);
        roots.push(-u - shift);
    } else {
        let r = (-p / 3.0).sqrt();
        let phi = (-q / (2.0 * r * r * r)).clamp(-1.0, 1.0).acos();
        for k in 0..3 {
            let angle = (phi + 2.0 * std::f64::consts::PI * k as f64) / 3.0;
            roots.push(2.0 * r * angle.cos() - shift);
        }
    }
    roots
}

fn solve_quadratic_real(a: f64, b: f64, c: f64) -> Vec<f64> {
    const EPS: f64 = 1e-14;
    if a.abs() < EPS {
        if b.abs() < EPS {
            return Vec::new();
        }
        return vec![-c / b];
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return Vec::new();
    }
    let sq = disc.sqrt();
    vec![(-b + sq) / (2.0 * a), (-b - sq) / (2.0 * a)]
}

/// Draws one sample of the standard normal distribution (Box-Muller).
pub(crate) fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
