//! Robust estimation kernels for each geometric model.
//!
//! Pixel-space kernels report squared distances in view B; bearing kernels
//! report squared sines of angles. A-contrario constants follow from the
//! area of view B (pixel kernels) or the unit sphere (bearing kernels).

use crate::geometry::{
    angular_error_sq, epipolar_distance_sq, essential, fundamental, homography, ortho, spherical,
    transfer_error_sq,
};
use crate::robust::Kernel;
use crate::scene::Camera;
use nalgebra::{Matrix3, Vector2, Vector3};

fn gather<T: Copy>(points: &[T], sample: &[usize]) -> Vec<T> {
    sample.iter().map(|&idx| points[idx]).collect()
}

/// Width and height of view B, used for a-contrario constants.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageSize {
    pub width: f64,
    pub height: f64,
}

impl ImageSize {
    /// Creates a size; non-positive extents are clamped to one pixel.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: f64::from(width.max(1)),
            height: f64::from(height.max(1)),
        }
    }

    fn area(&self) -> f64 {
        self.width * self.height
    }

    fn diagonal(&self) -> f64 {
        self.width.hypot(self.height)
    }
}

/// Fundamental matrix kernel, seven-point solver.
#[derive(Clone, Debug)]
pub struct FundamentalKernel {
    xa: Vec<Vector2<f64>>,
    xb: Vec<Vector2<f64>>,
    size_b: ImageSize,
}

impl FundamentalKernel {
    pub fn new(xa: Vec<Vector2<f64>>, xb: Vec<Vector2<f64>>, size_b: ImageSize) -> Self {
        Self { xa, xb, size_b }
    }
}

impl Kernel for FundamentalKernel {
    type Model = Matrix3<f64>;

    fn sample_size(&self) -> usize {
        7
    }

    fn max_models(&self) -> usize {
        3
    }

    fn len(&self) -> usize {
        self.xa.len()
    }

    fn fit(&self, sample: &[usize], models: &mut Vec<Matrix3<f64>>) {
        models.extend(fundamental::seven_point(
            &gather(&self.xa, sample),
            &gather(&self.xb, sample),
        ));
    }

    fn error(&self, model: &Matrix3<f64>, idx: usize) -> f64 {
        epipolar_distance_sq(model, &self.xa[idx], &self.xb[idx])
    }

    fn alpha0(&self) -> f64 {
        2.0 * self.size_b.diagonal() / self.size_b.area()
    }

    fn mult_error(&self) -> f64 {
        0.5
    }
}

/// Pixel points plus their normalized camera coordinates.
#[derive(Clone, Debug)]
struct CalibratedPoints {
    xa: Vec<Vector2<f64>>,
    xb: Vec<Vector2<f64>>,
    na: Vec<Vector2<f64>>,
    nb: Vec<Vector2<f64>>,
    ka_inv: Matrix3<f64>,
    kb_inv: Matrix3<f64>,
}

impl CalibratedPoints {
    fn new(
        xa: Vec<Vector2<f64>>,
        xb: Vec<Vector2<f64>>,
        ka: &Matrix3<f64>,
        kb: &Matrix3<f64>,
    ) -> Option<Self> {
        let ka_inv = ka.try_inverse()?;
        let kb_inv = kb.try_inverse()?;
        let normalize = |k_inv: &Matrix3<f64>, p: &Vector2<f64>| {
            let h = k_inv * Vector3::new(p.x, p.y, 1.0);
            Vector2::new(h.x / h.z, h.y / h.z)
        };
        let na = xa.iter().map(|p| normalize(&ka_inv, p)).collect();
        let nb = xb.iter().map(|p| normalize(&kb_inv, p)).collect();
        Some(Self {
            xa,
            xb,
            na,
            nb,
            ka_inv,
            kb_inv,
        })
    }

    /// Lifts a normalized-coordinate epipolar matrix to pixels.
    fn to_pixels(&self, e: &Matrix3<f64>) -> Matrix3<f64> {
        self.kb_inv.transpose() * e * self.ka_inv
    }
}

/// Essential matrix kernel on calibrated pinhole views, five-point solver.
/// Models are returned as pixel fundamental matrices `K_b⁻ᵀ E K_a⁻¹`.
#[derive(Clone, Debug)]
pub struct EssentialKernel {
    points: CalibratedPoints,
    size_b: ImageSize,
}

impl EssentialKernel {
    /// Returns `None` when a calibration matrix is singular.
    pub fn new(
        xa: Vec<Vector2<f64>>,
        xb: Vec<Vector2<f64>>,
        ka: &Matrix3<f64>,
        kb: &Matrix3<f64>,
        size_b: ImageSize,
    ) -> Option<Self> {
        Some(Self {
            points: CalibratedPoints::new(xa, xb, ka, kb)?,
            size_b,
        })
    }
}

impl Kernel for EssentialKernel {
    type Model = Matrix3<f64>;

    fn sample_size(&self) -> usize {
        5
    }

    fn max_models(&self) -> usize {
        10
    }

    fn len(&self) -> usize {
        self.points.xa.len()
    }

    fn fit(&self, sample: &[usize], models: &mut Vec<Matrix3<f64>>) {
        let solutions = essential::five_point(
            &gather(&self.points.na, sample),
            &gather(&self.points.nb, sample),
        );
        models.extend(solutions.iter().map(|e| self.points.to_pixels(e)));
    }

    fn error(&self, model: &Matrix3<f64>, idx: usize) -> f64 {
        epipolar_distance_sq(model, &self.points.xa[idx], &self.points.xb[idx])
    }

    fn alpha0(&self) -> f64 {
        2.0 * self.size_b.diagonal() / self.size_b.area()
    }

    fn mult_error(&self) -> f64 {
        0.5
    }
}

/// Homography kernel, four-point DLT.
#[derive(Clone, Debug)]
pub struct HomographyKernel {
    xa: Vec<Vector2<f64>>,
    xb: Vec<Vector2<f64>>,
    size_b: ImageSize,
}

impl HomographyKernel {
    pub fn new(xa: Vec<Vector2<f64>>, xb: Vec<Vector2<f64>>, size_b: ImageSize) -> Self {
        Self { xa, xb, size_b }
    }
}

impl Kernel for HomographyKernel {
    type Model = Matrix3<f64>;

    fn sample_size(&self) -> usize {
        4
    }

    fn max_models(&self) -> usize {
        1
    }

    fn len(&self) -> usize {
        self.xa.len()
    }

    fn fit(&self, sample: &[usize], models: &mut Vec<Matrix3<f64>>) {
        models.extend(homography::four_point(
            &gather(&self.xa, sample),
            &gather(&self.xb, sample),
        ));
    }

    fn error(&self, model: &Matrix3<f64>, idx: usize) -> f64 {
        transfer_error_sq(model, &self.xa[idx], &self.xb[idx])
    }

    fn alpha0(&self) -> f64 {
        std::f64::consts::PI / self.size_b.area()
    }

    fn mult_error(&self) -> f64 {
        1.0
    }
}

/// Solver used by [`BearingKernel`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BearingSolver {
    /// Eight-point essential matrix.
    General,
    /// Five-point essential matrix with a vertical rotation axis.
    Upright,
}

/// Essential matrix kernel on unit bearings of spherical cameras.
#[derive(Clone, Debug)]
pub struct BearingKernel {
    ba: Vec<Vector3<f64>>,
    bb: Vec<Vector3<f64>>,
    solver: BearingSolver,
}

impl BearingKernel {
    pub fn new(ba: Vec<Vector3<f64>>, bb: Vec<Vector3<f64>>, solver: BearingSolver) -> Self {
        Self { ba, bb, solver }
    }
}

impl Kernel for BearingKernel {
    type Model = Matrix3<f64>;

    fn sample_size(&self) -> usize {
        match self.solver {
            BearingSolver::General => 8,
            BearingSolver::Upright => 5,
        }
    }

    fn max_models(&self) -> usize {
        1
    }

    fn len(&self) -> usize {
        self.ba.len()
    }

    fn fit(&self, sample: &[usize], models: &mut Vec<Matrix3<f64>>) {
        let ba = gather(&self.ba, sample);
        let bb = gather(&self.bb, sample);
        let model = match self.solver {
            BearingSolver::General => spherical::eight_point(&ba, &bb),
            BearingSolver::Upright => spherical::upright(&ba, &bb),
        };
        models.extend(model);
    }

    fn error(&self, model: &Matrix3<f64>, idx: usize) -> f64 {
        angular_error_sq(model, &self.ba[idx], &self.bb[idx])
    }

    /// A random bearing lies within angle `t` of a great circle with
    /// probability `sin t`, hence unit `alpha0` and exponent one half.
    fn alpha0(&self) -> f64 {
        1.0
    }

    fn mult_error(&self) -> f64 {
        0.5
    }
}

/// Affine epipolar kernel for orthographic cameras, solved in normalized
/// camera coordinates and scored in pixels.
#[derive(Clone, Debug)]
pub struct OrthographicKernel {
    points: CalibratedPoints,
    size_b: ImageSize,
}

impl OrthographicKernel {
    /// Returns `None` when a calibration matrix is singular.
    pub fn new(
        xa: Vec<Vector2<f64>>,
        xb: Vec<Vector2<f64>>,
        ka: &Matrix3<f64>,
        kb: &Matrix3<f64>,
        size_b: ImageSize,
    ) -> Option<Self> {
        Some(Self {
            points: CalibratedPoints::new(xa, xb, ka, kb)?,
            size_b,
        })
    }
}

impl Kernel for OrthographicKernel {
    type Model = Matrix3<f64>;

    fn sample_size(&self) -> usize {
        4
    }

    fn max_models(&self) -> usize {
        1
    }

    fn len(&self) -> usize {
        self.points.xa.len()
    }

    fn fit(&self, sample: &[usize], models: &mut Vec<Matrix3<f64>>) {
        let model = ortho::affine_epipolar(
            &gather(&self.points.na, sample),
            &gather(&self.points.nb, sample),
        );
        models.extend(model.map(|e| self.points.to_pixels(&e)));
    }

    fn error(&self, model: &Matrix3<f64>, idx: usize) -> f64 {
        epipolar_distance_sq(model, &self.points.xa[idx], &self.points.xb[idx])
    }

    fn alpha0(&self) -> f64 {
        2.0 * self.size_b.diagonal() / self.size_b.area()
    }

    fn mult_error(&self) -> f64 {
        0.5
    }
}

/// Verified two-view relation, usable as a search constraint.
#[derive(Clone, Debug, PartialEq)]
pub enum PairGeometry {
    /// Pixel epipolar matrix (fundamental, lifted essential or affine).
    Epipolar(Matrix3<f64>),
    /// Pixel homography from view A to view B.
    Homography(Matrix3<f64>),
    /// Essential matrix on bearings of two spherical cameras.
    Spherical {
        essential: Matrix3<f64>,
        camera_a: Camera,
        camera_b: Camera,
    },
}

impl PairGeometry {
    /// Squared residual of pixel `a` in view A against pixel `b` in view B,
    /// in the units of the kernel that produced the model.
    pub fn error(&self, a: (f64, f64), b: (f64, f64)) -> f64 {
        let xa = Vector2::new(a.0, a.1);
        let xb = Vector2::new(b.0, b.1);
        match self {
            PairGeometry::Epipolar(f) => epipolar_distance_sq(f, &xa, &xb),
            PairGeometry::Homography(h) => transfer_error_sq(h, &xa, &xb),
            PairGeometry::Spherical {
                essential,
                camera_a,
                camera_b,
            } => match (camera_a.bearing(a.0, a.1), camera_b.bearing(b.0, b.1)) {
                (Some(ba), Some(bb)) => angular_error_sq(essential, &ba, &bb),
                _ => f64::INFINITY,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::testing::{k_matrix, TwoView};
    use crate::robust::{acransac, RansacConfig};

    fn with_outliers(
        mut a: Vec<Vector2<f64>>,
        mut b: Vec<Vector2<f64>>,
        count: usize,
    ) -> (Vec<Vector2<f64>>, Vec<Vector2<f64>>) {
        for k in 0..count {
            let t = k as f64;
            a.push(Vector2::new((t * 97.3) % 640.0, (t * 53.1) % 480.0));
            b.push(Vector2::new((t * 41.7 + 200.0) % 640.0, (t * 71.9 + 100.0) % 480.0));
        }
        (a, b)
    }

    #[test]
    fn fundamental_kernel_rejects_outliers() {
        let scene = TwoView::random(51, 60);
        let (a, b) = scene.pixels(&k_matrix());
        let (a, b) = with_outliers(a, b, 30);
        let kernel = FundamentalKernel::new(a, b, ImageSize::new(640, 480));
        let result = acransac(&kernel, &RansacConfig::default()).unwrap();
        let outliers_kept = result.inliers.iter().filter(|&&idx| idx >= 60).count();
        assert!(result.inliers.len() >= 55);
        assert!(outliers_kept <= 2);
    }

    #[test]
    fn essential_kernel_scores_in_pixels() {
        let scene = TwoView::random(52, 40);
        let k = k_matrix();
        let (a, b) = scene.pixels(&k);
        let kernel = EssentialKernel::new(a, b, &k, &k, ImageSize::new(640, 480)).unwrap();
        let mut models = Vec::new();
        kernel.fit(&[0, 1, 2, 3, 4], &mut models);
        let best = models
            .iter()
            .map(|m| (0..kernel.len()).map(|idx| kernel.error(m, idx)).fold(0.0, f64::max))
            .fold(f64::INFINITY, f64::min);
        assert!(best < 1e-6);
    }

    #[test]
    fn spherical_geometry_uses_bearings() {
        let camera = Camera::Spherical {
            width: 2000,
            height: 1000,
        };
        let geometry = PairGeometry::Spherical {
            essential: Matrix3::new(0.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0),
            camera_a: camera.clone(),
            camera_b: camera,
        };
        // Pure x translation: points on the equator stay on the epipolar plane.
        assert!(geometry.error((700.0, 500.0), (900.0, 500.0)) < 1e-20);
        assert!(geometry.error((700.0, 500.0), (900.0, 300.0)) > 1e-3);
    }
}
