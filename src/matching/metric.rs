//! Descriptor distances.
//!
//! `SquaredL2` returns the squared Euclidean distance, so ratio tests against
//! it compare with the squared ratio. With the `simd` feature the L2 inner
//! loop runs eight lanes at a time through `wide::f32x8`.

#[cfg(feature = "simd")]
use wide::f32x8;

/// Row-major descriptor table borrowed from a `Regions`.
#[derive(Clone, Copy, Debug)]
pub struct DescriptorView<'a, T> {
    data: &'a [T],
    dim: usize,
}

impl<'a, T> DescriptorView<'a, T> {
    /// Wraps `data` holding descriptors of `dim` elements; `dim` must be > 0.
    pub fn new(data: &'a [T], dim: usize) -> Self {
        debug_assert!(dim > 0 && data.len() % dim == 0);
        Self { data, dim }
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.data.len().checked_div(self.dim).unwrap_or(0)
    }

    /// Returns true when the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements per descriptor.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Descriptor `idx`.
    #[inline]
    pub fn get(&self, idx: usize) -> &'a [T] {
        &self.data[idx * self.dim..(idx + 1) * self.dim]
    }

    /// Iterates over descriptors in index order.
    pub fn iter(&self) -> impl Iterator<Item = &'a [T]> + 'a {
        self.data.chunks_exact(self.dim.max(1))
    }
}

/// Distance between two descriptors of equal length.
pub trait Metric {
    /// Descriptor element type.
    type Element: Copy + Send + Sync;

    /// Distance between `a` and `b`.
    fn distance(a: &[Self::Element], b: &[Self::Element]) -> f32;

    /// Bound on `best / second` distances equivalent to the distance ratio
    /// `ratio` in this metric's units.
    fn ratio_bound(ratio: f32) -> f32 {
        ratio
    }
}

/// Squared Euclidean distance over `f32` descriptors.
#[derive(Clone, Copy, Debug, Default)]
pub struct SquaredL2;

/// Manhattan distance over `f32` descriptors.
#[derive(Clone, Copy, Debug, Default)]
pub struct L1;

/// Bit difference count over packed binary descriptors.
#[derive(Clone, Copy, Debug, Default)]
pub struct Hamming;

impl Metric for SquaredL2 {
    type Element = f32;

    #[inline]
    fn distance(a: &[f32], b: &[f32]) -> f32 {
        squared_l2(a, b)
    }

    fn ratio_bound(ratio: f32) -> f32 {
        ratio * ratio
    }
}

impl Metric for L1 {
    type Element = f32;

    #[inline]
    fn distance(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
    }
}

impl Metric for Hamming {
    type Element = u8;

    #[inline]
    fn distance(a: &[u8], b: &[u8]) -> f32 {
        let mut bits = 0u32;
        let mut chunks_a = a.chunks_exact(8);
        let mut chunks_b = b.chunks_exact(8);
        for (ca, cb) in chunks_a.by_ref().zip(chunks_b.by_ref()) {
            let mut wa = [0u8; 8];
            let mut wb = [0u8; 8];
            wa.copy_from_slice(ca);
            wb.copy_from_slice(cb);
            bits += (u64::from_le_bytes(wa) ^ u64::from_le_bytes(wb)).count_ones();
        }
        for (x, y) in chunks_a.remainder().iter().zip(chunks_b.remainder()) {
            bits += (x ^ y).count_ones();
        }
        bits as f32
    }
}

#[cfg(not(feature = "simd"))]
#[inline]
fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(feature = "simd")]
#[inline]
fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    const LANES: usize = 8;
    let simd_end = a.len().min(b.len()) / LANES * LANES;
    let mut acc = f32x8::ZERO;
    for start in (0..simd_end).step_by(LANES) {
        let mut la = [0f32; LANES];
        let mut lb = [0f32; LANES];
        la.copy_from_slice(&a[start..start + LANES]);
        lb.copy_from_slice(&b[start..start + LANES]);
        let d = f32x8::from(la) - f32x8::from(lb);
        acc = acc + d * d;
    }
    let mut sum: f32 = acc.to_array().iter().sum();
    for (x, y) in a[simd_end..].iter().zip(&b[simd_end..]) {
        let d = x - y;
        sum += d * d;
    }
    sum
}
