//! Per-view local features and descriptors.
//!
//! `Regions` pairs a keypoint list with a parallel descriptor array. The
//! descriptor storage is polymorphic over floating point (`Scalar`) and
//! bit-packed (`Binary`) encodings; the active encoding for a run is described
//! by a `RegionsType` read from the `image_describer.json` sidecar.

pub mod cache;
pub mod io;
pub mod provider;

pub use provider::{ProviderMode, RegionsProvider};

use crate::util::{PairMatchError, PairMatchResult};
use serde::{Deserialize, Serialize};

/// Detected keypoint: position, scale and orientation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Feature {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
    pub orientation: f32,
}

impl Feature {
    /// Creates a feature.
    pub fn new(x: f32, y: f32, scale: f32, orientation: f32) -> Self {
        Self {
            x,
            y,
            scale,
            orientation,
        }
    }
}

/// Descriptor encoding used by a feature extractor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegionsType {
    /// Floating point descriptors of `dimension` components.
    Scalar { dimension: usize },
    /// Bit-packed descriptors of `bits` bits.
    Binary { bits: usize },
}

impl RegionsType {
    /// True for floating point descriptors.
    pub fn is_scalar(&self) -> bool {
        matches!(self, RegionsType::Scalar { .. })
    }

    /// True for bit-packed descriptors.
    pub fn is_binary(&self) -> bool {
        matches!(self, RegionsType::Binary { .. })
    }

    /// Bytes occupied by one descriptor on disk.
    pub fn descriptor_bytes(&self) -> usize {
        match *self {
            RegionsType::Scalar { dimension } => dimension * std::mem::size_of::<f32>(),
            RegionsType::Binary { bits } => bits.div_ceil(8),
        }
    }

    pub(crate) fn validate(&self) -> PairMatchResult<()> {
        let size = match *self {
            RegionsType::Scalar { dimension } => dimension,
            RegionsType::Binary { bits } => bits,
        };
        if size == 0 {
            return Err(PairMatchError::InvalidInput("descriptor size must be > 0"));
        }
        Ok(())
    }
}

/// Descriptor array stored row-major, one descriptor per feature.
#[derive(Clone, Debug, PartialEq)]
pub enum Descriptors {
    /// `dimension` f32 values per descriptor.
    Scalar { dimension: usize, data: Vec<f32> },
    /// `bytes` packed bytes per descriptor.
    Binary { bytes: usize, data: Vec<u8> },
}

impl Descriptors {
    /// Number of descriptors.
    pub fn len(&self) -> usize {
        match self {
            Descriptors::Scalar { dimension, data } => data.len() / (*dimension).max(1),
            Descriptors::Binary { bytes, data } => data.len() / (*bytes).max(1),
        }
    }

    /// Returns true when there is no descriptor.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short name of the encoding, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Descriptors::Scalar { .. } => "scalar",
            Descriptors::Binary { .. } => "binary",
        }
    }

    /// Borrowed row-major f32 data and dimension, for scalar descriptors.
    pub fn as_scalar(&self) -> PairMatchResult<(&[f32], usize)> {
        match self {
            Descriptors::Scalar { dimension, data } => Ok((data, *dimension)),
            other => Err(PairMatchError::DescriptorMismatch {
                expected: "scalar",
                got: other.kind_name(),
            }),
        }
    }

    /// Borrowed row-major bytes and row width, for binary descriptors.
    pub fn as_binary(&self) -> PairMatchResult<(&[u8], usize)> {
        match self {
            Descriptors::Binary { bytes, data } => Ok((data, *bytes)),
            other => Err(PairMatchError::DescriptorMismatch {
                expected: "binary",
                got: other.kind_name(),
            }),
        }
    }

    fn select(&self, order: &[usize]) -> Descriptors {
        match self {
            Descriptors::Scalar { dimension, data } => Descriptors::Scalar {
                dimension: *dimension,
                data: order
                    .iter()
                    .flat_map(|&i| data[i * dimension..(i + 1) * dimension].iter().copied())
                    .collect(),
            },
            Descriptors::Binary { bytes, data } => Descriptors::Binary {
                bytes: *bytes,
                data: order
                    .iter()
                    .flat_map(|&i| data[i * bytes..(i + 1) * bytes].iter().copied())
                    .collect(),
            },
        }
    }
}

/// Features and descriptors of one view.
#[derive(Clone, Debug, PartialEq)]
pub struct Regions {
    features: Vec<Feature>,
    descriptors: Descriptors,
}

impl Regions {
    /// Pairs features with descriptors; both must have the same length.
    pub fn new(features: Vec<Feature>, descriptors: Descriptors) -> PairMatchResult<Self> {
        if features.len() != descriptors.len() {
            return Err(PairMatchError::InvalidInput(
                "feature and descriptor counts differ",
            ));
        }
        Ok(Self {
            features,
            descriptors,
        })
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns true when the view has no feature.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Keypoints in extraction order.
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Descriptor array parallel to `features`.
    pub fn descriptors(&self) -> &Descriptors {
        &self.descriptors
    }

    /// Pixel position of feature `idx` in double precision.
    pub fn point(&self, idx: usize) -> Option<(f64, f64)> {
        self.features
            .get(idx)
            .map(|f| (f64::from(f.x), f64::from(f.y)))
    }

    /// Keeps the `count` features with the largest scale.
    ///
    /// Ties keep extraction order. Views with fewer than `count` features are
    /// returned whole.
    pub fn strongest(&self, count: usize) -> Regions {
        if self.len() <= count {
            return self.clone();
        }
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| {
            self.features[b]
                .scale
                .total_cmp(&self.features[a].scale)
                .then_with(|| a.cmp(&b))
        });
        order.truncate(count);
        Regions {
            features: order.iter().map(|&i| self.features[i]).collect(),
            descriptors: self.descriptors.select(&order),
        }
    }
}
