//! Low-level building blocks for custom verification pipelines.
//!
//! These items expose the minimal solvers, estimation kernels and nearest
//! neighbor indices behind the stage functions. Most users should prefer
//! `CollectionMatcher` and `GeometricFilter`.

pub use crate::geometry::essential::five_point;
pub use crate::geometry::fundamental::seven_point;
pub use crate::geometry::homography::four_point;
pub use crate::geometry::kernel::{
    BearingKernel, BearingSolver, EssentialKernel, FundamentalKernel, HomographyKernel, ImageSize,
    OrthographicKernel, PairGeometry,
};
pub use crate::geometry::ortho::affine_epipolar;
pub use crate::geometry::spherical::{eight_point, upright};
pub use crate::matching::brute::{knn, match_brute_force};
pub use crate::matching::cascade::{CascadeHasher, HashedDescriptors};
pub use crate::matching::hnsw::{HnswIndex, MetricSpace};
pub use crate::matching::kdtree::KdForest;
pub use crate::matching::metric::{DescriptorView, Hamming, Metric, SquaredL2, L1};
pub use crate::matching::neighbors::{ratio_test, Neighbor, TopK};
pub use crate::robust::{acransac, ransac, Kernel, RansacConfig, RobustResult};
