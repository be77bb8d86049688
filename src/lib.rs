//! PairMatch computes pairwise feature correspondences for structure from
//! motion.
//!
//! The crate covers view pair generation, putative descriptor matching with a
//! family of nearest neighbor strategies, and geometric verification of the
//! matches with a-contrario RANSAC over two-view models. Pair-level work runs
//! in parallel with the `rayon` feature; `tracing` instruments the stages.

pub mod filter;
pub mod geometry;
pub mod lowlevel;
pub mod matches;
pub mod matching;
pub mod pairs;
pub mod pipeline;
pub mod progress;
pub mod regions;
pub mod report;
pub mod robust;
pub mod scene;
mod trace;
pub mod util;

pub use filter::{EssentialPruning, GeometricFilter, GeometricFilterConfig, GuidedMatching};
pub use geometry::GeometricModelKind;
pub use matches::{IndMatch, IndMatches, PairwiseMatches};
pub use matching::{CollectionMatcher, MatcherKind, MatchingConfig};
pub use pairs::{Pair, PairMode, PairSet};
pub use pipeline::{
    run_geometric_filter, run_matching, run_pair_generation, FilterOptions, MatchingOptions,
    PairGenerationOptions, StageOutput,
};
pub use progress::Progress;
pub use regions::{Descriptors, Feature, ProviderMode, Regions, RegionsProvider, RegionsType};
pub use report::{DirectoryReport, GraphStage, GraphStats, ReportSink, StatsOnly};
pub use scene::{Camera, Scene, View, ViewId};
pub use util::{PairMatchError, PairMatchResult};
