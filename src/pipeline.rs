//! Stage entry points: pair generation, putative matching and geometric
//! filtering.
//!
//! Each stage reads its inputs from disk, persists its output and reports the
//! resulting match graph. A stage with an existing output and `force` unset
//! reloads that output instead of recomputing it.

use crate::filter::{GeometricFilter, GeometricFilterConfig, GuidedMatching};
use crate::geometry::GeometricModelKind;
use crate::matches::io::{load_matches, save_matches};
use crate::matches::{
    correspondence_count, pairs_of, preemptive_filter, restrict_to, PairwiseMatches,
};
use crate::matching::{CollectionMatcher, MatcherKind, MatchingConfig};
use crate::pairs::io::{load_pairs, save_pairs};
use crate::pairs::{exhaustive_pairs, PairMode, PairSet};
use crate::progress::Progress;
use crate::regions::io::{ImageDescriber, IMAGE_DESCRIBER_FILE};
use crate::regions::{ProviderMode, RegionsProvider};
use crate::report::{GraphStage, GraphStats, ReportSink};
use crate::scene::Scene;
use crate::trace::{trace_event, trace_span};
use crate::util::{PairMatchError, PairMatchResult};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// File written beside the matches when pre-emptive filtering is active.
pub const PREEMPTIVE_PAIRS_FILE: &str = "preemptive_pairs.txt";

fn require(path: &Path, what: &'static str) -> PairMatchResult<()> {
    if path.as_os_str().is_empty() {
        return Err(PairMatchError::MissingPath { what });
    }
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn load_provider(
    scene: &Scene,
    dir: &Path,
    mode: ProviderMode,
    progress: &Progress,
) -> PairMatchResult<RegionsProvider> {
    let describer = ImageDescriber::load(dir.join(IMAGE_DESCRIBER_FILE))?;
    RegionsProvider::load(scene, dir, describer.regions_type, mode, progress)
}

/// Inputs of [`run_pair_generation`].
#[derive(Clone, Debug)]
pub struct PairGenerationOptions {
    pub scene_path: PathBuf,
    pub output: PathBuf,
    pub mode: PairMode,
}

/// Builds the pair list of a scene and saves it.
pub fn run_pair_generation(options: &PairGenerationOptions) -> PairMatchResult<PairSet> {
    require(&options.scene_path, "scene file")?;
    require(&options.output, "output pair file")?;
    let scene = Scene::load(&options.scene_path)?;
    let pairs = options.mode.generate(scene.len());
    save_pairs(&options.output, &pairs)?;
    trace_event!("pairs_generated", views = scene.len(), pairs = pairs.len());
    Ok(pairs)
}

/// Result of a matching or filtering stage.
#[derive(Clone, Debug)]
pub struct StageOutput {
    pub matches: PairwiseMatches,
    pub stats: GraphStats,
    /// True when the output was reloaded instead of recomputed.
    pub resumed: bool,
}

impl StageOutput {
    fn resumed(matches: PairwiseMatches) -> Self {
        let stats = GraphStats::from_pairs(&pairs_of(&matches));
        Self {
            matches,
            stats,
            resumed: true,
        }
    }
}

/// Inputs of [`run_matching`].
#[derive(Clone, Debug)]
pub struct MatchingOptions {
    pub scene_path: PathBuf,
    /// Matches file; its directory holds the regions and their sidecar.
    pub output: PathBuf,
    /// Pair list restricting the work; exhaustive pairs otherwise.
    pub pairs_path: Option<PathBuf>,
    pub matcher: MatcherKind,
    pub matching: MatchingConfig,
    /// Resident region budget; zero keeps every region in memory.
    pub cache_size: usize,
    /// Match only this many strongest features per view and drop weak pairs.
    pub preemptive_feature_count: Option<usize>,
    /// Fraction of `preemptive_feature_count` a pair needs to survive.
    pub preemptive_fraction: f64,
    pub force: bool,
}

impl MatchingOptions {
    pub fn new(scene_path: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            scene_path: scene_path.into(),
            output: output.into(),
            pairs_path: None,
            matcher: MatcherKind::Auto,
            matching: MatchingConfig::default(),
            cache_size: 0,
            preemptive_feature_count: None,
            preemptive_fraction: 0.08,
            force: false,
        }
    }
}

/// Computes putative matches for a scene and saves them.
pub fn run_matching(
    options: &MatchingOptions,
    sink: &dyn ReportSink,
    progress: &Progress,
) -> PairMatchResult<StageOutput> {
    require(&options.scene_path, "scene file")?;
    require(&options.output, "output matches file")?;
    if !options.force && options.output.is_file() {
        let matches = load_matches(&options.output)?;
        trace_event!("matches_resumed", pairs = matches.len());
        return Ok(StageOutput::resumed(matches));
    }
    let _span = trace_span!("run_matching").entered();
    let started = Instant::now();

    let scene = Scene::load(&options.scene_path)?;
    let dir = parent_dir(&options.output);
    let mode = ProviderMode::from_options(options.cache_size, options.preemptive_feature_count);
    let provider = load_provider(&scene, &dir, mode, progress)?;

    let pairs = match &options.pairs_path {
        Some(path) => load_pairs(path, scene.len())?,
        None => exhaustive_pairs(scene.len()),
    };
    let matcher =
        CollectionMatcher::new(options.matcher, provider.regions_type(), options.matching)?;
    let mut matches = matcher.match_pairs(&provider, &pairs, progress);

    if let ProviderMode::Preemptive { feature_count } = mode {
        let dropped = preemptive_filter(&mut matches, feature_count, options.preemptive_fraction);
        trace_event!("preemptive_filtered", dropped = dropped, kept = matches.len());
        save_pairs(dir.join(PREEMPTIVE_PAIRS_FILE), &pairs_of(&matches))?;
    }

    save_matches(&options.output, &matches)?;
    let stats = sink.report_graph(GraphStage::Putative, &pairs_of(&matches), scene.len())?;
    trace_event!(
        "matching_done",
        pairs = matches.len(),
        correspondences = correspondence_count(&matches),
        components = stats.components,
        elapsed_ms = started.elapsed().as_millis() as u64
    );
    Ok(StageOutput {
        matches,
        stats,
        resumed: false,
    })
}

/// Inputs of [`run_geometric_filter`].
#[derive(Clone, Debug)]
pub struct FilterOptions {
    pub scene_path: PathBuf,
    /// Putative matches; their directory holds the regions and sidecar.
    pub putative_path: PathBuf,
    pub output: PathBuf,
    /// Restricts the putative matches to these pairs.
    pub input_pairs: Option<PathBuf>,
    /// Receives the pairs that survive filtering.
    pub output_pairs: Option<PathBuf>,
    pub model: GeometricModelKind,
    pub guided: bool,
    pub cache_size: usize,
    pub filter: GeometricFilterConfig,
    pub force: bool,
}

impl FilterOptions {
    pub fn new(
        scene_path: impl Into<PathBuf>,
        putative_path: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            scene_path: scene_path.into(),
            putative_path: putative_path.into(),
            output: output.into(),
            input_pairs: None,
            output_pairs: None,
            model: GeometricModelKind::Fundamental,
            guided: false,
            cache_size: 0,
            filter: GeometricFilterConfig::default(),
            force: false,
        }
    }
}

/// Geometrically verifies putative matches and saves the survivors.
pub fn run_geometric_filter(
    options: &FilterOptions,
    sink: &dyn ReportSink,
    progress: &Progress,
) -> PairMatchResult<StageOutput> {
    require(&options.scene_path, "scene file")?;
    require(&options.putative_path, "putative matches file")?;
    require(&options.output, "output matches file")?;
    if !options.force && options.output.is_file() {
        let matches = load_matches(&options.output)?;
        trace_event!("matches_resumed", pairs = matches.len());
        return Ok(StageOutput::resumed(matches));
    }
    let _span = trace_span!("run_geometric_filter").entered();
    let started = Instant::now();

    let scene = Scene::load(&options.scene_path)?;
    let dir = parent_dir(&options.putative_path);
    let mode = ProviderMode::from_options(options.cache_size, None);
    let provider = load_provider(&scene, &dir, mode, progress)?;

    let mut putative = load_matches(&options.putative_path)?;
    if let Some(path) = &options.input_pairs {
        restrict_to(&mut putative, &load_pairs(path, scene.len())?);
    }

    let guidance = if options.guided {
        GuidedMatching::for_model(options.model)
    } else {
        GuidedMatching::Disabled
    };
    let filter = GeometricFilter::new(&scene, &provider, options.filter)?;
    let matches = filter.robust_model_estimation(options.model, &putative, guidance, progress);

    save_matches(&options.output, &matches)?;
    let pairs = pairs_of(&matches);
    if let Some(path) = &options.output_pairs {
        save_pairs(path, &pairs)?;
    }
    let stats = sink.report_graph(GraphStage::Geometric, &pairs, scene.len())?;
    trace_event!(
        "geometric_filter_stage_done",
        putative = putative.len(),
        accepted = matches.len(),
        rejected = putative.len() - matches.len(),
        elapsed_ms = started.elapsed().as_millis() as u64
    );
    Ok(StageOutput {
        matches,
        stats,
        resumed: false,
    })
}
