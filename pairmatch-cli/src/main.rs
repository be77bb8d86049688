use clap::{Args, Parser, Subcommand};
use pairmatch::{
    run_geometric_filter, run_matching, run_pair_generation, DirectoryReport, EssentialPruning,
    FilterOptions, GeometricModelKind, MatcherKind, MatchingConfig, MatchingOptions,
    PairGenerationOptions, PairMode, Progress, StageOutput,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Pairwise feature matching for structure from motion")]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Print a JSON summary of the stage on stdout.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the list of view pairs to match.
    Pairs(PairsArgs),
    /// Compute putative matches between view pairs.
    Match(MatchArgs),
    /// Keep the matches consistent with a two-view geometric model.
    Filter(FilterArgs),
}

#[derive(Args, Debug)]
struct PairsArgs {
    /// Scene file (JSON).
    #[arg(short, long)]
    input: PathBuf,
    /// Output pair list.
    #[arg(short, long)]
    output: PathBuf,
    /// EXHAUSTIVE or CONTIGUOUS.
    #[arg(short, long, default_value = "EXHAUSTIVE")]
    mode: String,
    /// Number of following views paired with each view in CONTIGUOUS mode.
    #[arg(short = 'c', long)]
    overlap: Option<usize>,
}

#[derive(Args, Debug)]
struct MatchArgs {
    /// Scene file (JSON).
    #[arg(short, long)]
    input: PathBuf,
    /// Output matches file (.txt or .json); its directory holds the regions.
    #[arg(short, long)]
    output: PathBuf,
    /// Pair list restricting the matched pairs.
    #[arg(short, long)]
    pairs: Option<PathBuf>,
    /// Nearest neighbor method.
    #[arg(short = 'n', long, default_value = "AUTO")]
    matcher: MatcherKind,
    /// Distance ratio threshold.
    #[arg(short, long, default_value_t = 0.8)]
    ratio: f32,
    /// Resident region budget; 0 keeps every region in memory.
    #[arg(long, default_value_t = 0)]
    cache_size: usize,
    /// Match only this many strongest features per view first.
    #[arg(long)]
    preemptive: Option<usize>,
    /// Match fraction of the pre-emptive feature count a pair needs.
    #[arg(long, default_value_t = 0.08)]
    preemptive_fraction: f64,
    /// Recompute even if the output exists.
    #[arg(short, long)]
    force: bool,
    /// Match pairs on a single thread.
    #[arg(long)]
    sequential: bool,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Scene file (JSON).
    #[arg(short, long)]
    input: PathBuf,
    /// Putative matches; their directory holds the regions.
    #[arg(short, long)]
    matches: PathBuf,
    /// Output matches file (.txt or .json).
    #[arg(short, long)]
    output: PathBuf,
    /// Pair list restricting the verified pairs.
    #[arg(short = 'p', long)]
    input_pairs: Option<PathBuf>,
    /// Pair list of the surviving pairs.
    #[arg(short = 's', long)]
    output_pairs: Option<PathBuf>,
    /// Model: f, e, h, a, u or o.
    #[arg(short = 'g', long, default_value = "f")]
    model: GeometricModelKind,
    /// Re-match pairs under their estimated geometry.
    #[arg(short = 'r', long)]
    guided: bool,
    /// Sampling budget of the robust estimator.
    #[arg(short = 'I', long, default_value_t = 2048)]
    max_iterations: usize,
    /// Resident region budget; 0 keeps every region in memory.
    #[arg(long, default_value_t = 0)]
    cache_size: usize,
    /// Fewest inliers an essential matrix pair may keep.
    #[arg(long, default_value_t = 50)]
    essential_min_inliers: usize,
    /// Smallest inlier ratio an essential matrix pair may keep.
    #[arg(long, default_value_t = 0.3)]
    essential_min_ratio: f64,
    /// Recompute even if the output exists.
    #[arg(short, long)]
    force: bool,
    /// Verify pairs on a single thread.
    #[arg(long)]
    sequential: bool,
}

#[derive(Debug, Serialize)]
struct Summary {
    stage: &'static str,
    pairs: usize,
    correspondences: usize,
    nodes: usize,
    components: usize,
    resumed: bool,
}

impl Summary {
    fn new(stage: &'static str, output: &StageOutput) -> Self {
        Self {
            stage,
            pairs: output.matches.len(),
            correspondences: output.matches.values().map(Vec::len).sum(),
            nodes: output.stats.nodes,
            components: output.stats.components,
            resumed: output.resumed,
        }
    }
}

fn progress() -> Progress {
    Progress::with_callback(|done, total| {
        if total > 0 && (done == total || done % 100 == 0) {
            tracing::debug!(done, total, "progress");
        }
    })
}

fn report_dir(output: &Path) -> PathBuf {
    match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("pairmatch=info"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let summary = match cli.command {
        Command::Pairs(args) => {
            let mode = PairMode::parse(&args.mode, args.overlap)?;
            let pairs = run_pair_generation(&PairGenerationOptions {
                scene_path: args.input,
                output: args.output,
                mode,
            })?;
            tracing::info!(pairs = pairs.len(), "pairs written");
            None
        }
        Command::Match(args) => {
            let sink = DirectoryReport::new(report_dir(&args.output));
            let mut options = MatchingOptions::new(args.input, args.output);
            options.pairs_path = args.pairs;
            options.matcher = args.matcher;
            options.matching = MatchingConfig {
                ratio: args.ratio,
                parallel: !args.sequential,
                ..Default::default()
            };
            options.cache_size = args.cache_size;
            options.preemptive_feature_count = args.preemptive;
            options.preemptive_fraction = args.preemptive_fraction;
            options.force = args.force;
            let output = run_matching(&options, &sink, &progress())?;
            tracing::info!(
                pairs = output.matches.len(),
                graph = %output.stats,
                resumed = output.resumed,
                "putative matches ready"
            );
            Some(Summary::new("match", &output))
        }
        Command::Filter(args) => {
            let sink = DirectoryReport::new(report_dir(&args.output));
            let mut options = FilterOptions::new(args.input, args.matches, args.output);
            options.input_pairs = args.input_pairs;
            options.output_pairs = args.output_pairs;
            options.model = args.model;
            options.guided = args.guided;
            options.cache_size = args.cache_size;
            options.force = args.force;
            options.filter.max_iterations = args.max_iterations;
            options.filter.parallel = !args.sequential;
            options.filter.essential_pruning = Some(EssentialPruning {
                min_inliers: args.essential_min_inliers,
                min_ratio: args.essential_min_ratio,
            });
            let output = run_geometric_filter(&options, &sink, &progress())?;
            tracing::info!(
                pairs = output.matches.len(),
                graph = %output.stats,
                resumed = output.resumed,
                "geometric matches ready"
            );
            Some(Summary::new("filter", &output))
        }
    };

    if let (true, Some(summary)) = (cli.json, summary) {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}
