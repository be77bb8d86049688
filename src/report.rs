//! Match graph reporting.
//!
//! A pair set is viewed as an undirected graph over view ids. Stages hand
//! their final pair set to a [`ReportSink`], which summarizes it and may
//! render an adjacency matrix (SVG) and a Graphviz description.

use crate::pairs::PairSet;
use crate::scene::ViewId;
use crate::util::{PairMatchError, PairMatchResult};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};
use std::fs;
use std::path::{Path, PathBuf};

/// Summary of a match graph.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphStats {
    /// Views with at least one edge.
    pub nodes: usize,
    /// Number of pairs.
    pub edges: usize,
    /// Connected components among `nodes`.
    pub components: usize,
    pub min_degree: usize,
    pub max_degree: usize,
    pub mean_degree: f64,
}

impl GraphStats {
    /// Computes the statistics of the graph spanned by `pairs`.
    pub fn from_pairs(pairs: &PairSet) -> Self {
        let mut degree: BTreeMap<ViewId, usize> = BTreeMap::new();
        for pair in pairs {
            *degree.entry(pair.first()).or_default() += 1;
            *degree.entry(pair.second()).or_default() += 1;
        }
        if degree.is_empty() {
            return Self::default();
        }
        let nodes = degree.len();
        Self {
            nodes,
            edges: pairs.len(),
            components: count_components(pairs, degree.keys().copied()),
            min_degree: degree.values().copied().min().unwrap_or(0),
            max_degree: degree.values().copied().max().unwrap_or(0),
            mean_degree: 2.0 * pairs.len() as f64 / nodes as f64,
        }
    }
}

impl fmt::Display for GraphStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "nodes={} edges={} components={} degree[min={} max={} mean={:.2}]",
            self.nodes,
            self.edges,
            self.components,
            self.min_degree,
            self.max_degree,
            self.mean_degree
        )
    }
}

fn find(parent: &mut BTreeMap<ViewId, ViewId>, mut v: ViewId) -> ViewId {
    while let Some(&p) = parent.get(&v) {
        if p == v {
            break;
        }
        let grand = parent.get(&p).copied().unwrap_or(p);
        parent.insert(v, grand);
        v = grand;
    }
    v
}

fn count_components(pairs: &PairSet, nodes: impl Iterator<Item = ViewId>) -> usize {
    let mut parent: BTreeMap<ViewId, ViewId> = nodes.map(|v| (v, v)).collect();
    for pair in pairs {
        let ra = find(&mut parent, pair.first());
        let rb = find(&mut parent, pair.second());
        if ra != rb {
            parent.insert(ra.max(rb), ra.min(rb));
        }
    }
    let ids: Vec<ViewId> = parent.keys().copied().collect();
    ids.into_iter()
        .map(|v| find(&mut parent, v))
        .collect::<BTreeSet<_>>()
        .len()
}

const CELL: usize = 4;

/// Renders the symmetric adjacency matrix of `pairs` over `view_count` views.
pub fn adjacency_svg(pairs: &PairSet, view_count: usize) -> String {
    let side = view_count.max(1) * CELL;
    let mut svg = String::new();
    let _ = writeln!(
        svg,
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" "#,
            r#"width="{side}" height="{side}" viewBox="0 0 {side} {side}">"#
        ),
        side = side
    );
    let _ = writeln!(svg, r#"  <rect width="{side}" height="{side}" fill="white"/>"#);
    for pair in pairs {
        let (a, b) = (pair.first() as usize, pair.second() as usize);
        for (row, col) in [(a, b), (b, a)] {
            let _ = writeln!(
                svg,
                r#"  <rect x="{}" y="{}" width="{CELL}" height="{CELL}" fill="black"/>"#,
                col * CELL,
                row * CELL
            );
        }
    }
    svg.push_str("</svg>\n");
    svg
}

/// Describes `pairs` as an undirected Graphviz graph.
pub fn graphviz_dot(pairs: &PairSet) -> String {
    let nodes: BTreeSet<ViewId> = pairs
        .iter()
        .flat_map(|p| [p.first(), p.second()])
        .collect();
    let mut dot = String::from("graph matches {\n");
    for node in &nodes {
        let _ = writeln!(dot, "  n{node} [label=\"{node}\"];");
    }
    for pair in pairs {
        let _ = writeln!(dot, "  n{} -- n{};", pair.first(), pair.second());
    }
    dot.push_str("}\n");
    dot
}

/// Which graph of the pipeline is reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphStage {
    /// Pairs left after putative matching.
    Putative,
    /// Pairs left after geometric filtering.
    Geometric,
}

impl GraphStage {
    fn file_names(&self) -> (&'static str, &'static str) {
        match self {
            GraphStage::Putative => ("PutativeAdjacencyMatrix.svg", "putative_matches.dot"),
            GraphStage::Geometric => ("GeometricAdjacencyMatrix.svg", "geometric_matches.dot"),
        }
    }
}

/// Destination of match graph reports.
pub trait ReportSink {
    /// Reports the graph of `pairs` over `view_count` views.
    fn report_graph(
        &self,
        stage: GraphStage,
        pairs: &PairSet,
        view_count: usize,
    ) -> PairMatchResult<GraphStats>;
}

/// Computes statistics without writing anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatsOnly;

impl ReportSink for StatsOnly {
    fn report_graph(
        &self,
        _stage: GraphStage,
        pairs: &PairSet,
        _view_count: usize,
    ) -> PairMatchResult<GraphStats> {
        Ok(GraphStats::from_pairs(pairs))
    }
}

/// Writes the adjacency matrix and the Graphviz graph into a directory.
#[derive(Clone, Debug)]
pub struct DirectoryReport {
    dir: PathBuf,
}

impl DirectoryReport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ReportSink for DirectoryReport {
    fn report_graph(
        &self,
        stage: GraphStage,
        pairs: &PairSet,
        view_count: usize,
    ) -> PairMatchResult<GraphStats> {
        let (svg_name, dot_name) = stage.file_names();
        let svg_path = self.dir.join(svg_name);
        fs::write(&svg_path, adjacency_svg(pairs, view_count))
            .map_err(|err| PairMatchError::io(svg_path, err))?;
        let dot_path = self.dir.join(dot_name);
        fs::write(&dot_path, graphviz_dot(pairs)).map_err(|err| PairMatchError::io(dot_path, err))?;
        Ok(GraphStats::from_pairs(pairs))
    }
}
