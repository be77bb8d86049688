//! Error types for pairmatch.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for pairmatch operations.
pub type PairMatchResult<T> = std::result::Result<T, PairMatchError>;

/// Errors that abort a pipeline stage.
///
/// Per-pair failures (too few correspondences, no consensus, a region that
/// cannot be fetched) never surface as values of this type outside a stage;
/// the affected pair is dropped instead.
#[derive(Debug, Error)]
pub enum PairMatchError {
    /// The input data or parameters are invalid.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// A required path argument was empty.
    #[error("missing required path: {what}")]
    MissingPath { what: &'static str },
    /// Reading or writing a file failed.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A JSON document could not be read or written.
    #[error("json error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// A text or binary file is malformed.
    #[error("malformed {path} (line {line}): {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    /// The nearest neighbor method name is not recognized.
    #[error("unknown nearest matching method: {0}")]
    UnknownMatcher(String),
    /// The geometric model selector is not recognized.
    #[error("unknown geometric model: {0}")]
    UnknownModel(String),
    /// The pair mode name is not recognized.
    #[error("unknown pair mode: {0}")]
    UnknownPairMode(String),
    /// The matches file extension has no known format.
    #[error("unsupported matches file format: {path}")]
    UnsupportedFormat { path: PathBuf },
    /// The companion feature/descriptor file of a view is missing.
    #[error("missing regions for view {view_id}: {path}")]
    MissingRegions { view_id: u32, path: PathBuf },
    /// A view id is not part of the scene or of the provider.
    #[error("unknown view id {0}")]
    UnknownView(u32),
    /// A view index is outside `[0, len)`.
    #[error("view index {index} out of bounds for {len} views")]
    ViewOutOfBounds { index: u32, len: usize },
    /// Descriptors of one kind were handed to a matcher of another kind.
    #[error("descriptor kind mismatch: expected {expected}, got {got}")]
    DescriptorMismatch {
        expected: &'static str,
        got: &'static str,
    },
    /// A robust estimation could not produce a model.
    #[error("estimation failed: {reason}")]
    Estimation { reason: &'static str },
}

impl PairMatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }
}
