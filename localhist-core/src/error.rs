use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No history found for: {0}")]
    NotFound(String),

    #[error("{what} index {index} out of range (len {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Failed to apply patch {index}: {source}")]
    PatchApply { index: usize, source: PatchError },

    #[error("Invalid history record {}: {reason}", path.display())]
    InvalidRecord { path: PathBuf, reason: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid ignore pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Failure of the patch primitive itself, before it is tied to a position
/// in a commit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("malformed patch: {0}")]
    Malformed(String),

    #[error("hunk {hunk} expects {expected:?} at line {line}, found {found:?}")]
    Mismatch {
        hunk: usize,
        line: usize,
        expected: String,
        found: Option<String>,
    },

    #[error("hunk {hunk} starts at line {line} but the base has {len} lines")]
    OutOfBounds { hunk: usize, line: usize, len: usize },
}

impl Error {
    pub(crate) fn out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        Error::IndexOutOfRange { what, index, len }
    }

    /// Whether the error only means the file has no history yet.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
