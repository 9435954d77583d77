//! Error types shared across the crate.

use std::borrow::Cow;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChemlinkError>;

/// Fatal and storage-level failures.
///
/// Per-field problems (ambiguous names, unreachable APIs, schema violations)
/// never surface here; they are reported through `ResolutionEntry` statuses
/// and `ValidationReport` errors instead.
#[derive(Debug, Error)]
pub enum ChemlinkError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("reference dataset {path:?} is unusable (line {line}): {reason}")]
    Build {
        path: PathBuf,
        line: usize,
        reason: Cow<'static, str>,
    },

    #[error("reference index is invalid: {reason}")]
    InvalidIndex { reason: Cow<'static, str> },

    #[error("lock unavailable: {0}")]
    Lock(String),

    #[error("resolution cache record at offset {offset} is corrupt: {reason}")]
    CacheCorruption {
        offset: u64,
        reason: Cow<'static, str>,
    },

    #[error("invalid JSON schema: {0}")]
    Schema(String),

    #[error("invalid field path {path:?}: {reason}")]
    InvalidPath {
        path: String,
        reason: Cow<'static, str>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to encode record: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode record: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ChemlinkError {
    pub(crate) fn invalid_index(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidIndex {
            reason: reason.into(),
        }
    }
}
