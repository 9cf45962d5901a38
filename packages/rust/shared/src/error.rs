//! Error types for LinkDigest.
//!
//! Library crates use [`LinkDigestError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Pipeline failures come in three severities ([`FailureKind`]). Item and
//! batch failures are recorded as [`Failure`] values and the run continues;
//! stage failures abort the run through [`LinkDigestError::Stage`].

use std::path::PathBuf;

use crate::types::Stage;

/// Top-level error type for all LinkDigest operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkDigestError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to a collaborator service.
    #[error("network error: {0}")]
    Network(String),

    /// Response parsing error (malformed JSON, missing fields, etc.).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Stage store read/write error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input, inconsistent vectors, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A stage could not produce a usable result; the run stops here.
    #[error("{stage} stage failed: {message}")]
    Stage { stage: Stage, message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LinkDigestError>;

impl LinkDigestError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a fatal stage error.
    pub fn stage(stage: Stage, msg: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

}

// ---------------------------------------------------------------------------
// Failure taxonomy
// ---------------------------------------------------------------------------

/// Severity of a failure observed during a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// One URL, text, or cluster could not be processed; it is excluded.
    Item,
    /// One collaborator call (e.g. an extraction chunk) failed; its
    /// contribution is empty and the remaining calls still run.
    Batch,
    /// The whole stage failed; no downstream stage runs.
    Stage,
}

/// A non-fatal failure recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Stage that observed the failure.
    pub stage: Stage,
    /// Severity.
    pub kind: FailureKind,
    /// The URL, chunk, or cluster label the failure concerns.
    pub key: Option<String>,
    /// Human-readable cause.
    pub message: String,
}

impl Failure {
    /// Record a single-item failure.
    pub fn item(stage: Stage, key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind: FailureKind::Item,
            key: Some(key.into()),
            message: message.into(),
        }
    }

    /// Record a failed collaborator call covering several items.
    pub fn batch(stage: Stage, key: Option<String>, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind: FailureKind::Batch,
            key,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = LinkDigestError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = LinkDigestError::stage(Stage::Embedding, "2 vectors for 3 summaries");
        assert_eq!(
            err.to_string(),
            "embedding stage failed: 2 vectors for 3 summaries"
        );
    }

    #[test]
    fn failure_constructors() {
        let f = Failure::item(Stage::Summarization, "http://a", "not parseable");
        assert_eq!(f.kind, FailureKind::Item);
        assert_eq!(f.key.as_deref(), Some("http://a"));

        let f = Failure::batch(Stage::Extraction, None, "503");
        assert_eq!(f.kind, FailureKind::Batch);
        assert!(f.key.is_none());
    }
}
