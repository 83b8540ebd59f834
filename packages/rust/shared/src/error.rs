//! Error types for ConceptLink.
//!
//! Library crates use [`ConceptLinkError`] via `thiserror`. Remote failures
//! are retried and degraded by the callers; only [`ConceptLinkError::CacheCorrupt`]
//! is meant to stop a run.

use std::path::PathBuf;

/// Top-level error type for all ConceptLink operations.
#[derive(Debug, thiserror::Error)]
pub enum ConceptLinkError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during a single remote attempt.
    #[error("network error: {0}")]
    Network(String),

    /// Remote payload could not be decoded.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A remote operation failed on every attempt.
    #[error("{operation} failed after {trials} attempts: {last_error}")]
    RetriesExhausted {
        operation: String,
        trials: u32,
        last_error: String,
    },

    /// The persisted lookup cache cannot be read back.
    #[error("cache file {path:?} is corrupt: {message}")]
    CacheCorrupt { path: PathBuf, message: String },

    /// A concept record does not match the expected schema.
    #[error("malformed record at line {line}: {message}")]
    MalformedRecord { line: usize, message: String },

    /// Embedding service error or unusable vectors.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid input value.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ConceptLinkError>;

impl ConceptLinkError {
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

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn cache_corrupt(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::CacheCorrupt {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn malformed_record(line: usize, msg: impl Into<String>) -> Self {
        Self::MalformedRecord {
            line,
            message: msg.into(),
        }
    }

    /// Whether this error marks a remote stage that gave up after retrying.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. } | Self::Embedding(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ConceptLinkError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = ConceptLinkError::malformed_record(7, "concepts must be an array");
        assert_eq!(
            err.to_string(),
            "malformed record at line 7: concepts must be an array"
        );

        let err = ConceptLinkError::RetriesExhausted {
            operation: "wikidata search".into(),
            trials: 3,
            last_error: "HTTP 503".into(),
        };
        assert_eq!(
            err.to_string(),
            "wikidata search failed after 3 attempts: HTTP 503"
        );
    }

    #[test]
    fn degraded_classification() {
        let exhausted = ConceptLinkError::RetriesExhausted {
            operation: "sparql".into(),
            trials: 3,
            last_error: "timeout".into(),
        };
        assert!(exhausted.is_degraded());
        assert!(ConceptLinkError::Embedding("down".into()).is_degraded());
        assert!(!ConceptLinkError::cache_corrupt("/tmp/c.json", "eof").is_degraded());
    }
}
