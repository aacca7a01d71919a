//! Index error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur inside the indexing core
///
/// Recovery policy lives with the callers: parse errors skip one document,
/// cache errors degrade to misses, worker errors fall back to sequential
/// parsing, and consistency errors reduce to no-op removals. None of these
/// aborts a batch.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Cache {namespace} tier failed for {key}: {reason}")]
    Cache {
        namespace: String,
        key: String,
        reason: String,
    },

    #[error("Worker pool failure: {0}")]
    Worker(String),

    #[error("Document not found: {path}")]
    MissingDocument { path: PathBuf },

    #[error("Unknown task id: {0}")]
    UnknownTask(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexError {
    pub fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_message() {
        let err = IndexError::parse("notes/bad.md", "unbalanced bracket");
        let msg = err.to_string();
        assert!(msg.contains("notes/bad.md"));
        assert!(msg.contains("unbalanced bracket"));
    }

    #[test]
    fn test_unknown_task_message() {
        let err = IndexError::UnknownTask("abc123".to_string());
        assert!(err.to_string().contains("abc123"));
    }
}
