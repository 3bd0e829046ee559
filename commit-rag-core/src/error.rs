// error types shared across the engine
//
// parsing problems are collected and never fatal; index and generation
// problems are surfaced to the caller as typed failures.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// a diff fragment the analyser could not interpret (recorded, not raised)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {reason}")]
pub struct DiffParseError {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to read or write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid index data: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid corpus csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("corrupt index artifact: {0}")]
    Corrupt(String),

    #[error("unsupported index artifact version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("corpus contains no usable records")]
    EmptyCorpus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    EmptyResponse,
    Timeout,
    ServiceUnavailable,
}

impl fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::EmptyResponse => "empty response",
            Self::Timeout => "timeout",
            Self::ServiceUnavailable => "service unavailable",
        };
        f.write_str(label)
    }
}

/// failure of the external text-generation call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("generation failed ({kind}): {message}")]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    pub message: String,
}

impl GenerationError {
    pub fn new(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn empty_response(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::EmptyResponse, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::Timeout, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::ServiceUnavailable, message)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no changes detected in the diff")]
    NoChanges,

    #[error("commit index is not loaded and no corpus source is configured")]
    IndexNotReady,

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("index worker stopped: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
