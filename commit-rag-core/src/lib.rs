// commit-rag-core/src/lib.rs

// declare modules
pub mod ai;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod index;
pub mod retrieval;
pub mod utils;

// re-export key structs/functions for the cli crate
pub use crate::ai::{
    CommitType, GeneratedMessage, GenerationClient, GenerationOptions, GenerationRequest,
    OpenRouterClient, StyleConstraints, generate,
};
pub use crate::config::Config;
pub use crate::diff::{ChangeKind, ChangeSummary, FileChange, FileType};
pub use crate::engine::{Engine, SimilarCommit};
pub use crate::error::{DiffParseError, EngineError, GenerationError, GenerationErrorKind, IndexError};
pub use crate::index::{CorpusEntry, CorpusRecord, IndexOptions, VectorSpaceIndex, build_index, load_corpus};
pub use crate::retrieval::{RetrievalHit, RetrievalResult, retrieve};

/// parse a unified diff into structured change facts
pub fn analyze_diff(diff_text: &str) -> ChangeSummary {
    diff::analyze(diff_text)
}
