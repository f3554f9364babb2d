//! Error types for the analysis pipeline.
//!
//! Provider failures never show up here: adapters turn them into
//! `ProviderOutcome::Unavailable` and the orchestrator falls through to the
//! next provider. What reaches the caller is limited to missing/unowned
//! diaries, bad input and storage trouble.

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// Diary or analysis is absent, or the caller does not own it
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed input (empty batch, bad page size, ...)
    #[error("validation error: {0}")]
    Validation(String),

    /// SQLite failure; the attempted write was rolled back
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A stored JSON column could not be decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unreadable stored row (bad timestamp, unknown enum tag) or poisoned lock
    #[error("internal error: {0}")]
    Internal(String),

    #[error("config error: {0}")]
    Config(String),

    /// HTTP client construction failed
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
