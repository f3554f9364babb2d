//! Provider capability shared by the external emotion analysis APIs.

use crate::emotion::{AnalysisSource, EmotionReading};
use async_trait::async_trait;
use std::fmt;

/// Why a provider produced no reading. Never surfaced to callers.
#[derive(Debug, Clone, PartialEq)]
pub enum Unavailable {
    /// Credentials missing; no request was sent
    NotConfigured,
    /// Timeout, connection error or non-200 status
    Request(String),
    /// Reply could not be turned into a reading
    Malformed(String),
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unavailable::NotConfigured => write!(f, "not configured"),
            Unavailable::Request(msg) => write!(f, "request failed: {}", msg),
            Unavailable::Malformed(msg) => write!(f, "malformed response: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutcome {
    Analyzed(EmotionReading),
    Unavailable(Unavailable),
}

/// One external emotion analysis API.
///
/// Implementations make a single attempt per call and report failure as
/// [`ProviderOutcome::Unavailable`] instead of an error.
#[async_trait]
pub trait EmotionProvider: Send + Sync {
    /// `request_id` correlates the provider's log lines with the caller's
    async fn analyze(&self, request_id: &str, text: &str) -> ProviderOutcome;

    /// Source stamped on records this provider produced
    fn source(&self) -> AnalysisSource;

    fn name(&self) -> &str;

    /// Whether credentials are present. Unconfigured providers are skipped.
    fn is_configured(&self) -> bool;
}
