//! Structured logging module for CBT Diary
//!
//! Writes to stderr and to a daily file under the configured log directory
//! (`cbt-diary.YYYY-MM-DD.log`, last 7 days kept) with categories:
//! - ANALYSIS: Orchestrator decisions and persisted results
//! - PROVIDER: External API calls
//! - STORAGE: Database lifecycle
//! - STATS: Trend and improvement queries
//! - ERROR: Failures (provider outages, storage errors)

use once_cell::sync::OnceCell;
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Daily files retained in the log directory
const KEEP_LOG_FILES: usize = 7;

/// Log categories for structured logging
#[derive(Debug, Clone, Copy)]
pub enum LogCategory {
    Analysis, // Orchestrator fallback decisions, records written
    Provider, // Outbound API calls
    Storage,  // Database open/schema
    Stats,    // Trend/improvement aggregation
    Error,    // Errors
}

impl LogCategory {
    fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Analysis => "ANALYSIS",
            LogCategory::Provider => "PROVIDER",
            LogCategory::Storage => "STORAGE",
            LogCategory::Stats => "STATS",
            LogCategory::Error => "ERROR",
        }
    }
}

/// Keeps the background file writer alive for the life of the process
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Initialize the logging system - creates log directory if needed.
///
/// Safe to call more than once; only the first call installs the subscriber.
pub fn init_logging(log_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if FILE_GUARD.get().is_some() {
        return Ok(());
    }

    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("cbt-diary")
        .filename_suffix("log")
        .max_log_files(KEEP_LOG_FILES)
        .build(log_dir)?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()?;

    let _ = FILE_GUARD.set(guard);

    log(LogCategory::Storage, None, &format!(
        "CBT Diary logging initialized in {}", log_dir.display()
    ));

    Ok(())
}

/// Log a message with category and optional request context
pub fn log(category: LogCategory, request_id: Option<&str>, message: &str) {
    // Shortened like the id column in the UI
    let request: String = request_id
        .map(|id| id.chars().take(8).collect())
        .unwrap_or_else(|| "-".to_string());

    match category {
        LogCategory::Error => {
            tracing::error!(category = category.as_str(), request = %request, "{}", message)
        }
        _ => tracing::info!(category = category.as_str(), request = %request, "{}", message),
    }
}

/// Log an orchestrator event (cache hit, provider chosen, record saved)
pub fn log_analysis(request_id: Option<&str>, message: &str) {
    log(LogCategory::Analysis, request_id, message);
}

/// Log an outbound provider call
pub fn log_provider(request_id: Option<&str>, message: &str) {
    log(LogCategory::Provider, request_id, message);
}

pub fn log_storage(message: &str) {
    log(LogCategory::Storage, None, message);
}

pub fn log_stats(message: &str) {
    log(LogCategory::Stats, None, message);
}

/// Log an error
pub fn log_error(request_id: Option<&str>, message: &str) {
    log(LogCategory::Error, request_id, message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_without_init_is_silent() {
        log_analysis(Some("0123456789abcdef"), "no subscriber installed");
        log_error(None, "still fine");
    }

    #[test]
    fn test_init_creates_dir_and_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested/logs");

        init_logging(&dir).unwrap();
        assert!(dir.is_dir());

        // second call is a no-op rather than a double-install error
        init_logging(&dir).unwrap();
        log_stats("trend computed");
    }
}
