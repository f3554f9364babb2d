//! Runtime configuration
//!
//! Everything the analysis pipeline needs is carried in one explicit
//! [`AnalysisConfig`] handed to the service at construction. Values come
//! from the environment (a `.env` file is honoured when present).

use crate::error::{AnalysisError, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_COZE_BASE_URL: &str = "https://api.coze.com";
pub const DEFAULT_QWEN_API_URL: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/text-generation/generate";
pub const DEFAULT_QWEN_MODEL: &str = "qwen-turbo";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DATABASE_PATH: &str = "diary.db";

/// Chat-style provider (tried first)
#[derive(Debug, Clone)]
pub struct CozeSettings {
    pub api_key: Option<String>,
    pub bot_id: Option<String>,
    pub base_url: String,
}

impl Default for CozeSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            bot_id: None,
            base_url: DEFAULT_COZE_BASE_URL.to_string(),
        }
    }
}

impl CozeSettings {
    /// Both the key and the bot id are required
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.bot_id.is_some()
    }
}

/// Structured-JSON provider (tried second)
#[derive(Debug, Clone)]
pub struct QwenSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub api_url: String,
}

impl Default for QwenSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_QWEN_MODEL.to_string(),
            api_url: DEFAULT_QWEN_API_URL.to_string(),
        }
    }
}

impl QwenSettings {
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub coze: CozeSettings,
    pub qwen: QwenSettings,
    /// Upper bound on a single provider request
    pub request_timeout: Duration,
    pub database_path: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            coze: CozeSettings::default(),
            qwen: QwenSettings::default(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            log_dir: default_log_dir(),
        }
    }
}

impl AnalysisConfig {
    /// Load from the process environment, reading `.env` first if it exists.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let request_timeout = match get("ANALYSIS_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    AnalysisError::Config(format!("ANALYSIS_TIMEOUT_SECS is not a number: {}", raw))
                })?;
                if secs == 0 {
                    return Err(AnalysisError::Config(
                        "ANALYSIS_TIMEOUT_SECS must be positive".to_string(),
                    ));
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            coze: CozeSettings {
                api_key: get("COZE_API_KEY"),
                bot_id: get("COZE_BOT_ID"),
                base_url: get("COZE_BASE_URL").unwrap_or_else(|| DEFAULT_COZE_BASE_URL.to_string()),
            },
            qwen: QwenSettings {
                api_key: get("QWEN_API_KEY"),
                model: get("QWEN_MODEL_NAME").unwrap_or_else(|| DEFAULT_QWEN_MODEL.to_string()),
                api_url: get("QWEN_API_URL").unwrap_or_else(|| DEFAULT_QWEN_API_URL.to_string()),
            },
            request_timeout,
            database_path: get("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
            log_dir: get("LOG_DIR").map(PathBuf::from).unwrap_or_else(default_log_dir),
        })
    }

    pub fn with_coze(mut self, api_key: &str, bot_id: &str) -> Self {
        self.coze.api_key = Some(api_key.to_string());
        self.coze.bot_id = Some(bot_id.to_string());
        self
    }

    pub fn with_coze_base_url(mut self, base_url: &str) -> Self {
        self.coze.base_url = base_url.to_string();
        self
    }

    pub fn with_qwen(mut self, api_key: &str) -> Self {
        self.qwen.api_key = Some(api_key.to_string());
        self
    }

    pub fn with_qwen_api_url(mut self, api_url: &str) -> Self {
        self.qwen.api_url = api_url.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }
}

fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".cbt-diary/logs")
}
