use crate::classifier::KeywordEmotionClassifier;
use crate::config::CozeSettings;
use crate::emotion::{AnalysisSource, EmotionReading};
use crate::logging;
use crate::provider::{EmotionProvider, ProviderOutcome, Unavailable};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::time::Duration;

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
const CONNECT_TIMEOUT_SECS: u64 = 10;
/// Bot-side user the diary queries are attributed to
const DIARY_USER_ID: &str = "cbt_diary_user";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    bot_id: &'a str,
    user_id: &'a str,
    query: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

pub struct CozeClient {
    client: Client,
    settings: CozeSettings,
}

impl CozeClient {
    pub fn new(settings: CozeSettings, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(timeout))
            .build()?;

        Ok(Self { client, settings })
    }

    pub fn is_configured(&self) -> bool {
        self.settings.is_configured()
    }

    /// Ask the bot to analyze `text`; returns the raw response body.
    pub async fn chat_completion(&self, text: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
        let (api_key, bot_id) = match (&self.settings.api_key, &self.settings.bot_id) {
            (Some(key), Some(bot)) => (key, bot),
            _ => return Err("Coze credentials not configured".into()),
        };

        let request = ChatRequest {
            bot_id,
            user_id: DIARY_USER_ID,
            query: format!("请分析以下文本的情绪：{}", text),
            stream: false,
        };

        let url = format!(
            "{}{}",
            self.settings.base_url.trim_end_matches('/'),
            CHAT_COMPLETIONS_PATH
        );

        let response = self.client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(format!("Coze API error ({}): {}", status, error_text).into());
        }

        Ok(response.text().await?)
    }
}

/// Pull the assistant message out of a chat completion body.
pub fn extract_reply(body: &str) -> Result<String, String> {
    let completion: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| format!("unexpected payload: {}", e))?;

    completion.choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| "No choices in Coze response".to_string())
}

/// Chat replies are free text: run the keyword scan over them.
pub fn normalize_reply(reply: &str, classifier: &KeywordEmotionClassifier) -> EmotionReading {
    classifier.classify(reply).normalized()
}

/// Provider A: Coze chat bot.
pub struct CozeProvider {
    client: CozeClient,
    classifier: KeywordEmotionClassifier,
}

impl CozeProvider {
    pub fn new(settings: CozeSettings, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: CozeClient::new(settings, timeout)?,
            classifier: KeywordEmotionClassifier::new(),
        })
    }
}

#[async_trait]
impl EmotionProvider for CozeProvider {
    async fn analyze(&self, request_id: &str, text: &str) -> ProviderOutcome {
        if !self.client.is_configured() {
            return ProviderOutcome::Unavailable(Unavailable::NotConfigured);
        }

        let body = match self.client.chat_completion(text).await {
            Ok(body) => body,
            Err(e) => {
                logging::log_error(Some(request_id), &format!("Coze call failed: {}", e));
                return ProviderOutcome::Unavailable(Unavailable::Request(e.to_string()));
            }
        };

        match extract_reply(&body) {
            Ok(reply) => {
                logging::log_provider(Some(request_id), &format!("Coze replied ({} chars)", reply.chars().count()));
                ProviderOutcome::Analyzed(normalize_reply(&reply, &self.classifier))
            }
            Err(e) => {
                logging::log_error(Some(request_id), &format!("Coze response unusable: {}", e));
                ProviderOutcome::Unavailable(Unavailable::Malformed(e))
            }
        }
    }

    fn source(&self) -> AnalysisSource {
        AnalysisSource::Coze
    }

    fn name(&self) -> &str {
        "coze"
    }

    fn is_configured(&self) -> bool {
        self.client.is_configured()
    }
}
