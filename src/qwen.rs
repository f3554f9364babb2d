use crate::classifier::KeywordEmotionClassifier;
use crate::config::QwenSettings;
use crate::emotion::{AnalysisSource, EmotionReading};
use crate::logging;
use crate::provider::{EmotionProvider, ProviderOutcome, Unavailable};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::time::Duration;

const CONNECT_TIMEOUT_SECS: u64 = 10;

const SYSTEM_PROMPT: &str = "你是一个专业的情绪分析助手，请准确分析文本中的情绪状态。";

#[derive(Debug, Serialize, Clone)]
pub struct QwenMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    input: GenerationInput,
    parameters: GenerationParameters,
}

#[derive(Debug, Serialize)]
struct GenerationInput {
    messages: Vec<QwenMessage>,
}

#[derive(Debug, Serialize)]
struct GenerationParameters {
    result_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    output: GenerationOutput,
}

#[derive(Debug, Deserialize)]
struct GenerationOutput {
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

#[derive(Debug, Deserialize)]
struct DashScopeError {
    code: String,
    message: String,
}

pub struct QwenClient {
    client: Client,
    settings: QwenSettings,
}

impl QwenClient {
    pub fn new(settings: QwenSettings, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(timeout))
            .build()?;

        Ok(Self { client, settings })
    }

    pub fn is_configured(&self) -> bool {
        self.settings.is_configured()
    }

    /// Send a text generation request; returns the raw response body.
    pub async fn generate(&self, messages: Vec<QwenMessage>) -> Result<String, Box<dyn Error + Send + Sync>> {
        let api_key = self.settings.api_key.as_deref()
            .ok_or("Qwen API key not configured")?;

        let request = GenerationRequest {
            model: &self.settings.model,
            input: GenerationInput { messages },
            parameters: GenerationParameters { result_format: "message" },
        };

        let response = self.client
            .post(&self.settings.api_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            // Try to parse structured error
            if let Ok(parsed_error) = serde_json::from_str::<DashScopeError>(&error_text) {
                return Err(format!(
                    "Qwen API error ({}): {} - {}",
                    status, parsed_error.code, parsed_error.message
                ).into());
            }

            return Err(format!("Qwen API error ({}): {}", status, error_text).into());
        }

        Ok(response.text().await?)
    }
}

/// Messages asking for a reading in the canonical JSON shape
pub fn analysis_messages(text: &str) -> Vec<QwenMessage> {
    let prompt = format!(
        r#"请对以下日记文本进行情绪分析，只返回JSON，不要附加其他说明。

文本内容："{}"

返回格式：
{{
  "overall_emotion": "happy | sad | angry | anxious | calm | neutral 之一",
  "emotion_intensity": 0.0到1.0之间的情绪强度,
  "emotion_dimensions": {{
    "valence": -1.0到1.0之间的情绪效价,
    "arousal": 0.0到1.0之间的唤醒度,
    "dominance": 0.0到1.0之间的控制感
  }},
  "key_words": ["关键词1", "关键词2"],
  "confidence_score": 0.0到1.0之间的置信度
}}"#,
        text
    );

    vec![
        QwenMessage {
            role: "system".to_string(),
            content: SYSTEM_PROMPT.to_string(),
        },
        QwenMessage {
            role: "user".to_string(),
            content: prompt,
        },
    ]
}

/// Pull the assistant message out of a generation body.
pub fn extract_reply(body: &str) -> Result<String, String> {
    let generation: GenerationResponse =
        serde_json::from_str(body).map_err(|e| format!("unexpected payload: {}", e))?;

    generation.output.choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| "No choices in Qwen response".to_string())
}

/// Result of normalizing a model reply
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedReply {
    /// Reply decoded straight into the canonical shape
    Structured(EmotionReading),
    /// Reply was free text; keyword scan over it
    Heuristic(EmotionReading),
}

impl ParsedReply {
    pub fn into_reading(self) -> EmotionReading {
        match self {
            ParsedReply::Structured(reading) | ParsedReply::Heuristic(reading) => reading,
        }
    }
}

/// Two-stage parse: strict schema decode first, keyword scan second.
pub fn parse_reply(reply: &str, classifier: &KeywordEmotionClassifier) -> ParsedReply {
    match decode_structured(reply) {
        Some(reading) => ParsedReply::Structured(reading.normalized()),
        None => ParsedReply::Heuristic(classifier.classify(reply).normalized()),
    }
}

fn decode_structured(reply: &str) -> Option<EmotionReading> {
    let cleaned = reply
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str::<EmotionReading>(cleaned).ok()
}

/// Provider B: Qwen through DashScope.
pub struct QwenProvider {
    client: QwenClient,
    classifier: KeywordEmotionClassifier,
}

impl QwenProvider {
    pub fn new(settings: QwenSettings, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: QwenClient::new(settings, timeout)?,
            classifier: KeywordEmotionClassifier::new(),
        })
    }
}

#[async_trait]
impl EmotionProvider for QwenProvider {
    async fn analyze(&self, request_id: &str, text: &str) -> ProviderOutcome {
        if !self.client.is_configured() {
            return ProviderOutcome::Unavailable(Unavailable::NotConfigured);
        }

        let body = match self.client.generate(analysis_messages(text)).await {
            Ok(body) => body,
            Err(e) => {
                logging::log_error(Some(request_id), &format!("Qwen call failed: {}", e));
                return ProviderOutcome::Unavailable(Unavailable::Request(e.to_string()));
            }
        };

        let reply = match extract_reply(&body) {
            Ok(reply) => reply,
            Err(e) => {
                logging::log_error(Some(request_id), &format!("Qwen response unusable: {}", e));
                return ProviderOutcome::Unavailable(Unavailable::Malformed(e));
            }
        };

        match parse_reply(&reply, &self.classifier) {
            ParsedReply::Structured(reading) => {
                logging::log_provider(Some(request_id), "Qwen returned structured analysis");
                ProviderOutcome::Analyzed(reading)
            }
            ParsedReply::Heuristic(reading) => {
                logging::log_provider(Some(request_id), "Qwen reply was not JSON, scanned reply text instead");
                ProviderOutcome::Analyzed(reading)
            }
        }
    }

    fn source(&self) -> AnalysisSource {
        AnalysisSource::Qwen
    }

    fn name(&self) -> &str {
        "qwen"
    }

    fn is_configured(&self) -> bool {
        self.client.is_configured()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::Emotion;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const STRUCTURED: &str = r#"{
        "overall_emotion": "anxious",
        "emotion_intensity": 0.72,
        "emotion_dimensions": {"valence": -0.4, "arousal": 0.8, "dominance": 0.3},
        "key_words": ["考试", "失眠"],
        "confidence_score": 0.85
    }"#;

    fn settings(api_url: &str) -> QwenSettings {
        QwenSettings {
            api_key: Some("qwen-key".to_string()),
            model: "qwen-turbo".to_string(),
            api_url: api_url.to_string(),
        }
    }

    fn generation_body(content: &str) -> serde_json::Value {
        json!({
            "output": {"choices": [{"finish_reason": "stop", "message": {"role": "assistant", "content": content}}]},
            "usage": {"input_tokens": 10, "output_tokens": 20}
        })
    }

    #[test]
    fn test_structured_reply_is_decoded() {
        let classifier = KeywordEmotionClassifier::new();
        match parse_reply(STRUCTURED, &classifier) {
            ParsedReply::Structured(reading) => {
                assert_eq!(reading.overall_emotion, Emotion::Anxious);
                assert_eq!(reading.emotion_intensity, 0.72);
                assert_eq!(reading.emotion_dimensions.arousal, 0.8);
                assert_eq!(reading.key_words, vec!["考试", "失眠"]);
            }
            other => panic!("Expected Structured, got: {other:?}"),
        }
    }

    #[test]
    fn test_fenced_reply_is_decoded() {
        let fenced = format!("```json\n{}\n```", STRUCTURED);
        let parsed = parse_reply(&fenced, &KeywordEmotionClassifier::new());
        assert!(matches!(parsed, ParsedReply::Structured(_)));
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let reply = r#"{"overall_emotion":"happy","emotion_intensity":3,
            "emotion_dimensions":{"valence":2,"arousal":0.5,"dominance":0.5},
            "key_words":[],"confidence_score":1.5}"#;
        let reading = parse_reply(reply, &KeywordEmotionClassifier::new()).into_reading();
        assert_eq!(reading.emotion_intensity, 1.0);
        assert_eq!(reading.confidence_score, 1.0);
        assert_eq!(reading.emotion_dimensions.valence, 1.0);
    }

    #[test]
    fn test_free_text_falls_back_to_keyword_scan() {
        let classifier = KeywordEmotionClassifier::new();
        let parsed = parse_reply("文本整体比较平静，作者感到放松。", &classifier);
        match parsed {
            ParsedReply::Heuristic(reading) => {
                assert_eq!(reading.overall_emotion, Emotion::Calm);
                assert!((reading.emotion_intensity - 0.6).abs() < 1e-9);
            }
            other => panic!("Expected Heuristic, got: {other:?}"),
        }
    }

    #[test]
    fn test_schema_mismatch_falls_back() {
        // unknown label and missing fields: not the canonical shape
        let reply = r#"{"overall_emotion": "excited", "emotion_intensity": 0.5}"#;
        let parsed = parse_reply(reply, &KeywordEmotionClassifier::new());
        assert!(matches!(parsed, ParsedReply::Heuristic(_)));
    }

    #[test]
    fn test_extract_reply_requires_output() {
        assert!(extract_reply(r#"{"code":"x"}"#).is_err());
        assert!(extract_reply(r#"{"output":{"choices":[]}}"#).is_err());
    }

    #[tokio::test]
    async fn test_structured_round_trip_over_http() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/generate"))
            .and(header("Authorization", "Bearer qwen-key"))
            .and(body_partial_json(json!({
                "model": "qwen-turbo",
                "parameters": {"result_format": "message"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(generation_body(STRUCTURED)))
            .expect(1)
            .mount(&server)
            .await;

        let provider = QwenProvider::new(
            settings(&format!("{}/generate", server.uri())),
            Duration::from_secs(2),
        )
        .unwrap();

        match provider.analyze("5b1e7a90-test", "明天考试，整晚睡不着").await {
            ProviderOutcome::Analyzed(reading) => {
                assert_eq!(reading.overall_emotion, Emotion::Anxious);
                assert_eq!(reading.confidence_score, 0.85);
            }
            other => panic!("Expected Analyzed, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_structured_error_is_unavailable() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "code": "InvalidApiKey",
                "message": "Invalid API-key provided."
            })))
            .mount(&server)
            .await;

        let provider = QwenProvider::new(settings(&server.uri()), Duration::from_secs(2)).unwrap();
        let outcome = provider.analyze("5b1e7a90-test", "今天很开心").await;
        assert!(
            matches!(outcome, ProviderOutcome::Unavailable(Unavailable::Request(ref msg)) if msg.contains("InvalidApiKey")),
            "Expected Request failure, got: {outcome:?}"
        );
    }

    #[tokio::test]
    async fn test_missing_key_sends_nothing() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut unset = settings(&server.uri());
        unset.api_key = None;
        let provider = QwenProvider::new(unset, Duration::from_secs(2)).unwrap();

        assert_eq!(
            provider.analyze("5b1e7a90-test", "今天很开心").await,
            ProviderOutcome::Unavailable(Unavailable::NotConfigured)
        );
    }

    #[tokio::test]
    async fn test_empty_success_status_is_unavailable() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let provider = QwenProvider::new(settings(&server.uri()), Duration::from_secs(2)).unwrap();
        let outcome = provider.analyze("5b1e7a90-test", "今天很开心").await;
        assert!(
            matches!(outcome, ProviderOutcome::Unavailable(Unavailable::Request(ref msg)) if msg.contains("204")),
            "Expected Request failure, got: {outcome:?}"
        );
    }
}
