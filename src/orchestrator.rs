use crate::classifier::KeywordEmotionClassifier;
use crate::config::AnalysisConfig;
use crate::coze::CozeProvider;
use crate::emotion::{AnalysisSource, DiarySummary, EmotionReading, EmotionRecord, NewEmotionRecord};
use crate::error::{AnalysisError, Result};
use crate::game_mapping::{self, GameMapping};
use crate::logging;
use crate::provider::{EmotionProvider, ProviderOutcome};
use crate::qwen::QwenProvider;
use crate::store::EmotionStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============ Results ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub record: EmotionRecord,
    /// False when the diary had already been analyzed
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiaryAnalysis {
    pub record: EmotionRecord,
    pub created: bool,
    pub game_mapping: GameMapping,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "analysis", rename_all = "snake_case")]
pub enum BatchOutcome {
    NotFound,
    AlreadyAnalyzed(EmotionRecord),
    Analyzed(EmotionRecord),
    AnalysisFailed,
}

impl BatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchOutcome::NotFound => "not_found",
            BatchOutcome::AlreadyAnalyzed(_) => "already_analyzed",
            BatchOutcome::Analyzed(_) => "analyzed",
            BatchOutcome::AnalysisFailed => "analysis_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItem {
    pub diary_id: i64,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

// ============ Orchestrator ============

/// Runs the provider chain for a diary and persists exactly one record.
///
/// Providers are tried in order; the keyword classifier is the last resort
/// and never fails, so analysis itself always yields a reading.
pub struct EmotionAnalysisOrchestrator {
    providers: Vec<Box<dyn EmotionProvider>>,
    classifier: KeywordEmotionClassifier,
    store: Arc<dyn EmotionStore>,
}

impl EmotionAnalysisOrchestrator {
    /// Coze first, then Qwen, then the local classifier
    pub fn from_config(config: &AnalysisConfig, store: Arc<dyn EmotionStore>) -> Result<Self> {
        let coze = CozeProvider::new(config.coze.clone(), config.request_timeout)?;
        let qwen = QwenProvider::new(config.qwen.clone(), config.request_timeout)?;
        Ok(Self::with_providers(vec![Box::new(coze), Box::new(qwen)], store))
    }

    pub fn with_providers(providers: Vec<Box<dyn EmotionProvider>>, store: Arc<dyn EmotionStore>) -> Self {
        Self {
            providers,
            classifier: KeywordEmotionClassifier::new(),
            store,
        }
    }

    /// First reading the chain produces, with the source that produced it.
    async fn run_chain(&self, request_id: &str, text: &str) -> (EmotionReading, AnalysisSource) {
        for provider in &self.providers {
            if !provider.is_configured() {
                logging::log_analysis(Some(request_id), &format!("{} skipped: no credentials", provider.name()));
                continue;
            }

            match provider.analyze(request_id, text).await {
                ProviderOutcome::Analyzed(reading) => {
                    logging::log_analysis(Some(request_id), &format!("{} produced {}", provider.name(), reading.overall_emotion.as_str()));
                    return (reading, provider.source());
                }
                ProviderOutcome::Unavailable(reason) => {
                    logging::log_analysis(Some(request_id), &format!("{} unavailable: {}", provider.name(), reason));
                }
            }
        }

        let reading = self.classifier.classify(text).normalized();
        logging::log_analysis(Some(request_id), &format!("Local fallback produced {}", reading.overall_emotion.as_str()));
        (reading, AnalysisSource::Fallback)
    }

    /// Write the record and the diary summary together.
    ///
    /// Losing a race against a concurrent writer is not an error: the
    /// winner's record is returned instead.
    fn persist(&self, request_id: &str, diary_id: i64, reading: EmotionReading, source: AnalysisSource) -> Result<AnalysisResult> {
        let summary = DiarySummary::from(&reading);
        let record = NewEmotionRecord {
            diary_id,
            reading,
            source,
            analyzed_at: Utc::now(),
        };

        match self.store.persist_analysis(&record, &summary) {
            Ok(saved) => {
                logging::log_analysis(Some(request_id), &format!("Saved analysis {} for diary {} ({})", saved.id, diary_id, source.as_str()));
                Ok(AnalysisResult { record: saved, created: true })
            }
            Err(AnalysisError::Storage(e)) => match self.store.find_record_by_diary(diary_id)? {
                Some(existing) => {
                    logging::log_analysis(Some(request_id), &format!("Diary {} analyzed concurrently, keeping record {}", diary_id, existing.id));
                    Ok(AnalysisResult { record: existing, created: false })
                }
                None => {
                    logging::log_error(Some(request_id), &format!("Failed to save analysis for diary {}: {}", diary_id, e));
                    Err(AnalysisError::Storage(e))
                }
            },
            Err(e) => {
                logging::log_error(Some(request_id), &format!("Failed to save analysis for diary {}: {}", diary_id, e));
                Err(e)
            }
        }
    }

    async fn analyze_with_source(&self, diary_id: i64, text: &str, stamp: Option<AnalysisSource>) -> Result<AnalysisResult> {
        let request_id = uuid::Uuid::new_v4().to_string();

        if let Some(existing) = self.store.find_record_by_diary(diary_id)? {
            logging::log_analysis(Some(&request_id), &format!("Diary {} already analyzed", diary_id));
            return Ok(AnalysisResult { record: existing, created: false });
        }

        let (reading, source) = self.run_chain(&request_id, text).await;
        self.persist(&request_id, diary_id, reading, stamp.unwrap_or(source))
    }

    /// Analyze a diary's text once. Repeat calls return the stored record
    /// without contacting any provider.
    pub async fn analyze_once(&self, diary_id: i64, text: &str) -> Result<AnalysisResult> {
        self.analyze_with_source(diary_id, text, None).await
    }

    /// Analyze a diary owned by `owner_id` and attach its game mapping.
    pub async fn analyze_diary(&self, owner_id: i64, diary_id: i64) -> Result<DiaryAnalysis> {
        let diary = self
            .store
            .fetch_diary(diary_id, owner_id)?
            .ok_or_else(|| AnalysisError::NotFound(format!("diary {}", diary_id)))?;

        let result = self.analyze_once(diary.id, &diary.content).await?;
        Ok(DiaryAnalysis {
            game_mapping: game_mapping::map_reading(&result.record.reading),
            record: result.record,
            created: result.created,
        })
    }

    /// Analyze several diaries independently, in input order.
    pub async fn analyze_batch(&self, owner_id: i64, diary_ids: &[i64]) -> Result<Vec<BatchItem>> {
        if diary_ids.is_empty() {
            return Err(AnalysisError::Validation("no diary ids provided".to_string()));
        }

        let mut items = Vec::with_capacity(diary_ids.len());
        for &diary_id in diary_ids {
            let outcome = self.batch_outcome(owner_id, diary_id).await;
            items.push(BatchItem { diary_id, outcome });
        }

        logging::log_analysis(None, &format!(
            "Batch of {} for user {}: {} analyzed",
            items.len(),
            owner_id,
            items.iter().filter(|i| matches!(i.outcome, BatchOutcome::Analyzed(_))).count()
        ));

        Ok(items)
    }

    async fn batch_outcome(&self, owner_id: i64, diary_id: i64) -> BatchOutcome {
        let diary = match self.store.fetch_diary(diary_id, owner_id) {
            Ok(Some(diary)) => diary,
            Ok(None) => return BatchOutcome::NotFound,
            Err(e) => {
                logging::log_error(None, &format!("Batch lookup of diary {} failed: {}", diary_id, e));
                return BatchOutcome::AnalysisFailed;
            }
        };

        match self.analyze_with_source(diary.id, &diary.content, Some(AnalysisSource::Batch)).await {
            Ok(AnalysisResult { record, created: true }) => BatchOutcome::Analyzed(record),
            Ok(AnalysisResult { record, created: false }) => BatchOutcome::AlreadyAnalyzed(record),
            Err(_) => BatchOutcome::AnalysisFailed,
        }
    }
}
