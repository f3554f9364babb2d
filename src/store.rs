//! Storage collaborator seen by the analysis core.

use crate::emotion::{DiarySummary, EmotionRecord, NewEmotionRecord};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Completed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<AnalysisStatus> {
        match s {
            "pending" => Some(AnalysisStatus::Pending),
            "completed" => Some(AnalysisStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diary {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub analysis_status: AnalysisStatus,
    /// Summary of the analysis, once there is one
    pub emotion_score: Option<DiarySummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Diary/analysis persistence used by the orchestrator and the aggregators.
///
/// Implementations must write an analysis record and its diary summary
/// together in [`EmotionStore::persist_analysis`]; the default version is
/// only as atomic as the two calls it makes.
pub trait EmotionStore: Send + Sync {
    /// Diary `diary_id` if it exists and belongs to `owner_id`
    fn fetch_diary(&self, diary_id: i64, owner_id: i64) -> Result<Option<Diary>>;

    fn find_record_by_diary(&self, diary_id: i64) -> Result<Option<EmotionRecord>>;

    fn save_record(&self, record: &NewEmotionRecord) -> Result<EmotionRecord>;

    /// Mark the diary analyzed and store the summary snapshot
    fn update_diary_summary(&self, diary_id: i64, summary: &DiarySummary) -> Result<()>;

    fn persist_analysis(&self, record: &NewEmotionRecord, summary: &DiarySummary) -> Result<EmotionRecord> {
        let saved = self.save_record(record)?;
        self.update_diary_summary(record.diary_id, summary)?;
        Ok(saved)
    }

    /// User's records analyzed at or after `since`, oldest first
    fn records_since(&self, user_id: i64, since: DateTime<Utc>) -> Result<Vec<EmotionRecord>>;

    /// User's newest records with confidence strictly above `min_confidence`
    fn recent_confident_records(
        &self,
        user_id: i64,
        min_confidence: f64,
        limit: usize,
    ) -> Result<Vec<EmotionRecord>>;

    /// One page of the user's records, newest first, with diary text, plus the total count
    fn analysis_page(
        &self,
        user_id: i64,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<(EmotionRecord, String)>, usize)>;

    fn count_diaries(&self, user_id: i64, since: Option<DateTime<Utc>>) -> Result<usize>;

    fn count_records(&self, user_id: i64) -> Result<usize>;
}
