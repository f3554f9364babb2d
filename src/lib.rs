pub mod classifier;
pub mod config;
pub mod coze;
pub mod db;
pub mod emotion;
pub mod error;
pub mod game_mapping;
pub mod logging;
pub mod orchestrator;
pub mod provider;
pub mod qwen;
pub mod store;
pub mod trends;

use chrono::{Duration, Utc};
use config::AnalysisConfig;
use db::Database;
use emotion::EmotionRecord;
use error::{AnalysisError, Result};
use game_mapping::GameMapping;
use orchestrator::{BatchItem, DiaryAnalysis, EmotionAnalysisOrchestrator};
use provider::EmotionProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use store::{Diary, EmotionStore};
use trends::{ImprovementStats, TrendAggregator, TrendReport};

/// Default number of history entries per page
pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;
/// Characters of diary text shown in history entries
const PREVIEW_CHARS: usize = 100;
/// Window for "recent diaries" in the overview
const RECENT_DIARY_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAnalysis {
    pub analysis: EmotionRecord,
    pub game_mapping: GameMapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub analysis: EmotionRecord,
    /// First 100 characters of the diary, "..." appended when cut
    pub diary_content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: usize,
    pub pages: usize,
    pub per_page: usize,
    pub total: usize,
    pub has_prev: bool,
    pub has_next: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisHistory {
    pub analysis_history: Vec<HistoryEntry>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOverview {
    pub total_diaries: usize,
    pub total_analyses: usize,
    /// Percent of diaries analyzed, one decimal
    pub analysis_coverage: f64,
    pub recent_diaries_7d: usize,
}

fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

fn pagination(page: usize, per_page: usize, total: usize) -> Pagination {
    let pages = (total + per_page - 1) / per_page;
    Pagination {
        page,
        pages,
        per_page,
        total,
        has_prev: page > 1,
        has_next: page < pages,
    }
}

/// Entry point for callers: diary storage, analysis and statistics behind
/// one owner-scoped API.
pub struct DiaryAnalysisService {
    db: Arc<Database>,
    orchestrator: EmotionAnalysisOrchestrator,
    trends: TrendAggregator,
}

impl DiaryAnalysisService {
    /// Open the configured database and wire the default provider chain.
    pub fn open(config: &AnalysisConfig) -> Result<Self> {
        let db = Arc::new(Database::open(&config.database_path)?);
        let orchestrator = EmotionAnalysisOrchestrator::from_config(config, db.clone())?;
        Ok(Self::assemble(db, orchestrator))
    }

    pub fn with_providers(db: Arc<Database>, providers: Vec<Box<dyn EmotionProvider>>) -> Self {
        let orchestrator = EmotionAnalysisOrchestrator::with_providers(providers, db.clone());
        Self::assemble(db, orchestrator)
    }

    fn assemble(db: Arc<Database>, orchestrator: EmotionAnalysisOrchestrator) -> Self {
        let trends = TrendAggregator::new(db.clone());
        Self { db, orchestrator, trends }
    }

    // ============ Diaries ============

    pub fn write_diary(&self, user_id: i64, content: &str) -> Result<Diary> {
        if content.trim().is_empty() {
            return Err(AnalysisError::Validation("diary content is empty".to_string()));
        }
        self.db.create_diary(user_id, content)
    }

    // ============ Analysis ============

    pub async fn analyze_diary(&self, user_id: i64, diary_id: i64) -> Result<DiaryAnalysis> {
        self.orchestrator.analyze_diary(user_id, diary_id).await
    }

    /// Stored analysis of a diary the caller owns
    pub fn get_analysis(&self, user_id: i64, diary_id: i64) -> Result<StoredAnalysis> {
        self.db
            .fetch_diary(diary_id, user_id)?
            .ok_or_else(|| AnalysisError::NotFound(format!("diary {}", diary_id)))?;

        let analysis = self
            .db
            .find_record_by_diary(diary_id)?
            .ok_or_else(|| AnalysisError::NotFound(format!("analysis for diary {}", diary_id)))?;

        Ok(StoredAnalysis {
            game_mapping: game_mapping::map_reading(&analysis.reading),
            analysis,
        })
    }

    pub async fn batch_analyze(&self, user_id: i64, diary_ids: &[i64]) -> Result<Vec<BatchItem>> {
        self.orchestrator.analyze_batch(user_id, diary_ids).await
    }

    /// One page of the caller's analyses, newest first. `limit` is clamped to 1..=100.
    pub fn analysis_history(&self, user_id: i64, page: usize, limit: Option<usize>) -> Result<AnalysisHistory> {
        if page == 0 {
            return Err(AnalysisError::Validation("page starts at 1".to_string()));
        }
        let per_page = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

        let offset = (page - 1)
            .checked_mul(per_page)
            .filter(|offset| i64::try_from(*offset).is_ok())
            .ok_or_else(|| AnalysisError::Validation(format!("page {} is out of range", page)))?;

        let (rows, total) = self.db.analysis_page(user_id, offset, per_page)?;
        let analysis_history = rows
            .into_iter()
            .map(|(analysis, content)| HistoryEntry {
                analysis,
                diary_content: preview(&content),
            })
            .collect();

        Ok(AnalysisHistory {
            analysis_history,
            pagination: pagination(page, per_page, total),
        })
    }

    // ============ Statistics ============

    pub fn emotion_trend(&self, user_id: i64, days: u32) -> Result<TrendReport> {
        self.trends.trend(user_id, days)
    }

    pub fn improvement_rate(&self, user_id: i64) -> Result<f64> {
        self.trends.improvement_rate(user_id)
    }

    pub fn improvement_stats(&self, user_id: i64) -> Result<ImprovementStats> {
        self.trends.improvement_stats(user_id)
    }

    pub fn analysis_overview(&self, user_id: i64) -> Result<AnalysisOverview> {
        let total_diaries = self.db.count_diaries(user_id, None)?;
        let total_analyses = self.db.count_records(user_id)?;
        let recent_diaries_7d = self
            .db
            .count_diaries(user_id, Some(Utc::now() - Duration::days(RECENT_DIARY_DAYS)))?;

        let analysis_coverage = if total_diaries > 0 {
            (total_analyses as f64 / total_diaries as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        Ok(AnalysisOverview {
            total_diaries,
            total_analyses,
            analysis_coverage,
            recent_diaries_7d,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::{AnalysisSource, Emotion};

    fn service() -> DiaryAnalysisService {
        let db = Arc::new(Database::open_in_memory().unwrap());
        DiaryAnalysisService::with_providers(db, Vec::new())
    }

    #[test]
    fn test_preview_cuts_on_characters() {
        assert_eq!(preview("短文"), "短文");
        let long: String = std::iter::repeat('情').take(101).collect();
        let cut = preview(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), 103);
        let exact: String = std::iter::repeat('a').take(100).collect();
        assert_eq!(preview(&exact), exact);
    }

    #[test]
    fn test_pagination_metadata() {
        let p = pagination(2, 20, 45);
        assert_eq!(p.pages, 3);
        assert!(p.has_prev && p.has_next);

        let last = pagination(3, 20, 45);
        assert!(!last.has_next);

        let empty = pagination(1, 20, 0);
        assert_eq!(empty.pages, 0);
        assert!(!empty.has_prev && !empty.has_next);
    }

    #[tokio::test]
    async fn test_get_analysis_requires_owner_and_record() {
        let service = service();
        let diary = service.write_diary(1, "今天很开心，也很满足").unwrap();

        assert!(matches!(service.get_analysis(1, diary.id), Err(AnalysisError::NotFound(_))));

        let analyzed = service.analyze_diary(1, diary.id).await.unwrap();
        assert_eq!(analyzed.record.source, AnalysisSource::Fallback);

        let stored = service.get_analysis(1, diary.id).unwrap();
        assert_eq!(stored.analysis, analyzed.record);
        assert_eq!(stored.analysis.reading.overall_emotion, Emotion::Happy);
        assert!(matches!(service.get_analysis(2, diary.id), Err(AnalysisError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_history_pages_newest_first() {
        let service = service();
        let mut ids = Vec::new();
        for i in 0..3 {
            let diary = service.write_diary(1, &format!("第{}天，心情平静", i)).unwrap();
            service.analyze_diary(1, diary.id).await.unwrap();
            ids.push(diary.id);
        }

        let first = service.analysis_history(1, 1, Some(2)).unwrap();
        assert_eq!(first.analysis_history.len(), 2);
        assert_eq!(first.pagination.total, 3);
        assert_eq!(first.pagination.pages, 2);
        assert!(first.pagination.has_next);

        let second = service.analysis_history(1, 2, Some(2)).unwrap();
        assert_eq!(second.analysis_history.len(), 1);
        assert_eq!(second.analysis_history[0].analysis.diary_id, ids[0]);

        let clamped = service.analysis_history(1, 1, Some(0)).unwrap();
        assert_eq!(clamped.pagination.per_page, 1);
        assert_eq!(service.analysis_history(1, 1, Some(500)).unwrap().pagination.per_page, MAX_PAGE_SIZE);
        assert!(matches!(service.analysis_history(1, 0, None), Err(AnalysisError::Validation(_))));
        assert!(matches!(
            service.analysis_history(1, usize::MAX / 2, Some(100)),
            Err(AnalysisError::Validation(_))
        ));

        let beyond = service.analysis_history(1, 50, Some(2)).unwrap();
        assert!(beyond.analysis_history.is_empty());
        assert_eq!(beyond.pagination.total, 3);
    }

    #[tokio::test]
    async fn test_overview_coverage() {
        let service = service();
        assert_eq!(service.analysis_overview(1).unwrap().analysis_coverage, 0.0);

        let ids: Vec<i64> = ["开心", "难过", "平静"]
            .iter()
            .map(|content| service.write_diary(1, content).unwrap().id)
            .collect();
        service.analyze_diary(1, ids[0]).await.unwrap();

        let overview = service.analysis_overview(1).unwrap();
        assert_eq!(overview.total_diaries, 3);
        assert_eq!(overview.total_analyses, 1);
        assert_eq!(overview.analysis_coverage, 33.3);
        assert_eq!(overview.recent_diaries_7d, 3);
    }

    #[test]
    fn test_empty_diary_rejected() {
        assert!(matches!(service().write_diary(1, "   "), Err(AnalysisError::Validation(_))));
    }
}
