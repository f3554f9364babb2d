//! Trend and improvement statistics over stored analyses
//!
//! The aggregation itself is pure (`daily_trend`, `improvement_rate`,
//! `improvement_stats`); [`TrendAggregator`] only fetches the records.

use crate::emotion::{Emotion, EmotionRecord};
use crate::error::{AnalysisError, Result};
use crate::logging;
use crate::store::EmotionStore;
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Records considered by the improvement statistics
pub const IMPROVEMENT_SAMPLE_SIZE: usize = 20;
/// Only analyses strictly more confident than this count toward improvement
pub const MIN_IMPROVEMENT_CONFIDENCE: f64 = 0.5;
/// Records averaged at each end of the sample
const IMPROVEMENT_WINDOW: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub dominant_emotion: Emotion,
    /// Rounded to two decimals
    pub average_intensity: f64,
    pub sample_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub trend_data: Vec<TrendPoint>,
    pub total_days: usize,
    pub period: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementStats {
    /// Percent change between the newest and oldest windows, two decimals
    pub improvement_rate: f64,
    pub emotion_frequency: BTreeMap<String, usize>,
    pub average_intensity: f64,
    pub total_analyses: usize,
    /// Weighted score of the newest record
    pub recent_score: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Wellbeing score of an emotion, used to weight improvement
pub fn emotion_base_score(emotion: Emotion) -> f64 {
    match emotion {
        Emotion::Happy => 1.0,
        Emotion::Calm => 0.8,
        Emotion::Neutral => 0.6,
        Emotion::Anxious => 0.4,
        Emotion::Sad => 0.3,
        Emotion::Angry => 0.2,
    }
}

pub fn weighted_score(record: &EmotionRecord) -> f64 {
    emotion_base_score(record.reading.overall_emotion) * record.reading.confidence_score
}

/// Most frequent emotion; ties go to the one seen first.
fn mode(emotions: impl IntoIterator<Item = Emotion>) -> Option<Emotion> {
    let mut counts: Vec<(Emotion, usize)> = Vec::new();
    for emotion in emotions {
        match counts.iter_mut().find(|(e, _)| *e == emotion) {
            Some((_, count)) => *count += 1,
            None => counts.push((emotion, 1)),
        }
    }

    let mut best: Option<(Emotion, usize)> = None;
    for (emotion, count) in counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((emotion, count));
        }
    }
    best.map(|(emotion, _)| emotion)
}

/// One point per UTC calendar date, ascending. Records are taken in the given order.
pub fn daily_trend(records: &[EmotionRecord]) -> Vec<TrendPoint> {
    let mut by_date: BTreeMap<NaiveDate, Vec<&EmotionRecord>> = BTreeMap::new();
    for record in records {
        by_date
            .entry(record.analyzed_at.date_naive())
            .or_default()
            .push(record);
    }

    by_date
        .into_iter()
        .filter_map(|(date, day)| {
            let dominant_emotion = mode(day.iter().map(|r| r.reading.overall_emotion))?;
            let total: f64 = day.iter().map(|r| r.reading.emotion_intensity).sum();
            Some(TrendPoint {
                date,
                dominant_emotion,
                average_intensity: round2(total / day.len() as f64),
                sample_count: day.len(),
            })
        })
        .collect()
}

/// Improvement between the newest and oldest ends of `scores` (newest first).
///
/// Both ends average up to ten scores, so with fewer than twenty scores the
/// two windows share entries.
pub fn improvement_rate(scores: &[f64]) -> f64 {
    let n = scores.len();
    if n < 2 {
        return 0.0;
    }

    let window = IMPROVEMENT_WINDOW.min(n);
    let recent_avg: f64 = scores[..window].iter().sum::<f64>() / window as f64;
    let older_avg: f64 = scores[n - window..].iter().sum::<f64>() / window as f64;

    if older_avg > 0.0 {
        (recent_avg - older_avg) / older_avg * 100.0
    } else {
        0.0
    }
}

/// Full improvement statistics for records ordered newest first.
pub fn improvement_stats(records: &[EmotionRecord]) -> Option<ImprovementStats> {
    if records.is_empty() {
        return None;
    }

    let scores: Vec<f64> = records.iter().map(weighted_score).collect();

    let mut emotion_frequency = BTreeMap::new();
    for record in records {
        *emotion_frequency
            .entry(record.reading.overall_emotion.as_str().to_string())
            .or_insert(0) += 1;
    }

    let total_intensity: f64 = records.iter().map(|r| r.reading.emotion_intensity).sum();

    Some(ImprovementStats {
        improvement_rate: round2(improvement_rate(&scores)),
        emotion_frequency,
        average_intensity: round2(total_intensity / records.len() as f64),
        total_analyses: records.len(),
        recent_score: scores[0],
    })
}

/// Reads stored analyses and aggregates them per user.
pub struct TrendAggregator {
    store: Arc<dyn EmotionStore>,
}

impl TrendAggregator {
    pub fn new(store: Arc<dyn EmotionStore>) -> Self {
        Self { store }
    }

    /// Daily trend over the last `window_days` days
    pub fn trend(&self, user_id: i64, window_days: u32) -> Result<TrendReport> {
        if window_days == 0 {
            return Err(AnalysisError::Validation("window must be at least one day".to_string()));
        }

        let since = Utc::now()
            .checked_sub_signed(Duration::days(i64::from(window_days)))
            .ok_or_else(|| AnalysisError::Validation(format!("window of {} days is out of range", window_days)))?;
        let records = self.store.records_since(user_id, since)?;
        let trend_data = daily_trend(&records);

        logging::log_stats(&format!(
            "Trend for user {}: {} records over {} days -> {} points",
            user_id, records.len(), window_days, trend_data.len()
        ));

        Ok(TrendReport {
            total_days: trend_data.len(),
            trend_data,
            period: format!("{} days", window_days),
        })
    }

    fn improvement_sample(&self, user_id: i64) -> Result<Vec<EmotionRecord>> {
        self.store.recent_confident_records(user_id, MIN_IMPROVEMENT_CONFIDENCE, IMPROVEMENT_SAMPLE_SIZE)
    }

    /// Improvement rate alone; 0 when there is not enough data.
    pub fn improvement_rate(&self, user_id: i64) -> Result<f64> {
        let records = self.improvement_sample(user_id)?;
        let scores: Vec<f64> = records.iter().map(weighted_score).collect();
        Ok(improvement_rate(&scores))
    }

    pub fn improvement_stats(&self, user_id: i64) -> Result<ImprovementStats> {
        let records = self.improvement_sample(user_id)?;
        let stats = improvement_stats(&records)
            .ok_or_else(|| AnalysisError::NotFound("no analysis data found".to_string()))?;

        logging::log_stats(&format!(
            "Improvement for user {}: {:.2}% over {} analyses",
            user_id, stats.improvement_rate, stats.total_analyses
        ));

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::emotion::{AnalysisSource, DiarySummary, EmotionDimensions, EmotionReading, NewEmotionRecord};
    use chrono::{DateTime, TimeZone};

    fn record(emotion: Emotion, intensity: f64, confidence: f64, at: DateTime<Utc>) -> EmotionRecord {
        EmotionRecord {
            id: 0,
            diary_id: 0,
            reading: EmotionReading {
                overall_emotion: emotion,
                emotion_intensity: intensity,
                emotion_dimensions: EmotionDimensions::default(),
                key_words: Vec::new(),
                confidence_score: confidence,
            },
            source: AnalysisSource::Fallback,
            analyzed_at: at,
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_same_day_mode() {
        let records = vec![
            record(Emotion::Sad, 0.6, 0.7, at(5, 8)),
            record(Emotion::Sad, 0.3, 0.7, at(5, 12)),
            record(Emotion::Happy, 0.9, 0.7, at(5, 20)),
        ];
        let trend = daily_trend(&records);
        assert_eq!(trend.len(), 1);
        assert_eq!(trend[0].dominant_emotion, Emotion::Sad);
        assert_eq!(trend[0].sample_count, 3);
        assert_eq!(trend[0].average_intensity, 0.6);
    }

    #[test]
    fn test_tie_goes_to_first_seen() {
        let records = vec![
            record(Emotion::Calm, 0.2, 0.7, at(6, 8)),
            record(Emotion::Angry, 0.4, 0.7, at(6, 9)),
            record(Emotion::Angry, 0.4, 0.7, at(6, 10)),
            record(Emotion::Calm, 0.2, 0.7, at(6, 11)),
        ];
        assert_eq!(daily_trend(&records)[0].dominant_emotion, Emotion::Calm);
    }

    #[test]
    fn test_points_sorted_by_date() {
        let records = vec![
            record(Emotion::Happy, 0.5, 0.7, at(9, 8)),
            record(Emotion::Sad, 0.5, 0.7, at(2, 8)),
            record(Emotion::Calm, 0.5, 0.7, at(4, 8)),
        ];
        let dates: Vec<u32> = daily_trend(&records)
            .iter()
            .map(|p| chrono::Datelike::day(&p.date))
            .collect();
        assert_eq!(dates, vec![2, 4, 9]);
        assert!(daily_trend(&[]).is_empty());
    }

    #[test]
    fn test_improvement_rate_needs_two_scores() {
        assert_eq!(improvement_rate(&[]), 0.0);
        assert_eq!(improvement_rate(&[0.8]), 0.0);
    }

    #[test]
    fn test_improvement_rate_overlapping_windows() {
        // n = 4: both windows cover all four scores, so the rate is 0
        assert_eq!(improvement_rate(&[0.9, 0.1, 0.5, 0.3]), 0.0);

        // n = 12: recent = first 10, older = last 10
        let mut scores = vec![1.0, 1.0];
        scores.extend(std::iter::repeat(0.5).take(8));
        scores.extend([0.2, 0.2]);
        let recent = (2.0 + 4.0) / 10.0;
        let older = (4.0 + 0.4) / 10.0;
        let expected = (recent - older) / older * 100.0;
        assert!((improvement_rate(&scores) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_improvement_rate_zero_older_average() {
        let mut scores = vec![0.8; 10];
        scores.extend([0.0; 10]);
        assert_eq!(improvement_rate(&scores), 0.0);
        assert_eq!(improvement_rate(&[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_improvement_stats_summary() {
        let records = vec![
            record(Emotion::Happy, 0.8, 0.9, at(10, 8)),
            record(Emotion::Sad, 0.4, 0.6, at(9, 8)),
            record(Emotion::Sad, 0.3, 0.8, at(8, 8)),
        ];
        let stats = improvement_stats(&records).unwrap();
        assert_eq!(stats.total_analyses, 3);
        assert_eq!(stats.emotion_frequency["sad"], 2);
        assert_eq!(stats.emotion_frequency["happy"], 1);
        assert_eq!(stats.average_intensity, 0.5);
        assert!((stats.recent_score - 0.9).abs() < 1e-9);
        assert!(improvement_stats(&[]).is_none());
    }

    #[test]
    fn test_aggregator_over_store() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let now = Utc::now();
        for (days_ago, emotion, confidence) in [
            (40, Emotion::Angry, 0.9),
            (2, Emotion::Sad, 0.6),
            (1, Emotion::Calm, 0.4),
            (0, Emotion::Happy, 0.8),
        ] {
            let diary = db.create_diary(7, "日记").unwrap();
            let new = NewEmotionRecord {
                diary_id: diary.id,
                reading: record(emotion, 0.5, confidence, now).reading,
                source: AnalysisSource::Fallback,
                analyzed_at: now - Duration::days(days_ago),
            };
            db.persist_analysis(&new, &DiarySummary::from(&new.reading)).unwrap();
        }

        let aggregator = TrendAggregator::new(db.clone());

        let report = aggregator.trend(7, 30).unwrap();
        assert_eq!(report.total_days, report.trend_data.len());
        assert_eq!(report.period, "30 days");
        let total: usize = report.trend_data.iter().map(|p| p.sample_count).sum();
        assert_eq!(total, 3);

        // confidence > 0.5 only: happy (newest), sad, angry
        let stats = aggregator.improvement_stats(7).unwrap();
        assert_eq!(stats.total_analyses, 3);
        assert!(!stats.emotion_frequency.contains_key("calm"));

        assert!(matches!(aggregator.improvement_stats(8), Err(AnalysisError::NotFound(_))));
        assert_eq!(aggregator.improvement_rate(8).unwrap(), 0.0);
        assert!(matches!(aggregator.trend(7, 0), Err(AnalysisError::Validation(_))));
        assert!(matches!(aggregator.trend(7, u32::MAX), Err(AnalysisError::Validation(_))));
        assert_eq!(aggregator.trend(7, 36_500).unwrap().trend_data.len(), report.trend_data.len() + 1);
    }
}
