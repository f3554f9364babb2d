use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of key words kept on a reading
pub const MAX_KEY_WORDS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Anxious,
    Calm,
    Neutral,
}

impl Emotion {
    pub const ALL: [Emotion; 6] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Anxious,
        Emotion::Calm,
        Emotion::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Anxious => "anxious",
            Emotion::Calm => "calm",
            Emotion::Neutral => "neutral",
        }
    }

    pub fn from_str(s: &str) -> Option<Emotion> {
        match s.trim().to_lowercase().as_str() {
            "happy" => Some(Emotion::Happy),
            "sad" => Some(Emotion::Sad),
            "angry" => Some(Emotion::Angry),
            "anxious" => Some(Emotion::Anxious),
            "calm" => Some(Emotion::Calm),
            "neutral" => Some(Emotion::Neutral),
            _ => None,
        }
    }
}

/// Dimensional affect: valence in [-1, 1], arousal and dominance in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionDimensions {
    pub valence: f64,
    pub arousal: f64,
    pub dominance: f64,
}

impl Default for EmotionDimensions {
    fn default() -> Self {
        Self {
            valence: 0.0,
            arousal: 0.5,
            dominance: 0.5,
        }
    }
}

impl EmotionDimensions {
    fn clamped(self) -> Self {
        Self {
            valence: clamp_finite(self.valence, -1.0, 1.0, 0.0),
            arousal: clamp_finite(self.arousal, 0.0, 1.0, 0.5),
            dominance: clamp_finite(self.dominance, 0.0, 1.0, 0.5),
        }
    }
}

/// Normalized output of any classification path (provider or local).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionReading {
    pub overall_emotion: Emotion,
    pub emotion_intensity: f64,
    pub emotion_dimensions: EmotionDimensions,
    pub key_words: Vec<String>,
    pub confidence_score: f64,
}

impl EmotionReading {
    /// Force every field into its canonical range.
    ///
    /// Key words are deduplicated (first occurrence wins) and capped at
    /// [`MAX_KEY_WORDS`]. Non-finite numbers fall back to the neutral defaults.
    pub fn normalized(self) -> Self {
        let mut key_words: Vec<String> = Vec::with_capacity(self.key_words.len());
        for word in self.key_words {
            let word = word.trim().to_string();
            if !word.is_empty() && !key_words.contains(&word) {
                key_words.push(word);
            }
        }
        key_words.truncate(MAX_KEY_WORDS);

        Self {
            overall_emotion: self.overall_emotion,
            emotion_intensity: clamp_finite(self.emotion_intensity, 0.0, 1.0, 0.5),
            emotion_dimensions: self.emotion_dimensions.clamped(),
            key_words,
            confidence_score: clamp_finite(self.confidence_score, 0.0, 1.0, 0.5),
        }
    }
}

fn clamp_finite(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

/// Where a stored analysis came from. Audit only, never read by classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisSource {
    #[serde(rename = "coze")]
    Coze,
    #[serde(rename = "qwen")]
    Qwen,
    #[serde(rename = "fallback")]
    Fallback,
    #[serde(rename = "batch_analysis")]
    Batch,
}

impl AnalysisSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisSource::Coze => "coze",
            AnalysisSource::Qwen => "qwen",
            AnalysisSource::Fallback => "fallback",
            AnalysisSource::Batch => "batch_analysis",
        }
    }

    pub fn from_str(s: &str) -> Option<AnalysisSource> {
        match s {
            "coze" => Some(AnalysisSource::Coze),
            "qwen" => Some(AnalysisSource::Qwen),
            "fallback" => Some(AnalysisSource::Fallback),
            "batch_analysis" => Some(AnalysisSource::Batch),
            _ => None,
        }
    }
}

/// Canonical persisted analysis of one diary entry. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionRecord {
    pub id: i64,
    pub diary_id: i64,
    #[serde(flatten)]
    pub reading: EmotionReading,
    #[serde(rename = "ai_model_version")]
    pub source: AnalysisSource,
    pub analyzed_at: DateTime<Utc>,
}

/// Record not yet written to storage
#[derive(Debug, Clone, PartialEq)]
pub struct NewEmotionRecord {
    pub diary_id: i64,
    pub reading: EmotionReading,
    pub source: AnalysisSource,
    pub analyzed_at: DateTime<Utc>,
}

/// Snapshot denormalized onto the diary row for quick display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiarySummary {
    pub overall_emotion: Emotion,
    pub emotion_intensity: f64,
    pub confidence_score: f64,
}

impl From<&EmotionReading> for DiarySummary {
    fn from(reading: &EmotionReading) -> Self {
        Self {
            overall_emotion: reading.overall_emotion,
            emotion_intensity: reading.emotion_intensity,
            confidence_score: reading.confidence_score,
        }
    }
}
