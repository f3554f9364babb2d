//! Keyword emotion classifier
//!
//! Terminal fallback of the analysis chain: a fixed keyword table scanned
//! over the diary text. It never fails, so the orchestrator can always
//! produce a record even when every provider is down. Provider adapters
//! reuse the same scan over reply text they cannot decode.

use crate::emotion::{Emotion, EmotionDimensions, EmotionReading, MAX_KEY_WORDS};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Keyword table. Order doubles as the tie-break priority:
/// happy > sad > angry > anxious > calm.
const EMOTION_KEYWORDS: &[(Emotion, &[&str])] = &[
    (Emotion::Happy, &["开心", "快乐", "高兴", "愉快", "满足", "幸福"]),
    (Emotion::Sad, &["难过", "悲伤", "沮丧", "失落", "痛苦", "伤心"]),
    (Emotion::Angry, &["生气", "愤怒", "恼火", "气愤", "暴躁"]),
    (Emotion::Anxious, &["焦虑", "担心", "紧张", "不安", "恐惧", "害怕"]),
    (Emotion::Calm, &["平静", "宁静", "安详", "放松", "舒适", "安心"]),
];

/// Function words dropped from key word extraction
const STOP_WORDS: &[&str] = &[
    "的", "了", "在", "是", "我", "有", "和", "就", "不", "人", "都", "一", "一个", "上", "也",
    "很", "到", "说", "要", "去", "你", "会", "着", "没有", "看", "好", "自己", "这",
];

/// Contiguous runs of CJK unified ideographs
static WORD_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{4E00}-\x{9FFF}]+").expect("word-run pattern is valid"));

#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordEmotionClassifier;

impl KeywordEmotionClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify raw text. Total: any input yields a structurally valid reading.
    pub fn classify(&self, text: &str) -> EmotionReading {
        let (emotion, max_score) = dominant_emotion(text);
        let max_score = max_score as f64;

        EmotionReading {
            overall_emotion: emotion,
            emotion_intensity: (max_score * 0.3).min(0.9),
            // Dimensional affect is not estimated by the keyword scan
            emotion_dimensions: EmotionDimensions::default(),
            key_words: extract_keywords(text),
            confidence_score: (max_score * 0.2 + 0.3).min(0.9),
        }
    }
}

/// Per-emotion keyword hit counts, in priority order.
pub fn score_emotions(text: &str) -> Vec<(Emotion, usize)> {
    EMOTION_KEYWORDS
        .iter()
        .map(|(emotion, keywords)| {
            let score = keywords
                .iter()
                .map(|keyword| count_overlapping(text, keyword))
                .sum();
            (*emotion, score)
        })
        .collect()
}

/// Highest-scoring emotion and its score; `Neutral` when nothing matched.
fn dominant_emotion(text: &str) -> (Emotion, usize) {
    let mut best = (Emotion::Neutral, 0);
    for (emotion, score) in score_emotions(text) {
        // Strictly greater keeps the earlier (higher priority) emotion on ties
        if score > best.1 {
            best = (emotion, score);
        }
    }
    best
}

fn count_overlapping(text: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    text.char_indices()
        .filter(|(i, _)| text[*i..].starts_with(needle))
        .count()
}

/// Most frequent word runs of two or more characters, minus stop words.
///
/// Ties keep first-seen order. At most [`MAX_KEY_WORDS`] are returned.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for run in WORD_RUN.find_iter(text) {
        let word = run.as_str();
        if word.chars().count() < 2 || STOP_WORDS.contains(&word) {
            continue;
        }
        let count = counts.entry(word).or_insert(0);
        if *count == 0 {
            order.push(word);
        }
        *count += 1;
    }

    // Stable sort: equal counts stay in first-seen order
    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    order
        .into_iter()
        .take(MAX_KEY_WORDS)
        .map(str::to_string)
        .collect()
}
