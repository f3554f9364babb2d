//! Emotion → game configuration mapping
//!
//! Pure lookup tables; nothing here is persisted. The mapping is recomputed
//! whenever a caller asks for it.

use crate::emotion::{Emotion, EmotionReading};
use serde::{Deserialize, Serialize};

const DEFAULT_SCENARIO: &str = "神秘岛屿";
const DEFAULT_CHALLENGE: &str = "基础认知训练";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CharacterEffects {
    pub speed: f64,
    pub strength: f64,
    pub intelligence: f64,
}

impl Default for CharacterEffects {
    fn default() -> Self {
        Self {
            speed: 1.0,
            strength: 1.0,
            intelligence: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameMapping {
    pub difficulty_modifier: f64,
    pub character_effects: CharacterEffects,
    pub scenario_recommendations: Vec<String>,
    pub cbt_challenges: Vec<String>,
}

/// Base game difficulty per emotion, scaled by intensity in [`map_emotion`]
pub fn base_difficulty(emotion: Emotion) -> f64 {
    match emotion {
        Emotion::Happy => 0.7,
        Emotion::Sad => 1.2,
        Emotion::Angry => 1.4,
        Emotion::Anxious => 1.3,
        Emotion::Calm => 0.8,
        Emotion::Neutral => 1.0,
    }
}

pub fn character_effects(emotion: Emotion) -> CharacterEffects {
    let base = CharacterEffects::default();
    match emotion {
        Emotion::Sad => CharacterEffects { speed: 0.8, strength: 0.9, ..base },
        Emotion::Angry => CharacterEffects { strength: 1.2, intelligence: 0.9, ..base },
        Emotion::Anxious => CharacterEffects { speed: 1.1, intelligence: 0.8, ..base },
        Emotion::Happy => CharacterEffects { speed: 1.1, intelligence: 1.1, ..base },
        Emotion::Calm | Emotion::Neutral => base,
    }
}

pub fn scenario_recommendations(emotion: Emotion) -> Vec<String> {
    let scenarios: &[&str] = match emotion {
        Emotion::Happy => &["阳光草原", "彩虹山谷", "欢乐城堡"],
        Emotion::Sad => &["宁静湖泊", "月光森林", "温暖小屋"],
        Emotion::Angry => &["平静海岸", "禅意花园", "冥想空间"],
        Emotion::Anxious => &["轻松海滩", "舒缓温泉", "安静图书馆"],
        Emotion::Calm => &["禅意庭院", "平静湖面", "和谐花园"],
        Emotion::Neutral => &[DEFAULT_SCENARIO],
    };
    scenarios.iter().map(|s| s.to_string()).collect()
}

pub fn cbt_challenges(emotion: Emotion) -> Vec<String> {
    let challenges: &[&str] = match emotion {
        Emotion::Sad => &["识别负面思维模式", "寻找积极证据", "重构消极想法", "练习感恩日记"],
        Emotion::Angry => &["情绪识别练习", "愤怒管理技巧", "换位思考练习", "放松训练"],
        Emotion::Anxious => &["焦虑源识别", "现实性检验", "应对策略制定", "正念练习"],
        Emotion::Happy => &["维持积极状态", "分享快乐经验", "建立健康习惯", "目标设定"],
        Emotion::Calm => &["保持内心平静", "深度思考练习", "自我反思", "持续成长"],
        Emotion::Neutral => &[DEFAULT_CHALLENGE],
    };
    challenges.iter().map(|s| s.to_string()).collect()
}

/// Map an emotion and its intensity onto the game configuration space.
pub fn map_emotion(emotion: Emotion, intensity: f64) -> GameMapping {
    GameMapping {
        difficulty_modifier: base_difficulty(emotion) * (0.8 + intensity * 0.4),
        character_effects: character_effects(emotion),
        scenario_recommendations: scenario_recommendations(emotion),
        cbt_challenges: cbt_challenges(emotion),
    }
}

/// Game configuration for an analysis reading
pub fn map_reading(reading: &EmotionReading) -> GameMapping {
    map_emotion(reading.overall_emotion, reading.emotion_intensity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::EmotionDimensions;

    fn reading(emotion: Emotion, intensity: f64) -> EmotionReading {
        EmotionReading {
            overall_emotion: emotion,
            emotion_intensity: intensity,
            emotion_dimensions: EmotionDimensions::default(),
            key_words: Vec::new(),
            confidence_score: 0.8,
        }
    }

    #[test]
    fn test_angry_mapping() {
        let mapping = map_reading(&reading(Emotion::Angry, 0.5));
        assert!((mapping.difficulty_modifier - 1.4).abs() < 1e-9);
        assert_eq!(mapping.character_effects.strength, 1.2);
        assert_eq!(mapping.character_effects.intelligence, 0.9);
        assert_eq!(mapping.character_effects.speed, 1.0);
        assert_eq!(mapping.scenario_recommendations.len(), 3);
        assert_eq!(mapping.cbt_challenges.len(), 4);
    }

    #[test]
    fn test_difficulty_scales_with_intensity() {
        let low = map_emotion(Emotion::Sad, 0.0);
        let high = map_emotion(Emotion::Sad, 1.0);
        assert!((low.difficulty_modifier - 1.2 * 0.8).abs() < 1e-9);
        assert!((high.difficulty_modifier - 1.2 * 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_mapping_is_pure_for_every_emotion() {
        for emotion in Emotion::ALL {
            let input = reading(emotion, 0.6);
            let first = serde_json::to_string(&map_reading(&input)).unwrap();
            let second = serde_json::to_string(&map_reading(&input)).unwrap();
            assert_eq!(first, second, "{:?}", emotion);

            let expected = base_difficulty(emotion) * (0.8 + 0.6 * 0.4);
            assert!((map_reading(&input).difficulty_modifier - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_character_effect_overrides() {
        assert_eq!(
            character_effects(Emotion::Sad),
            CharacterEffects { speed: 0.8, strength: 0.9, intelligence: 1.0 }
        );
        assert_eq!(
            character_effects(Emotion::Anxious),
            CharacterEffects { speed: 1.1, strength: 1.0, intelligence: 0.8 }
        );
        assert_eq!(
            character_effects(Emotion::Happy),
            CharacterEffects { speed: 1.1, strength: 1.0, intelligence: 1.1 }
        );
        assert_eq!(character_effects(Emotion::Calm), CharacterEffects::default());
        assert_eq!(character_effects(Emotion::Neutral), CharacterEffects::default());
    }

    #[test]
    fn test_neutral_gets_single_defaults() {
        let mapping = map_emotion(Emotion::Neutral, 0.5);
        assert_eq!(mapping.scenario_recommendations, vec![DEFAULT_SCENARIO]);
        assert_eq!(mapping.cbt_challenges, vec![DEFAULT_CHALLENGE]);
        assert!((mapping.difficulty_modifier - 1.0).abs() < 1e-9);
    }
}
