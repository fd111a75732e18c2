//! Four-dichotomy type scorer.

use std::collections::BTreeMap;

use serde_json::json;

use super::{ScorerError, SystemProfile, SystemScorer};
use crate::answers::{answers_blob, Answers, Lang};
use crate::text;

struct Dichotomy {
    first: char,
    second: char,
    first_keywords: &'static [&'static str],
    second_keywords: &'static [&'static str],
    /// Letter used when both sides score the same.
    tie: char,
}

const DICHOTOMIES: [Dichotomy; 4] = [
    Dichotomy {
        first: 'E',
        second: 'I',
        first_keywords: &["social", "outgoing", "people", "talk", "party", "اجتماعي", "ناس", "سوالف"],
        second_keywords: &["quiet", "alone", "solo", "introvert", "reflect", "هادي", "لوحدي", "انطوائي"],
        tie: 'I',
    },
    Dichotomy {
        first: 'S',
        second: 'N',
        first_keywords: &["practical", "concrete", "detail", "hands-on", "realistic", "عملي", "واقعي", "تفاصيل"],
        second_keywords: &["imagin", "idea", "future", "pattern", "possib", "خيال", "فكره", "مستقبل"],
        tie: 'N',
    },
    Dichotomy {
        first: 'T',
        second: 'F',
        first_keywords: &["logic", "analy", "strategy", "objective", "reason", "منطق", "تحليل", "استراتيج"],
        second_keywords: &["feel", "emotion", "harmony", "values", "empath", "احساس", "مشاعر", "عاطف"],
        tie: 'T',
    },
    Dichotomy {
        first: 'J',
        second: 'P',
        first_keywords: &["plan", "organized", "structure", "schedule", "routine", "خطه", "منظم", "روتين"],
        second_keywords: &["spontaneous", "flexible", "improvis", "adapt", "عفوي", "مرن", "ارتجال"],
        tie: 'J',
    },
];

fn type_suggestions(code: &str) -> &'static [&'static str] {
    match code {
        "INTJ" => &["chess", "archery", "swimming", "cycling"],
        "INTP" => &["chess", "climbing", "cycling", "archery"],
        "ENTJ" => &["tennis", "martial_arts", "rowing", "basketball"],
        "ENTP" => &["climbing", "parkour", "tennis", "surfing"],
        "INFJ" => &["yoga", "hiking", "swimming", "tai_chi"],
        "INFP" => &["yoga", "dance", "hiking", "walking"],
        "ENFJ" => &["dance", "football", "rowing", "basketball"],
        "ENFP" => &["dance", "surfing", "climbing", "parkour"],
        "ISTJ" => &["archery", "golf", "swimming", "rowing"],
        "ISFJ" => &["yoga", "walking", "swimming", "pilates"],
        "ESTJ" => &["football", "running", "tennis", "rowing"],
        "ESFJ" => &["dance", "basketball", "football", "walking"],
        "ISTP" => &["climbing", "martial_arts", "archery", "cycling"],
        "ISFP" => &["surfing", "yoga", "dance", "hiking"],
        "ESTP" => &["boxing", "parkour", "basketball", "surfing"],
        "ESFP" => &["dance", "football", "surfing", "basketball"],
        _ => &[],
    }
}

fn count_hits(folded: &str, keywords: &[&str]) -> usize {
    keywords
        .iter()
        .filter(|k| text::contains_phrase(folded, k))
        .count()
}

#[derive(Debug, Clone)]
pub struct MbtiScorer {
    confidence: f64,
}

impl Default for MbtiScorer {
    fn default() -> Self {
        Self { confidence: 0.70 }
    }
}

impl SystemScorer for MbtiScorer {
    fn name(&self) -> &str {
        "mbti"
    }

    fn score(&self, answers: &Answers, _lang: Lang) -> Result<SystemProfile, ScorerError> {
        let blob = text::fold(&answers_blob(answers));

        let mut code = String::with_capacity(4);
        let mut total_hits = 0;
        let mut letters = BTreeMap::new();
        for d in &DICHOTOMIES {
            let a = count_hits(&blob, d.first_keywords);
            let b = count_hits(&blob, d.second_keywords);
            total_hits += a + b;
            let letter = match a.cmp(&b) {
                std::cmp::Ordering::Greater => d.first,
                std::cmp::Ordering::Less => d.second,
                std::cmp::Ordering::Equal => d.tie,
            };
            letters.insert(format!("{}{}", d.first, d.second), json!({ "first": a, "second": b }));
            code.push(letter);
        }
        if total_hits == 0 {
            return Err(ScorerError::no_signal("mbti"));
        }

        let suggestions = type_suggestions(&code);
        if suggestions.is_empty() {
            return Err(ScorerError::Failed {
                system: "mbti".to_string(),
                message: format!("no suggestion table for {code}"),
            });
        }

        let mut profile = BTreeMap::new();
        profile.insert("type".to_string(), json!(code));
        profile.insert("dichotomies".to_string(), json!(letters));

        let key_traits = code
            .chars()
            .map(|c| match c {
                'E' => "extraverted",
                'I' => "introverted",
                'S' => "sensing",
                'N' => "intuitive",
                'T' => "thinking",
                'F' => "feeling",
                'J' => "judging",
                _ => "perceiving",
            })
            .map(str::to_string)
            .collect();

        Ok(SystemProfile {
            system_name: "mbti".to_string(),
            profile,
            confidence: self.confidence,
            key_traits,
            candidate_suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
        })
    }
}
