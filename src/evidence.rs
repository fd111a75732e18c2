//! Evidence gate: is there enough in the answers to recommend from?
//!
//! Advisory unless `require_pass` is set. The report always carries the
//! localized follow-up questions for the topics nobody touched.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::answers::{AnswerValue, Answers, Lang};
use crate::text;

/// Answer keys that carry metadata rather than an answer.
const IGNORED_KEYS: &[&str] = &["profile"];

/// Topic order is the order missing topics and follow-ups are reported in.
const TOPICS: &[(&str, &[&str])] = &[
    (
        "goal",
        &[
            "هدف", "نتيجه", "اخسر", "انقاص", "وزن", "كتله", "قوه", "لياقه", "stamina", "endurance", "goal", "fat",
            "muscle", "strength", "lose", "gain", "tone",
        ],
    ),
    (
        "mode",
        &[
            "فردي", "جماعي", "فريق", "شريك", "solo", "team", "co-op", "vr", "واقع افتراضي", "تكتيك", "stealth",
            "تخفي", "adrenaline", "calm",
        ],
    ),
    (
        "intensity",
        &[
            "هدوء", "تنفس", "سريع", "اندفاع", "ايقاع", "توتر", "استرخاء", "adrenaline", "calm", "tempo", "pace",
            "breath",
        ],
    ),
    (
        "history",
        &["سابق", "جربت", "خبره", "ماضي", "قبل", "played", "tried", "experience", "history", "background"],
    ),
    (
        "health",
        &[
            "اصابه", "مشكله", "ركبه", "ظهر", "كتف", "الم", "حساسيه", "ضغط", "سكر", "injury", "hurt", "pain",
            "condition",
        ],
    ),
    (
        "constraints",
        &["وقت", "التزام", "مشغول", "دراسه", "عمل", "schedule", "busy", "time", "constraint"],
    ),
    (
        "environment",
        &["خارجي", "داخلي", "بيت", "نادي", "طبيعه", "outdoor", "indoor", "nature", "facility"],
    ),
    (
        "skill_pref",
        &[
            "دقه", "تصويب", "توازن", "قبضه", "لغز", "خداع", "precision", "aim", "balance", "grip", "puzzle", "feint",
        ],
    ),
];

fn follow_up(topic: &str, lang: Lang) -> Option<&'static str> {
    let q = match (topic, lang) {
        ("goal", Lang::En) => "What's your nearest goal? (strength/cardio/fat-loss/balance...)",
        ("goal", Lang::Ar) => "وش هدفك الأقرب الآن؟ (قوة/لياقة/نزول وزن/توازن...)",
        ("mode", Lang::En) => "Do you prefer solo or team? Open to VR?",
        ("mode", Lang::Ar) => "تميل لفردي ولا جماعي؟ وهل ودك VR؟",
        ("intensity", Lang::En) => "Do you like calm focus or adrenaline bursts?",
        ("intensity", Lang::Ar) => "تفضّل هدوء وتركيز ولا اندفاع وأدرينالين؟",
        ("history", Lang::En) => "What activities have you tried before that felt good?",
        ("history", Lang::Ar) => "وش الأشياء اللي جربتها قبل وحسّيتها تناسبك؟",
        ("health", Lang::En) => "Any injuries or conditions to consider?",
        ("health", Lang::Ar) => "في إصابة/حساسية لازم نراعيها؟",
        ("constraints", Lang::En) => "Any general time constraints or commitments?",
        ("constraints", Lang::Ar) => "هل عندك قيود عامة في الوقت أو التزامات؟ (بشكل عام)",
        ("environment", Lang::En) => "Do you prefer quiet indoor vibes or open outdoor?",
        ("environment", Lang::Ar) => "تحب أجواء داخلية هادئة ولا خارجية مفتوحة؟",
        ("skill_pref", Lang::En) => "Do you enjoy precision/puzzles/stealth/balance? Which most?",
        ("skill_pref", Lang::Ar) => "تميل للدقة/الألغاز/التخفّي/التوازن؟ وش أكثر شي يجذبك؟",
        _ => return None,
    };
    Some(q)
}

// =============================================================================
// CONFIG
// =============================================================================

fn default_min_answers() -> usize {
    4
}

fn default_min_topics() -> usize {
    3
}

fn default_min_chars_per_answer() -> usize {
    18
}

fn default_pass_score() -> f64 {
    0.65
}

fn default_borderline_score() -> f64 {
    0.45
}

fn default_followup_batch() -> usize {
    3
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceConfig {
    #[serde(default = "default_min_answers")]
    pub min_answers: usize,
    #[serde(default = "default_min_topics")]
    pub min_topics: usize,
    #[serde(default = "default_min_chars_per_answer")]
    pub min_chars_per_answer: usize,
    #[serde(default = "default_pass_score")]
    pub pass_score: f64,
    #[serde(default = "default_borderline_score")]
    pub borderline_score: f64,
    #[serde(default = "default_followup_batch")]
    pub followup_batch: usize,
    /// When set, a `fail` stops the request with follow-up questions.
    #[serde(default)]
    pub require_pass: bool,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            min_answers: default_min_answers(),
            min_topics: default_min_topics(),
            min_chars_per_answer: default_min_chars_per_answer(),
            pass_score: default_pass_score(),
            borderline_score: default_borderline_score(),
            followup_batch: default_followup_batch(),
            require_pass: false,
        }
    }
}

// =============================================================================
// REPORT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceStatus {
    Pass,
    Borderline,
    Fail,
}

impl EvidenceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EvidenceStatus::Pass => "pass",
            EvidenceStatus::Borderline => "borderline",
            EvidenceStatus::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceReport {
    pub status: EvidenceStatus,
    /// Weighted score in [0, 1], rounded to three places.
    pub score: f64,
    pub answered_count: usize,
    pub topics: BTreeMap<String, bool>,
    pub missing_topics: Vec<String>,
    pub follow_up_questions: Vec<String>,
}

impl EvidenceReport {
    pub fn is_fail(&self) -> bool {
        self.status == EvidenceStatus::Fail
    }
}

fn token_count(raw: &str) -> usize {
    text::words(raw).len()
}

fn is_significant(raw: &str, min_chars: usize) -> bool {
    text::fold(raw).chars().count() >= min_chars || token_count(raw) >= (min_chars / 6).max(5)
}

fn topics_in(raw: &str) -> BTreeSet<&'static str> {
    let folded = text::fold(raw);
    TOPICS
        .iter()
        .filter(|(_, words)| words.iter().any(|w| folded.contains(w)))
        .map(|(topic, _)| *topic)
        .collect()
}

fn median(values: &mut [usize]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) as f64 / 2.0
    } else {
        values[mid] as f64
    }
}

/// Score the answers and pick follow-ups for uncovered topics.
pub fn assess(answers: &Answers, lang: Lang, cfg: &EvidenceConfig) -> EvidenceReport {
    let significant: Vec<String> = answers
        .iter()
        .filter(|(key, _)| !IGNORED_KEYS.contains(&key.as_str()))
        .map(|(_, value)| AnswerValue::as_text(value))
        .filter(|a| is_significant(a, cfg.min_chars_per_answer))
        .collect();

    let mut hit: BTreeSet<&'static str> = BTreeSet::new();
    let mut unique: BTreeSet<String> = BTreeSet::new();
    let mut lengths: Vec<usize> = Vec::with_capacity(significant.len());
    for answer in &significant {
        hit.extend(topics_in(answer));
        let words = text::words(answer);
        lengths.push(words.len());
        unique.extend(words);
    }

    let total_tokens: usize = lengths.iter().sum();
    let unique_ratio = (unique.len() as f64 / total_tokens.max(1) as f64).min(1.0);
    let median_tokens = median(&mut lengths);

    let answered_score = (significant.len() as f64 / cfg.min_answers.max(1) as f64).min(1.0);
    let topics_score = (hit.len() as f64 / cfg.min_topics.max(1) as f64).min(1.0);
    let quality_score = (median_tokens / 10.0).min(1.0);
    let score = 0.35 * answered_score + 0.35 * topics_score + 0.20 * quality_score + 0.10 * unique_ratio;

    let status = if significant.is_empty() || significant.len() < (cfg.min_answers / 2).max(2) {
        EvidenceStatus::Fail
    } else if score >= cfg.pass_score {
        EvidenceStatus::Pass
    } else if score >= cfg.borderline_score {
        EvidenceStatus::Borderline
    } else {
        EvidenceStatus::Fail
    };

    let missing_topics: Vec<String> = TOPICS
        .iter()
        .map(|(t, _)| *t)
        .filter(|t| !hit.contains(t))
        .map(str::to_string)
        .collect();
    let follow_up_questions = missing_topics
        .iter()
        .filter_map(|t| follow_up(t, lang))
        .take(cfg.followup_batch)
        .map(str::to_string)
        .collect();

    EvidenceReport {
        status,
        score: (score * 1000.0).round() / 1000.0,
        answered_count: significant.len(),
        topics: TOPICS
            .iter()
            .map(|(t, _)| (t.to_string(), hit.contains(t)))
            .collect(),
        missing_topics,
        follow_up_questions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answers(pairs: &[(&str, &str)]) -> Answers {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), AnswerValue::text(*v)))
            .collect()
    }

    #[test]
    fn test_empty_answers_fail_with_three_follow_ups() {
        let report = assess(&Answers::new(), Lang::En, &EvidenceConfig::default());
        assert_eq!(report.status, EvidenceStatus::Fail);
        assert_eq!(report.answered_count, 0);
        assert_eq!(report.missing_topics.len(), 8);
        assert_eq!(
            report.follow_up_questions,
            vec![
                "What's your nearest goal? (strength/cardio/fat-loss/balance...)",
                "Do you prefer solo or team? Open to VR?",
                "Do you like calm focus or adrenaline bursts?",
            ]
        );
    }

    #[test]
    fn test_rich_answers_pass() {
        let report = assess(
            &answers(&[
                ("q1", "My goal is to build strength and lose some fat over the coming months"),
                ("q2", "I prefer solo sessions where I can stay calm and control my breath"),
                ("q3", "I tried running before and the steady pace felt really good to me"),
                ("q4", "I enjoy precision and balance, anything that needs a careful aim"),
            ]),
            Lang::En,
            &EvidenceConfig::default(),
        );
        assert_eq!(report.status, EvidenceStatus::Pass, "{report:?}");
        assert_eq!(report.answered_count, 4);
        assert!(report.topics["goal"]);
        assert!(report.topics["skill_pref"]);
        assert!(report.missing_topics.contains(&"health".to_string()));
    }

    #[test]
    fn test_single_answer_fails_regardless_of_score() {
        let report = assess(
            &answers(&[("q1", "goal strength team calm tried injury time outdoor precision")]),
            Lang::En,
            &EvidenceConfig::default(),
        );
        assert_eq!(report.status, EvidenceStatus::Fail);
    }

    #[test]
    fn test_arabic_follow_ups_and_folded_topics() {
        let report = assess(
            &answers(&[("q1", "هدفي أزيد لياقتي وقوتي بشكل واضح")]),
            Lang::Ar,
            &EvidenceConfig::default(),
        );
        assert!(report.topics["goal"]);
        assert_eq!(report.follow_up_questions[0], "تميل لفردي ولا جماعي؟ وهل ودك VR؟");
    }

    #[test]
    fn test_profile_key_is_ignored() {
        let report = assess(
            &answers(&[("profile", "a very long metadata string that should not count at all")]),
            Lang::En,
            &EvidenceConfig::default(),
        );
        assert_eq!(report.answered_count, 0);
    }
}
