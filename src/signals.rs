//! Trait signal extraction from answer text.
//!
//! Extraction is total: any input, including empty or malformed answers,
//! yields one [`TraitSignal`] per known trait. A trait with no matching trigger
//! phrase simply has strength zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::answers::{answers_blob, AnswerValue, Answers, Questionnaire};
use crate::text;

/// Maximum multiplicative boost awarded to long, explicit answers.
pub const SPECIFICITY_BOOST: f64 = 0.2;
/// Token count at which the specificity boost saturates.
pub const SPECIFICITY_SATURATION_TOKENS: f64 = 40.0;
/// Strength credited to a trait by a question-polarity cue.
pub const POLARITY_STRENGTH: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitSignal {
    pub name: String,
    pub strength: f64,
}

impl TraitSignal {
    pub fn new(name: impl Into<String>, strength: f64) -> Self {
        Self {
            name: name.into(),
            strength: strength.clamp(0.0, 1.0),
        }
    }
}

/// Signals for a whole request plus the questions that matched nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalSet {
    pub signals: Vec<TraitSignal>,
    /// Questions with no matching trait (zero signal, not an error).
    pub misses: Vec<String>,
}

impl SignalSet {
    pub fn strength(&self, name: &str) -> f64 {
        self.signals
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.strength)
            .unwrap_or(0.0)
    }

    /// Signals above `threshold`, strongest first, ties by name.
    pub fn active(&self, threshold: f64) -> Vec<&TraitSignal> {
        let mut out: Vec<&TraitSignal> = self
            .signals
            .iter()
            .filter(|s| s.strength > threshold)
            .collect();
        out.sort_by(|a, b| b.strength.total_cmp(&a.strength).then_with(|| a.name.cmp(&b.name)));
        out
    }

    pub fn as_map(&self) -> BTreeMap<String, f64> {
        self.signals
            .iter()
            .map(|s| (s.name.clone(), s.strength))
            .collect()
    }
}

// =============================================================================
// TRIGGER TABLE
// =============================================================================

/// Bilingual trigger phrases for one trait.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEntry {
    pub label: String,
    #[serde(default)]
    pub en: Vec<String>,
    #[serde(default)]
    pub ar: Vec<String>,
}

impl TriggerEntry {
    fn new(label: &str, en: &[&str], ar: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            en: en.iter().map(|s| s.to_string()).collect(),
            ar: ar.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerTable {
    pub entries: Vec<TriggerEntry>,
}

impl Default for TriggerTable {
    fn default() -> Self {
        let e = TriggerEntry::new;
        Self {
            entries: vec![
                e(
                    "introvert",
                    &["introvert", "quiet", "alone", "solo", "by myself"],
                    &["انطوائي", "هادي", "احب لوحدي", "فردي", "مااحب الزحمه", "قليل كلام"],
                ),
                e(
                    "extrovert",
                    &["extrovert", "social", "team", "group", "crowd"],
                    &["اجتماعي", "احب الفريق", "احب الناس", "زحمه", "اختلاط", "تجمع"],
                ),
                e(
                    "precision",
                    &["precision", "aim", "mark", "accurate", "steady"],
                    &["دقه", "تصويب", "نشان", "محكم", "ضبط", "متقن"],
                ),
                e(
                    "sustained_attention",
                    &["deep focus", "long focus", "patience", "think long", "focus"],
                    &["تركيز طويل", "صبر", "تفكير عميق", "جلوس طويل", "تركيز"],
                ),
                e(
                    "sensation_seeking",
                    &["adrenaline", "thrill", "risk", "fast", "jump", "speed"],
                    &["مغامره", "ادرينالين", "سرعه", "خطر", "قفز", "قويه"],
                ),
                e(
                    "calm_regulation",
                    &["calm", "breath", "breathing", "relax", "peace"],
                    &["هدوء", "تنفس", "صفاء", "استرخاء", "تنظيم نفس"],
                ),
                e(
                    "tactical_mindset",
                    &["tactic", "strategic", "strategy", "ambush", "plan"],
                    &["تكتيك", "خطه", "كمين", "خدع", "استراتيجي"],
                ),
                e(
                    "likes_puzzles",
                    &["puzzle", "riddle", "feint", "trick"],
                    &["لغز", "الغاز", "خدعه بصريه", "احاجي"],
                ),
                e(
                    "prefers_solo",
                    &["solo", "alone", "individual", "on my own"],
                    &["فردي", "لوحدي", "بدون فريق"],
                ),
                e(
                    "prefers_team",
                    &["team", "group", "co-op", "squad", "together"],
                    &["فريق", "جماعي", "مع ناس"],
                ),
                e(
                    "anxious",
                    &["anxious", "anxiety", "fear", "phobia", "tense", "nervous"],
                    &["قلق", "خائف", "رهبه", "فوبيا", "توتر عالي"],
                ),
                e(
                    "low_repetition_tolerance",
                    &["bored quickly", "hate repetition", "monotony", "boring"],
                    &["امل بسرعه", "ملل", "اكره التكرار", "روتين"],
                ),
                e(
                    "needs_quick_wins",
                    &["quick win", "fast result", "immediate"],
                    &["نتيجه سريعه", "نتيجه فوريه", "احب الانجاز السريع"],
                ),
                e(
                    "vr_inclination",
                    &["vr", "virtual reality", "headset"],
                    &["واقع افتراضي", "نظاره", "افتراضي"],
                ),
            ],
        }
    }
}

impl TriggerTable {
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.label.as_str())
    }
}

// =============================================================================
// POLARITY HINTS
// =============================================================================

/// Question-text cue that decides which side of a trait pair an answer credits.
#[derive(Debug, Clone)]
pub struct PolarityHint {
    pub cues: Vec<String>,
    pub affirmative: Vec<String>,
    pub negative: Vec<String>,
}

impl PolarityHint {
    fn new(cues: &[&str], affirmative: &[&str], negative: &[&str]) -> Self {
        let owned = |xs: &[&str]| -> Vec<String> { xs.iter().map(|s| s.to_string()).collect() };
        Self {
            cues: owned(cues),
            affirmative: owned(affirmative),
            negative: owned(negative),
        }
    }
}

fn default_polarity_hints() -> Vec<PolarityHint> {
    vec![
        PolarityHint::new(
            &["alone", "by yourself", "on your own", "solitude", "لوحدك", "بمفردك", "وحدك"],
            &["prefers_solo", "introvert"],
            &["prefers_team", "extrovert"],
        ),
        PolarityHint::new(
            &["crowd", "with a team", "with others", "زحمه", "مع فريق", "مع ناس"],
            &["prefers_team", "extrovert"],
            &["prefers_solo", "introvert"],
        ),
        PolarityHint::new(
            &["risk", "danger", "thrill", "adrenaline", "مخاطره", "خطر", "ادرينالين"],
            &["sensation_seeking"],
            &["calm_regulation"],
        ),
    ]
}

const AFFIRMATIVE_WORDS: &[&str] = &[
    "yes", "yeah", "yep", "sure", "definitely", "absolutely", "prefer", "love", "always",
    "نعم", "اي", "ايوه", "اكيد", "احب", "دايم", "طبعا",
];

const NEGATIVE_WORDS: &[&str] = &[
    "no", "not", "never", "nope", "rarely", "hate", "dont", "don't", "لا", "ما", "ابدا", "مستحيل",
    "اكره",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarity {
    Affirmative,
    Negative,
}

fn answer_polarity(answer: &str) -> Option<Polarity> {
    let lowered = text::fold(answer);
    let words = text::words(&lowered);
    let has = |list: &[&str]| {
        words
            .iter()
            .any(|w| list.iter().any(|cand| text::fold(cand) == *w))
            || list
                .iter()
                .filter(|c| c.contains('\''))
                .any(|c| lowered.contains(c))
    };
    if has(NEGATIVE_WORDS) {
        Some(Polarity::Negative)
    } else if has(AFFIRMATIVE_WORDS) {
        Some(Polarity::Affirmative)
    } else {
        None
    }
}

// =============================================================================
// INTENTS
// =============================================================================

/// Bilingual keyword lists per intent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordSet {
    #[serde(default)]
    pub en: Vec<String>,
    #[serde(default)]
    pub ar: Vec<String>,
}

impl KeywordSet {
    pub fn new(en: &[&str], ar: &[&str]) -> Self {
        Self {
            en: en.iter().map(|s| s.to_string()).collect(),
            ar: ar.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn any_match(&self, folded_blob: &str) -> bool {
        self.en
            .iter()
            .chain(self.ar.iter())
            .any(|k| text::contains_phrase(folded_blob, k))
    }
}

pub type IntentTable = BTreeMap<String, KeywordSet>;

pub fn default_intent_keywords() -> IntentTable {
    let mut t = IntentTable::new();
    t.insert(
        "stress_relief".into(),
        KeywordSet::new(
            &["stress", "unwind", "decompress", "relax", "calm down"],
            &["ضغط", "توتر", "ارتاح", "استرخاء", "افرغ"],
        ),
    );
    t.insert(
        "focus".into(),
        KeywordSet::new(
            &["focus", "concentrat", "attention", "sharp mind"],
            &["تركيز", "انتباه", "ذهن صافي"],
        ),
    );
    t.insert(
        "confidence".into(),
        KeywordSet::new(
            &["confidence", "self-esteem", "believe in myself", "shy"],
            &["ثقه", "خجول", "اثبت نفسي"],
        ),
    );
    t.insert(
        "social_connection".into(),
        KeywordSet::new(
            &["friends", "meet people", "belong", "community", "lonely"],
            &["اصدقاء", "اتعرف", "انتماء", "مجتمع", "وحيد"],
        ),
    );
    t.insert(
        "fitness".into(),
        KeywordSet::new(
            &["fitness", "stamina", "lose weight", "strength", "endurance", "tone"],
            &["لياقه", "وزن", "قوه", "تحمل", "عضل"],
        ),
    );
    t.insert(
        "competition".into(),
        KeywordSet::new(
            &["compete", "winning", "ranking", "beat others", "tournament"],
            &["منافسه", "فوز", "اتفوق", "بطوله"],
        ),
    );
    t
}

/// Active intents in id order. An intent is active when any keyword matches.
pub fn detect_intents(answers: &Answers, table: &IntentTable) -> Vec<String> {
    let blob = text::fold(&answers_blob(answers));
    if blob.is_empty() {
        return Vec::new();
    }
    table
        .iter()
        .filter(|(_, set)| set.any_match(&blob))
        .map(|(intent, _)| intent.clone())
        .collect()
}

// =============================================================================
// EXTRACTOR
// =============================================================================

#[derive(Debug, Clone)]
pub struct SignalExtractor {
    table: TriggerTable,
    hints: Vec<PolarityHint>,
}

impl Default for SignalExtractor {
    fn default() -> Self {
        Self::new(TriggerTable::default())
    }
}

impl SignalExtractor {
    pub fn new(table: TriggerTable) -> Self {
        Self {
            table,
            hints: default_polarity_hints(),
        }
    }

    pub fn table(&self) -> &TriggerTable {
        &self.table
    }

    /// Request-level signals from all answers together.
    ///
    /// Keyword hits are counted over the whole answer blob, then per-question
    /// polarity cues are applied and paired traits are balanced.
    pub fn extract(&self, answers: &Answers) -> SignalSet {
        self.extract_with(answers, None)
    }

    pub fn extract_with(&self, answers: &Answers, questionnaire: Option<&Questionnaire>) -> SignalSet {
        let blob = answers_blob(answers);
        let mut strengths = self.score_text(&blob);

        for (qid, value) in answers {
            let question = question_text(qid, value, questionnaire);
            self.apply_polarity(&mut strengths, question.as_deref(), &value.as_text());
        }
        balance_pairs(&mut strengths);

        let per_question = self.extract_per_question(answers, questionnaire);
        let misses = per_question
            .iter()
            .filter(|(_, sigs)| sigs.iter().all(|s| s.strength <= 0.0))
            .map(|(qid, _)| qid.clone())
            .collect();

        SignalSet {
            signals: self.to_signals(&strengths),
            misses,
        }
    }

    /// Signals for a single answer, with optional question text for polarity cues.
    pub fn extract_text(&self, answer: &str, question: Option<&str>) -> Vec<TraitSignal> {
        let mut strengths = self.score_text(answer);
        self.apply_polarity(&mut strengths, question, answer);
        balance_pairs(&mut strengths);
        self.to_signals(&strengths)
    }

    pub fn extract_per_question(
        &self,
        answers: &Answers,
        questionnaire: Option<&Questionnaire>,
    ) -> BTreeMap<String, Vec<TraitSignal>> {
        answers
            .iter()
            .map(|(qid, value)| {
                let question = question_text(qid, value, questionnaire);
                (qid.clone(), self.extract_text(&value.as_text(), question.as_deref()))
            })
            .collect()
    }

    fn score_text(&self, raw: &str) -> BTreeMap<String, f64> {
        let folded = text::fold(raw);
        let token_count = text::words(&folded).len() as f64;
        let boost = 1.0 + SPECIFICITY_BOOST * (token_count / SPECIFICITY_SATURATION_TOKENS).min(1.0);

        self.table
            .entries
            .iter()
            .map(|entry| {
                let base = keyword_strength(&folded, &entry.en).max(keyword_strength(&folded, &entry.ar));
                let strength = if base > 0.0 { (base * boost).min(1.0) } else { 0.0 };
                (entry.label.clone(), strength)
            })
            .collect()
    }

    fn apply_polarity(&self, strengths: &mut BTreeMap<String, f64>, question: Option<&str>, answer: &str) {
        let Some(question) = question else { return };
        let folded_q = text::fold(question);
        let Some(polarity) = answer_polarity(answer) else {
            return;
        };
        for hint in &self.hints {
            if !hint.cues.iter().any(|c| text::contains_phrase(&folded_q, c)) {
                continue;
            }
            let credited = match polarity {
                Polarity::Affirmative => &hint.affirmative,
                Polarity::Negative => &hint.negative,
            };
            for name in credited {
                if let Some(s) = strengths.get_mut(name) {
                    *s = s.max(POLARITY_STRENGTH);
                }
            }
        }
    }

    fn to_signals(&self, strengths: &BTreeMap<String, f64>) -> Vec<TraitSignal> {
        self.table
            .labels()
            .map(|label| TraitSignal::new(label, strengths.get(label).copied().unwrap_or(0.0)))
            .collect()
    }
}

fn question_text(qid: &str, value: &AnswerValue, questionnaire: Option<&Questionnaire>) -> Option<String> {
    if let Some(q) = value.question_text() {
        return Some(q.to_string());
    }
    let spec = questionnaire?.get(qid)?;
    if spec.text.is_empty() {
        return None;
    }
    Some(format!("{} {}", spec.text.en, spec.text.ar))
}

/// `hits / max(2, phrases / 2)`, capped at 1.
fn keyword_strength(folded_blob: &str, phrases: &[String]) -> f64 {
    if phrases.is_empty() || folded_blob.is_empty() {
        return 0.0;
    }
    let hits = phrases
        .iter()
        .filter(|p| text::contains_phrase(folded_blob, p))
        .count() as f64;
    (hits / (phrases.len() as f64 / 2.0).max(2.0)).min(1.0)
}

/// Halve the weaker member of each mutually exclusive pair.
fn balance_pairs(strengths: &mut BTreeMap<String, f64>) {
    for (a, b) in [("introvert", "extrovert"), ("prefers_solo", "prefers_team")] {
        let sa = strengths.get(a).copied().unwrap_or(0.0);
        let sb = strengths.get(b).copied().unwrap_or(0.0);
        if sa > sb {
            if let Some(s) = strengths.get_mut(b) {
                *s *= 0.5;
            }
        } else if sb > sa {
            if let Some(s) = strengths.get_mut(a) {
                *s *= 0.5;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answers(pairs: &[(&str, AnswerValue)]) -> Answers {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_empty_answers_yield_zero_signals_for_every_trait() {
        let ex = SignalExtractor::default();
        let set = ex.extract(&Answers::new());
        assert_eq!(set.signals.len(), TriggerTable::default().entries.len());
        assert!(set.signals.iter().all(|s| s.strength == 0.0));
        assert!(set.misses.is_empty());
    }

    #[test]
    fn test_unmatched_answer_is_recorded_as_miss() {
        let ex = SignalExtractor::default();
        let set = ex.extract(&answers(&[("q1", AnswerValue::text("purple elephants"))]));
        assert_eq!(set.misses, vec!["q1".to_string()]);
    }

    #[test]
    fn test_longer_answer_scores_slightly_higher_but_capped() {
        let ex = SignalExtractor::default();
        let short = ex.extract_text("I like calm evenings", None);
        let long_text = format!("I like calm evenings {}", "words that keep going ".repeat(20));
        let long = ex.extract_text(&long_text, None);
        let s = |sigs: &[TraitSignal]| sigs.iter().find(|s| s.name == "calm_regulation").unwrap().strength;
        assert!(s(&long) > s(&short));
        assert!(s(&long) <= 1.0);
    }

    #[test]
    fn test_arabic_triggers_match_after_folding() {
        let ex = SignalExtractor::default();
        let sigs = ex.extract_text("أحب الهدوء والتنفّس العميق", None);
        let calm = sigs.iter().find(|s| s.name == "calm_regulation").unwrap();
        assert!(calm.strength > 0.0);
    }

    #[test]
    fn test_solitude_question_flips_pair_by_answer_polarity() {
        let ex = SignalExtractor::default();
        let q = "Do you prefer to train alone?";
        let yes = ex.extract_text("yes, definitely", Some(q));
        let no = ex.extract_text("no, never", Some(q));
        let get = |sigs: &[TraitSignal], n: &str| sigs.iter().find(|s| s.name == n).unwrap().strength;
        assert!(get(&yes, "prefers_solo") > get(&yes, "prefers_team"));
        assert!(get(&no, "prefers_team") > get(&no, "prefers_solo"));
    }

    #[test]
    fn test_weaker_pair_member_is_halved() {
        let ex = SignalExtractor::default();
        let sigs = ex.extract_text("introvert quiet solo but sometimes social", None);
        let get = |n: &str| sigs.iter().find(|s| s.name == n).unwrap().strength;
        let raw_extrovert = keyword_strength(&text::fold("introvert quiet solo but sometimes social"), &TriggerTable::default().entries[1].en);
        assert!(get("introvert") > get("extrovert"));
        assert!(get("extrovert") < raw_extrovert * (1.0 + SPECIFICITY_BOOST));
    }

    #[test]
    fn test_detect_intents_is_sorted_and_bilingual() {
        let a = answers(&[
            ("q1", AnswerValue::text("I want to unwind after work")),
            ("q2", AnswerValue::text("أبغى تركيز أعلى")),
        ]);
        let intents = detect_intents(&a, &default_intent_keywords());
        assert_eq!(intents, vec!["focus".to_string(), "stress_relief".to_string()]);
    }
}
