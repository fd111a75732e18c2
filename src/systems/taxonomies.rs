//! Keyword tables for the bucket-based systems.
//!
//! Bucket order is the tie-break priority. Suggestion ids use the same
//! canonical vocabulary as the catalog (`archery`, `tai_chi`, ...).

use super::keyword::{KeywordBucket, KeywordTaxonomy};

pub fn big_five() -> KeywordTaxonomy {
    let b = KeywordBucket::new;
    KeywordTaxonomy::new(
        "big_five",
        0.75,
        vec![
            b(
                "openness",
                &["creative", "curious", "new things", "imagin", "explore", "novel", "فضول", "ابداع", "جديد", "استكشاف"],
                &["openness", "novelty"],
                &["climbing", "dance", "surfing", "parkour"],
            ),
            b(
                "conscientiousness",
                &["disciplin", "organized", "routine", "precis", "goal", "methodical", "منظم", "انضباط", "دقه", "هدف"],
                &["discipline", "precision"],
                &["archery", "golf", "rowing", "swimming"],
            ),
            b(
                "extraversion",
                &["social", "team", "friends", "crowd", "party", "people", "اجتماعي", "فريق", "اصدقاء", "ناس"],
                &["sociability", "energy"],
                &["football", "basketball", "dance", "martial_arts"],
            ),
            b(
                "agreeableness",
                &["help", "kind", "cooperat", "support", "together", "مساعده", "تعاون", "لطيف"],
                &["cooperation", "warmth"],
                &["rowing", "hiking", "yoga"],
            ),
            b(
                "neuroticism",
                &["anxious", "stress", "worry", "nervous", "tense", "قلق", "توتر", "خوف"],
                &["stress_sensitivity"],
                &["yoga", "tai_chi", "swimming", "walking"],
            ),
        ],
    )
}

pub fn enneagram() -> KeywordTaxonomy {
    let b = KeywordBucket::new;
    KeywordTaxonomy::new(
        "enneagram",
        0.65,
        vec![
            b(
                "type_1",
                &["perfect", "correct", "right way", "principle", "improve", "كمال", "صح", "مبدا"],
                &["principled", "self_control"],
                &["yoga", "pilates", "golf", "archery"],
            ),
            b(
                "type_2",
                &["help", "care", "support", "give", "مساعده", "اهتم", "عطاء"],
                &["caring", "generous"],
                &["dance", "rowing", "hiking", "swimming"],
            ),
            b(
                "type_3",
                &["achieve", "success", "result", "ambitio", "انجاز", "نجاح", "طموح"],
                &["driven", "adaptive"],
                &["running", "basketball", "tennis", "cycling"],
            ),
            b(
                "type_4",
                &["unique", "express", "art", "deep feeling", "مميز", "فن", "تعبير"],
                &["expressive", "introspective"],
                &["dance", "climbing", "surfing", "yoga"],
            ),
            b(
                "type_5",
                &["understand", "learn", "analy", "think", "knowledge", "research", "افهم", "تعلم", "تحليل"],
                &["analytical", "private"],
                &["chess", "archery", "swimming", "cycling"],
            ),
            b(
                "type_6",
                &["safe", "secure", "trust", "loyal", "careful", "امان", "ثقه", "حذر"],
                &["loyal", "vigilant"],
                &["hiking", "swimming", "rowing", "tai_chi"],
            ),
            b(
                "type_7",
                &["fun", "adventure", "excit", "variety", "متعه", "مغامره", "تنوع"],
                &["spontaneous", "versatile"],
                &["surfing", "parkour", "climbing", "dance"],
            ),
            b(
                "type_8",
                &["strong", "control", "power", "challenge", "fight", "قوه", "تحدي", "سيطره"],
                &["assertive", "protective"],
                &["boxing", "martial_arts", "weightlifting", "football"],
            ),
            b(
                "type_9",
                &["peace", "calm", "harmony", "relax", "quiet", "سلام", "هدوء", "انسجام"],
                &["easygoing", "receptive"],
                &["yoga", "tai_chi", "swimming", "walking"],
            ),
        ],
    )
}

pub fn disc() -> KeywordTaxonomy {
    let b = KeywordBucket::new;
    KeywordTaxonomy::new(
        "disc",
        0.70,
        vec![
            b(
                "dominance",
                &["compet", "lead", "direct", "challenge", "win", "منافسه", "قياده", "تحدي"],
                &["decisive", "competitive"],
                &["boxing", "martial_arts", "basketball"],
            ),
            b(
                "influence",
                &["social", "fun", "people", "enthusias", "talk", "اجتماعي", "ناس", "متعه"],
                &["expressive", "sociable"],
                &["dance", "football", "basketball"],
            ),
            b(
                "steadiness",
                &["steady", "patient", "calm", "consistent", "loyal", "صبر", "هدوء", "ثابت"],
                &["patient", "consistent"],
                &["yoga", "swimming", "walking"],
            ),
            b(
                "conscientiousness",
                &["precis", "accurate", "detail", "analy", "quality", "دقه", "تفاصيل", "تحليل"],
                &["precise", "systematic"],
                &["golf", "archery", "chess"],
            ),
        ],
    )
}

pub fn temperament() -> KeywordTaxonomy {
    let b = KeywordBucket::new;
    KeywordTaxonomy::new(
        "temperament",
        0.60,
        vec![
            b(
                "sanguine",
                &["fun", "social", "lively", "cheerful", "مرح", "اجتماعي"],
                &["lively"],
                &["dance", "football", "basketball"],
            ),
            b(
                "choleric",
                &["ambitio", "lead", "strong", "intense", "compet", "قوي", "طموح"],
                &["driven"],
                &["boxing", "martial_arts", "running"],
            ),
            b(
                "melancholic",
                &["deep", "detail", "perfect", "thought", "reflect", "عميق", "تفكير"],
                &["reflective"],
                &["archery", "swimming", "chess"],
            ),
            b(
                "phlegmatic",
                &["calm", "patient", "peace", "steady", "relax", "هدوء", "صبر", "سلام"],
                &["even_tempered"],
                &["walking", "tai_chi", "yoga"],
            ),
        ],
    )
}

pub fn sports_psychology() -> KeywordTaxonomy {
    let b = KeywordBucket::new;
    KeywordTaxonomy::new(
        "sports_psychology",
        0.70,
        vec![
            b(
                "mastery_orientation",
                &["master", "improve", "technique", "skill", "precis", "practice", "اتقان", "مهاره", "تطوير", "دقه"],
                &["task_focus", "deliberate_practice"],
                &["archery", "climbing", "golf", "martial_arts"],
            ),
            b(
                "stress_regulation",
                &["stress", "calm", "breath", "relax", "anxious", "unwind", "توتر", "هدوء", "تنفس", "استرخاء"],
                &["self_regulation"],
                &["yoga", "swimming", "tai_chi"],
            ),
            b(
                "arousal_seeking",
                &["adrenaline", "thrill", "speed", "risk", "intense", "ادرينالين", "سرعه", "مغامره"],
                &["sensation_seeking"],
                &["surfing", "parkour", "boxing", "climbing"],
            ),
            b(
                "social_affiliation",
                &["team", "friends", "together", "belong", "group", "فريق", "اصدقاء", "جماعه"],
                &["affiliation"],
                &["football", "basketball", "rowing"],
            ),
            b(
                "ego_competition",
                &["winning", "compet", "beat", "rank", "champion", "فوز", "منافسه", "بطوله"],
                &["ego_orientation"],
                &["tennis", "running", "boxing"],
            ),
            b(
                "flow_absorption",
                &["focus", "flow", "absorb", "lose track", "zone", "تركيز", "انسجام", "اندماج"],
                &["absorption"],
                &["archery", "swimming", "cycling", "rowing"],
            ),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answers::{AnswerValue, Answers, Lang};
    use crate::systems::SystemScorer;

    #[test]
    fn test_calm_answers_pick_peacemaker_and_phlegmatic() {
        let mut a = Answers::new();
        a.insert("q".into(), AnswerValue::text("I value peace, I relax easily and stay calm"));
        let e = enneagram().score(&a, Lang::En).unwrap();
        assert_eq!(e.profile["type"], serde_json::json!("type_9"));
        let t = temperament().score(&a, Lang::En).unwrap();
        assert_eq!(t.profile["type"], serde_json::json!("phlegmatic"));
        assert_eq!(t.candidate_suggestions[0], "walking");
    }

    #[test]
    fn test_arabic_answers_are_scored() {
        let mut a = Answers::new();
        a.insert("q".into(), AnswerValue::text("أحب المنافسة والتحدي والقيادة"));
        let d = disc().score(&a, Lang::Ar).unwrap();
        assert_eq!(d.profile["type"], serde_json::json!("dominance"));
    }
}
