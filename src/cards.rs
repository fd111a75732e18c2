//! Recommendation cards: structured output, built from catalog templates,
//! generic trait descriptions, or generated drafts.
//!
//! Cards carry data only. Display text comes from [`crate::render`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::answers::Lang;
use crate::catalog::CatalogItem;
use crate::diversity::Signature;
use crate::text;

/// Minimum number of core skills on a generated card.
pub const MIN_CORE_SKILLS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    WhatItIs,
    WhyYou,
    CoreSkills,
    WinCondition,
    FirstWeek,
    ProgressCues,
    Notes,
}

impl SectionKind {
    /// Display order.
    pub const ALL: [SectionKind; 7] = [
        SectionKind::WhatItIs,
        SectionKind::WhyYou,
        SectionKind::CoreSkills,
        SectionKind::WinCondition,
        SectionKind::FirstWeek,
        SectionKind::ProgressCues,
        SectionKind::Notes,
    ];

    /// Sections every card must carry.
    pub const REQUIRED: [SectionKind; 4] = [
        SectionKind::WhyYou,
        SectionKind::CoreSkills,
        SectionKind::WinCondition,
        SectionKind::FirstWeek,
    ];

    /// List sections hold one entry per line.
    pub fn is_list(self) -> bool {
        matches!(self, SectionKind::CoreSkills | SectionKind::ProgressCues)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardSection {
    pub kind: SectionKind,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationCard {
    pub label: String,
    /// Catalog item behind the card. Generated cards may have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub body_sections: Vec<CardSection>,
    pub difficulty: u8,
    /// blake3 digest of the sorted signature terms.
    pub signature: String,
    pub signature_terms: BTreeSet<String>,
}

impl RecommendationCard {
    pub fn new(label: impl Into<String>, item_id: Option<String>, body_sections: Vec<CardSection>, difficulty: u8) -> Self {
        let mut card = Self {
            label: label.into(),
            item_id,
            body_sections,
            difficulty: difficulty.clamp(1, 5),
            signature: String::new(),
            signature_terms: BTreeSet::new(),
        };
        card.reseal();
        card
    }

    pub fn section(&self, kind: SectionKind) -> Option<&str> {
        self.body_sections
            .iter()
            .find(|s| s.kind == kind)
            .map(|s| s.text.as_str())
    }

    pub fn section_mut(&mut self, kind: SectionKind) -> Option<&mut String> {
        self.body_sections
            .iter_mut()
            .find(|s| s.kind == kind)
            .map(|s| &mut s.text)
    }

    pub fn core_skills(&self) -> Vec<&str> {
        self.section(SectionKind::CoreSkills)
            .map(|t| t.lines().map(str::trim).filter(|l| !l.is_empty()).collect())
            .unwrap_or_default()
    }

    /// Recompute signature terms and digest after the label or skills change.
    pub fn reseal(&mut self) {
        let mut terms = text::token_set(&self.label);
        for skill in self.core_skills() {
            terms.extend(text::token_set(skill));
        }
        let joined = terms.iter().map(String::as_str).collect::<Vec<_>>().join("|");
        self.signature = blake3::hash(joined.as_bytes()).to_hex().to_string();
        self.signature_terms = terms;
    }

    /// Append text to the notes section, creating it if needed.
    pub fn append_note(&mut self, note: &str) {
        match self.section_mut(SectionKind::Notes) {
            Some(existing) if !existing.trim().is_empty() => {
                existing.push(' ');
                existing.push_str(note);
            }
            Some(existing) => existing.push_str(note),
            None => self.body_sections.push(CardSection {
                kind: SectionKind::Notes,
                text: note.to_string(),
            }),
        }
    }
}

impl Signature for RecommendationCard {
    fn signature_terms(&self) -> &BTreeSet<String> {
        &self.signature_terms
    }

    fn duplicate_key(&self) -> String {
        text::canon(&self.label)
    }
}

// =============================================================================
// BUILDERS
// =============================================================================

fn push(sections: &mut Vec<CardSection>, kind: SectionKind, text: impl Into<String>) {
    let text = text.into();
    if !text.trim().is_empty() {
        sections.push(CardSection { kind, text });
    }
}

fn join_sentences(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Card for a catalog item: its identity template when present, else a generic card.
pub fn card_for_item(item: &CatalogItem, lang: Lang) -> RecommendationCard {
    match &item.template {
        Some(_) => from_template(item, lang),
        None => generic_card(item, lang),
    }
}

pub fn from_template(item: &CatalogItem, lang: Lang) -> RecommendationCard {
    let Some(t) = &item.template else {
        return generic_card(item, lang);
    };
    let mut sections = Vec::new();
    push(
        &mut sections,
        SectionKind::WhatItIs,
        join_sentences(&[t.scene.get(lang), t.inner_sensation.get(lang)]),
    );
    push(&mut sections, SectionKind::WhyYou, t.why_you.get(lang));
    push(&mut sections, SectionKind::CoreSkills, t.core_skills.get(lang).join("\n"));
    push(&mut sections, SectionKind::WinCondition, t.win_condition.get(lang));
    push(&mut sections, SectionKind::FirstWeek, t.first_week.get(lang));
    push(&mut sections, SectionKind::ProgressCues, t.progress_markers.get(lang).join("\n"));
    push(&mut sections, SectionKind::Notes, t.mode.get(lang));
    RecommendationCard::new(item.display_label(lang), Some(item.id.clone()), sections, t.difficulty)
}

/// Skill and motive phrases for the traits an item weights most.
fn trait_phrase(name: &str, lang: Lang) -> (&'static str, &'static str) {
    match (name, lang) {
        ("precision", Lang::En) => ("steady aim", "you enjoy getting small details exactly right"),
        ("precision", Lang::Ar) => ("تصويب ثابت", "تستمتع بإتقان التفاصيل الصغيرة"),
        ("sustained_attention", Lang::En) => ("long focus", "you can stay with one thing for a long time"),
        ("sustained_attention", Lang::Ar) => ("تركيز طويل", "تقدر تبقى مع شيء واحد وقتا طويلا"),
        ("calm_regulation", Lang::En) => ("breath control", "calm is something you seek out"),
        ("calm_regulation", Lang::Ar) => ("التحكم بالنفس", "تبحث عن الهدوء"),
        ("prefers_solo", Lang::En) => ("self-pacing", "you recharge on your own terms"),
        ("prefers_solo", Lang::Ar) => ("إيقاع ذاتي", "تشحن طاقتك بطريقتك"),
        ("prefers_team", Lang::En) => ("team play", "shared effort lifts your energy"),
        ("prefers_team", Lang::Ar) => ("اللعب الجماعي", "الجهد المشترك يرفع طاقتك"),
        ("sensation_seeking", Lang::En) => ("bold commitment", "intensity wakes you up"),
        ("sensation_seeking", Lang::Ar) => ("اندفاع محسوب", "الشدة توقظك"),
        ("tactical_mindset", Lang::En) => ("reading situations", "you like thinking a few moves ahead"),
        ("tactical_mindset", Lang::Ar) => ("قراءة المواقف", "تحب التفكير بخطوات للأمام"),
        ("likes_puzzles", Lang::En) => ("problem solving", "puzzles pull you in"),
        ("likes_puzzles", Lang::Ar) => ("حل المسائل", "الألغاز تجذبك"),
        ("low_repetition_tolerance", Lang::En) => ("adaptability", "variety keeps you engaged"),
        ("low_repetition_tolerance", Lang::Ar) => ("التكيف", "التنوع يبقيك متحمسا"),
        ("needs_quick_wins", Lang::En) => ("quick feedback", "you like to feel progress early"),
        ("needs_quick_wins", Lang::Ar) => ("تغذية راجعة سريعة", "تحب أن تشعر بالتقدم مبكرا"),
        ("sensory_intensity", Lang::En) => ("body awareness", "you notice strong physical sensations"),
        ("sensory_intensity", Lang::Ar) => ("وعي الجسد", "تلاحظ الإحساس الجسدي القوي"),
        (_, Lang::En) => ("consistency", "steady effort suits you"),
        (_, Lang::Ar) => ("الاستمرارية", "الجهد الثابت يناسبك"),
    }
}

const FILLER_SKILLS_EN: [&str; 3] = ["consistency", "recovery", "body awareness"];
const FILLER_SKILLS_AR: [&str; 3] = ["الاستمرارية", "الاستشفاء", "وعي الجسد"];

/// Deterministic card from the label and the item's strongest positive trait weights.
pub fn generic_card(item: &CatalogItem, lang: Lang) -> RecommendationCard {
    let mut weights: Vec<(&String, f64)> = item
        .trait_weights
        .iter()
        .filter(|(_, w)| **w > 0.0)
        .map(|(k, w)| (k, *w))
        .collect();
    weights.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let mut skills: Vec<&str> = Vec::new();
    let mut motives: Vec<&str> = Vec::new();
    for (name, _) in weights.iter().take(MIN_CORE_SKILLS) {
        let (skill, motive) = trait_phrase(name, lang);
        if !skills.contains(&skill) {
            skills.push(skill);
            motives.push(motive);
        }
    }
    let filler = match lang {
        Lang::En => FILLER_SKILLS_EN,
        Lang::Ar => FILLER_SKILLS_AR,
    };
    for extra in filler {
        if skills.len() >= MIN_CORE_SKILLS {
            break;
        }
        if !skills.contains(&extra) {
            skills.push(extra);
        }
    }

    let label = item.display_label(lang);
    let (what, why, win, first, cues): (String, String, String, String, Vec<&str>) = match lang {
        Lang::En => (
            format!(
                "{label} is a path built around steady practice. Expect a clear rhythm of breath, warmth in the muscles and a calm focus that lingers afterwards."
            ),
            if motives.is_empty() {
                "It keeps things simple and lets you grow at your own pace.".to_string()
            } else {
                format!("It fits because {}.", motives.join(", and "))
            },
            "Finishing a session feeling lighter and more in control than when you started.".to_string(),
            "Explore the basics gently, notice which moments feel good, and stop while you still want more.".to_string(),
            vec!["Effort feels smoother", "You look forward to the next session", "Tension fades sooner afterwards"],
        ),
        Lang::Ar => (
            format!("{label} مسار مبني على ممارسة ثابتة. توقع إيقاعا واضحا للتنفس ودفء في العضلات وتركيزا هادئا يبقى بعدها."),
            if motives.is_empty() {
                "بسيط ويتركك تنمو بإيقاعك.".to_string()
            } else {
                format!("يناسبك لأنك {}.", motives.join("، و"))
            },
            "تنهي الحصة وأنت أخف وأكثر تحكما مما بدأت.".to_string(),
            "استكشف الأساسيات بلطف، لاحظ اللحظات الممتعة، وتوقف وأنت ما زلت تريد المزيد.".to_string(),
            vec!["الجهد يصير أسهل", "تنتظر الحصة القادمة", "التوتر يخف أسرع"],
        ),
    };

    let mut sections = Vec::new();
    push(&mut sections, SectionKind::WhatItIs, what);
    push(&mut sections, SectionKind::WhyYou, why);
    push(&mut sections, SectionKind::CoreSkills, skills.join("\n"));
    push(&mut sections, SectionKind::WinCondition, win);
    push(&mut sections, SectionKind::FirstWeek, first);
    push(&mut sections, SectionKind::ProgressCues, cues.join("\n"));
    RecommendationCard::new(label, Some(item.id.clone()), sections, 2)
}

// =============================================================================
// GENERATED DRAFTS
// =============================================================================

/// One card as returned by the generation backend, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardDraft {
    #[serde(default)]
    pub sport_label: String,
    #[serde(default)]
    pub what_it_looks_like: String,
    #[serde(default)]
    pub inner_sensation: String,
    #[serde(default)]
    pub why_you: String,
    #[serde(default)]
    pub first_week: String,
    #[serde(default)]
    pub progress_markers: StringOrList,
    #[serde(default)]
    pub win_condition: String,
    #[serde(default)]
    pub core_skills: StringOrList,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub variant_vr: String,
    #[serde(default)]
    pub variant_no_vr: String,
    #[serde(default)]
    pub difficulty: Option<u8>,
}

/// Backends return lists either as arrays or as delimited strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    List(Vec<String>),
    Text(String),
}

impl Default for StringOrList {
    fn default() -> Self {
        StringOrList::List(Vec::new())
    }
}

impl StringOrList {
    pub fn items(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            StringOrList::List(items) => items.iter().map(String::as_str).collect(),
            StringOrList::Text(text) => text.split(['\n', ';', '،', ',']).collect(),
        };
        raw.into_iter()
            .map(|s| s.trim().trim_start_matches(['-', '•', '*']).trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl CardDraft {
    /// Build a card. Field text is taken as-is; sanitizing happens in the quality guard.
    pub fn into_card(self, item_id: Option<String>) -> RecommendationCard {
        let mut sections = Vec::new();
        push(
            &mut sections,
            SectionKind::WhatItIs,
            join_sentences(&[self.what_it_looks_like.as_str(), self.inner_sensation.as_str()]),
        );
        push(&mut sections, SectionKind::WhyYou, self.why_you);
        push(&mut sections, SectionKind::CoreSkills, self.core_skills.items().join("\n"));
        push(&mut sections, SectionKind::WinCondition, self.win_condition);
        push(&mut sections, SectionKind::FirstWeek, self.first_week);
        push(&mut sections, SectionKind::ProgressCues, self.progress_markers.items().join("\n"));
        let notes = join_sentences(&[self.mode.as_str(), self.variant_vr.as_str(), self.variant_no_vr.as_str()]);
        push(&mut sections, SectionKind::Notes, notes);
        RecommendationCard::new(self.sport_label.trim(), item_id, sections, self.difficulty.unwrap_or(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    #[test]
    fn test_template_card_has_required_sections_and_signature() {
        let catalog = Catalog::builtin().unwrap();
        let item = catalog.get("archery").unwrap();
        let card = card_for_item(item, Lang::En);
        assert_eq!(card.label, "The Still Marksman");
        for kind in SectionKind::REQUIRED {
            assert!(card.section(kind).is_some(), "missing {kind:?}");
        }
        assert!(card.signature_terms.contains("marksman"));
        assert!(card.signature_terms.contains("aim"));
        assert_eq!(card.signature.len(), 64);
    }

    #[test]
    fn test_arabic_template_falls_back_per_field() {
        let catalog = Catalog::builtin().unwrap();
        let card = card_for_item(catalog.get("golf").unwrap(), Lang::Ar);
        // No Arabic text for this item: English is used.
        assert_eq!(card.label, "The Long-Game Planner");
    }

    #[test]
    fn test_generic_card_is_deterministic_with_three_skills() {
        let item = CatalogItem::new("x", "Quiet Explorer", 0.1)
            .with_weight("calm_regulation", 0.5)
            .with_weight("precision", 0.5);
        let a = generic_card(&item, Lang::En);
        let b = generic_card(&item, Lang::En);
        assert_eq!(a, b);
        assert_eq!(a.core_skills(), vec!["breath control", "steady aim", "consistency"]);
    }

    #[test]
    fn test_draft_accepts_string_lists() {
        let draft: CardDraft = serde_json::from_value(serde_json::json!({
            "sport_label": "The Night Glider",
            "core_skills": "balance, timing; breath",
            "difficulty": 9
        }))
        .unwrap();
        let card = draft.into_card(None);
        assert_eq!(card.core_skills(), vec!["balance", "timing", "breath"]);
        assert_eq!(card.difficulty, 5);
    }

    #[test]
    fn test_signature_ignores_section_order() {
        let mut a = RecommendationCard::new("Calm Anchor", None, vec![], 1);
        a.body_sections.push(CardSection {
            kind: SectionKind::CoreSkills,
            text: "breath\nbalance".into(),
        });
        a.reseal();
        let mut b = RecommendationCard::new("calm anchor", None, vec![], 1);
        b.body_sections.push(CardSection {
            kind: SectionKind::CoreSkills,
            text: "balance\nbreath".into(),
        });
        b.reseal();
        assert_eq!(a.signature, b.signature);
    }
}
