//! Content rules for card text, with deterministic repair.
//!
//! Checks run in a fixed order:
//! 1. forbidden terms (concealed item names, promotional boilerplate) and
//!    forbidden details (durations, reps, cost, named places)
//! 2. minimum length and generic filler
//! 3. sensory marker density
//! 4. required section headings
//!
//! The guard never ships invalid text silently: callers either regenerate,
//! or call [`QualityGuard::repair`] / [`QualityGuard::repair_card`] and get
//! the residual violations back.

use std::fmt;

use fancy_regex::Regex as FancyRegex;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::answers::Lang;
use crate::cards::{CardSection, RecommendationCard, SectionKind, MIN_CORE_SKILLS};
use crate::catalog::Catalog;
use crate::render::{headings, render_card};
use crate::text;

/// Replacement for masked terms.
pub const MASK: &str = "—";

const MAX_PAD_ROUNDS: usize = 32;

// Durations, reps and sets, cost, and named places. Matched on folded text,
// so Arabic alternatives are spelled in folded form.
static DETAIL_LATIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b\d+(?:\.\d+)?\s*(?:min|mins|minute|minutes|sec|secs|second|seconds|hour|hours|hr|hrs)\b|\b(?:rep|reps|set|sets)\b|\d+\s*[x×]\s*\d+|×|\b(?:cost|costs|budget|price|prices)\b|[$€£]|\b(?:outdoor|indoor|park|beach|gym|studio)\b",
    )
    .expect("Invalid detail regex")
});

static DETAIL_ARABIC: Lazy<FancyRegex> = Lazy::new(|| {
    FancyRegex::new(
        r"(?<![\p{L}])(?:[وبلف]?ال)?(?:دقيقه|دقايق|ثانيه|ثواني|ساعه|ساعات|تكرار|جوله|جولات|تكلفه|ميزانيه|ريال|دولار|صاله|نادي|جيم|غرفه|ساحه|ملعب|حديقه|شاطي|طبيعه|بيت|منزل)(?![\p{L}])",
    )
    .expect("Invalid Arabic detail regex")
});

// =============================================================================
// CONFIG
// =============================================================================

fn default_min_chars() -> usize {
    220
}

fn default_min_sensory_hits() -> usize {
    4
}

fn default_conceal() -> bool {
    true
}

pub fn default_generic_phrases() -> Vec<String> {
    [
        "any physical activity",
        "pick whatever suits you",
        "choose what suits you",
        "try a few options",
        "just start anything",
        "just move",
        "the type doesn't matter",
        "general activity",
        "general sport",
        "you know what suits you",
        "أي نشاط بدني مفيد",
        "اختر ما يناسبك",
        "جرّب أكثر من خيار",
        "ابدأ بأي شيء",
        "تحرك فقط",
        "لا يهم النوع",
        "نشاط عام",
        "رياضة عامة",
        "أنت تعرف ما يناسبك",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn default_promotional_phrases() -> Vec<String> {
    [
        "best sport ever",
        "sign up now",
        "limited offer",
        "buy now",
        "click here",
        "subscribe today",
        "اشترك الآن",
        "عرض محدود",
        "أفضل رياضة",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn default_sensory_markers() -> Vec<String> {
    [
        "breath", "rhythm", "tension", "release", "warmth", "cool", "balance", "pulse", "sweat",
        "stretch", "stillness", "calm", "focus", "flow", "harmony", "weight", "lightness",
        "sensation", "wave", "roar", "reach", "gentle burn", "clarity", "grip", "heartbeat",
        "texture", "تنفس", "إيقاع", "توتر", "استرخاء", "دفء", "برودة", "توازن", "نبض", "تعرق",
        "شد", "مرونة", "هدوء", "تركيز", "تدفق", "انسجام", "ثقل", "خفة", "إحساس", "موجة", "هدير",
        "امتداد", "حرق لطيف", "صفاء", "تماسك",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_min_sensory_hits")]
    pub min_sensory_hits: usize,
    #[serde(default = "default_conceal")]
    pub conceal_item_names: bool,
    #[serde(default = "default_generic_phrases")]
    pub generic_phrases: Vec<String>,
    #[serde(default = "default_promotional_phrases")]
    pub promotional_phrases: Vec<String>,
    #[serde(default = "default_sensory_markers")]
    pub sensory_markers: Vec<String>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
            min_sensory_hits: default_min_sensory_hits(),
            conceal_item_names: default_conceal(),
            generic_phrases: default_generic_phrases(),
            promotional_phrases: default_promotional_phrases(),
            sensory_markers: default_sensory_markers(),
        }
    }
}

// =============================================================================
// VIOLATIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    ForbiddenTerm,
    ForbiddenDetail,
    TooShort,
    Generic,
    LowSensoryDensity,
    MissingSection,
    TooFewSkills,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::ForbiddenTerm => "forbidden_term",
            ViolationKind::ForbiddenDetail => "forbidden_detail",
            ViolationKind::TooShort => "too_short",
            ViolationKind::Generic => "generic",
            ViolationKind::LowSensoryDensity => "low_sensory_density",
            ViolationKind::MissingSection => "missing_section",
            ViolationKind::TooFewSkills => "too_few_skills",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct QualityViolation {
    pub kind: ViolationKind,
    pub detail: String,
}

impl QualityViolation {
    fn new(kind: ViolationKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub violations: Vec<QualityViolation>,
}

impl QualityReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(|v| v.to_string()).collect()
    }

    pub fn has(&self, kind: ViolationKind) -> bool {
        self.violations.iter().any(|v| v.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepairOutcome {
    pub text: String,
    /// Violations still present after every repair step.
    pub residual: Vec<QualityViolation>,
    pub changed: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum QualityError {
    #[error("invalid term pattern: {0}")]
    Pattern(String),
}

// =============================================================================
// GUARD
// =============================================================================

#[derive(Debug, Clone)]
pub struct QualityGuard {
    config: QualityConfig,
    terms: Vec<String>,
    term_pattern: Option<FancyRegex>,
    generic_patterns: Vec<Regex>,
}

impl QualityGuard {
    /// Guard with an explicit forbidden-term list (promotional phrases are always added).
    pub fn new(config: QualityConfig, concealed: Vec<String>) -> Result<Self, QualityError> {
        let mut terms: Vec<String> = concealed
            .into_iter()
            .chain(config.promotional_phrases.iter().cloned())
            .map(|t| text::fold(&t))
            .filter(|t| !t.is_empty())
            .collect();
        // Longest first so multi-word terms win over their prefixes.
        terms.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then_with(|| a.cmp(b)));
        terms.dedup();

        let term_pattern = if terms.is_empty() {
            None
        } else {
            let alternation = terms.iter().map(|t| regex::escape(t)).collect::<Vec<_>>().join("|");
            let pattern = format!(r"(?i)(?<![\p{{L}}\p{{N}}])(?:[وبلف]?ال)?(?:{alternation})(?![\p{{L}}\p{{N}}])");
            Some(FancyRegex::new(&pattern).map_err(|e| QualityError::Pattern(e.to_string()))?)
        };

        let generic_patterns = config
            .generic_phrases
            .iter()
            .filter(|p| !p.trim().is_empty())
            .map(|p| Regex::new(&format!("(?i){}", regex::escape(p.trim()))))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| QualityError::Pattern(e.to_string()))?;

        Ok(Self {
            config,
            terms,
            term_pattern,
            generic_patterns,
        })
    }

    /// Guard for a catalog: its ids and aliases are concealed when configured.
    pub fn for_catalog(config: QualityConfig, catalog: &Catalog) -> Result<Self, QualityError> {
        let concealed = if config.conceal_item_names {
            catalog.concealed_names()
        } else {
            Vec::new()
        };
        Self::new(config, concealed)
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    pub fn forbidden_terms(&self) -> &[String] {
        &self.terms
    }

    // -------------------------------------------------------------------------
    // Checks
    // -------------------------------------------------------------------------

    fn find_term(&self, raw: &str) -> Option<String> {
        let pattern = self.term_pattern.as_ref()?;
        for candidate in [raw.to_string(), text::fold(raw)] {
            if let Ok(Some(m)) = pattern.find(&candidate) {
                return Some(m.as_str().to_string());
            }
        }
        None
    }

    fn has_forbidden_detail(sentence: &str) -> bool {
        let folded = text::fold(sentence);
        DETAIL_LATIN.is_match(&folded) || DETAIL_ARABIC.is_match(&folded).unwrap_or(false)
    }

    fn find_generic(&self, raw: &str) -> Option<String> {
        let folded = text::fold(raw);
        self.config
            .generic_phrases
            .iter()
            .find(|p| text::contains_phrase(&folded, p))
            .cloned()
    }

    pub fn sensory_hits(&self, raw: &str) -> usize {
        let folded = text::fold(raw);
        self.config
            .sensory_markers
            .iter()
            .filter(|m| text::contains_phrase(&folded, m))
            .count()
    }

    fn missing_sections(raw: &str, lang: Lang) -> Vec<&'static str> {
        let h = headings(lang);
        SectionKind::REQUIRED
            .iter()
            .map(|k| h.for_section(*k))
            .filter(|heading| !raw.contains(heading))
            .collect()
    }

    /// Validate display text in `lang`.
    pub fn validate(&self, raw: &str, lang: Lang) -> QualityReport {
        let mut violations = Vec::new();

        if let Some(term) = self.find_term(raw) {
            violations.push(QualityViolation::new(ViolationKind::ForbiddenTerm, term));
        }
        if let Some(sentence) = text::split_sentences(raw)
            .into_iter()
            .find(|s| Self::has_forbidden_detail(s))
        {
            violations.push(QualityViolation::new(
                ViolationKind::ForbiddenDetail,
                text::clip(&sentence, 80),
            ));
        }

        let length = raw.trim().chars().count();
        if length < self.config.min_chars {
            violations.push(QualityViolation::new(
                ViolationKind::TooShort,
                format!("{length} < {} chars", self.config.min_chars),
            ));
        }
        if let Some(phrase) = self.find_generic(raw) {
            violations.push(QualityViolation::new(ViolationKind::Generic, phrase));
        }

        let hits = self.sensory_hits(raw);
        if hits < self.config.min_sensory_hits {
            violations.push(QualityViolation::new(
                ViolationKind::LowSensoryDensity,
                format!("{hits} < {} markers", self.config.min_sensory_hits),
            ));
        }

        for heading in Self::missing_sections(raw, lang) {
            violations.push(QualityViolation::new(ViolationKind::MissingSection, heading));
        }

        QualityReport { violations }
    }

    /// Validate a card as rendered, plus its structured fields.
    pub fn validate_card(&self, card: &RecommendationCard, lang: Lang) -> QualityReport {
        let mut report = self.validate(&render_card(card, 1, lang), lang);
        let skills = card.core_skills().len();
        if skills < MIN_CORE_SKILLS {
            report.violations.push(QualityViolation::new(
                ViolationKind::TooFewSkills,
                format!("{skills} < {MIN_CORE_SKILLS}"),
            ));
        }
        report
    }

    // -------------------------------------------------------------------------
    // Repair
    // -------------------------------------------------------------------------

    /// Drop every sentence that names a duration, reps, cost or place. Line structure is kept.
    pub fn scrub_forbidden_sentences(&self, raw: &str) -> String {
        raw.lines()
            .map(|line| {
                text::split_sentences(line)
                    .into_iter()
                    .filter(|s| !Self::has_forbidden_detail(s))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn drop_generic(&self, raw: &str) -> String {
        let mut out = raw.to_string();
        for pattern in &self.generic_patterns {
            out = pattern.replace_all(&out, "").into_owned();
        }
        if self.find_generic(&out).is_none() {
            return out;
        }
        // Spelling variants survive the literal pass: drop whole sentences instead.
        out.lines()
            .map(|line| {
                text::split_sentences(line)
                    .into_iter()
                    .filter(|s| self.find_generic(s).is_none())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Replace concealed names and promotional phrases with [`MASK`].
    pub fn mask_forbidden(&self, raw: &str) -> String {
        let Some(pattern) = &self.term_pattern else {
            return raw.to_string();
        };
        let masked = pattern.replace_all(raw, MASK).into_owned();
        match pattern.is_match(&text::fold(&masked)) {
            // Only a folded variant matches: fall back to masking the folded text.
            Ok(true) => pattern.replace_all(&text::fold(&masked), MASK).into_owned(),
            _ => masked,
        }
    }

    /// Clean one generated field: forbidden detail sentences and generic filler go.
    pub fn sanitize_field(&self, raw: &str) -> String {
        let scrubbed = self.scrub_forbidden_sentences(raw);
        let cleaned = self.drop_generic(&scrubbed);
        cleaned
            .lines()
            .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Deterministic repair of free text, then revalidation.
    pub fn repair(&self, raw: &str, lang: Lang) -> RepairOutcome {
        let mut out = self.sanitize_field(raw);

        let h = headings(lang);
        for kind in SectionKind::REQUIRED {
            let heading = h.for_section(kind);
            if !out.contains(heading) {
                out.push_str(&format!("\n\n{heading}\n{}", section_filler(kind, lang)));
            }
        }

        if self.sensory_hits(&out) < self.config.min_sensory_hits {
            out.push_str("\n\n");
            out.push_str(sensory_paragraph(lang));
        }

        let mut rounds = 0;
        while out.trim().chars().count() < self.config.min_chars && rounds < MAX_PAD_ROUNDS {
            out.push(' ');
            out.push_str(padding_sentence(lang));
            rounds += 1;
        }

        out = self.mask_forbidden(&out);
        let residual = self.validate(&out, lang).violations;
        RepairOutcome {
            changed: out != raw,
            text: out,
            residual,
        }
    }

    /// Deterministic repair of a card: fields are sanitized and masked, missing
    /// sections and skills are filled, and notes absorb sensory and padding text.
    pub fn repair_card(&self, card: &RecommendationCard, lang: Lang) -> (RecommendationCard, Vec<QualityViolation>) {
        let mut fixed = card.clone();
        fixed.label = self.mask_forbidden(&fixed.label);
        for section in &mut fixed.body_sections {
            section.text = self.mask_forbidden(&self.sanitize_field(&section.text));
        }
        fixed.body_sections.retain(|s| !s.text.trim().is_empty());

        for kind in SectionKind::REQUIRED {
            if fixed.section(kind).is_none() {
                fixed.body_sections.push(CardSection {
                    kind,
                    text: section_filler(kind, lang).to_string(),
                });
            }
        }
        fixed.body_sections.sort_by_key(|s| SectionKind::ALL.iter().position(|k| *k == s.kind));

        let mut skills: Vec<String> = fixed.core_skills().into_iter().map(str::to_string).collect();
        for extra in filler_skills(lang) {
            if skills.len() >= MIN_CORE_SKILLS {
                break;
            }
            if !skills.iter().any(|s| s == extra) {
                skills.push(extra.to_string());
            }
        }
        if let Some(text) = fixed.section_mut(SectionKind::CoreSkills) {
            *text = skills.join("\n");
        }

        if self.sensory_hits(&render_card(&fixed, 1, lang)) < self.config.min_sensory_hits {
            fixed.append_note(sensory_paragraph(lang));
        }
        let mut rounds = 0;
        while render_card(&fixed, 1, lang).trim().chars().count() < self.config.min_chars && rounds < MAX_PAD_ROUNDS {
            fixed.append_note(padding_sentence(lang));
            rounds += 1;
        }

        fixed.reseal();
        let residual = self.validate_card(&fixed, lang).violations;
        (fixed, residual)
    }
}

fn section_filler(kind: SectionKind, lang: Lang) -> &'static str {
    match (kind, lang) {
        (SectionKind::WhyYou, Lang::En) => "It matches the way you like to feel while moving.",
        (SectionKind::WhyYou, Lang::Ar) => "يناسب الطريقة التي تحب أن تشعر بها وأنت تتحرك.",
        (SectionKind::CoreSkills, Lang::En) => "consistency\nrecovery\nbody awareness",
        (SectionKind::CoreSkills, Lang::Ar) => "الاستمرارية\nالاستشفاء\nوعي الجسد",
        (SectionKind::WinCondition, Lang::En) => "Ending each session calmer and more capable than you began.",
        (SectionKind::WinCondition, Lang::Ar) => "تنهي كل حصة أهدأ وأقدر مما بدأت.",
        (SectionKind::FirstWeek, Lang::En) => "Explore the basics gently and notice what feels natural.",
        (SectionKind::FirstWeek, Lang::Ar) => "استكشف الأساسيات بلطف ولاحظ ما يبدو طبيعيا.",
        (_, Lang::En) => "Keep it light and curious.",
        (_, Lang::Ar) => "اجعلها خفيفة وممتعة.",
    }
}

fn filler_skills(lang: Lang) -> [&'static str; 3] {
    match lang {
        Lang::En => ["consistency", "recovery", "body awareness"],
        Lang::Ar => ["الاستمرارية", "الاستشفاء", "وعي الجسد"],
    }
}

fn sensory_paragraph(lang: Lang) -> &'static str {
    match lang {
        Lang::En => "Notice the rhythm of your breath, the warmth in your muscles, the balance in each movement and the calm focus that follows.",
        Lang::Ar => "لاحظ إيقاع تنفسك، ودفء عضلاتك، وتوازن كل حركة، والهدوء والتركيز الذي يتبعها.",
    }
}

fn padding_sentence(lang: Lang) -> &'static str {
    match lang {
        Lang::En => "Let each session end while you still feel curious for more.",
        Lang::Ar => "اجعل كل حصة تنتهي وأنت ما زلت متشوقا للمزيد.",
    }
}
