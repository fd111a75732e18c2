//! Display text for recommendation cards. Kept apart from scoring.

use crate::answers::Lang;
use crate::cards::{RecommendationCard, SectionKind};

/// Localized section headings.
#[derive(Debug, Clone, Copy)]
pub struct Headings {
    pub ideal_identity: &'static str,
    pub what_it_is: &'static str,
    pub why_you: &'static str,
    pub core_skills: &'static str,
    pub win_condition: &'static str,
    pub first_week: &'static str,
    pub progress_cues: &'static str,
    pub notes: &'static str,
    pub approx_level: &'static str,
}

const EN: Headings = Headings {
    ideal_identity: "Ideal identity",
    what_it_is: "What is it?",
    why_you: "Why you",
    core_skills: "Core skills",
    win_condition: "Win condition",
    first_week: "First week",
    progress_cues: "Progress cues",
    notes: "Notes",
    approx_level: "Approx level",
};

const AR: Headings = Headings {
    ideal_identity: "الهوية المثالية",
    what_it_is: "ما هي؟",
    why_you: "لماذا أنت",
    core_skills: "المهارات الأساسية",
    win_condition: "شرط الفوز",
    first_week: "الأسبوع الأول",
    progress_cues: "مؤشرات التقدم",
    notes: "ملاحظات",
    approx_level: "المستوى التقريبي",
};

pub fn headings(lang: Lang) -> &'static Headings {
    match lang {
        Lang::En => &EN,
        Lang::Ar => &AR,
    }
}

impl Headings {
    pub fn for_section(&self, kind: SectionKind) -> &'static str {
        match kind {
            SectionKind::WhatItIs => self.what_it_is,
            SectionKind::WhyYou => self.why_you,
            SectionKind::CoreSkills => self.core_skills,
            SectionKind::WinCondition => self.win_condition,
            SectionKind::FirstWeek => self.first_week,
            SectionKind::ProgressCues => self.progress_cues,
            SectionKind::Notes => self.notes,
        }
    }
}

/// Render one card. `index` is 1-based.
pub fn render_card(card: &RecommendationCard, index: usize, lang: Lang) -> String {
    let h = headings(lang);
    let mut out = format!("{index}. {}\n{}: {}\n", card.label, h.ideal_identity, card.label);

    for kind in SectionKind::ALL {
        let Some(body) = card.section(kind) else {
            continue;
        };
        if body.trim().is_empty() {
            continue;
        }
        out.push('\n');
        out.push_str(h.for_section(kind));
        out.push('\n');
        if kind.is_list() {
            for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
                out.push_str("- ");
                out.push_str(line);
                out.push('\n');
            }
        } else {
            out.push_str(body.trim());
            out.push('\n');
        }
    }

    out.push('\n');
    out.push_str(&format!("{}: {}/5", h.approx_level, card.difficulty));
    out
}

/// Render cards in order, separated by a blank line.
pub fn render_cards(cards: &[RecommendationCard], lang: Lang) -> String {
    cards
        .iter()
        .enumerate()
        .map(|(i, c)| render_card(c, i + 1, lang))
        .collect::<Vec<_>>()
        .join("\n\n")
}
