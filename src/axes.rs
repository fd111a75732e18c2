//! Bounded multi-axis profile built from weighted question contributions.
//!
//! ## Axes
//!
//! Five bipolar axes in `[-1, 1]`, positive pole first:
//! `tech_intuition` (technical ↔ intuitive), `calm_adrenaline`,
//! `solo_group`, `repeat_variety`, `control_freedom`; plus the unipolar
//! `sensory_intensity` in `[0, 1]`.
//!
//! ## Scoring paths
//!
//! A question is either *explicit* (its definition carries a per-option score
//! table) or *heuristic* (contributions come from trait signals through a fixed
//! trait→axis table). The path is a property of the question definition. When
//! an explicit question contributes to an axis, heuristic contributions to that
//! axis are dropped for the whole request, so the two paths never mix on one axis.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::answers::{Answers, Lang, Questionnaire};
use crate::signals::TraitSignal;

// =============================================================================
// Axis definitions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisBound {
    /// `[-1, 1]`
    Bipolar,
    /// `[0, 1]`
    Unipolar,
}

impl AxisBound {
    pub fn range(self) -> (f64, f64) {
        match self {
            AxisBound::Bipolar => (-1.0, 1.0),
            AxisBound::Unipolar => (0.0, 1.0),
        }
    }

    pub fn clamp(self, value: f64) -> f64 {
        let (lo, hi) = self.range();
        value.clamp(lo, hi)
    }

    pub fn contains(self, value: f64) -> bool {
        let (lo, hi) = self.range();
        (lo..=hi).contains(&value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisDef {
    pub name: String,
    pub bound: AxisBound,
}

impl AxisDef {
    pub fn bipolar(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bound: AxisBound::Bipolar,
        }
    }

    pub fn unipolar(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bound: AxisBound::Unipolar,
        }
    }
}

pub const TECH_INTUITION: &str = "tech_intuition";
pub const CALM_ADRENALINE: &str = "calm_adrenaline";
pub const SOLO_GROUP: &str = "solo_group";
pub const REPEAT_VARIETY: &str = "repeat_variety";
pub const CONTROL_FREEDOM: &str = "control_freedom";
pub const SENSORY_INTENSITY: &str = "sensory_intensity";

pub fn default_axes() -> Vec<AxisDef> {
    vec![
        AxisDef::bipolar(TECH_INTUITION),
        AxisDef::bipolar(CALM_ADRENALINE),
        AxisDef::bipolar(SOLO_GROUP),
        AxisDef::bipolar(REPEAT_VARIETY),
        AxisDef::bipolar(CONTROL_FREEDOM),
        AxisDef::unipolar(SENSORY_INTENSITY),
    ]
}

/// One entry of the heuristic trait→axis lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitAxisLink {
    pub trait_name: String,
    pub axis: String,
    pub coefficient: f64,
}

pub fn default_trait_axis_links() -> Vec<TraitAxisLink> {
    let l = |t: &str, a: &str, c: f64| TraitAxisLink {
        trait_name: t.to_string(),
        axis: a.to_string(),
        coefficient: c,
    };
    vec![
        l("precision", TECH_INTUITION, 0.8),
        l("precision", CONTROL_FREEDOM, 0.4),
        l("sustained_attention", TECH_INTUITION, 0.6),
        l("sustained_attention", REPEAT_VARIETY, 0.5),
        l("tactical_mindset", TECH_INTUITION, 0.7),
        l("likes_puzzles", TECH_INTUITION, 0.5),
        l("sensation_seeking", CALM_ADRENALINE, -0.9),
        l("sensation_seeking", SENSORY_INTENSITY, 0.9),
        l("sensation_seeking", CONTROL_FREEDOM, -0.3),
        l("calm_regulation", CALM_ADRENALINE, 0.9),
        l("calm_regulation", SENSORY_INTENSITY, 0.1),
        l("anxious", CALM_ADRENALINE, 0.4),
        l("introvert", SOLO_GROUP, 0.7),
        l("prefers_solo", SOLO_GROUP, 0.9),
        l("extrovert", SOLO_GROUP, -0.7),
        l("prefers_team", SOLO_GROUP, -0.9),
        l("low_repetition_tolerance", REPEAT_VARIETY, -0.8),
        l("low_repetition_tolerance", CONTROL_FREEDOM, -0.4),
        l("needs_quick_wins", REPEAT_VARIETY, -0.4),
        l("vr_inclination", SENSORY_INTENSITY, 0.5),
        l("vr_inclination", TECH_INTUITION, -0.2),
    ]
}

// =============================================================================
// Inputs and profile
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringPath {
    Explicit,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Contribution {
    /// Per-axis values from an explicit option table.
    Explicit(BTreeMap<String, f64>),
    /// Trait signals matched in the answer, mapped through the trait→axis table.
    Heuristic(Vec<TraitSignal>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionInput {
    pub question_id: String,
    pub weight: f64,
    pub contribution: Contribution,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisProfile {
    pub scores: BTreeMap<String, f64>,
    pub provenance: BTreeMap<String, ScoringPath>,
    /// Set when any axis was produced by the heuristic path.
    pub low_confidence: bool,
}

impl AxisProfile {
    pub fn get(&self, axis: &str) -> Option<f64> {
        self.scores.get(axis).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Fraction of `total_axes` with a value of magnitude at least `min_magnitude`.
    pub fn coverage(&self, total_axes: usize, min_magnitude: f64) -> f64 {
        if total_axes == 0 {
            return 0.0;
        }
        let covered = self
            .scores
            .values()
            .filter(|v| v.abs() >= min_magnitude)
            .count();
        (covered as f64 / total_axes as f64).min(1.0)
    }
}

// =============================================================================
// Aggregator
// =============================================================================

#[derive(Debug, Clone)]
pub struct AxisAggregator {
    axes: Vec<AxisDef>,
    links: Vec<TraitAxisLink>,
}

impl Default for AxisAggregator {
    fn default() -> Self {
        Self::new(default_axes(), default_trait_axis_links())
    }
}

impl AxisAggregator {
    pub fn new(axes: Vec<AxisDef>, links: Vec<TraitAxisLink>) -> Self {
        Self { axes, links }
    }

    pub fn axes(&self) -> &[AxisDef] {
        &self.axes
    }

    pub fn bound(&self, axis: &str) -> Option<AxisBound> {
        self.axes.iter().find(|a| a.name == axis).map(|a| a.bound)
    }

    /// Build per-question inputs. Explicit questions use their option table;
    /// every other answered question falls back to its trait signals.
    pub fn inputs_for(
        &self,
        answers: &Answers,
        per_question: &BTreeMap<String, Vec<TraitSignal>>,
        questionnaire: Option<&Questionnaire>,
    ) -> Vec<QuestionInput> {
        let mut inputs = Vec::new();
        for (qid, value) in answers {
            if value.is_blank() {
                continue;
            }
            let spec = questionnaire.and_then(|q| q.get(qid));
            let weight = spec.map(|s| s.weight).unwrap_or(1.0);
            match spec {
                Some(spec) if spec.is_explicit() => {
                    if let Some(values) = spec.explicit_contribution(value) {
                        inputs.push(QuestionInput {
                            question_id: qid.clone(),
                            weight,
                            contribution: Contribution::Explicit(values),
                        });
                    }
                }
                _ => {
                    let signals = per_question.get(qid).cloned().unwrap_or_default();
                    inputs.push(QuestionInput {
                        question_id: qid.clone(),
                        weight,
                        contribution: Contribution::Heuristic(signals),
                    });
                }
            }
        }
        inputs
    }

    /// Weighted average per axis over the questions that contributed to it.
    ///
    /// Axes with no contribution are absent. Every output value is clamped to
    /// its axis bound. Input order does not affect the result.
    pub fn aggregate(&self, inputs: &[QuestionInput]) -> AxisProfile {
        let mut ordered: Vec<&QuestionInput> = inputs
            .iter()
            .filter(|i| i.weight.is_finite() && i.weight > 0.0)
            .collect();
        ordered.sort_by(|a, b| a.question_id.cmp(&b.question_id));

        let explicit_axes: BTreeSet<String> = ordered
            .iter()
            .filter_map(|i| match &i.contribution {
                Contribution::Explicit(values) => Some(values),
                Contribution::Heuristic(_) => None,
            })
            .flat_map(|values| {
                values
                    .iter()
                    .filter(|(axis, v)| v.is_finite() && self.bound(axis).is_some())
                    .map(|(axis, _)| axis.clone())
            })
            .collect();

        let mut sums: BTreeMap<String, (f64, f64)> = BTreeMap::new();
        let mut provenance: BTreeMap<String, ScoringPath> = BTreeMap::new();

        for input in ordered {
            let (values, path) = match &input.contribution {
                Contribution::Explicit(values) => (values.clone(), ScoringPath::Explicit),
                Contribution::Heuristic(signals) => {
                    let mut values = self.heuristic_values(signals);
                    values.retain(|axis, _| !explicit_axes.contains(axis));
                    (values, ScoringPath::Heuristic)
                }
            };

            for (axis, raw) in values {
                let Some(bound) = self.bound(&axis) else {
                    debug!(axis = %axis, question = %input.question_id, "ignoring undeclared axis");
                    continue;
                };
                if !raw.is_finite() {
                    continue;
                }
                let entry = sums.entry(axis.clone()).or_insert((0.0, 0.0));
                entry.0 += input.weight * bound.clamp(raw);
                entry.1 += input.weight;
                provenance.insert(axis, path);
            }
        }

        let scores: BTreeMap<String, f64> = sums
            .into_iter()
            .filter(|(_, (_, w))| *w > 0.0)
            .filter_map(|(axis, (wv, w))| {
                let bound = self.bound(&axis)?;
                Some((axis, bound.clamp(wv / w)))
            })
            .collect();
        provenance.retain(|axis, _| scores.contains_key(axis));
        let low_confidence = provenance.values().any(|p| *p == ScoringPath::Heuristic);

        AxisProfile {
            scores,
            provenance,
            low_confidence,
        }
    }

    fn heuristic_values(&self, signals: &[TraitSignal]) -> BTreeMap<String, f64> {
        let mut values: BTreeMap<String, f64> = BTreeMap::new();
        for signal in signals.iter().filter(|s| s.strength > 0.0) {
            for link in self.links.iter().filter(|l| l.trait_name == signal.name) {
                *values.entry(link.axis.clone()).or_insert(0.0) += link.coefficient * signal.strength;
            }
        }
        values
    }
}

// =============================================================================
// Derived readings
// =============================================================================

/// Threshold for reading a bipolar axis as a binary trait.
pub const BINARY_TRAIT_THRESHOLD: f64 = 0.35;
/// Threshold for surfacing a silent driver.
pub const SILENT_DRIVER_THRESHOLD: f64 = 0.4;

const POLES: &[(&str, &str, &str)] = &[
    (TECH_INTUITION, "technical", "intuitive"),
    (CALM_ADRENALINE, "calm", "adrenaline"),
    (SOLO_GROUP, "solo", "group"),
    (REPEAT_VARIETY, "repetition", "variety"),
    (CONTROL_FREEDOM, "control", "freedom"),
];

/// Pole names for axes whose magnitude reaches the binary-trait threshold.
pub fn binary_traits(profile: &AxisProfile) -> Vec<String> {
    let mut out = Vec::new();
    for (axis, positive, negative) in POLES {
        match profile.get(axis) {
            Some(v) if v >= BINARY_TRAIT_THRESHOLD => out.push(positive.to_string()),
            Some(v) if v <= -BINARY_TRAIT_THRESHOLD => out.push(negative.to_string()),
            _ => {}
        }
    }
    match profile.get(SENSORY_INTENSITY) {
        Some(v) if v >= 0.5 + BINARY_TRAIT_THRESHOLD => out.push("high_intensity".to_string()),
        Some(v) if v <= 0.5 - BINARY_TRAIT_THRESHOLD => out.push("low_intensity".to_string()),
        _ => {}
    }
    out
}

/// Short statements of what quietly drives the person, localized.
pub fn silent_drivers(profile: &AxisProfile, lang: Lang) -> Vec<String> {
    let table: &[(&str, &str, &str, &str, &str)] = &[
        (
            TECH_INTUITION,
            "Mastery through precise, repeatable technique",
            "Flow through instinct and feel",
            "الإتقان عبر تقنية دقيقة",
            "الانسياب بالحدس والإحساس",
        ),
        (
            CALM_ADRENALINE,
            "A need for inner quiet and steady breathing",
            "A hunger for intensity and a racing pulse",
            "حاجة لهدوء داخلي وتنفس ثابت",
            "جوع للشدة ونبض متسارع",
        ),
        (
            SOLO_GROUP,
            "Recharging in your own space",
            "Energy that grows with other people",
            "شحن الطاقة في مساحتك الخاصة",
            "طاقة تكبر مع الناس",
        ),
        (
            REPEAT_VARIETY,
            "Comfort in deepening one ritual",
            "Restlessness that wants new challenges",
            "راحة في تعميق طقس واحد",
            "فضول يبحث عن تحديات جديدة",
        ),
        (
            CONTROL_FREEDOM,
            "Wanting every variable under control",
            "Wanting room to improvise",
            "رغبة في ضبط كل تفصيلة",
            "رغبة في مساحة للارتجال",
        ),
    ];
    let mut out = Vec::new();
    for (axis, pos_en, neg_en, pos_ar, neg_ar) in table {
        let Some(v) = profile.get(axis) else { continue };
        let picked = if v >= SILENT_DRIVER_THRESHOLD {
            Some((pos_en, pos_ar))
        } else if v <= -SILENT_DRIVER_THRESHOLD {
            Some((neg_en, neg_ar))
        } else {
            None
        };
        if let Some((en, ar)) = picked {
            out.push(match lang {
                Lang::En => en.to_string(),
                Lang::Ar => ar.to_string(),
            });
        }
    }
    out
}
