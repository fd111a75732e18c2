//! Catalog ranking: priors, trait weights, intent boosts and guard penalties.
//!
//! Every catalog item comes back, fully ordered. Guarded items keep their
//! (penalized) score and sort after every unguarded item so the penalty stays
//! auditable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::axes::AxisProfile;
use crate::catalog::{CatalogItem, GuardRule};
use crate::signals::SignalSet;
use crate::text;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub item_id: String,
    pub score: f64,
    pub reasons: Vec<String>,
    /// Ids of guards that fired for this item.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guarded_by: Vec<String>,
}

impl RankedCandidate {
    pub fn is_guarded(&self) -> bool {
        !self.guarded_by.is_empty()
    }
}

/// Everything the ranker reads from one request.
#[derive(Debug, Clone, Default)]
pub struct RankContext {
    /// Trait-signal strengths, plus axis values for names no signal uses.
    pub strengths: BTreeMap<String, f64>,
    pub intents: Vec<String>,
}

impl RankContext {
    pub fn new(signals: &SignalSet, axes: &AxisProfile, intents: &[String]) -> Self {
        Self {
            strengths: trait_strengths(signals, axes),
            intents: intents.to_vec(),
        }
    }
}

/// Merge signals and axes into one lookup. Signal names win over axis names.
pub fn trait_strengths(signals: &SignalSet, axes: &AxisProfile) -> BTreeMap<String, f64> {
    let mut out = signals.as_map();
    for (axis, value) in &axes.scores {
        out.entry(axis.clone()).or_insert(*value);
    }
    out
}

/// Rank every item. The result is total and deterministic.
pub fn rank(ctx: &RankContext, guards: &[GuardRule], items: &[CatalogItem]) -> Vec<RankedCandidate> {
    let mut scored: Vec<(usize, String, RankedCandidate)> = items
        .iter()
        .enumerate()
        .map(|(idx, item)| (idx, text::canon(&item.label), score_item(ctx, guards, item)))
        .collect();

    scored.sort_by(|(ia, la, a), (ib, lb, b)| {
        let item_a = &items[*ia];
        let item_b = &items[*ib];
        a.is_guarded()
            .cmp(&b.is_guarded())
            .then_with(|| b.score.total_cmp(&a.score))
            .then_with(|| item_b.prior.total_cmp(&item_a.prior))
            .then_with(|| la.cmp(lb))
            .then_with(|| ia.cmp(ib))
    });

    scored.into_iter().map(|(_, _, c)| c).collect()
}

fn score_item(ctx: &RankContext, guards: &[GuardRule], item: &CatalogItem) -> RankedCandidate {
    let mut reasons = vec![format!("prior {:+.3}", item.prior)];
    let mut score = item.prior;

    for (name, weight) in &item.trait_weights {
        let strength = ctx.strengths.get(name).copied().unwrap_or(0.0);
        let term = strength * weight;
        if term != 0.0 {
            score += term;
            reasons.push(format!("trait {name} {strength:.2}x{weight:+.2} = {term:+.3}"));
        }
    }

    for intent in &ctx.intents {
        if let Some(boost) = item.intent_boosts.get(intent) {
            score += boost;
            reasons.push(format!("intent {intent} {boost:+.3}"));
        }
    }

    let mut guarded_by = Vec::new();
    for guard in guards {
        if guard.applies_to_item(item) && guard.condition.holds(&ctx.strengths) {
            score -= guard.penalty;
            guarded_by.push(guard.id.clone());
            reasons.push(format!("guard {} -{:e}", guard.id, guard.penalty));
        }
    }

    RankedCandidate {
        item_id: item.id.clone(),
        score,
        reasons,
        guarded_by,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{default_guards, RiskLevel};

    fn strengths(pairs: &[(&str, f64)]) -> RankContext {
        RankContext {
            strengths: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            ..RankContext::default()
        }
    }

    #[test]
    fn test_score_formula_adds_prior_traits_and_intents() {
        let items = vec![CatalogItem::new("a", "Alpha", 0.1)
            .with_weight("precision", 0.5)
            .with_intent("focus", 0.2)];
        let mut ctx = strengths(&[("precision", 0.8)]);
        ctx.intents = vec!["focus".into()];
        let ranked = rank(&ctx, &[], &items);
        assert!((ranked[0].score - (0.1 + 0.4 + 0.2)).abs() < 1e-12);
        assert_eq!(ranked[0].reasons.len(), 3);
    }

    #[test]
    fn test_guarded_item_sorts_last_but_stays_present() {
        let items = vec![
            CatalogItem::new("fight", "Fighter", 5.0).with_risk(RiskLevel::High),
            CatalogItem::new("calm", "Calm", 0.0),
        ];
        let ctx = strengths(&[("anxious", 0.9)]);
        let ranked = rank(&ctx, &default_guards(), &items);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[1].item_id, "fight");
        assert!(ranked[1].score < -1e8);
        assert_eq!(ranked[1].guarded_by, vec!["anxiety_blocks_high_risk"]);
    }

    #[test]
    fn test_ties_break_on_prior_then_label_then_index() {
        let items = vec![
            CatalogItem::new("b", "Beta", 0.0).with_weight("x", 0.2),
            CatalogItem::new("a", "Alpha", 0.2),
            CatalogItem::new("c", "Alpha", 0.2),
        ];
        let ctx = strengths(&[("x", 1.0)]);
        let ids: Vec<String> = rank(&ctx, &[], &items).into_iter().map(|c| c.item_id).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_axis_values_fill_missing_trait_names() {
        let mut signals = SignalSet::default();
        signals.signals.push(crate::signals::TraitSignal::new("calm_regulation", 0.4));
        let mut axes = AxisProfile::default();
        axes.scores.insert("calm_regulation".into(), -1.0);
        axes.scores.insert("solo_group".into(), 0.7);
        let merged = trait_strengths(&signals, &axes);
        assert_eq!(merged["calm_regulation"], 0.4);
        assert_eq!(merged["solo_group"], 0.7);
    }
}
