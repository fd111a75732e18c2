//! Vote-based merge of every system's suggestions into one ranking.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::systems::SystemProfile;

/// Maximum number of candidates in a consensus result.
pub const CONSENSUS_TOP_N: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub top_candidates: Vec<String>,
    pub confidence: f64,
    /// Number of systems that voted for the top candidate.
    pub agreement_count: usize,
    pub vote_table: BTreeMap<String, usize>,
    /// Systems that contributed at least one suggestion.
    pub contributing_systems: usize,
    /// Mean self-reported confidence of the contributing systems.
    pub mean_system_confidence: f64,
}

impl ConsensusResult {
    /// No system contributed. Downstream treats this as insufficient evidence
    /// and continues with ranker-only output.
    pub fn is_insufficient(&self) -> bool {
        self.top_candidates.is_empty()
    }
}

/// Count votes across systems and return the top candidates.
///
/// Ordering: more votes first, then more primary (first-listed) votes, then
/// candidate id. A system votes at most once per candidate.
pub fn consensus(profiles: &[SystemProfile]) -> ConsensusResult {
    let mut votes: BTreeMap<String, usize> = BTreeMap::new();
    let mut primary: BTreeMap<String, usize> = BTreeMap::new();
    let mut contributing = 0usize;
    let mut confidence_sum = 0.0;

    for profile in profiles {
        let mut seen = BTreeSet::new();
        for candidate in &profile.candidate_suggestions {
            let id = candidate.trim();
            if id.is_empty() || !seen.insert(id.to_string()) {
                continue;
            }
            *votes.entry(id.to_string()).or_insert(0) += 1;
        }
        if seen.is_empty() {
            continue;
        }
        if let Some(first) = profile
            .candidate_suggestions
            .iter()
            .map(|c| c.trim())
            .find(|c| !c.is_empty())
        {
            *primary.entry(first.to_string()).or_insert(0) += 1;
        }
        contributing += 1;
        confidence_sum += profile.confidence.clamp(0.0, 1.0);
    }

    if contributing == 0 {
        return ConsensusResult::default();
    }

    let mut ranked: Vec<(&String, usize)> = votes.iter().map(|(id, v)| (id, *v)).collect();
    ranked.sort_by(|(a_id, a_votes), (b_id, b_votes)| {
        b_votes
            .cmp(a_votes)
            .then_with(|| {
                let pa = primary.get(*a_id).copied().unwrap_or(0);
                let pb = primary.get(*b_id).copied().unwrap_or(0);
                pb.cmp(&pa)
            })
            .then_with(|| a_id.cmp(b_id))
    });

    let top_candidates: Vec<String> = ranked
        .iter()
        .take(CONSENSUS_TOP_N)
        .map(|(id, _)| (*id).clone())
        .collect();
    let agreement_count = ranked.first().map(|(_, v)| *v).unwrap_or(0);

    ConsensusResult {
        top_candidates,
        confidence: (agreement_count as f64 / contributing as f64).clamp(0.0, 1.0),
        agreement_count,
        vote_table: votes,
        contributing_systems: contributing,
        mean_system_confidence: confidence_sum / contributing as f64,
    }
}
