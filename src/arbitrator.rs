//! Generation arbitration: generated cards when a backend is configured and
//! its output passes the quality guard, deterministic catalog cards otherwise.
//!
//! Flow per request:
//! 1. No generator: straight to fallback.
//! 2. Generate under a timeout. Provider errors, timeouts and malformed output
//!    go straight to fallback with the error code as `failure_reason`.
//! 3. Quality or diversity violations trigger a repair prompt, at most
//!    `max_regenerations` times, then fallback.
//! 4. Fallback ranks, builds, repairs and diversifies catalog cards. It only
//!    fails when the catalog has fewer than `k` eligible items.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::answers::Lang;
use crate::cards::{card_for_item, RecommendationCard};
use crate::catalog::Catalog;
use crate::diversity::select_diverse;
use crate::generation::{parse_drafts, GenerationError, TextGenerator};
use crate::prompts::{RecommendationBrief, RECOMMEND_PROMPT, REPAIR_PROMPT};
use crate::quality::QualityGuard;
use crate::ranker::RankedCandidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationPath {
    Llm,
    Fallback,
}

impl GenerationPath {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationPath::Llm => "llm",
            GenerationPath::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArbitratorConfig {
    pub k: usize,
    pub max_similarity: f64,
    pub timeout: Duration,
    pub max_regenerations: u32,
}

impl Default for ArbitratorConfig {
    fn default() -> Self {
        Self {
            k: 3,
            max_similarity: crate::diversity::DEFAULT_MAX_SIMILARITY,
            timeout: Duration::from_secs(22),
            max_regenerations: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arbitration {
    pub cards: Vec<RecommendationCard>,
    pub path: GenerationPath,
    /// Why the generated path was abandoned. None when it was never tried.
    pub failure_reason: Option<String>,
    /// Generation calls made for this request.
    pub attempts: u32,
    /// Fallback cards the quality guard had to change.
    pub repaired_cards: usize,
}

#[derive(Debug, Error)]
pub enum ArbitrationError {
    #[error("only {eligible} eligible catalog items for {k} cards")]
    InsufficientCandidates { eligible: usize, k: usize },
}

/// Why one generated response was turned down.
enum Rejection {
    Fatal(GenerationError),
    Quality(Vec<String>),
}

pub struct GenerationArbitrator {
    generator: RwLock<Option<Arc<dyn TextGenerator>>>,
    /// Bumped on every set or clear.
    revision: AtomicU64,
    config: ArbitratorConfig,
}

impl GenerationArbitrator {
    pub fn new(config: ArbitratorConfig) -> Self {
        Self {
            generator: RwLock::new(None),
            revision: AtomicU64::new(0),
            config,
        }
    }

    pub fn with_generator(self, generator: Arc<dyn TextGenerator>) -> Self {
        self.set_generator(generator);
        self
    }

    pub fn config(&self) -> &ArbitratorConfig {
        &self.config
    }

    /// Takes effect from the next request.
    pub fn set_generator(&self, generator: Arc<dyn TextGenerator>) {
        self.replace_generator(Some(generator));
    }

    pub fn clear_generator(&self) {
        self.replace_generator(None);
    }

    fn replace_generator(&self, generator: Option<Arc<dyn TextGenerator>>) {
        let mut slot = match self.generator.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = generator;
        self.revision.fetch_add(1, Ordering::SeqCst);
    }

    /// Identifies the configured backend: `none`, or the generator name plus
    /// the swap revision. Results computed under another label are stale.
    pub fn backend_label(&self) -> String {
        let slot = match self.generator.read() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        match slot.as_ref() {
            Some(generator) => format!("{}#{}", generator.name(), self.revision.load(Ordering::SeqCst)),
            None => "none".to_string(),
        }
    }

    pub fn has_generator(&self) -> bool {
        self.current_generator().is_some()
    }

    fn current_generator(&self) -> Option<Arc<dyn TextGenerator>> {
        match self.generator.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub async fn arbitrate(
        &self,
        brief: &RecommendationBrief,
        ranked: &[RankedCandidate],
        catalog: &Catalog,
        guard: &QualityGuard,
    ) -> Result<Arbitration, ArbitrationError> {
        let Some(generator) = self.current_generator() else {
            return self.fallback(ranked, catalog, guard, brief.lang, None, 0);
        };

        let first = RECOMMEND_PROMPT.render(brief);
        let mut prompt = first.clone();
        let mut attempts = 0u32;

        let failure = loop {
            attempts += 1;
            let raw = match tokio::time::timeout(self.config.timeout, generator.generate(&prompt)).await {
                Err(_) => break GenerationError::Timeout(self.config.timeout),
                Ok(Err(err)) => break err,
                Ok(Ok(raw)) => raw,
            };

            let violations = match self.accept_generated(&raw, catalog, guard, brief.lang) {
                Ok(cards) => {
                    debug!(generator = generator.name(), attempts, "generated cards accepted");
                    return Ok(Arbitration {
                        cards,
                        path: GenerationPath::Llm,
                        failure_reason: None,
                        attempts,
                        repaired_cards: 0,
                    });
                }
                Err(Rejection::Fatal(err)) => break err,
                Err(Rejection::Quality(violations)) => violations,
            };

            if attempts > self.config.max_regenerations {
                let reason = format!("quality: {}", violations.join("; "));
                warn!(generator = generator.name(), attempts, reason = %reason, "generated cards rejected, using fallback");
                return self.fallback(ranked, catalog, guard, brief.lang, Some("quality".to_string()), attempts);
            }
            debug!(attempts, violations = violations.len(), "regenerating with repair prompt");
            prompt = REPAIR_PROMPT.render_repair(&first, &raw, &violations, brief.lang);
        };

        warn!(
            generator = generator.name(),
            code = failure.code(),
            error = %failure,
            "generation failed, using fallback"
        );
        self.fallback(ranked, catalog, guard, brief.lang, Some(failure.code().to_string()), attempts)
    }

    fn accept_generated(
        &self,
        raw: &str,
        catalog: &Catalog,
        guard: &QualityGuard,
        lang: Lang,
    ) -> Result<Vec<RecommendationCard>, Rejection> {
        let drafts = parse_drafts(raw).map_err(Rejection::Fatal)?;

        let mut accepted = Vec::new();
        let mut violations = Vec::new();
        for (idx, draft) in drafts.into_iter().enumerate() {
            let item_id = catalog.resolve(&draft.sport_label).map(|i| i.id.clone());
            let mut card = draft.into_card(item_id);
            for section in &mut card.body_sections {
                section.text = guard.sanitize_field(&section.text);
            }
            card.body_sections.retain(|s| !s.text.is_empty());
            card.reseal();

            let report = guard.validate_card(&card, lang);
            if report.is_valid() {
                accepted.push(card);
            } else {
                violations.extend(report.messages().into_iter().map(|m| format!("card {}: {m}", idx + 1)));
            }
        }

        let selection = select_diverse(&accepted, self.config.k, self.config.max_similarity);
        if selection.len() == self.config.k && !selection.relaxed {
            return Ok(selection.items);
        }
        if selection.relaxed {
            violations.push(format!("cards are too similar (max {})", self.config.max_similarity));
        } else {
            violations.push(format!("need {} distinct valid cards, got {}", self.config.k, selection.len()));
        }
        Err(Rejection::Quality(violations))
    }

    /// Deterministic path: unguarded items in rank order, repaired, then diversified.
    pub fn fallback(
        &self,
        ranked: &[RankedCandidate],
        catalog: &Catalog,
        guard: &QualityGuard,
        lang: Lang,
        failure_reason: Option<String>,
        attempts: u32,
    ) -> Result<Arbitration, ArbitrationError> {
        let k = self.config.k;
        let mut repaired_cards = 0;
        let mut pool = Vec::new();
        for candidate in ranked.iter().filter(|c| !c.is_guarded()) {
            let Some(item) = catalog.get(&candidate.item_id) else {
                continue;
            };
            let card = card_for_item(item, lang);
            let (fixed, residual) = guard.repair_card(&card, lang);
            if !residual.is_empty() {
                warn!(item = %item.id, residual = residual.len(), "card still invalid after repair, skipped");
                continue;
            }
            if fixed != card {
                debug!(item = %item.id, "quality guard repaired fallback card");
                repaired_cards += 1;
            }
            pool.push(fixed);
        }

        let selection = select_diverse(&pool, k, self.config.max_similarity);
        if selection.len() < k {
            return Err(ArbitrationError::InsufficientCandidates {
                eligible: selection.len(),
                k,
            });
        }
        Ok(Arbitration {
            cards: selection.items,
            path: GenerationPath::Fallback,
            failure_reason,
            attempts,
            repaired_cards,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::PromptInstance;
    use crate::quality::QualityConfig;
    use crate::ranker::{rank, RankContext};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Scripted {
        replies: Vec<Result<String, ()>>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn generate(&self, _prompt: &PromptInstance) -> Result<String, GenerationError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.replies.get(n.min(self.replies.len() - 1)) {
                Some(Ok(text)) => Ok(text.clone()),
                _ => Err(GenerationError::Empty),
            }
        }
    }

    fn setup() -> (Catalog, QualityGuard, Vec<RankedCandidate>) {
        let catalog = Catalog::builtin().unwrap();
        let guard = QualityGuard::for_catalog(QualityConfig::default(), &catalog).unwrap();
        let ranked = rank(&RankContext::default(), catalog.guards(), catalog.items());
        (catalog, guard, ranked)
    }

    fn brief() -> RecommendationBrief {
        RecommendationBrief {
            k: 3,
            ..RecommendationBrief::default()
        }
    }

    #[tokio::test]
    async fn test_no_generator_uses_fallback_without_failure() {
        let (catalog, guard, ranked) = setup();
        let arb = GenerationArbitrator::new(ArbitratorConfig::default());
        let out = arb.arbitrate(&brief(), &ranked, &catalog, &guard).await.unwrap();
        assert_eq!(out.path, GenerationPath::Fallback);
        assert_eq!(out.failure_reason, None);
        assert_eq!(out.cards.len(), 3);
        assert_eq!(out.attempts, 0);
    }

    #[tokio::test]
    async fn test_malformed_output_falls_back_without_regenerating() {
        let (catalog, guard, ranked) = setup();
        let gen = Arc::new(Scripted {
            replies: vec![Ok("sorry, no json".into())],
            calls: AtomicU32::new(0),
        });
        let arb = GenerationArbitrator::new(ArbitratorConfig::default()).with_generator(gen.clone());
        let out = arb.arbitrate(&brief(), &ranked, &catalog, &guard).await.unwrap();
        assert_eq!(out.path, GenerationPath::Fallback);
        assert_eq!(out.failure_reason.as_deref(), Some("malformed"));
        assert_eq!(gen.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_low_quality_output_regenerates_once_then_falls_back() {
        let (catalog, guard, ranked) = setup();
        let weak = r#"{"recommendations":[{"sport_label":"Anything","why_you":"just move"}]}"#;
        let gen = Arc::new(Scripted {
            replies: vec![Ok(weak.into())],
            calls: AtomicU32::new(0),
        });
        let arb = GenerationArbitrator::new(ArbitratorConfig::default()).with_generator(gen.clone());
        let out = arb.arbitrate(&brief(), &ranked, &catalog, &guard).await.unwrap();
        assert_eq!(out.path, GenerationPath::Fallback);
        assert_eq!(out.failure_reason.as_deref(), Some("quality"));
        assert_eq!(gen.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_backend_label_changes_on_every_swap() {
        let gen = Arc::new(Scripted {
            replies: vec![Ok(String::new())],
            calls: AtomicU32::new(0),
        });
        let arb = GenerationArbitrator::new(ArbitratorConfig::default());
        assert_eq!(arb.backend_label(), "none");

        arb.set_generator(gen.clone());
        let first = arb.backend_label();
        assert_eq!(first, "generator#1");

        arb.clear_generator();
        assert_eq!(arb.backend_label(), "none");
        arb.set_generator(gen);
        assert_ne!(arb.backend_label(), first);
    }

    #[tokio::test]
    async fn test_fallback_short_catalog_is_insufficient() {
        let (catalog, guard, ranked) = setup();
        let arb = GenerationArbitrator::new(ArbitratorConfig::default());
        let err = arb.fallback(&ranked[..2], &catalog, &guard, Lang::En, None, 0).unwrap_err();
        assert!(matches!(err, ArbitrationError::InsufficientCandidates { eligible: 2, k: 3 }));
    }
}
