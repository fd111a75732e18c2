//! Request facade: answers in, `k` cards or an insufficient-evidence signal out.
//!
//! The scoring core runs synchronously inside `recommend`. The only awaits are
//! the optional generation call and the result cache.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::answers::{Answers, Lang, Questionnaire};
use crate::arbitrator::{ArbitrationError, GenerationArbitrator, GenerationPath};
use crate::axes::{binary_traits, silent_drivers, AxisAggregator, AxisProfile};
use crate::cache::{CacheError, CachedResult, InMemoryResultCache, ResultCache, ResultCacheKey, SqliteResultCache};
use crate::cards::RecommendationCard;
use crate::catalog::{Catalog, CatalogHandle, CatalogLoadError};
use crate::config::{ConfigError, EngineConfig};
use crate::consensus::{consensus, ConsensusResult};
use crate::evidence::{assess, EvidenceReport, EvidenceStatus};
use crate::gateway::{ChatModel, ProviderGateway, TracingUsageSink};
use crate::generation::{ChatTextGenerator, TextGenerator};
use crate::prompts::RecommendationBrief;
use crate::quality::QualityGuard;
use crate::ranker::{rank, RankContext, RankedCandidate};
use crate::render::render_cards;
use crate::signals::{detect_intents, SignalExtractor};
use crate::systems::{ExcludedScorer, SystemRegistry};
use crate::telemetry::{self, NoopTelemetry, TelemetrySink};
use crate::text;

/// Ranked candidates kept in the result metadata.
const RANKED_HEAD_LEN: usize = 5;
/// Longest answer excerpt passed to the generator.
const ANSWER_LINE_MAX_CHARS: usize = 400;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogLoadError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("render error: {0}")]
    Render(String),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Catalog(_) => "catalog",
            EngineError::Config(_) => "config",
            EngineError::Cache(_) => "cache",
            EngineError::Render(_) => "render",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendRequest {
    pub answers: Answers,
    #[serde(default)]
    pub lang: Lang,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl RecommendRequest {
    pub fn new(answers: Answers, lang: Lang) -> Self {
        Self {
            answers,
            lang,
            user_id: None,
        }
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    /// Exactly `k` cards.
    pub cards: Vec<RecommendationCard>,
    pub rendered: String,
    pub path: GenerationPath,
    pub failure_reason: Option<String>,
    pub consensus: ConsensusResult,
    pub axis_profile: AxisProfile,
    pub evidence: EvidenceReport,
    /// Heuristic axes were used, or no scorer contributed to consensus.
    pub low_confidence: bool,
    pub ranked_head: Vec<RankedCandidate>,
    #[serde(default)]
    pub excluded_systems: Vec<ExcludedScorer>,
    #[serde(default)]
    pub intents: Vec<String>,
    #[serde(default)]
    pub catalog_version: String,
    #[serde(default)]
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecommendOutcome {
    Recommendations(RecommendationSet),
    InsufficientEvidence {
        reason: String,
        follow_up_questions: Vec<String>,
    },
}

impl RecommendOutcome {
    pub fn recommendations(&self) -> Option<&RecommendationSet> {
        match self {
            RecommendOutcome::Recommendations(set) => Some(set),
            RecommendOutcome::InsufficientEvidence { .. } => None,
        }
    }

    pub fn into_recommendations(self) -> Option<RecommendationSet> {
        match self {
            RecommendOutcome::Recommendations(set) => Some(set),
            RecommendOutcome::InsufficientEvidence { .. } => None,
        }
    }
}

// =============================================================================
// ENGINE
// =============================================================================

pub struct RecommendationEngine {
    catalog: CatalogHandle,
    config: EngineConfig,
    registry: SystemRegistry,
    extractor: SignalExtractor,
    aggregator: AxisAggregator,
    questionnaire: Option<Questionnaire>,
    arbitrator: GenerationArbitrator,
    cache: Option<Arc<dyn ResultCache>>,
    telemetry: Arc<dyn TelemetrySink>,
    guard: Mutex<Option<(Arc<Catalog>, Arc<QualityGuard>)>>,
}

impl RecommendationEngine {
    /// Engine over `catalog` with default scorers, no cache and no generator.
    pub fn new(catalog: Catalog, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let engine = Self {
            catalog: CatalogHandle::new(catalog),
            arbitrator: GenerationArbitrator::new(config.arbitrator_config()),
            config,
            registry: SystemRegistry::default(),
            extractor: SignalExtractor::default(),
            aggregator: AxisAggregator::default(),
            questionnaire: None,
            cache: None,
            telemetry: Arc::new(NoopTelemetry),
            guard: Mutex::new(None),
        };
        // Fail at construction, not on the first request, if the guard cannot be built.
        engine.guard_for(&engine.catalog.snapshot())?;
        Ok(engine)
    }

    /// Build everything `config` names: catalog, questionnaire, cache and,
    /// when a model and `OPENROUTER_API_KEY` are both present, the generator.
    pub fn from_config(config: EngineConfig) -> Result<Self, EngineError> {
        let catalog = match &config.catalog_path {
            Some(path) => Catalog::load(path)?,
            None => Catalog::builtin()?,
        };
        let questionnaire = match &config.questions_path {
            Some(path) => Some(Questionnaire::load(path).map_err(ConfigError::from)?),
            None => None,
        };
        let cache: Option<Arc<dyn ResultCache>> = if config.cache.disabled {
            None
        } else {
            match &config.cache.path {
                Some(path) => Some(Arc::new(SqliteResultCache::new(path)?)),
                None => Some(Arc::new(InMemoryResultCache::new(config.cache.capacity))),
            }
        };
        let generator = match &config.generation.model {
            Some(model) => openrouter_generator(model, config.generation.temperature, config.generation.timeout()),
            None => None,
        };

        let mut engine = Self::new(catalog, config)?;
        engine.questionnaire = questionnaire;
        engine.cache = cache;
        if let Some(generator) = generator {
            engine.arbitrator.set_generator(generator);
        }
        Ok(engine)
    }

    pub fn with_registry(mut self, registry: SystemRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_extractor(mut self, extractor: SignalExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_aggregator(mut self, aggregator: AxisAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_questionnaire(mut self, questionnaire: Questionnaire) -> Self {
        self.questionnaire = Some(questionnaire);
        self
    }

    pub fn with_generator(self, generator: Arc<dyn TextGenerator>) -> Self {
        self.arbitrator.set_generator(generator);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &CatalogHandle {
        &self.catalog
    }

    /// Swap generators in and out between requests.
    pub fn arbitrator(&self) -> &GenerationArbitrator {
        &self.arbitrator
    }

    /// Hot-reload the catalog. A bad file leaves the current snapshot in place.
    pub fn reload_catalog(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let snapshot = self.catalog.reload_from(path)?;
        self.guard_for(&snapshot)?;
        Ok(())
    }

    /// Full ranking for `answers`, guarded items last. No generation, no cache.
    pub fn rank(&self, answers: &Answers, lang: Lang) -> Vec<RankedCandidate> {
        let snapshot = self.catalog.snapshot();
        self.score(answers, lang, &snapshot).ranked
    }

    pub async fn recommend(&self, request: RecommendRequest) -> Result<RecommendOutcome, EngineError> {
        let RecommendRequest { answers, lang, user_id } = request;
        let snapshot = self.catalog.snapshot();
        let key = ResultCacheKey::new(lang, user_id.as_deref(), &answers);
        let backend = self.arbitrator.backend_label();

        if let Some(hit) = self.cached(&key, &snapshot, &backend).await {
            return Ok(RecommendOutcome::Recommendations(hit));
        }

        let evidence = assess(&answers, lang, &self.config.evidence);
        if self.config.evidence.require_pass && evidence.status == EvidenceStatus::Fail {
            debug!(score = evidence.score, answered = evidence.answered_count, "evidence gate failed");
            return Ok(RecommendOutcome::InsufficientEvidence {
                reason: format!("evidence score {:.2} below threshold", evidence.score),
                follow_up_questions: evidence.follow_up_questions,
            });
        }

        let scored = self.score(&answers, lang, &snapshot);
        let guard = self.guard_for(&snapshot)?;
        let brief = self.brief(&answers, lang, &scored);

        let arbitration = match self.arbitrator.arbitrate(&brief, &scored.ranked, &snapshot, &guard).await {
            Ok(arbitration) => arbitration,
            Err(err @ ArbitrationError::InsufficientCandidates { .. }) => {
                warn!(error = %err, catalog_version = snapshot.version(), "not enough eligible catalog items");
                return Ok(RecommendOutcome::InsufficientEvidence {
                    reason: err.to_string(),
                    follow_up_questions: evidence.follow_up_questions,
                });
            }
        };

        if let Some(reason) = &arbitration.failure_reason {
            self.telemetry.log(
                telemetry::GENERATION_FAILED,
                json!({ "reason": reason, "attempts": arbitration.attempts }),
            );
        }
        if arbitration.repaired_cards > 0 {
            self.telemetry.log(
                telemetry::QUALITY_REPAIRED,
                json!({ "cards": arbitration.repaired_cards, "path": arbitration.path.as_str() }),
            );
        }

        let rendered = render_cards(&arbitration.cards, lang);
        if arbitration.cards.len() != self.config.k {
            return Err(EngineError::Render(format!(
                "expected {} cards, got {}",
                self.config.k,
                arbitration.cards.len()
            )));
        }

        let low_confidence = scored.axes.low_confidence || scored.consensus.is_insufficient();
        let set = RecommendationSet {
            cards: arbitration.cards,
            rendered,
            path: arbitration.path,
            failure_reason: arbitration.failure_reason,
            consensus: scored.consensus,
            axis_profile: scored.axes,
            evidence,
            low_confidence,
            ranked_head: scored.ranked.into_iter().take(RANKED_HEAD_LEN).collect(),
            excluded_systems: scored.excluded,
            intents: scored.intents,
            catalog_version: snapshot.version().to_string(),
            cached: false,
        };

        self.store(&key, &set, &backend).await;
        self.telemetry.log(
            telemetry::RECOMMENDATION_COMPLETED,
            json!({
                "path": set.path.as_str(),
                "failure_reason": set.failure_reason,
                "consensus_confidence": set.consensus.confidence,
                "k": set.cards.len(),
                "low_confidence": set.low_confidence,
                "catalog_version": set.catalog_version,
            }),
        );
        info!(
            path = set.path.as_str(),
            lang = lang.as_str(),
            consensus_confidence = set.consensus.confidence,
            low_confidence = set.low_confidence,
            "recommendation completed"
        );
        Ok(RecommendOutcome::Recommendations(set))
    }

    // -------------------------------------------------------------------------
    // Scoring core
    // -------------------------------------------------------------------------

    fn score(&self, answers: &Answers, lang: Lang, catalog: &Catalog) -> Scored {
        let questionnaire = self.questionnaire.as_ref();
        let signals = self.extractor.extract_with(answers, questionnaire);
        let per_question = self.extractor.extract_per_question(answers, questionnaire);
        let inputs = self.aggregator.inputs_for(answers, &per_question, questionnaire);
        let axes = self.aggregator.aggregate(&inputs);

        let run = self.registry.run(answers, lang);
        let consensus = consensus(&run.profiles);
        if consensus.is_insufficient() {
            debug!(excluded = run.excluded.len(), "no scorer contributed; ranking without consensus");
        }

        let intents = detect_intents(answers, catalog.intent_keywords());
        let ctx = RankContext::new(&signals, &axes, &intents);
        let ranked = rank(&ctx, catalog.guards(), catalog.items());

        Scored {
            axes,
            consensus,
            excluded: run.excluded,
            intents,
            ranked,
        }
    }

    fn brief(&self, answers: &Answers, lang: Lang, scored: &Scored) -> RecommendationBrief {
        let answer_lines = answers
            .iter()
            .filter(|(_, value)| !value.is_blank())
            .map(|(qid, value)| {
                let label = value.question_text().unwrap_or(qid.as_str());
                text::clip(&format!("{label}: {}", value.as_text()), ANSWER_LINE_MAX_CHARS)
            })
            .collect();
        let ranked_hints = scored
            .ranked
            .iter()
            .filter(|c| !c.is_guarded())
            .take(self.config.k * 2)
            .map(|c| c.item_id.clone())
            .collect();

        RecommendationBrief {
            lang,
            k: self.config.k,
            answer_lines,
            axis_profile: scored.axes.scores.clone(),
            binary_traits: binary_traits(&scored.axes),
            silent_drivers: silent_drivers(&scored.axes, lang),
            consensus: scored.consensus.top_candidates.clone(),
            intents: scored.intents.clone(),
            ranked_hints,
        }
    }

    /// Quality guard for this snapshot, rebuilt only when the catalog changes.
    fn guard_for(&self, snapshot: &Arc<Catalog>) -> Result<Arc<QualityGuard>, EngineError> {
        let mut slot = match self.guard.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some((catalog, guard)) = slot.as_ref() {
            if Arc::ptr_eq(catalog, snapshot) {
                return Ok(Arc::clone(guard));
            }
        }
        let guard = QualityGuard::for_catalog(self.config.quality.clone(), snapshot)
            .map(Arc::new)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        *slot = Some((Arc::clone(snapshot), Arc::clone(&guard)));
        Ok(guard)
    }

    // -------------------------------------------------------------------------
    // Cache
    // -------------------------------------------------------------------------

    async fn cached(&self, key: &ResultCacheKey, snapshot: &Catalog, backend: &str) -> Option<RecommendationSet> {
        let cache = self.cache.as_ref()?;
        let entry = match cache.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "result cache lookup failed; bypassing");
                return None;
            }
        };
        if entry.catalog_version != snapshot.version() {
            debug!(cached = %entry.catalog_version, current = snapshot.version(), "stale cache entry ignored");
            return None;
        }
        if entry.backend != backend {
            debug!(cached = %entry.backend, current = backend, "cache entry from another backend ignored");
            return None;
        }
        match serde_json::from_value::<RecommendationSet>(entry.payload) {
            Ok(mut set) => {
                set.cached = true;
                self.telemetry.log(
                    telemetry::CACHE_HIT,
                    json!({ "path": set.path.as_str(), "catalog_version": set.catalog_version }),
                );
                Some(set)
            }
            Err(err) => {
                warn!(error = %err, "unreadable cache entry; recomputing");
                None
            }
        }
    }

    async fn store(&self, key: &ResultCacheKey, set: &RecommendationSet, backend: &str) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let payload = match serde_json::to_value(set) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "result not cacheable");
                return;
            }
        };
        let entry = CachedResult {
            catalog_version: set.catalog_version.clone(),
            backend: backend.to_string(),
            path: set.path.as_str().to_string(),
            payload,
        };
        if let Err(err) = cache.put(key, &entry).await {
            warn!(error = %err, "result cache write failed; continuing");
        }
    }
}

struct Scored {
    axes: AxisProfile,
    consensus: ConsensusResult,
    excluded: Vec<ExcludedScorer>,
    intents: Vec<String>,
    ranked: Vec<RankedCandidate>,
}

/// OpenRouter-backed generator, or None when the API key is missing.
fn openrouter_generator(model: &str, temperature: f32, timeout: Duration) -> Option<Arc<dyn TextGenerator>> {
    match ProviderGateway::from_env(timeout, Arc::new(TracingUsageSink)) {
        Ok(gateway) => {
            let generator = ChatTextGenerator::new(Arc::new(gateway), ChatModel::openrouter(model))
                .temperature(temperature);
            Some(Arc::new(generator))
        }
        Err(err) => {
            warn!(model, error = %err, "generation backend unavailable; fallback only");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answers::AnswerValue;

    fn engine() -> RecommendationEngine {
        RecommendationEngine::new(Catalog::builtin().unwrap(), EngineConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_fallback_set_has_k_cards_and_rendered_text() {
        let answers: Answers = [("q1".to_string(), AnswerValue::text("I love calm water and steady breathing"))]
            .into_iter()
            .collect();
        let outcome = engine().recommend(RecommendRequest::new(answers, Lang::En)).await.unwrap();
        let set = outcome.recommendations().unwrap();
        assert_eq!(set.cards.len(), 3);
        assert_eq!(set.path, GenerationPath::Fallback);
        assert!(set.rendered.contains(&set.cards[0].label));
        assert_eq!(set.ranked_head.len(), 5);
        assert!(!set.cached);
    }

    #[tokio::test]
    async fn test_required_evidence_gate_short_circuits() {
        let mut config = EngineConfig::default();
        config.evidence.require_pass = true;
        let engine = RecommendationEngine::new(Catalog::builtin().unwrap(), config).unwrap();
        let outcome = engine.recommend(RecommendRequest::default()).await.unwrap();
        match outcome {
            RecommendOutcome::InsufficientEvidence { follow_up_questions, .. } => {
                assert!(!follow_up_questions.is_empty());
            }
            other => panic!("expected insufficient evidence, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cache_hit_is_marked_and_skips_recompute() {
        let engine = engine().with_cache(Arc::new(InMemoryResultCache::new(8)));
        let request = RecommendRequest::default().user("u1");
        let first = engine.recommend(request.clone()).await.unwrap().into_recommendations().unwrap();
        let second = engine.recommend(request).await.unwrap().into_recommendations().unwrap();
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.cards, second.cards);
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = RecommendOutcome::InsufficientEvidence {
            reason: "x".into(),
            follow_up_questions: vec![],
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "insufficient_evidence");
    }
}
