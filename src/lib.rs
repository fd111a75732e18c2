#![forbid(unsafe_code)]

//! # sportsync-engine
//!
//! Turns questionnaire answers into a small, diverse set of sport identity
//! cards.
//!
//! Answers are mined for trait signals, folded into a bounded multi-axis
//! profile, and scored by several independent personality systems whose
//! suggestions are merged by vote. A static catalog is ranked under guard
//! rules, and the final `k` cards come either from a generative backend or
//! from a deterministic fallback. Both paths pass a diversity selector and a
//! quality guard before anything is returned.
//!
//! The entry point is [`RecommendationEngine::recommend`].

pub mod answers;
pub mod arbitrator;
pub mod axes;
pub mod cache;
pub mod cards;
pub mod catalog;
pub mod config;
pub mod consensus;
pub mod diversity;
pub mod engine;
pub mod evidence;
pub mod gateway;
pub mod generation;
pub mod jobs;
pub mod prompts;
pub mod quality;
pub mod ranker;
pub mod render;
pub mod signals;
pub mod systems;
pub mod telemetry;
pub mod text;

pub use answers::{AnswerValue, Answers, Lang, Questionnaire};
pub use arbitrator::{Arbitration, ArbitratorConfig, GenerationArbitrator, GenerationPath};
pub use axes::{AxisAggregator, AxisProfile};
pub use cache::{InMemoryResultCache, ResultCache, ResultCacheKey, SqliteResultCache};
pub use cards::RecommendationCard;
pub use catalog::{Catalog, CatalogHandle, CatalogItem, CatalogLoadError, GuardRule, RiskLevel};
pub use config::{ConfigError, EngineConfig};
pub use consensus::{consensus, ConsensusResult};
pub use diversity::select_diverse;
pub use engine::{EngineError, RecommendOutcome, RecommendRequest, RecommendationEngine, RecommendationSet};
pub use evidence::{EvidenceReport, EvidenceStatus};
pub use gateway::{ChatGateway, ProviderGateway, UsageSink};
pub use generation::{ChatTextGenerator, GenerationError, TextGenerator};
pub use jobs::{spawn_recommendation_job, InMemoryJobStore, JobId, JobSnapshot, JobStatus, JobStore, SqliteJobStore};
pub use quality::{QualityConfig, QualityGuard, QualityReport};
pub use ranker::{rank, RankedCandidate};
pub use signals::{SignalExtractor, SignalSet, TraitSignal};
pub use systems::{SystemProfile, SystemRegistry, SystemScorer};
pub use telemetry::{JsonlTelemetrySink, TelemetrySink};
