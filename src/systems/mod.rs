//! Independent personality-taxonomy scorers behind one strategy interface.
//!
//! Each scorer reads the same answers and returns a labeled profile with a
//! short list of candidate suggestions. Scorers share no state. The registry
//! runs every scorer and excludes failures (errors or panics) from consensus
//! instead of aborting the request.

pub mod keyword;
pub mod mbti;
pub mod taxonomies;

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::answers::{Answers, Lang};

pub use keyword::{KeywordBucket, KeywordTaxonomy};
pub use mbti::MbtiScorer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemProfile {
    pub system_name: String,
    pub profile: BTreeMap<String, serde_json::Value>,
    pub confidence: f64,
    pub key_traits: Vec<String>,
    /// Candidate ids, strongest first. The first entry is the primary suggestion.
    pub candidate_suggestions: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ScorerError {
    #[error("{system}: no keyword evidence in answers")]
    NoSignal { system: String },
    #[error("{system}: {message}")]
    Failed { system: String, message: String },
}

impl ScorerError {
    pub fn no_signal(system: impl Into<String>) -> Self {
        Self::NoSignal {
            system: system.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NoSignal { .. } => "no_signal",
            Self::Failed { .. } => "failed",
        }
    }
}

pub trait SystemScorer: Send + Sync {
    fn name(&self) -> &str;

    fn score(&self, answers: &Answers, lang: Lang) -> Result<SystemProfile, ScorerError>;
}

/// A scorer left out of consensus, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedScorer {
    pub system_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemRun {
    pub profiles: Vec<SystemProfile>,
    pub excluded: Vec<ExcludedScorer>,
}

#[derive(Clone)]
pub struct SystemRegistry {
    scorers: Vec<Arc<dyn SystemScorer>>,
}

impl Default for SystemRegistry {
    fn default() -> Self {
        Self::new()
            .with(taxonomies::big_five())
            .with(MbtiScorer::default())
            .with(taxonomies::enneagram())
            .with(taxonomies::disc())
            .with(taxonomies::temperament())
            .with(taxonomies::sports_psychology())
    }
}

impl SystemRegistry {
    pub fn new() -> Self {
        Self {
            scorers: Vec::new(),
        }
    }

    pub fn with(mut self, scorer: impl SystemScorer + 'static) -> Self {
        self.scorers.push(Arc::new(scorer));
        self
    }

    pub fn register(&mut self, scorer: Arc<dyn SystemScorer>) {
        self.scorers.push(scorer);
    }

    pub fn names(&self) -> Vec<&str> {
        self.scorers.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.scorers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scorers.is_empty()
    }

    /// Run every scorer in registration order.
    pub fn run(&self, answers: &Answers, lang: Lang) -> SystemRun {
        let mut run = SystemRun::default();
        for scorer in &self.scorers {
            let name = scorer.name().to_string();
            let outcome = catch_unwind(AssertUnwindSafe(|| scorer.score(answers, lang)));
            match outcome {
                Ok(Ok(profile)) if !profile.candidate_suggestions.is_empty() => {
                    run.profiles.push(profile);
                }
                Ok(Ok(_)) => {
                    debug!(scorer = %name, "scorer returned no suggestions");
                    run.excluded.push(ExcludedScorer {
                        system_name: name,
                        reason: "no_suggestions".to_string(),
                    });
                }
                Ok(Err(err)) => {
                    match &err {
                        ScorerError::NoSignal { .. } => debug!(scorer = %name, "no signal"),
                        ScorerError::Failed { .. } => {
                            warn!(scorer = %name, error = %err, "scorer failed; excluded from consensus")
                        }
                    }
                    run.excluded.push(ExcludedScorer {
                        system_name: name,
                        reason: err.code().to_string(),
                    });
                }
                Err(_) => {
                    warn!(scorer = %name, "scorer panicked; excluded from consensus");
                    run.excluded.push(ExcludedScorer {
                        system_name: name,
                        reason: "panicked".to_string(),
                    });
                }
            }
        }
        run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answers::AnswerValue;

    struct Exploding;

    impl SystemScorer for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn score(&self, _answers: &Answers, _lang: Lang) -> Result<SystemProfile, ScorerError> {
            panic!("boom")
        }
    }

    struct Broken;

    impl SystemScorer for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn score(&self, _answers: &Answers, _lang: Lang) -> Result<SystemProfile, ScorerError> {
            Err(ScorerError::Failed {
                system: "broken".into(),
                message: "table missing".into(),
            })
        }
    }

    #[test]
    fn test_failing_scorers_are_excluded_not_fatal() {
        let registry = SystemRegistry::new()
            .with(Exploding)
            .with(Broken)
            .with(taxonomies::temperament());
        let mut answers = Answers::new();
        answers.insert("q".into(), AnswerValue::text("I stay calm and patient, peaceful"));
        let run = registry.run(&answers, Lang::En);
        assert_eq!(run.profiles.len(), 1);
        assert_eq!(run.profiles[0].system_name, "temperament");
        let reasons: Vec<&str> = run.excluded.iter().map(|e| e.reason.as_str()).collect();
        assert_eq!(reasons, vec!["panicked", "failed"]);
    }

    #[test]
    fn test_default_registry_has_six_independent_systems() {
        let registry = SystemRegistry::default();
        assert_eq!(
            registry.names(),
            vec!["big_five", "mbti", "enneagram", "disc", "temperament", "sports_psychology"]
        );
    }
}
