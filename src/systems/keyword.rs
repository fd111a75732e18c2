//! Bucket-based taxonomy scorer shared by most systems.

use std::collections::BTreeMap;

use serde_json::json;

use super::{ScorerError, SystemProfile, SystemScorer};
use crate::answers::{answers_blob, Answers, Lang};
use crate::text;

/// One taxonomy type: its trigger keywords and what it suggests.
#[derive(Debug, Clone)]
pub struct KeywordBucket {
    pub id: String,
    pub keywords: Vec<String>,
    pub key_traits: Vec<String>,
    pub suggestions: Vec<String>,
}

impl KeywordBucket {
    pub fn new(id: &str, keywords: &[&str], key_traits: &[&str], suggestions: &[&str]) -> Self {
        let owned = |xs: &[&str]| -> Vec<String> { xs.iter().map(|s| s.to_string()).collect() };
        Self {
            id: id.to_string(),
            keywords: owned(keywords),
            key_traits: owned(key_traits),
            suggestions: owned(suggestions),
        }
    }

    fn hits(&self, folded_blob: &str) -> usize {
        self.keywords
            .iter()
            .filter(|k| text::contains_phrase(folded_blob, k))
            .count()
    }
}

/// Picks the bucket with the most keyword hits. Ties go to the earlier bucket.
#[derive(Debug, Clone)]
pub struct KeywordTaxonomy {
    name: String,
    confidence: f64,
    buckets: Vec<KeywordBucket>,
}

impl KeywordTaxonomy {
    pub fn new(name: &str, confidence: f64, buckets: Vec<KeywordBucket>) -> Self {
        Self {
            name: name.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            buckets,
        }
    }

    pub fn buckets(&self) -> &[KeywordBucket] {
        &self.buckets
    }

    /// Hit counts per bucket, in priority order.
    pub fn bucket_hits(&self, answers: &Answers) -> Vec<(String, usize)> {
        let blob = text::fold(&answers_blob(answers));
        self.buckets
            .iter()
            .map(|b| (b.id.clone(), b.hits(&blob)))
            .collect()
    }
}

impl SystemScorer for KeywordTaxonomy {
    fn name(&self) -> &str {
        &self.name
    }

    fn score(&self, answers: &Answers, _lang: Lang) -> Result<SystemProfile, ScorerError> {
        let hits = self.bucket_hits(answers);

        let mut best: Option<(usize, usize)> = None;
        for (idx, (_, count)) in hits.iter().enumerate() {
            if *count == 0 {
                continue;
            }
            match best {
                Some((_, top)) if *count <= top => {}
                _ => best = Some((idx, *count)),
            }
        }
        let Some((best_idx, _)) = best else {
            return Err(ScorerError::no_signal(&self.name));
        };
        let bucket = &self.buckets[best_idx];

        let scores: BTreeMap<String, usize> = hits.into_iter().collect();
        let mut profile = BTreeMap::new();
        profile.insert("type".to_string(), json!(bucket.id));
        profile.insert("scores".to_string(), json!(scores));

        Ok(SystemProfile {
            system_name: self.name.clone(),
            profile,
            confidence: self.confidence,
            key_traits: bucket.key_traits.clone(),
            candidate_suggestions: bucket.suggestions.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answers::AnswerValue;

    fn taxonomy() -> KeywordTaxonomy {
        KeywordTaxonomy::new(
            "toy",
            0.5,
            vec![
                KeywordBucket::new("first", &["calm", "quiet"], &["steady"], &["yoga"]),
                KeywordBucket::new("second", &["fast", "quiet"], &["bold"], &["boxing"]),
            ],
        )
    }

    fn answers(text: &str) -> Answers {
        let mut a = Answers::new();
        a.insert("q".into(), AnswerValue::text(text));
        a
    }

    #[test]
    fn test_tie_goes_to_earlier_bucket() {
        let p = taxonomy().score(&answers("quiet"), Lang::En).unwrap();
        assert_eq!(p.profile["type"], json!("first"));
        assert_eq!(p.candidate_suggestions, vec!["yoga"]);
    }

    #[test]
    fn test_highest_hit_count_wins() {
        let p = taxonomy().score(&answers("fast and quiet"), Lang::En).unwrap();
        assert_eq!(p.profile["type"], json!("second"));
    }

    #[test]
    fn test_no_hits_is_no_signal() {
        let err = taxonomy().score(&answers("nothing relevant"), Lang::En).unwrap_err();
        assert!(matches!(err, ScorerError::NoSignal { .. }));
    }
}
