//! Greedy top-k selection under a pairwise similarity ceiling.

use std::collections::BTreeSet;

use crate::text;

/// Default ceiling for pairwise signature similarity.
pub const DEFAULT_MAX_SIMILARITY: f64 = 0.6;

/// Anything with a token-set signature for diversity comparison.
pub trait Signature {
    fn signature_terms(&self) -> &BTreeSet<String>;

    /// Key for exact-duplicate detection. Two items with the same key are never both selected.
    fn duplicate_key(&self) -> String;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiverseSelection<T> {
    pub items: Vec<T>,
    /// True when the threshold had to be relaxed to reach `k`.
    pub relaxed: bool,
}

impl<T> DiverseSelection<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Jaccard similarity of two signatures.
pub fn signature_similarity<T: Signature>(a: &T, b: &T) -> f64 {
    text::jaccard(a.signature_terms(), b.signature_terms())
}

pub fn select_diverse<T: Signature + Clone>(ranked: &[T], k: usize, max_similarity: f64) -> DiverseSelection<T> {
    select_diverse_by(ranked, k, max_similarity, signature_similarity)
}

/// Pick up to `k` items from `ranked`, preserving rank order.
///
/// Pass one scans once and accepts every item whose similarity to all accepted
/// items is at most `max_similarity`. If that yields fewer than `k`, pass two
/// repeatedly accepts the remaining item with the lowest worst-case similarity
/// (earlier rank wins ties). Exact duplicates are never accepted, so the
/// result is short only when the pool has fewer than `k` distinct items.
pub fn select_diverse_by<T, F>(ranked: &[T], k: usize, max_similarity: f64, similarity: F) -> DiverseSelection<T>
where
    T: Signature + Clone,
    F: Fn(&T, &T) -> f64,
{
    let mut accepted: Vec<usize> = Vec::new();
    let mut keys: BTreeSet<String> = BTreeSet::new();

    for (idx, candidate) in ranked.iter().enumerate() {
        if accepted.len() >= k {
            break;
        }
        if keys.contains(&candidate.duplicate_key()) {
            continue;
        }
        let fits = accepted
            .iter()
            .all(|&a| similarity(&ranked[a], candidate) <= max_similarity);
        if fits {
            accepted.push(idx);
            keys.insert(candidate.duplicate_key());
        }
    }

    let mut relaxed = false;
    while accepted.len() < k {
        let mut best: Option<(usize, f64)> = None;
        for (idx, candidate) in ranked.iter().enumerate() {
            if accepted.contains(&idx) || keys.contains(&candidate.duplicate_key()) {
                continue;
            }
            let worst = accepted
                .iter()
                .map(|&a| similarity(&ranked[a], candidate))
                .fold(0.0_f64, f64::max);
            match best {
                Some((_, current)) if worst >= current => {}
                _ => best = Some((idx, worst)),
            }
        }
        let Some((idx, _)) = best else { break };
        relaxed = true;
        keys.insert(ranked[idx].duplicate_key());
        accepted.push(idx);
    }

    // Relaxed picks are appended out of rank order; restore it.
    accepted.sort_unstable();
    DiverseSelection {
        items: accepted.into_iter().map(|i| ranked[i].clone()).collect(),
        relaxed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        key: String,
        terms: BTreeSet<String>,
    }

    fn item(key: &str, terms: &[&str]) -> Item {
        Item {
            key: key.to_string(),
            terms: terms.iter().map(|s| s.to_string()).collect(),
        }
    }

    impl Signature for Item {
        fn signature_terms(&self) -> &BTreeSet<String> {
            &self.terms
        }

        fn duplicate_key(&self) -> String {
            self.key.clone()
        }
    }

    fn keys(sel: &DiverseSelection<Item>) -> Vec<&str> {
        sel.items.iter().map(|i| i.key.as_str()).collect()
    }

    #[test]
    fn test_skips_near_duplicates_without_restarting() {
        let ranked = vec![
            item("a", &["calm", "water", "breath"]),
            item("b", &["calm", "water", "breath", "glide"]),
            item("c", &["aim", "focus", "stance"]),
            item("d", &["team", "ball", "pass"]),
        ];
        let sel = select_diverse(&ranked, 3, 0.6);
        assert_eq!(keys(&sel), vec!["a", "c", "d"]);
        assert!(!sel.relaxed);
    }

    #[test]
    fn test_relaxes_to_least_similar_when_short() {
        let ranked = vec![
            item("a", &["x", "y", "z"]),
            item("b", &["x", "y", "z", "w"]),
            item("c", &["x", "y", "q", "r"]),
        ];
        let sel = select_diverse(&ranked, 2, 0.3);
        // b shares 3/4 with a, c shares 2/5: c is less similar.
        assert_eq!(keys(&sel), vec!["a", "c"]);
        assert!(sel.relaxed);
    }

    #[test]
    fn test_never_selects_exact_duplicates() {
        let ranked = vec![item("a", &["x"]), item("a", &["x"]), item("b", &["x"])];
        let sel = select_diverse(&ranked, 3, 0.6);
        assert_eq!(keys(&sel), vec!["a", "b"]);
    }

    #[test]
    fn test_short_pool_returns_what_exists() {
        let ranked = vec![item("a", &["x"])];
        let sel = select_diverse(&ranked, 3, 0.6);
        assert_eq!(sel.len(), 1);
    }
}
