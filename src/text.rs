//! Text normalisation shared by signal extraction, signatures and the quality guard.
//!
//! Arabic input is folded (diacritics and tatweel stripped, letter variants
//! unified) before any matching, so spelling variants of the same word compare
//! equal. Latin input is lowercased by the same pass.

use std::collections::BTreeSet;

use fancy_regex::Regex as FancyRegex;
use once_cell::sync::Lazy;
use regex::Regex;

/// Tokens at or below this many characters are dropped by [`tokenize`].
pub const MIN_TOKEN_CHARS: usize = 3;

static DIACRITICS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{064B}-\u{0652}\u{0640}]").expect("Invalid diacritics regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

static NON_CANON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^a-z0-9\u{0600}-\u{06FF}]+").expect("Invalid canonical label regex")
});

static TOKEN_SPLIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^A-Za-z0-9\u{0600}-\u{06FF}]+").expect("Invalid token split regex")
});

// Split after sentence punctuation (Latin and Arabic) or at line breaks.
static SENTENCE_BREAK: Lazy<FancyRegex> = Lazy::new(|| {
    FancyRegex::new(r"(?<=[.!?؟;؛])\s+|\n+").expect("Invalid sentence split regex")
});

/// Fold Arabic letter variants, strip diacritics, collapse whitespace and lowercase.
pub fn fold(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let stripped = DIACRITICS.replace_all(text, "");
    let mapped: String = stripped
        .chars()
        .map(|c| match c {
            'أ' | 'إ' | 'آ' => 'ا',
            'ؤ' => 'و',
            'ئ' | 'ى' => 'ي',
            'ة' => 'ه',
            other => other,
        })
        .collect();
    WHITESPACE
        .replace_all(mapped.trim(), " ")
        .to_lowercase()
}

/// Canonical form of a label or id: folded, punctuation removed, single spaces.
pub fn canon(label: &str) -> String {
    let folded = fold(label);
    let replaced = NON_CANON.replace_all(&folded, " ");
    WHITESPACE.replace_all(replaced.trim(), " ").into_owned()
}

/// Canonical id form: like [`canon`] but joined with underscores.
pub fn canon_id(label: &str) -> String {
    canon(label).replace(' ', "_")
}

/// Every word in the folded text, regardless of length.
pub fn words(text: &str) -> Vec<String> {
    TOKEN_SPLIT
        .split(&fold(text))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Significant tokens: folded words longer than two characters.
pub fn tokenize(text: &str) -> Vec<String> {
    words(text)
        .into_iter()
        .filter(|w| w.chars().count() >= MIN_TOKEN_CHARS)
        .collect()
}

pub fn token_set(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().collect()
}

/// Whether `phrase` occurs in `folded_haystack`. The haystack must already be folded.
pub fn contains_phrase(folded_haystack: &str, phrase: &str) -> bool {
    let needle = fold(phrase);
    !needle.is_empty() && folded_haystack.contains(&needle)
}

/// Split text into trimmed, non-empty sentences.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut start = 0;
    for m in SENTENCE_BREAK.find_iter(text) {
        let Ok(m) = m else { break };
        push_sentence(&mut out, &text[start..m.start()]);
        start = m.end();
    }
    push_sentence(&mut out, &text[start..]);
    out
}

fn push_sentence(out: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Jaccard similarity of two token sets.
///
/// Two empty sets are treated as identical (1.0); one empty set against a
/// non-empty one shares nothing (0.0).
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let inter = a.intersection(b).count();
    let union = a.len() + b.len() - inter;
    if union == 0 {
        return 0.0;
    }
    inter as f64 / union as f64
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_strips_diacritics_and_unifies_letters() {
        assert_eq!(fold("  أَحِبُّ   الهدوءَ "), "احب الهدوء");
        assert_eq!(fold("مدرسة"), "مدرسه");
        assert_eq!(fold("إلى"), "الي");
        assert_eq!(fold("Quiet  FOCUS"), "quiet focus");
    }

    #[test]
    fn test_canon_removes_punctuation() {
        assert_eq!(canon("  Martial-Arts: (Beginner) "), "martial arts beginner");
        assert_eq!(canon_id("Tai Chi"), "tai_chi");
    }

    #[test]
    fn test_tokenize_drops_short_words() {
        assert_eq!(tokenize("I am a calm, steady aimer"), vec!["calm", "steady", "aimer"]);
    }

    #[test]
    fn test_split_sentences_handles_arabic_question_mark() {
        let parts = split_sentences("First one. Second one!\nThird؟ Fourth");
        assert_eq!(parts, vec!["First one.", "Second one!", "Third؟", "Fourth"]);
    }

    #[test]
    fn test_jaccard_edge_cases() {
        let empty = BTreeSet::new();
        let a: BTreeSet<String> = ["calm", "focus"].iter().map(|s| s.to_string()).collect();
        let b: BTreeSet<String> = ["calm", "speed"].iter().map(|s| s.to_string()).collect();
        assert_eq!(jaccard(&empty, &empty), 1.0);
        assert_eq!(jaccard(&a, &empty), 0.0);
        assert!((jaccard(&a, &b) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_contains_phrase_matches_folded_arabic() {
        let hay = fold("أحب الهدوء والتنفّس");
        assert!(contains_phrase(&hay, "هدوء"));
        assert!(contains_phrase(&hay, "تنفس"));
        assert!(!contains_phrase(&hay, ""));
    }
}
