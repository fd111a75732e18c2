//! Input model: answers, languages and the optional questionnaire definition.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::text;

// =============================================================================
// LANGUAGE
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    En,
    Ar,
}

impl Lang {
    pub fn as_str(self) -> &'static str {
        match self {
            Lang::En => "en",
            Lang::Ar => "ar",
        }
    }

    /// Lenient parse: accepts codes, English names and the Arabic self-name.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "ar" | "arabic" | "العربية" | "عربي" => Lang::Ar,
            _ => Lang::En,
        }
    }
}

/// A string with per-language variants. Missing variants fall back to the other language.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalizedText {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub en: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ar: String,
}

impl LocalizedText {
    pub fn new(en: impl Into<String>, ar: impl Into<String>) -> Self {
        Self {
            en: en.into(),
            ar: ar.into(),
        }
    }

    pub fn en(en: impl Into<String>) -> Self {
        Self::new(en, String::new())
    }

    pub fn get(&self, lang: Lang) -> &str {
        let (primary, secondary) = match lang {
            Lang::En => (&self.en, &self.ar),
            Lang::Ar => (&self.ar, &self.en),
        };
        if primary.trim().is_empty() {
            secondary
        } else {
            primary
        }
    }

    pub fn is_empty(&self) -> bool {
        self.en.trim().is_empty() && self.ar.trim().is_empty()
    }
}

// =============================================================================
// ANSWERS
// =============================================================================

/// One answer: free text, a list of selected options, or an answer carrying its question text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Choices(Vec<String>),
    Detailed {
        answer: String,
        #[serde(default)]
        question: Option<String>,
    },
}

impl AnswerValue {
    pub fn text(value: impl Into<String>) -> Self {
        AnswerValue::Text(value.into())
    }

    pub fn choices<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AnswerValue::Choices(values.into_iter().map(Into::into).collect())
    }

    pub fn with_question(answer: impl Into<String>, question: impl Into<String>) -> Self {
        AnswerValue::Detailed {
            answer: answer.into(),
            question: Some(question.into()),
        }
    }

    /// Flattened answer text; choices are joined with ", ".
    pub fn as_text(&self) -> String {
        match self {
            AnswerValue::Text(t) => t.clone(),
            AnswerValue::Choices(items) => items.join(", "),
            AnswerValue::Detailed { answer, .. } => answer.clone(),
        }
    }

    /// Selected options. Free text counts as a single option.
    pub fn options(&self) -> Vec<&str> {
        match self {
            AnswerValue::Text(t) => vec![t.as_str()],
            AnswerValue::Choices(items) => items.iter().map(String::as_str).collect(),
            AnswerValue::Detailed { answer, .. } => vec![answer.as_str()],
        }
    }

    pub fn question_text(&self) -> Option<&str> {
        match self {
            AnswerValue::Detailed { question, .. } => question.as_deref(),
            _ => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.options().iter().all(|o| o.trim().is_empty())
    }
}

/// Answers keyed by question id. Ordered so every downstream pass is deterministic.
pub type Answers = BTreeMap<String, AnswerValue>;

/// All answer text joined into one blob, in question-id order.
pub fn answers_blob(answers: &Answers) -> String {
    answers
        .values()
        .map(AnswerValue::as_text)
        .filter(|t| !t.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable textual fingerprint input: folded answers in question-id order.
pub fn normalized_answers(answers: &Answers) -> String {
    answers
        .iter()
        .map(|(id, value)| {
            let mut opts: Vec<String> = value.options().iter().map(|o| text::fold(o)).collect();
            opts.sort();
            format!("{}={}", text::canon_id(id), opts.join(","))
        })
        .collect::<Vec<_>>()
        .join(";")
}

// =============================================================================
// QUESTIONNAIRE
// =============================================================================

/// Per-option axis contributions, keyed by option then axis.
pub type OptionScores = BTreeMap<String, BTreeMap<String, f64>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub id: String,
    #[serde(default)]
    pub text: LocalizedText,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Explicit per-option scores. Present means the question is scored explicitly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<OptionScores>,
}

fn default_weight() -> f64 {
    1.0
}

impl QuestionSpec {
    pub fn is_explicit(&self) -> bool {
        self.options.as_ref().is_some_and(|o| !o.is_empty())
    }

    /// Axis contributions for the selected options, averaged per axis.
    ///
    /// Options are matched on their canonical form. Returns `None` when no
    /// selected option appears in the table.
    pub fn explicit_contribution(&self, answer: &AnswerValue) -> Option<BTreeMap<String, f64>> {
        let table = self.options.as_ref()?;
        let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        let mut matched = false;
        for selected in answer.options() {
            let key = text::canon(selected);
            let Some((_, axes)) = table.iter().find(|(opt, _)| text::canon(opt) == key) else {
                continue;
            };
            matched = true;
            for (axis, value) in axes {
                let entry = sums.entry(axis.clone()).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
        }
        if !matched {
            return None;
        }
        Some(
            sums.into_iter()
                .map(|(axis, (sum, n))| (axis, sum / n as f64))
                .collect(),
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QuestionnaireError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("question {id} has invalid weight {weight}")]
    InvalidWeight { id: String, weight: f64 },
    #[error("duplicate question id: {0}")]
    DuplicateId(String),
}

/// Versioned question definitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Questionnaire {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub questions: Vec<QuestionSpec>,
}

impl Questionnaire {
    pub fn from_json(raw: &str) -> Result<Self, QuestionnaireError> {
        let parsed: Questionnaire = serde_json::from_str(raw)?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, QuestionnaireError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    fn validate(&self) -> Result<(), QuestionnaireError> {
        let mut seen = std::collections::BTreeSet::new();
        for q in &self.questions {
            if !q.weight.is_finite() || q.weight < 0.0 {
                return Err(QuestionnaireError::InvalidWeight {
                    id: q.id.clone(),
                    weight: q.weight,
                });
            }
            if !seen.insert(q.id.as_str()) {
                return Err(QuestionnaireError::DuplicateId(q.id.clone()));
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&QuestionSpec> {
        self.questions.iter().find(|q| q.id == id)
    }
}
