//! Generation backends and response parsing.
//!
//! The arbitrator only sees [`TextGenerator`]. The shipped implementation
//! wraps a [`ChatGateway`], so retries and usage records stay in the gateway.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::cards::CardDraft;
use crate::gateway::{ChatGateway, ChatModel, ChatRequest, ProviderError, CARD_MAX_TOKENS, CARD_TEMPERATURE};
use crate::prompts::PromptInstance;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("empty response")]
    Empty,
    #[error("no generator configured")]
    NotConfigured,
}

impl GenerationError {
    pub fn code(&self) -> &'static str {
        match self {
            GenerationError::Provider(_) => "provider",
            GenerationError::Timeout(_) => "timeout",
            GenerationError::Malformed(_) => "malformed",
            GenerationError::Empty => "empty",
            GenerationError::NotConfigured => "not_configured",
        }
    }
}

/// A backend that turns a prompt into raw text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &PromptInstance) -> Result<String, GenerationError>;

    /// Short name for logs and telemetry.
    fn name(&self) -> &str {
        "generator"
    }
}

// =============================================================================
// CHAT-BACKED GENERATOR
// =============================================================================

pub struct ChatTextGenerator<G: ChatGateway> {
    gateway: Arc<G>,
    model: ChatModel,
    temperature: f32,
    max_tokens: u32,
}

impl<G: ChatGateway> ChatTextGenerator<G> {
    pub fn new(gateway: Arc<G>, model: ChatModel) -> Self {
        Self {
            gateway,
            model,
            temperature: CARD_TEMPERATURE,
            max_tokens: CARD_MAX_TOKENS,
        }
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }
}

#[async_trait]
impl<G: ChatGateway> TextGenerator for ChatTextGenerator<G> {
    async fn generate(&self, prompt: &PromptInstance) -> Result<String, GenerationError> {
        let req = ChatRequest::card_generation(self.model.clone(), prompt.to_messages())
            .temperature(self.temperature)
            .max_tokens(self.max_tokens);

        let resp = self.gateway.chat(req).await?;
        if resp.truncated {
            return Err(GenerationError::Malformed(format!(
                "response cut off at {} tokens",
                self.max_tokens
            )));
        }
        if resp.content.trim().is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(resp.content)
    }

    fn name(&self) -> &str {
        self.model.model_id()
    }
}

// =============================================================================
// PARSING
// =============================================================================

#[derive(Deserialize)]
struct DraftEnvelope {
    #[serde(default)]
    recommendations: Vec<CardDraft>,
}

/// Strip a surrounding markdown code fence, with or without a language tag.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Extract the first JSON object from noisy model output.
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(start) = trimmed.find('{') {
        let remainder = &trimmed[start..];
        if let Some(end) = find_matching_brace(remainder) {
            return &remainder[..end];
        }
    }
    trimmed
}

/// Byte offset just past the brace closing the first object. Braces inside strings are ignored.
fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, c) in s.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        if c == '\\' && in_string {
            escape = true;
            continue;
        }
        if c == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse generated text into drafts. Accepts the `{"recommendations": [...]}`
/// envelope or a bare array of drafts.
pub fn parse_drafts(raw: &str) -> Result<Vec<CardDraft>, GenerationError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(GenerationError::Empty);
    }

    let drafts = if body.starts_with('[') {
        serde_json::from_str::<Vec<CardDraft>>(body)
            .map_err(|e| GenerationError::Malformed(e.to_string()))?
    } else {
        serde_json::from_str::<DraftEnvelope>(extract_json(body))
            .map_err(|e| GenerationError::Malformed(e.to_string()))?
            .recommendations
    };

    let drafts: Vec<CardDraft> = drafts
        .into_iter()
        .filter(|d| !d.sport_label.trim().is_empty())
        .collect();
    if drafts.is_empty() {
        return Err(GenerationError::Empty);
    }
    Ok(drafts)
}
