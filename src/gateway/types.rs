//! Request and response shapes for card generation calls.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sampling temperature for card drafts.
pub const CARD_TEMPERATURE: f32 = 0.7;
/// Output budget for three cards plus the JSON envelope.
pub const CARD_MAX_TOKENS: u32 = 1400;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// A previous model reply, replayed in repair prompts.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// OpenRouter model id, e.g. "openai/gpt-4o-mini".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatModel(String);

impl ChatModel {
    pub fn openrouter(model_id: impl Into<String>) -> Self {
        ChatModel(model_id.into())
    }

    pub fn model_id(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: ChatModel,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Sends `response_format: json_object`.
    pub json_mode: bool,
    /// Code path that made the call, for usage records.
    pub caller: &'static str,
}

impl ChatRequest {
    /// Plain-text completion with deterministic sampling.
    pub fn new(model: ChatModel, messages: Vec<Message>, caller: &'static str) -> Self {
        Self {
            model,
            messages,
            temperature: 0.0,
            max_tokens: CARD_MAX_TOKENS,
            json_mode: false,
            caller,
        }
    }

    /// JSON-mode request with the card drafting defaults.
    pub fn card_generation(model: ChatModel, messages: Vec<Message>) -> Self {
        Self {
            temperature: CARD_TEMPERATURE,
            json_mode: true,
            ..Self::new(model, messages, "arbitrator::generate")
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

    pub fn prompt_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content.chars().count()).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Provider-reported cost in nanodollars, 0 when not reported.
    pub cost_nanodollars: i64,
    pub latency: Duration,
    /// The model stopped at `max_tokens`, so JSON output is likely cut off.
    pub truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_generation_request_defaults() {
        let req = ChatRequest::card_generation(ChatModel::openrouter("test/model"), vec![Message::user("hi")]);
        assert!(req.json_mode);
        assert_eq!(req.temperature, CARD_TEMPERATURE);
        assert_eq!(req.max_tokens, CARD_MAX_TOKENS);
        assert_eq!(req.caller, "arbitrator::generate");

        let plain = ChatRequest::new(ChatModel::openrouter("test/model"), vec![], "test").max_tokens(10);
        assert!(!plain.json_mode);
        assert_eq!(plain.max_tokens, 10);
    }

    #[test]
    fn test_prompt_chars_counts_characters_not_bytes() {
        let req = ChatRequest::new(
            ChatModel::openrouter("m"),
            vec![Message::system("ab"), Message::user("تركيز")],
            "test",
        );
        assert_eq!(req.prompt_chars(), 7);
    }
}
