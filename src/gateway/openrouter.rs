//! OpenRouter `/chat/completions` client for card generation.
//!
//! One POST per call, no retries here; [`super::ProviderGateway`] owns those.
//! Bodies are capped because card responses are a few kilobytes of JSON.

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::error::ProviderError;
use super::types::{ChatRequest, ChatResponse, Message};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Prompts carry answers, profile and catalog hints; anything bigger is a bug upstream.
pub const MAX_PROMPT_CHARS: usize = 64_000;
const MAX_BODY_BYTES: usize = 256 * 1024;
/// Used when a 429 carries no usable `retry-after`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

const REFUSAL_OPENINGS: &[&str] = &[
    "i cannot",
    "i can't",
    "i won't",
    "i will not",
    "i'm unable to",
    "i am unable to",
    "sorry, i can",
];

#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    http: reqwest::Client,
    endpoint: String,
}

impl OpenRouterClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| ProviderError::config("API key is not a valid header value"))?;
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| ProviderError::config(format!("http client: {e}")))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        })
    }

    /// `OPENROUTER_API_KEY` is required; `OPENROUTER_BASE_URL` overrides the host.
    /// `timeout` is the generation timeout, so a hung socket never outlives it.
    pub fn from_env(timeout: Duration) -> Result<Self, ProviderError> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::config("OPENROUTER_API_KEY not set"))?;
        let base_url = std::env::var("OPENROUTER_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(api_key.trim(), &base_url, timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn complete(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let chars = req.prompt_chars();
        if chars > MAX_PROMPT_CHARS {
            return Err(ProviderError::PromptTooLarge {
                chars,
                max: MAX_PROMPT_CHARS,
            });
        }

        let started = Instant::now();
        let response = self
            .http
            .post(&self.endpoint)
            .json(&CompletionRequest::from(req))
            .send()
            .await?;

        let status = response.status();
        let request_id = header_str(response.headers(), "x-request-id");
        let retry_after = header_str(response.headers(), "retry-after")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.bytes().await?;
        if body.len() > MAX_BODY_BYTES {
            return Err(ProviderError::bad_response(format!("body of {} bytes", body.len())));
        }

        if !status.is_success() {
            return Err(status_error(status, &body, request_id, retry_after));
        }

        let parsed: CompletionBody = serde_json::from_slice(&body)
            .map_err(|e| ProviderError::bad_response(format!("invalid JSON: {e}")))?;
        parsed.into_response(started.elapsed())
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

fn status_error(
    status: StatusCode,
    body: &[u8],
    request_id: Option<String>,
    retry_after: Option<Duration>,
) -> ProviderError {
    let message = serde_json::from_slice::<CompletionBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    match status.as_u16() {
        429 => ProviderError::RateLimited {
            retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER),
            request_id,
        },
        code if code >= 500 => ProviderError::Upstream {
            status: code,
            message,
            request_id,
        },
        code => ProviderError::Rejected {
            status: code,
            message,
            request_id,
        },
    }
}

fn is_refusal(content: &str) -> bool {
    let first_line = content.trim_start().lines().next().unwrap_or("").to_lowercase();
    REFUSAL_OPENINGS.iter().any(|p| first_line.starts_with(p))
}

// =============================================================================
// WIRE FORMAT
// =============================================================================

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

impl<'a> From<&'a ChatRequest> for CompletionRequest<'a> {
    fn from(req: &'a ChatRequest) -> Self {
        Self {
            model: req.model.model_id(),
            messages: req.messages.iter().map(WireMessage::from).collect(),
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            response_format: req.json_mode.then_some(ResponseFormat { kind: "json_object" }),
        }
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a Message> for WireMessage<'a> {
    fn from(m: &'a Message) -> Self {
        Self {
            role: m.role.as_str(),
            content: &m.content,
        }
    }
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
    error: Option<WireError>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    /// USD, when the account has usage accounting enabled.
    cost: Option<f64>,
    cost_details: Option<CostDetails>,
}

#[derive(Deserialize)]
struct CostDetails {
    upstream_inference_cost: Option<f64>,
}

#[derive(Deserialize)]
struct WireError {
    message: Option<String>,
}

impl CompletionBody {
    fn into_response(self, latency: Duration) -> Result<ChatResponse, ProviderError> {
        if let Some(error) = self.error {
            return Err(ProviderError::bad_response(
                error.message.unwrap_or_else(|| "error without message".to_string()),
            ));
        }
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::bad_response("no choices"))?;
        let content = choice.message.and_then(|m| m.content).unwrap_or_default();
        if is_refusal(&content) {
            return Err(ProviderError::Refused(content));
        }

        let (input_tokens, output_tokens, cost_usd) = match self.usage {
            Some(u) => (
                u.prompt_tokens,
                u.completion_tokens,
                u.cost.or(u.cost_details.and_then(|d| d.upstream_inference_cost)),
            ),
            None => (0, 0, None),
        };

        Ok(ChatResponse {
            content,
            input_tokens,
            output_tokens,
            cost_nanodollars: cost_usd.map(|usd| ((usd * 1e9).round() as i64).max(0)).unwrap_or(0),
            latency,
            truncated: choice.finish_reason.as_deref() == Some("length"),
        })
    }
}
