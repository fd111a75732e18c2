//! One record per provider attempt, handed to a [`UsageSink`].
//!
//! The CLI logs records through `TracingUsageSink`; tests collect them.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::ProviderError;
use super::types::{ChatRequest, ChatResponse};

#[derive(Debug, Clone)]
pub struct ProviderCallRecord {
    pub model: String,
    pub caller: &'static str,
    /// 0 for the first try, then one per retry.
    pub attempt: u32,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_nanodollars: i64,
    pub latency_ms: u64,
    /// `ProviderError::code` of a failed attempt.
    pub error_code: Option<&'static str>,
    pub timestamp: DateTime<Utc>,
}

impl ProviderCallRecord {
    pub fn for_attempt(
        req: &ChatRequest,
        attempt: u32,
        elapsed: Duration,
        outcome: &Result<ChatResponse, ProviderError>,
    ) -> Self {
        let (input_tokens, output_tokens, cost_nanodollars, error_code) = match outcome {
            Ok(resp) => (resp.input_tokens, resp.output_tokens, resp.cost_nanodollars, None),
            Err(err) => (0, 0, 0, Some(err.code())),
        };
        Self {
            model: req.model.model_id().to_string(),
            caller: req.caller,
            attempt,
            input_tokens,
            output_tokens,
            cost_nanodollars,
            latency_ms: elapsed.as_millis() as u64,
            error_code,
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_code.is_none()
    }
}

#[async_trait]
pub trait UsageSink: Send + Sync {
    /// Fire-and-forget: a sink never fails the call it records.
    async fn record(&self, record: ProviderCallRecord);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUsageSink;

#[async_trait]
impl UsageSink for NoopUsageSink {
    async fn record(&self, _record: ProviderCallRecord) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingUsageSink;

#[async_trait]
impl UsageSink for TracingUsageSink {
    async fn record(&self, record: ProviderCallRecord) {
        tracing::info!(
            model = %record.model,
            caller = record.caller,
            attempt = record.attempt,
            tokens = record.input_tokens + record.output_tokens,
            cost_nanos = record.cost_nanodollars,
            latency_ms = record.latency_ms,
            error_code = record.error_code.unwrap_or(""),
            "generation call"
        );
    }
}
