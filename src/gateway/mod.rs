//! Generation backend: an OpenRouter client behind bounded retries.
//!
//! Every attempt, failed or not, is handed to a [`UsageSink`].

pub mod error;
pub mod openrouter;
pub mod types;
pub mod usage;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::debug;

pub use error::ProviderError;
pub use openrouter::OpenRouterClient;
pub use types::{ChatModel, ChatRequest, ChatResponse, Message, Role, CARD_MAX_TOKENS, CARD_TEMPERATURE};
pub use usage::{NoopUsageSink, ProviderCallRecord, TracingUsageSink, UsageSink};

#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    /// Ceiling for any single wait, including provider `retry-after`.
    pub max_retry_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(4),
        }
    }
}

impl GatewayConfig {
    /// Exponential backoff, raised to the provider's `retry-after` and capped.
    fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.retry_base_delay * 2u32.pow(attempt.min(5));
        backoff.max(retry_after.unwrap_or_default()).min(self.max_retry_delay)
    }
}

pub struct ProviderGateway<U: UsageSink> {
    client: OpenRouterClient,
    usage_sink: Arc<U>,
    config: GatewayConfig,
}

impl<U: UsageSink> ProviderGateway<U> {
    pub fn new(client: OpenRouterClient, usage_sink: Arc<U>, config: GatewayConfig) -> Self {
        Self {
            client,
            usage_sink,
            config,
        }
    }

    /// Client from `OPENROUTER_*` variables with default retries.
    pub fn from_env(timeout: Duration, usage_sink: Arc<U>) -> Result<Self, ProviderError> {
        Ok(Self::new(
            OpenRouterClient::from_env(timeout)?,
            usage_sink,
            GatewayConfig::default(),
        ))
    }
}

#[async_trait]
impl<U: UsageSink> ChatGateway for ProviderGateway<U> {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut attempt = 0;
        loop {
            let started = Instant::now();
            let outcome = self.client.complete(&req).await;
            self.usage_sink
                .record(ProviderCallRecord::for_attempt(&req, attempt, started.elapsed(), &outcome))
                .await;

            match outcome {
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.delay_for(attempt, err.retry_after());
                    debug!(attempt, code = err.code(), delay_ms = delay.as_millis() as u64, "retrying generation call");
                    sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_honours_retry_after_and_caps() {
        let config = GatewayConfig {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_secs(1),
        };
        assert_eq!(config.delay_for(0, None), Duration::from_millis(100));
        assert_eq!(config.delay_for(2, None), Duration::from_millis(400));
        assert_eq!(config.delay_for(0, Some(Duration::from_millis(700))), Duration::from_millis(700));
        assert_eq!(config.delay_for(9, None), Duration::from_secs(1));
        assert_eq!(config.delay_for(0, Some(Duration::from_secs(60))), Duration::from_secs(1));
    }
}
