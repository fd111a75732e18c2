//! Errors from the generation backend.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP 429. Retryable after `retry_after`.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        retry_after: Duration,
        request_id: Option<String>,
    },

    /// Any other 4xx. The same request will fail again.
    #[error("rejected with HTTP {status}: {message}")]
    Rejected {
        status: u16,
        message: String,
        request_id: Option<String>,
    },

    /// 5xx from OpenRouter or the upstream model host.
    #[error("upstream failure (HTTP {status}): {message}")]
    Upstream {
        status: u16,
        message: String,
        request_id: Option<String>,
    },

    #[error("prompt too large: {chars} chars (max {max})")]
    PromptTooLarge { chars: usize, max: usize },

    /// The model declined to write cards.
    #[error("model refused: {0}")]
    Refused(String),

    /// 2xx body that is not a usable completion.
    #[error("unusable response: {0}")]
    BadResponse(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Missing API key or an unusable header value.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn bad_response(message: impl Into<String>) -> Self {
        Self::BadResponse(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Upstream { .. } => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Rejected { .. }
            | Self::PromptTooLarge { .. }
            | Self::Refused(_)
            | Self::BadResponse(_)
            | Self::Config(_) => false,
        }
    }

    /// Wait requested by the provider, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Short code for logs and usage records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Rejected { .. } => "rejected",
            Self::Upstream { .. } => "upstream",
            Self::PromptTooLarge { .. } => "prompt_too_large",
            Self::Refused(_) => "refused",
            Self::BadResponse(_) => "bad_response",
            Self::Http(_) => "http",
            Self::Config(_) => "config",
        }
    }

    /// `x-request-id` of the failed call, for support tickets.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::RateLimited { request_id, .. }
            | Self::Rejected { request_id, .. }
            | Self::Upstream { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_failures_retry() {
        let limited = ProviderError::RateLimited {
            retry_after: Duration::from_secs(3),
            request_id: None,
        };
        assert!(limited.is_retryable());
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(3)));

        let upstream = ProviderError::Upstream {
            status: 503,
            message: "overloaded".into(),
            request_id: Some("req-9".into()),
        };
        assert!(upstream.is_retryable());
        assert_eq!(upstream.request_id(), Some("req-9"));
        assert_eq!(upstream.retry_after(), None);

        assert!(!ProviderError::Refused("no".into()).is_retryable());
        assert!(!ProviderError::PromptTooLarge { chars: 10, max: 5 }.is_retryable());
        assert_eq!(ProviderError::config("missing key").code(), "config");
    }
}
