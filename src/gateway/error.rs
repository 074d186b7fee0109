//! Failures talking to the judge model's HTTP endpoint.

use std::time::Duration;

use thiserror::Error;

use crate::ranking::JudgeError;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP 429.
    #[error("judge endpoint rate limited")]
    RateLimited { request_id: Option<String> },

    /// Any other non-success status.
    #[error("judge endpoint returned HTTP {status}: {message}")]
    Status {
        status: u16,
        message: String,
        request_id: Option<String>,
    },

    /// A 200 reply carrying an error object from the upstream model.
    #[error("upstream model error: {0}")]
    Upstream(String),

    /// A 200 reply with no readable answer in it.
    #[error("malformed judge reply: {0}")]
    Malformed(String),

    #[error("judge reply exceeded {limit} bytes")]
    TooLarge { limit: usize },

    #[error("judge request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// Missing API key, unusable base URL.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    /// Whether asking again with the same prompt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Upstream(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 408,
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Malformed(_) | Self::TooLarge { .. } | Self::Config(_) => false,
        }
    }

    /// The endpoint's `x-request-id`, when the failure came with one.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::RateLimited { request_id } | Self::Status { request_id, .. } => {
                request_id.as_deref()
            }
            _ => None,
        }
    }
}

impl From<ProviderError> for JudgeError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Timeout(after) => JudgeError::Timeout(after),
            other if other.is_retryable() => JudgeError::Transient(other.to_string()),
            other => JudgeError::Fatal(other.to_string()),
        }
    }
}
