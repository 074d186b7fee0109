//! Comparator gateway.
//!
//! Wraps a [`Judge`] with a per-call timeout and bounded retries, and folds
//! every raw answer into a [`Verdict`].

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::warn;

use super::types::{Candidate, ComparisonContext, RankingConfig, Verdict};

// =============================================================================
// Judge capability
// =============================================================================

/// Errors a judge can report for one attempt.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JudgeError {
    #[error("judge timed out after {0:?}")]
    Timeout(Duration),
    #[error("transient judge failure: {0}")]
    Transient(String),
    #[error("judge failure: {0}")]
    Fatal(String),
}

impl JudgeError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Transient(_) => true,
            Self::Fatal(_) => false,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Transient(_) => "transient",
            Self::Fatal(_) => "fatal",
        }
    }
}

/// The external judge: asked once per attempt which of two candidates is better.
///
/// Returns the raw answer; the gateway normalizes it. Implementations should
/// not retry internally.
#[async_trait::async_trait]
pub trait Judge: Send + Sync {
    async fn judge(
        &self,
        context: &ComparisonContext,
        first: &Candidate,
        second: &Candidate,
    ) -> Result<String, JudgeError>;
}

// =============================================================================
// Gateway
// =============================================================================

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_retries: 2,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

impl From<&RankingConfig> for GatewayConfig {
    fn from(cfg: &RankingConfig) -> Self {
        Self {
            timeout: Duration::from_secs(cfg.comparator_timeout_secs),
            max_retries: cfg.max_retries,
            retry_base_delay: Duration::from_millis(cfg.retry_base_delay_ms),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ComparisonError {
    #[error("comparator unavailable after {attempts} attempt(s): {source}")]
    Unavailable {
        attempts: u32,
        #[source]
        source: JudgeError,
    },
}

/// Result of one successfully judged pair.
#[derive(Debug, Clone)]
pub struct JudgedPair {
    pub verdict: Verdict,
    pub raw_answer: String,
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

pub struct ComparatorGateway<J: ?Sized> {
    judge: Arc<J>,
    config: GatewayConfig,
}

impl<J: Judge + ?Sized> ComparatorGateway<J> {
    pub fn new(judge: Arc<J>, config: GatewayConfig) -> Self {
        Self { judge, config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Judge one pair.
    ///
    /// Timeouts and transient failures are retried up to `max_retries` times
    /// with exponential backoff. A fatal failure, or running out of retries,
    /// yields [`ComparisonError::Unavailable`].
    pub async fn compare(
        &self,
        context: &ComparisonContext,
        first: &Candidate,
        second: &Candidate,
    ) -> Result<JudgedPair, ComparisonError> {
        let mut attempt: u32 = 0;

        loop {
            let result = match timeout(
                self.config.timeout,
                self.judge.judge(context, first, second),
            )
            .await
            {
                Ok(inner) => inner,
                Err(_) => Err(JudgeError::Timeout(self.config.timeout)),
            };

            match result {
                Ok(raw_answer) => {
                    return Ok(JudgedPair {
                        verdict: Verdict::from_raw(&raw_answer),
                        raw_answer,
                        attempts: attempt + 1,
                    });
                }
                Err(err) => {
                    if !err.is_retryable() || attempt >= self.config.max_retries {
                        return Err(ComparisonError::Unavailable {
                            attempts: attempt + 1,
                            source: err,
                        });
                    }

                    warn!(
                        first = first.index,
                        second = second.index,
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        code = err.code(),
                        error = %err,
                        "Comparator call failed; retrying"
                    );
                    sleep(backoff_delay(self.config.retry_base_delay, attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u64.pow(attempt.min(5));
    base * multiplier as u32
}
