//! HTTP client for an OpenAI-compatible `/chat/completions` endpoint,
//! narrowed to what a pairwise judge needs: send one rendered comparison
//! prompt, read back the answer text or notice a refusal.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::ProviderError;
use crate::prompts::PromptInstance;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// A verdict reply is a few words; anything this large is not one.
pub const MAX_REPLY_BYTES: usize = 256 * 1024;

/// What the model said about one comparison prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JudgeReply {
    Answer(String),
    /// Declined to compare: explicit refusal, content filter, or a reply that
    /// opens like a refusal.
    Refused(String),
}

/// Sends one comparison prompt to a model. Implementations do not retry.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        prompt: &PromptInstance,
    ) -> Result<JudgeReply, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct HttpJudgeClient {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpJudgeClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| ProviderError::Config("API key is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert("X-Title", HeaderValue::from_static("pairwise-rankings"));

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| ProviderError::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            timeout,
        })
    }

    /// Reads `OPENROUTER_API_KEY`, `OPENROUTER_BASE_URL` and
    /// `OPENROUTER_TIMEOUT_SECONDS`.
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| ProviderError::Config("OPENROUTER_API_KEY not set".into()))?;
        let base_url =
            std::env::var("OPENROUTER_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let timeout = std::env::var("OPENROUTER_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);
        Self::new(&api_key, &base_url, timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn transport_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.timeout)
        } else {
            ProviderError::Transport(err)
        }
    }

    async fn read_capped(&self, mut response: reqwest::Response) -> Result<Vec<u8>, ProviderError> {
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.transport_error(e))? {
            if body.len() + chunk.len() > MAX_REPLY_BYTES {
                return Err(ProviderError::TooLarge {
                    limit: MAX_REPLY_BYTES,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

// Wire format, limited to the fields a verdict needs.

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct WireReply {
    #[serde(default)]
    choices: Vec<WireChoice>,
    error: Option<WireError>,
}

#[derive(Deserialize)]
struct WireChoice {
    #[serde(default)]
    message: WireAnswer,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct WireAnswer {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Deserialize)]
struct WireError {
    message: Option<String>,
}

/// Whether the first line of a reply reads like a refusal.
pub fn looks_like_refusal(text: &str) -> bool {
    const OPENINGS: &[&str] = &[
        "refus",
        "i cannot",
        "i can't",
        "i won't",
        "i will not",
        "i am unable to",
        "i'm unable to",
        "unable to comply",
        "unable to assist",
    ];
    let first_line = text.trim_start().lines().next().unwrap_or("").to_lowercase();
    OPENINGS.iter().any(|o| first_line.starts_with(o))
}

/// Read a successful body into a [`JudgeReply`].
fn interpret(body: &[u8]) -> Result<JudgeReply, ProviderError> {
    let reply: WireReply = serde_json::from_slice(body)
        .map_err(|e| ProviderError::Malformed(format!("invalid JSON: {e}")))?;

    if let Some(error) = reply.error {
        let message = error.message.unwrap_or_default();
        if looks_like_refusal(&message) {
            return Ok(JudgeReply::Refused(message));
        }
        return Err(ProviderError::Upstream(message));
    }

    let choice = reply
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Malformed("no choices".into()))?;

    if let Some(refusal) = choice.message.refusal.filter(|r| !r.trim().is_empty()) {
        return Ok(JudgeReply::Refused(refusal));
    }
    let content = choice.message.content.unwrap_or_default();
    if choice.finish_reason.as_deref() == Some("content_filter") || looks_like_refusal(&content) {
        return Ok(JudgeReply::Refused(content));
    }
    Ok(JudgeReply::Answer(content))
}

/// Best-effort `error.message` from a failure body.
fn error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<WireReply>(body)
        .ok()
        .and_then(|r| r.error)
        .and_then(|e| e.message)
}

#[async_trait]
impl CompletionBackend for HttpJudgeClient {
    async fn complete(
        &self,
        model: &str,
        prompt: &PromptInstance,
    ) -> Result<JudgeReply, ProviderError> {
        let request = WireRequest {
            model,
            messages: [
                WireMessage {
                    role: "system",
                    content: &prompt.system,
                },
                WireMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: 0.0,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = self.read_capped(response).await?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited { request_id });
        }
        if !status.is_success() {
            debug!(status = status.as_u16(), request_id = ?request_id, "Judge call failed");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message: error_message(&body)
                    .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
                request_id,
            });
        }
        interpret(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refusal_is_judged_on_the_first_line() {
        assert!(looks_like_refusal("I can't help with that."));
        assert!(looks_like_refusal("  Refusing: policy"));
        assert!(!looks_like_refusal("First"));
        assert!(!looks_like_refusal("Answer: Second\nI cannot be sure."));
    }

    #[test]
    fn plain_content_is_an_answer() {
        let body = br#"{"choices":[{"message":{"content":"Second"},"finish_reason":"stop"}]}"#;
        assert_eq!(interpret(body).unwrap(), JudgeReply::Answer("Second".into()));
    }

    #[test]
    fn refusal_field_and_content_filter_are_refusals() {
        let explicit = br#"{"choices":[{"message":{"content":null,"refusal":"no"}}]}"#;
        assert_eq!(interpret(explicit).unwrap(), JudgeReply::Refused("no".into()));

        let filtered =
            br#"{"choices":[{"message":{"content":"First"},"finish_reason":"content_filter"}]}"#;
        assert_eq!(interpret(filtered).unwrap(), JudgeReply::Refused("First".into()));
    }

    #[test]
    fn error_object_in_success_body() {
        let refused = br#"{"error":{"message":"Refused: request violates policy"}}"#;
        assert!(matches!(interpret(refused), Ok(JudgeReply::Refused(_))));

        let upstream = br#"{"error":{"message":"provider overloaded"}}"#;
        assert!(matches!(interpret(upstream), Err(ProviderError::Upstream(_))));
    }

    #[test]
    fn missing_choices_is_malformed() {
        assert!(matches!(
            interpret(br#"{"choices":[]}"#),
            Err(ProviderError::Malformed(_))
        ));
        assert!(matches!(
            interpret(b"not json"),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let client =
            HttpJudgeClient::new("k", "http://localhost:9/v1/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9/v1/chat/completions");
    }
}
