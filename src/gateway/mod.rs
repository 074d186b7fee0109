//! LLM-backed [`Judge`]: renders the pairwise prompt and asks a chat model.

pub mod client;
pub mod error;

use std::sync::Arc;

use tracing::debug;

use crate::prompts::{PromptTemplate, PAIRWISE_PROMPT};
use crate::ranking::{Candidate, ComparisonContext, Judge, JudgeError, Verdict};

pub use client::{CompletionBackend, HttpJudgeClient, JudgeReply, DEFAULT_BASE_URL};
pub use error::ProviderError;

pub const DEFAULT_MODEL: &str = "openai/gpt-5-mini";

/// Judge that asks a chat model which candidate is better.
///
/// One backend call per attempt; retries belong to the comparator gateway.
pub struct ChatJudge<B: CompletionBackend + ?Sized = HttpJudgeClient> {
    backend: Arc<B>,
    model: String,
    template: PromptTemplate,
}

impl ChatJudge<HttpJudgeClient> {
    pub fn from_env(model: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self::new(Arc::new(HttpJudgeClient::from_env()?), model))
    }
}

impl<B: CompletionBackend + ?Sized> ChatJudge<B> {
    pub fn new(backend: Arc<B>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            template: PAIRWISE_PROMPT,
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait::async_trait]
impl<B: CompletionBackend + ?Sized> Judge for ChatJudge<B> {
    async fn judge(
        &self,
        context: &ComparisonContext,
        first: &Candidate,
        second: &Candidate,
    ) -> Result<String, JudgeError> {
        let prompt = self.template.render(context, first, second);
        match self.backend.complete(&self.model, &prompt).await? {
            JudgeReply::Answer(text) => Ok(text),
            JudgeReply::Refused(text) => {
                debug!(
                    first = first.index,
                    second = second.index,
                    model = %self.model,
                    reply = %text,
                    "Judge refused comparison"
                );
                Ok(Verdict::Neither.as_str().to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::prompts::PromptInstance;
    use crate::ranking::CandidatePayload;

    /// Replies once, remembering what it was asked.
    struct CannedBackend {
        reply: Mutex<Option<Result<JudgeReply, ProviderError>>>,
        seen: Mutex<Vec<(String, PromptInstance)>>,
    }

    impl CannedBackend {
        fn new(reply: Result<JudgeReply, ProviderError>) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(Some(reply)),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl CompletionBackend for CannedBackend {
        async fn complete(
            &self,
            model: &str,
            prompt: &PromptInstance,
        ) -> Result<JudgeReply, ProviderError> {
            self.seen
                .lock()
                .unwrap()
                .push((model.to_string(), prompt.clone()));
            self.reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(ProviderError::Config("no reply left".into())))
        }
    }

    fn pair() -> (Candidate, Candidate) {
        (
            Candidate {
                index: 0,
                payload: CandidatePayload::new("left"),
            },
            Candidate {
                index: 1,
                payload: CandidatePayload::new("right"),
            },
        )
    }

    #[tokio::test]
    async fn returns_model_answer_verbatim() {
        let backend = CannedBackend::new(Ok(JudgeReply::Answer("Second".into())));
        let judge = ChatJudge::new(backend.clone(), "test/model");
        let (a, b) = pair();
        let answer = judge
            .judge(&ComparisonContext::new("p"), &a, &b)
            .await
            .unwrap();
        assert_eq!(answer, "Second");

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "test/model");
        assert!(seen[0].1.user.contains("left"));
        assert!(seen[0].1.user.contains("right"));
    }

    #[tokio::test]
    async fn refusal_becomes_neither() {
        let backend = CannedBackend::new(Ok(JudgeReply::Refused("I can't: A".into())));
        let judge = ChatJudge::new(backend, "test/model");
        let (a, b) = pair();
        let answer = judge
            .judge(&ComparisonContext::new("p"), &a, &b)
            .await
            .unwrap();
        assert_eq!(Verdict::from_raw(&answer), Verdict::Neither);
    }

    #[tokio::test]
    async fn backend_errors_map_by_retryability() {
        let (a, b) = pair();
        let ctx = ComparisonContext::new("p");

        let transient = ChatJudge::new(
            CannedBackend::new(Err(ProviderError::Upstream("overloaded".into()))),
            "m",
        );
        assert!(matches!(
            transient.judge(&ctx, &a, &b).await,
            Err(JudgeError::Transient(_))
        ));

        let fatal = ChatJudge::new(
            CannedBackend::new(Err(ProviderError::Status {
                status: 401,
                message: "bad key".into(),
                request_id: None,
            })),
            "m",
        );
        assert!(matches!(
            fatal.judge(&ctx, &a, &b).await,
            Err(JudgeError::Fatal(_))
        ));
    }
}
