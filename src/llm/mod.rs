//! Language model invocation with one retry on timeout or transient failure.

use crate::api::{with_retry, ClientError, LlmClient, RequestPool, RetryPolicy};
use crate::error::AnalysisError;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct LlmInvoker {
    client: Arc<dyn LlmClient>,
    pool: RequestPool,
    policy: RetryPolicy,
}

impl LlmInvoker {
    pub fn new(client: Arc<dyn LlmClient>, pool: RequestPool, timeout: Duration) -> Self {
        Self {
            client,
            pool,
            policy: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(1),
                attempt_timeout: timeout,
            },
        }
    }

    /// Pause between the first attempt and the retry
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.policy.base_delay = delay;
        self.policy.max_delay = delay;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.policy.attempt_timeout
    }

    /// Send `prompt` as-is; the retry reuses the identical prompt
    pub async fn invoke(&self, prompt: &str) -> Result<String, AnalysisError> {
        let started = std::time::Instant::now();
        let client = &self.client;

        let outcome = with_retry(&self.pool, &self.policy, "llm", || async move {
            let text = client.generate(prompt).await?;
            if text.trim().is_empty() {
                return Err(ClientError::Transient("empty completion".to_string()));
            }
            Ok(text)
        })
        .await;

        match outcome {
            Ok(text) => {
                tracing::info!(
                    prompt_chars = prompt.len(),
                    response_chars = text.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "LLM call completed"
                );
                Ok(text)
            }
            Err(e) => {
                tracing::error!(error = %e, "LLM call failed");
                Err(AnalysisError::LlmUnavailable(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ClientResult;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays scripted responses and records every prompt it receives
    struct ScriptedLlm {
        responses: Mutex<Vec<ClientResult<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<ClientResult<String>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn generate(&self, prompt: &str) -> ClientResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(ClientError::Transient("script exhausted".into()));
            }
            responses.remove(0)
        }
    }

    fn invoker(llm: Arc<ScriptedLlm>) -> LlmInvoker {
        LlmInvoker::new(llm, RequestPool::new(2, 6000), Duration::from_secs(5))
            .with_retry_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_retries_once_with_identical_prompt() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Err(ClientError::Transient("503".into())),
            Ok("## Overview\nfine".into()),
        ]));

        let text = invoker(llm.clone()).invoke("prompt-A").await.unwrap();
        assert_eq!(text, "## Overview\nfine");
        assert_eq!(llm.calls(), vec!["prompt-A".to_string(), "prompt-A".to_string()]);
    }

    #[tokio::test]
    async fn test_fails_after_single_retry() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Err(ClientError::Timeout(Duration::from_secs(5))),
            Err(ClientError::Transient("502".into())),
            Ok("never reached".into()),
        ]));

        let err = invoker(llm.clone()).invoke("p").await.unwrap_err();
        assert!(matches!(err, AnalysisError::LlmUnavailable(_)));
        assert_eq!(llm.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_completion_is_retried() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok("   ".into()), Ok("text".into())]));
        assert_eq!(invoker(llm.clone()).invoke("p").await.unwrap(), "text");
        assert_eq!(llm.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_request_is_not_retried() {
        let llm = Arc::new(ScriptedLlm::new(vec![Err(ClientError::Rejected {
            status: 401,
            message: "invalid api key".into(),
        })]));

        let err = invoker(llm.clone()).invoke("p").await.unwrap_err();
        assert!(err.to_string().contains("invalid api key"));
        assert_eq!(llm.calls().len(), 1);
    }
}
