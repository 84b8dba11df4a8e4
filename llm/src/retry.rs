//! Timeout and retry wrapper around any [`LanguageModel`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::{ChatMessage, GenerateOptions, LanguageModel};
use crate::error::{LlmError, Result};

/// How hard to try before giving up on a generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles afterwards.
    pub initial_backoff_ms: u64,

    /// Deadline for each attempt.
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            timeout_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff_ms = backoff.as_millis() as u64;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }
}

/// A model that bounds every call and retries transient failures.
pub struct ResilientModel {
    inner: Arc<dyn LanguageModel>,
    policy: RetryPolicy,
}

impl ResilientModel {
    pub fn new(inner: Arc<dyn LanguageModel>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl LanguageModel for ResilientModel {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, messages: &[ChatMessage], options: GenerateOptions) -> Result<String> {
        let attempts = self.policy.max_attempts.max(1);
        let timeout = Duration::from_millis(self.policy.timeout_ms);
        let mut attempt = 1;

        loop {
            let outcome = tokio::time::timeout(timeout, self.inner.generate(messages, options))
                .await
                .unwrap_or(Err(LlmError::Timeout(self.policy.timeout_ms)));

            match outcome {
                Ok(text) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {attempt}", self.inner.name());
                    }
                    return Ok(text);
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    let backoff = self.policy.backoff_for(attempt);
                    warn!(
                        "{} attempt {attempt}/{attempts} failed ({e}), retrying in {} ms",
                        self.inner.name(),
                        backoff.as_millis()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays a fixed sequence of outcomes.
    struct Scripted {
        outcomes: Mutex<Vec<Result<String>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(mut outcomes: Vec<Result<String>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _: &[ChatMessage], _: GenerateOptions) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(LlmError::Transport("script exhausted".to_string())))
        }
    }

    struct Sleepy;

    #[async_trait]
    impl LanguageModel for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }

        async fn generate(&self, _: &[ChatMessage], _: GenerateOptions) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default().with_initial_backoff(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let inner = Arc::new(Scripted::new(vec![
            Err(LlmError::Transport("reset".to_string())),
            Err(LlmError::RateLimited),
            Ok("done".to_string()),
        ]));
        let model = ResilientModel::new(inner.clone(), fast_policy());

        let reply = model
            .generate(&[ChatMessage::user("hi")], GenerateOptions::default())
            .await
            .unwrap();

        assert_eq!(reply, "done");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let inner = Arc::new(Scripted::new(vec![]));
        let model = ResilientModel::new(inner.clone(), fast_policy().with_max_attempts(2));

        let err = model
            .generate(&[ChatMessage::user("hi")], GenerateOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::Transport(_)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_does_not_retry_content_errors() {
        let inner = Arc::new(Scripted::new(vec![Err(LlmError::Api {
            status: 400,
            message: "bad request".to_string(),
        })]));
        let model = ResilientModel::new(inner.clone(), fast_policy());

        assert!(
            model
                .generate(&[ChatMessage::user("hi")], GenerateOptions::default())
                .await
                .is_err()
        );
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let model = ResilientModel::new(
            Arc::new(Sleepy),
            fast_policy()
                .with_max_attempts(1)
                .with_timeout(Duration::from_millis(20)),
        );

        let err = model
            .generate(&[ChatMessage::user("hi")], GenerateOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::Timeout(20)));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(800));
    }
}
