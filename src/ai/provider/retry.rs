//! Retrying provider wrapper
//!
//! Retries retryable model-call failures with exponential backoff and
//! jitter. Non-retryable categories (auth, bad request, token limit) fail
//! on the first attempt. An attempt deadline, when set, bounds each call
//! separately; a timed-out attempt counts as a network failure and is
//! retried like one.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde_json::Value;
use tracing::warn;

use super::{LlmProvider, LlmResponse, SharedProvider};
use crate::ai::timeout::with_timeout;
use crate::constants::llm;
use crate::types::{ErrorClassifier, QuorumError, Result};

/// Backoff parameters for one model call
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first (minimum 1)
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub factor: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_attempts(llm::DEFAULT_RETRY_ATTEMPTS)
    }
}

impl RetryPolicy {
    pub fn with_attempts(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_delay: Duration::from_millis(llm::BASE_DELAY_MS),
            max_delay: Duration::from_secs(llm::MAX_DELAY_SECS),
            factor: llm::BACKOFF_FACTOR,
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.factor)
            .with_max_times(self.max_attempts - 1)
            .with_jitter()
    }
}

/// Provider decorator that retries transient failures
pub struct RetryingProvider {
    inner: SharedProvider,
    policy: RetryPolicy,
    attempt_timeout: Option<Duration>,
}

impl RetryingProvider {
    pub fn new(inner: SharedProvider, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            attempt_timeout: None,
        }
    }

    /// Bound every attempt by `timeout` instead of the whole retry series
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    async fn attempt(
        &self,
        prompt: &str,
        schema: &Value,
        temperature: Option<f32>,
    ) -> Result<LlmResponse> {
        let call = self.inner.generate(prompt, schema, temperature);
        match self.attempt_timeout {
            Some(limit) => with_timeout(limit, call, self.inner.name()).await,
            None => call.await,
        }
    }

    fn is_retryable(&self, err: &QuorumError) -> bool {
        ErrorClassifier::classify_error(err, self.inner.name()).is_retryable()
    }
}

#[async_trait]
impl LlmProvider for RetryingProvider {
    async fn generate(
        &self,
        prompt: &str,
        schema: &Value,
        temperature: Option<f32>,
    ) -> Result<LlmResponse> {
        (|| self.attempt(prompt, schema, temperature))
            .retry(self.policy.backoff())
            .when(|e| self.is_retryable(e))
            .notify(|e, delay| {
                warn!(
                    provider = self.inner.name(),
                    delay_ms = delay.as_millis() as u64,
                    "Model call failed, retrying: {}",
                    e
                );
            })
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn health_check(&self) -> Result<bool> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ErrorCategory, LlmError};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        calls: AtomicU32,
        fail_times: u32,
        category: ErrorCategory,
        /// Delay of the first call only
        first_delay: Duration,
    }

    impl FlakyProvider {
        fn new(fail_times: u32, category: ErrorCategory) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_times,
                category,
                first_delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl LlmProvider for FlakyProvider {
        async fn generate(&self, _: &str, _: &Value, _: Option<f32>) -> Result<LlmResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                tokio::time::sleep(self.first_delay).await;
            }
            if n < self.fail_times {
                Err(LlmError::new(self.category, "flaky").into())
            } else {
                Ok(LlmResponse::content_only(json!({"ok": true})))
            }
        }

        fn name(&self) -> &str {
            "flaky"
        }

        fn model(&self) -> &str {
            "flaky-1"
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
    }

    fn fast_policy(attempts: usize) -> RetryPolicy {
        RetryPolicy {
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..RetryPolicy::with_attempts(attempts)
        }
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let flaky = Arc::new(FlakyProvider::new(2, ErrorCategory::Transient));
        let provider = RetryingProvider::new(flaky.clone(), fast_policy(3));

        let response = provider.generate("p", &json!({}), None).await.unwrap();
        assert_eq!(response.content["ok"], true);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let flaky = Arc::new(FlakyProvider::new(10, ErrorCategory::Network));
        let provider = RetryingProvider::new(flaky.clone(), fast_policy(2));

        assert!(provider.generate("p", &json!({}), None).await.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_errors_fail_fast() {
        let flaky = Arc::new(FlakyProvider::new(10, ErrorCategory::Auth));
        let provider = RetryingProvider::new(flaky.clone(), fast_policy(5));

        assert!(provider.generate("p", &json!({}), None).await.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hung_attempt_is_cut_and_retried() {
        let flaky = Arc::new(FlakyProvider {
            first_delay: Duration::from_secs(30),
            ..FlakyProvider::new(0, ErrorCategory::Transient)
        });
        let provider = RetryingProvider::new(flaky.clone(), fast_policy(3))
            .with_attempt_timeout(Duration::from_millis(50));

        let response = tokio::time::timeout(
            Duration::from_secs(5),
            provider.generate("p", &json!({}), None),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(response.content["ok"], true);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_failure_within_attempt_deadline_is_retried() {
        let flaky = Arc::new(FlakyProvider {
            first_delay: Duration::from_millis(150),
            ..FlakyProvider::new(1, ErrorCategory::Transient)
        });
        let provider = RetryingProvider::new(flaky.clone(), fast_policy(3))
            .with_attempt_timeout(Duration::from_millis(250));

        let response = provider.generate("p", &json!({}), None).await.unwrap();
        assert_eq!(response.content["ok"], true);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_policy_clamps_to_one_attempt() {
        assert_eq!(RetryPolicy::with_attempts(0).max_attempts, 1);
    }
}
