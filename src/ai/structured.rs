//! Typed structured completion
//!
//! Thin layer over `LlmProvider`: one call, JSON value in, deserialized
//! type out. The call is bounded by the client's deadline unless the
//! provider bounds its own attempts. Pipeline stages talk to the model only through
//! `StructuredClient`.

use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::provider::SharedProvider;
use super::timeout::with_timeout;
use crate::types::{QuorumError, Result};

#[derive(Clone)]
pub struct StructuredClient {
    provider: SharedProvider,
    timeout: Option<Duration>,
}

impl StructuredClient {
    pub fn new(provider: SharedProvider, timeout: Duration) -> Self {
        Self {
            provider,
            timeout: Some(timeout),
        }
    }

    /// Client for a provider that applies its own per-attempt deadline,
    /// such as a [`RetryingProvider`](super::provider::RetryingProvider)
    pub fn without_deadline(provider: SharedProvider) -> Self {
        Self {
            provider,
            timeout: None,
        }
    }

    pub fn provider(&self) -> &SharedProvider {
        &self.provider
    }

    /// Complete `prompt` and deserialize the response into `T`
    ///
    /// A response that does not match `T` is a parse error, same as
    /// malformed JSON.
    pub async fn complete<T: DeserializeOwned>(
        &self,
        operation: &str,
        prompt: &str,
        schema: &Value,
        temperature: Option<f32>,
    ) -> Result<T> {
        let start = Instant::now();
        let call = self.provider.generate(prompt, schema, temperature);
        let response = match self.timeout {
            Some(limit) => with_timeout(limit, call, operation).await?,
            None => call.await?,
        };

        debug!(
            operation,
            provider = %response.metadata.provider,
            tokens = response.usage.total(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Structured completion finished"
        );

        serde_json::from_value(response.content).map_err(|e| {
            QuorumError::LlmApi(format!("{}: response did not match schema: {}", operation, e))
        })
    }
}
