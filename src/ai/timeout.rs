//! Per-call Timeouts
//!
//! Every external call of a pipeline run (model completion, plan probe,
//! sample execution) is bounded individually. A timed-out call fails only
//! that call; the caller decides whether it is fatal.
//!
//! ## Usage
//!
//! ```ignore
//! use crate::ai::timeout::{TimeoutConfig, with_timeout};
//!
//! let timeouts = TimeoutConfig::from_config(&config);
//! let response = with_timeout(
//!     timeouts.llm_request,
//!     provider.generate(&prompt, &schema, Some(0.7)),
//!     "candidate generation",
//! ).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use crate::config::Config;
use crate::constants::{llm, storage};
use crate::types::{QuorumError, Result};

/// Timeouts applied to the external calls of one run
#[derive(Debug, Clone, Copy)]
pub struct TimeoutConfig {
    /// Model completion requests
    pub llm_request: Duration,
    /// Plan probes and sample/final execution
    pub database: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm_request: Duration::from_secs(llm::DEFAULT_TIMEOUT_SECS),
            database: Duration::from_secs(storage::QUERY_TIMEOUT_SECS),
        }
    }
}

impl TimeoutConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            llm_request: Duration::from_secs(config.llm.timeout_secs),
            database: Duration::from_secs(config.database.query_timeout_secs),
        }
    }
}

/// Execute an async operation with a timeout
///
/// Returns a timeout error if the operation doesn't complete within the specified duration.
/// The inner future is dropped on timeout.
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(QuorumError::timeout(operation_name, timeout)),
    }
}

/// Execute an async operation with a timeout, wrapping a non-Result output
pub async fn with_timeout_map<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => Ok(result),
        Err(_) => Err(QuorumError::timeout(operation_name, timeout)),
    }
}
