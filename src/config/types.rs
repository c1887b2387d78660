//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/sqlquorum/) and project (.sqlquorum/) level configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ai::provider::ProviderConfig;
use crate::constants::{agent, executor, llm, schema, selector, storage, validation};
use crate::types::{QuorumError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// LLM provider settings
    pub llm: LlmConfig,

    /// Orchestration limits and candidate fan-out
    pub agent: AgentConfig,

    /// Plan-probe heuristics
    pub validation: ValidationConfig,

    /// Consensus selection settings
    pub selector: SelectorConfig,

    /// Final execution settings
    pub executor: ExecutorConfig,

    /// Target database settings
    pub database: DatabaseConfig,

    /// Schema retrieval settings
    pub schema: SchemaConfig,

    /// Suspended turn storage
    pub checkpoint: CheckpointConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: LlmConfig::default(),
            agent: AgentConfig::default(),
            validation: ValidationConfig::default(),
            selector: SelectorConfig::default(),
            executor: ExecutorConfig::default(),
            database: DatabaseConfig::default(),
            schema: SchemaConfig::default(),
            checkpoint: CheckpointConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `QuorumError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(QuorumError::Config(format!(
                "LLM temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if !(0.0..=2.0).contains(&self.agent.generation_temperature)
            || self.agent.generation_temperature <= 0.0
        {
            return Err(QuorumError::Config(format!(
                "Generation temperature must be in (0.0, 2.0], got {}",
                self.agent.generation_temperature
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(QuorumError::Config(
                "LLM timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.agent.candidate_count == 0 {
            return Err(QuorumError::Config(
                "Agent candidate_count must be greater than 0".to_string(),
            ));
        }

        if self.agent.max_steps == 0 {
            return Err(QuorumError::Config(
                "Agent max_steps must be greater than 0".to_string(),
            ));
        }

        if self.selector.compare_limit == 0 {
            return Err(QuorumError::Config(
                "Selector compare_limit must be greater than 0".to_string(),
            ));
        }

        if self.database.query_timeout_secs == 0 || self.database.connection_timeout_secs == 0 {
            return Err(QuorumError::Config(
                "Database timeouts must be greater than 0".to_string(),
            ));
        }

        if self.database.pool_size == 0 {
            return Err(QuorumError::Config(
                "Database pool_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "openai" or "ollama"
    pub provider: String,

    /// Model name
    pub model: String,

    /// Custom API endpoint
    pub api_base: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Default sampling temperature for non-generation calls
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: usize,

    /// Attempts per model call (1 = no retry)
    pub retry_attempts: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: llm::DEFAULT_MODEL.to_string(),
            api_base: None,
            timeout_secs: llm::DEFAULT_TIMEOUT_SECS,
            temperature: 0.0,
            max_tokens: llm::DEFAULT_MAX_TOKENS,
            retry_attempts: llm::DEFAULT_RETRY_ATTEMPTS,
        }
    }
}

impl LlmConfig {
    /// Build a provider configuration; the API key comes from the environment.
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            provider: self.provider.clone(),
            model: Some(self.model.clone()),
            timeout_secs: self.timeout_secs,
            temperature: self.temperature,
            api_key: None,
            api_base: self.api_base.clone(),
            max_tokens: self.max_tokens,
        }
    }
}

// =============================================================================
// Agent Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Validation rounds before the run gives up
    pub max_retries: u32,

    /// Schema re-retrievals before the run gives up
    pub max_schema_retries: u32,

    /// Follow-up questions allowed per turn
    pub max_follow_ups: u32,

    /// Candidates generated per normal round
    pub candidate_count: usize,

    /// Sampling temperature for candidate generation
    pub generation_temperature: f32,

    /// Recent message pairs kept in prompts
    pub max_message_pairs: usize,

    /// Node executions allowed per run
    pub max_steps: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_retries: agent::MAX_RETRIES,
            max_schema_retries: agent::MAX_SCHEMA_RETRIES,
            max_follow_ups: agent::MAX_FOLLOW_UPS,
            candidate_count: agent::CANDIDATE_COUNT,
            generation_temperature: agent::GENERATION_TEMPERATURE,
            max_message_pairs: agent::MAX_MESSAGE_PAIRS,
            max_steps: agent::MAX_STEPS,
        }
    }
}

// =============================================================================
// Validation / Selection / Execution
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Estimated-row threshold for full scans
    pub explain_max_rows: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            explain_max_rows: validation::EXPLAIN_MAX_ROWS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Row cap of the deterministic comparison sample
    pub compare_limit: u64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            compare_limit: selector::COMPARE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Row cap of the final result
    pub max_rows: usize,

    /// Ask the model for a natural-language summary of the result
    pub summarize: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_rows: executor::MAX_ROWS,
            summarize: true,
        }
    }
}

// =============================================================================
// Storage Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Target SQLite database file
    pub path: PathBuf,

    /// Maximum pooled connections
    pub pool_size: u32,

    /// Seconds to wait for a pooled connection
    pub connection_timeout_secs: u64,

    /// Per-statement timeout for plan probes and sample execution
    pub query_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data.db"),
            pool_size: storage::DEFAULT_POOL_SIZE,
            connection_timeout_secs: storage::CONNECTION_TIMEOUT_SECS,
            query_timeout_secs: storage::QUERY_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Table schemas retrieved per lookup
    pub top_k: usize,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            top_k: schema::TOP_K,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Checkpoint database file
    pub path: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".sqlquorum/checkpoints.db"),
        }
    }
}
