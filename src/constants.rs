//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Model call constants
pub mod llm {
    /// Default OpenAI model
    pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

    /// Default Ollama model
    pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1";

    /// Request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

    /// Maximum tokens to generate
    pub const DEFAULT_MAX_TOKENS: usize = 4096;

    /// Attempts per model call
    pub const DEFAULT_RETRY_ATTEMPTS: usize = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 500;

    /// Maximum delay between retries (seconds)
    pub const MAX_DELAY_SECS: u64 = 30;

    /// Backoff multiplier
    pub const BACKOFF_FACTOR: f32 = 2.0;
}

/// Orchestration limits
pub mod agent {
    /// Validation rounds before termination
    pub const MAX_RETRIES: u32 = 3;

    /// Schema re-retrievals before termination
    pub const MAX_SCHEMA_RETRIES: u32 = 3;

    /// Follow-up questions per turn
    pub const MAX_FOLLOW_UPS: u32 = 3;

    /// Candidates per normal generation round
    pub const CANDIDATE_COUNT: usize = 3;

    /// Candidates per arbitration round
    pub const ARBITRATION_CANDIDATE_COUNT: usize = 1;

    /// Sampling temperature for candidate generation
    pub const GENERATION_TEMPERATURE: f32 = 0.7;

    /// Recent message pairs kept in prompts
    pub const MAX_MESSAGE_PAIRS: usize = 5;

    /// Node executions per run
    pub const MAX_STEPS: usize = 25;
}

/// Plan-probe heuristics
pub mod validation {
    /// Estimated rows above which a full scan is flagged
    pub const EXPLAIN_MAX_ROWS: u64 = 10_000;
}

/// Consensus selection
pub mod selector {
    /// Row cap of the deterministic comparison sample
    pub const COMPARE_LIMIT: u64 = 50;
}

/// Final execution and summary
pub mod executor {
    /// Row cap of the final result
    pub const MAX_ROWS: usize = 1000;

    /// Rows shown to the summarizer
    pub const SUMMARY_SAMPLE_ROWS: usize = 20;
}

/// Schema retrieval
pub mod schema {
    /// Table schemas per lookup
    pub const TOP_K: usize = 5;
}

/// Storage layer
pub mod storage {
    /// Default connection pool size
    pub const DEFAULT_POOL_SIZE: u32 = 8;

    /// Seconds to wait for a pooled connection
    pub const CONNECTION_TIMEOUT_SECS: u64 = 30;

    /// Per-statement timeout (seconds)
    pub const QUERY_TIMEOUT_SECS: u64 = 30;

    /// SQLite busy timeout (milliseconds)
    pub const BUSY_TIMEOUT_MS: u32 = 5000;

    /// VM instructions between progress-handler checks
    pub const PROGRESS_HANDLER_OPS: i32 = 1000;

    /// Rows a fallback row estimate may visit on a table without rowid
    pub const ROW_ESTIMATE_SCAN_CAP: i64 = 100_000;

    /// Seconds a table's row estimate is reused by the plan probe
    pub const ROW_ESTIMATE_TTL_SECS: u64 = 300;
}
