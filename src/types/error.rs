//! Unified Error Type System
//!
//! One application error type, the stable agent error codes surfaced when a
//! pipeline run terminates unsuccessfully, and the categories that decide
//! whether a failed model call is worth retrying.
//!
//! ## Error Categories
//!
//! | Category      | Retried |
//! |---------------|---------|
//! | `RateLimit`   | yes     |
//! | `Network`     | yes     |
//! | `Transient`   | yes     |
//! | `ParseError`  | yes     |
//! | `Unknown`     | yes     |
//! | `TokenLimit`  | no      |
//! | `Auth`        | no      |
//! | `Unavailable` | no      |
//! | `BadRequest`  | no      |

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// Why a model call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    RateLimit,
    /// Prompt or completion exceeded the model context
    TokenLimit,
    Auth,
    Network,
    /// Model or endpoint does not exist
    Unavailable,
    BadRequest,
    /// Response was not the requested JSON
    ParseError,
    /// Server-side failure expected to clear up
    Transient,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "RATE_LIMIT",
            Self::TokenLimit => "TOKEN_LIMIT",
            Self::Auth => "AUTH",
            Self::Network => "NETWORK",
            Self::Unavailable => "UNAVAILABLE",
            Self::BadRequest => "BAD_REQUEST",
            Self::ParseError => "PARSE_ERROR",
            Self::Transient => "TRANSIENT",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Whether the same call may succeed when repeated
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Network | Self::Transient | Self::ParseError | Self::Unknown
        )
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// LLM Error
// =============================================================================

/// A categorized model-call failure
#[derive(Debug, Clone)]
pub struct LlmError {
    pub category: ErrorCategory,
    pub message: String,
    /// Provider that produced the error
    pub provider: Option<String>,
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.provider {
            Some(provider) => write!(f, "[{}:{}] {}", provider, self.category, self.message),
            None => write!(f, "[{}] {}", self.category, self.message),
        }
    }
}

impl std::error::Error for LlmError {}

impl LlmError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            provider: None,
        }
    }

    pub fn with_provider(
        category: ErrorCategory,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            provider: Some(provider.into()),
            ..Self::new(category, message)
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Message fragments per category, checked in order; the first hit wins
const MESSAGE_RULES: &[(ErrorCategory, &[&str])] = &[
    (
        ErrorCategory::RateLimit,
        &["rate limit", "429", "too many requests", "quota exceeded"],
    ),
    (
        ErrorCategory::TokenLimit,
        &[
            "context length",
            "maximum context",
            "token limit",
            "too many tokens",
            "too large",
        ],
    ),
    (
        ErrorCategory::Auth,
        &["401", "403", "api key", "unauthorized", "permission denied"],
    ),
    (
        ErrorCategory::Network,
        &[
            "network",
            "connection",
            "dns",
            "timeout",
            "timed out",
            "unreachable",
        ],
    ),
    (
        ErrorCategory::Transient,
        &[
            "500",
            "502",
            "503",
            "service unavailable",
            "server error",
            "overloaded",
        ],
    ),
    (ErrorCategory::Unavailable, &["404", "not found"]),
    (ErrorCategory::BadRequest, &["400", "bad request"]),
    (
        ErrorCategory::ParseError,
        &["parse", "json", "missing field", "unexpected token"],
    ),
];

/// Maps provider failures onto [`ErrorCategory`]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a free-text error message
    pub fn classify(message: &str, provider: &str) -> LlmError {
        let lower = message.to_lowercase();
        let category = MESSAGE_RULES
            .iter()
            .find(|(_, fragments)| fragments.iter().any(|f| lower.contains(f)))
            .map_or(ErrorCategory::Unknown, |(category, _)| *category);
        LlmError::with_provider(category, message, provider)
    }

    /// Classify an HTTP status; preferred over message matching when known
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> LlmError {
        let category = match status {
            429 => ErrorCategory::RateLimit,
            401 | 403 => ErrorCategory::Auth,
            400 | 422 => ErrorCategory::BadRequest,
            404 => ErrorCategory::Unavailable,
            408 => ErrorCategory::Network,
            500..=599 => ErrorCategory::Transient,
            _ => ErrorCategory::Unknown,
        };
        LlmError::with_provider(category, message, provider)
    }

    /// Classify an application error raised by a provider call
    pub fn classify_error(err: &QuorumError, provider: &str) -> LlmError {
        let category = match err {
            QuorumError::Llm(llm_err) => return llm_err.clone(),
            QuorumError::LlmApi(msg) => return Self::classify(msg, provider),
            QuorumError::Json(_) => ErrorCategory::ParseError,
            QuorumError::Timeout { .. } => ErrorCategory::Network,
            QuorumError::Config(_) => ErrorCategory::BadRequest,
            _ => ErrorCategory::Unknown,
        };
        LlmError::with_provider(category, err.to_string(), provider)
    }
}

// =============================================================================
// Agent Error Codes
// =============================================================================

/// Stable error codes written into the terminal state of a failed run.
///
/// The string code is what callers branch on; the message is the default
/// human-readable description used when no more specific text exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentErrorCode {
    EmptyQuery,
    NoSchemaResults,
    SchemaRetryLimit,
    FollowUpLimit,
    NoIrAst,
    NoSql,
    OnlySelect,
    LlmError,
    RetrievalError,
    ExecutionError,
    SystemError,
    ValidationRetryLimit,
    ValidationAllFailed,
    StepLimit,
    Cancelled,
}

impl AgentErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "empty_query",
            Self::NoSchemaResults => "no_schema_results",
            Self::SchemaRetryLimit => "schema_retry_limit",
            Self::FollowUpLimit => "follow_up_limit",
            Self::NoIrAst => "no_ir_ast",
            Self::NoSql => "no_sql",
            Self::OnlySelect => "only_select",
            Self::LlmError => "llm_error",
            Self::RetrievalError => "retrieval_error",
            Self::ExecutionError => "execution_error",
            Self::SystemError => "system_error",
            Self::ValidationRetryLimit => "validation_retry_limit",
            Self::ValidationAllFailed => "validation_all_failed",
            Self::StepLimit => "step_limit",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "No usable user query found in the conversation",
            Self::NoSchemaResults => "No matching table schema was found",
            Self::SchemaRetryLimit => "Schema retrieval limit reached",
            Self::FollowUpLimit => "Follow-up question limit reached",
            Self::NoIrAst => "Intent parsing produced no query representation",
            Self::NoSql => "No SQL candidate available",
            Self::OnlySelect => "Only SELECT statements are allowed",
            Self::LlmError => "Language model call failed",
            Self::RetrievalError => "Schema retrieval failed",
            Self::ExecutionError => "SQL execution failed",
            Self::SystemError => "Database system error",
            Self::ValidationRetryLimit => "SQL validation retry limit reached",
            Self::ValidationAllFailed => "All candidates failed validation",
            Self::StepLimit => "Pipeline step limit reached",
            Self::Cancelled => "Request was cancelled",
        }
    }
}

impl std::fmt::Display for AgentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum QuorumError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // -------------------------------------------------------------------------
    // LLM Errors
    // -------------------------------------------------------------------------
    /// Structured LLM error with category and retry hints
    #[error("LLM error: {0}")]
    Llm(LlmError),

    /// Simple LLM API error (use Llm variant for structured errors)
    #[error("LLM API error: {0}")]
    LlmApi(String),

    // -------------------------------------------------------------------------
    // Pipeline Errors
    // -------------------------------------------------------------------------
    /// Operation timeout with context
    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Schema retrieval error: {0}")]
    Retrieval(String),

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Checkpoint not found for thread {0}")]
    CheckpointNotFound(String),
}

impl From<LlmError> for QuorumError {
    fn from(err: LlmError) -> Self {
        QuorumError::Llm(err)
    }
}

impl From<r2d2::Error> for QuorumError {
    fn from(err: r2d2::Error) -> Self {
        QuorumError::Storage(format!("Failed to acquire database connection: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, QuorumError>;

// =============================================================================
// Helper Functions
// =============================================================================

impl QuorumError {
    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;

    /// Add context using a closure (lazy evaluation)
    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| QuorumError::Storage(format!("{}: {}", context.into(), e)))
    }

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| QuorumError::Storage(format!("{}: {}", f().into(), e)))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::RateLimit.to_string(), "RATE_LIMIT");
        assert_eq!(ErrorCategory::TokenLimit.to_string(), "TOKEN_LIMIT");
        assert_eq!(ErrorCategory::Auth.to_string(), "AUTH");
    }

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::RateLimit.is_retryable());
        assert!(ErrorCategory::Network.is_retryable());
        assert!(ErrorCategory::Transient.is_retryable());
        assert!(ErrorCategory::ParseError.is_retryable());
        assert!(!ErrorCategory::Auth.is_retryable());
        assert!(!ErrorCategory::BadRequest.is_retryable());
        assert!(!ErrorCategory::TokenLimit.is_retryable());
    }

    #[test]
    fn test_classify_rate_limit() {
        let err = ErrorClassifier::classify("Rate limit exceeded, please retry", "openai");
        assert_eq!(err.category, ErrorCategory::RateLimit);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_auth() {
        let err = ErrorClassifier::classify("Invalid API key provided", "openai");
        assert_eq!(err.category, ErrorCategory::Auth);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_network() {
        let err = ErrorClassifier::classify("Connection timed out after 30s", "ollama");
        assert_eq!(err.category, ErrorCategory::Network);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_parse() {
        let err = ErrorClassifier::classify("missing field `sql` at line 1", "openai");
        assert_eq!(err.category, ErrorCategory::ParseError);
    }

    #[test]
    fn test_classify_http_status() {
        let rate_limit = ErrorClassifier::classify_http_status(429, "Rate limited", "test");
        assert_eq!(rate_limit.category, ErrorCategory::RateLimit);

        let auth = ErrorClassifier::classify_http_status(401, "Unauthorized", "test");
        assert_eq!(auth.category, ErrorCategory::Auth);

        let server_error = ErrorClassifier::classify_http_status(500, "Server error", "test");
        assert_eq!(server_error.category, ErrorCategory::Transient);

        let gateway = ErrorClassifier::classify_http_status(504, "Gateway timeout", "test");
        assert_eq!(gateway.category, ErrorCategory::Transient);
    }

    #[test]
    fn test_classify_error_passes_structured_llm_error_through() {
        let inner = LlmError::new(ErrorCategory::Auth, "denied");
        let classified = ErrorClassifier::classify_error(&QuorumError::Llm(inner), "openai");
        assert_eq!(classified.category, ErrorCategory::Auth);

        let timeout = QuorumError::timeout("generation", Duration::from_secs(1));
        let classified = ErrorClassifier::classify_error(&timeout, "openai");
        assert!(classified.is_retryable());
    }

    #[test]
    fn test_classify_unmatched_message_is_unknown() {
        let err = ErrorClassifier::classify("something odd happened", "ollama");
        assert_eq!(err.category, ErrorCategory::Unknown);
        assert_eq!(err.provider.as_deref(), Some("ollama"));
    }

    #[test]
    fn test_agent_error_code_serde_matches_code() {
        for code in [
            AgentErrorCode::NoSql,
            AgentErrorCode::ValidationRetryLimit,
            AgentErrorCode::ValidationAllFailed,
            AgentErrorCode::SystemError,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.code()));
        }
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::with_provider(ErrorCategory::RateLimit, "Too many requests", "openai");
        assert_eq!(err.to_string(), "[openai:RATE_LIMIT] Too many requests");
    }
}
