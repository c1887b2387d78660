//! AI Integration Layer
//!
//! Model providers, typed structured completion, and prompt construction
//! used by the pipeline stages.

pub mod prompt;
pub mod provider;
pub mod structured;
pub mod timeout;
pub mod validation;

pub use prompt::{PromptBuilder, PromptSection};
pub use provider::{
    ErrorCategory, ErrorClassifier, LlmError, LlmProvider, LlmResponse, ProviderConfig,
    ResponseMetadata, ResponseTiming, RetryPolicy, RetryingProvider, SharedProvider, TokenUsage,
    create_provider,
};
pub use structured::StructuredClient;
pub use timeout::{TimeoutConfig, with_timeout, with_timeout_map};
pub use validation::{JsonRepairer, extract_json_from_response};
