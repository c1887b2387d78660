pub mod error;
pub mod message;
pub mod row;
pub mod utils;

pub use error::{
    AgentErrorCode, ErrorCategory, ErrorClassifier, LlmError, QuorumError, Result, ResultExt,
};
pub use message::{ChatMessage, Role, human_query_text, render_transcript, trim_messages};
pub use row::{ResultRow, value_text};
pub use utils::truncate_chars;

// =============================================================================
// Domain Newtypes
// =============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

/// Type-safe wrapper for conversation thread IDs
///
/// A thread groups the turns of one conversation; suspended turns are
/// checkpointed under it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random thread id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ThreadId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod newtype_tests {
    use super::*;

    #[test]
    fn test_thread_id() {
        let id = ThreadId::new("thread-123");
        assert_eq!(id.as_str(), "thread-123");
        assert_eq!(format!("{}", id), "thread-123");
    }

    #[test]
    fn test_generated_thread_ids_differ() {
        assert_ne!(ThreadId::generate(), ThreadId::generate());
    }

    #[test]
    fn test_thread_id_serializes_transparently() {
        let json = serde_json::to_string(&ThreadId::from("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
    }
}
