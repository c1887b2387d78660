//! Conversation messages exchanged between the user and the pipeline.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Ai,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Human => "User",
            Self::Ai => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: Role::Ai,
            content: content.into(),
        }
    }

    pub fn is_human(&self) -> bool {
        self.role == Role::Human
    }
}

/// Keep the first message plus the most recent `max_pairs * 2` messages.
///
/// The first message is the original request and anchors every prompt.
pub fn trim_messages(messages: &[ChatMessage], max_pairs: usize) -> Vec<ChatMessage> {
    let keep = max_pairs * 2;
    if messages.len() <= keep + 1 {
        return messages.to_vec();
    }

    let mut trimmed = Vec::with_capacity(keep + 1);
    trimmed.push(messages[0].clone());
    trimmed.extend_from_slice(&messages[messages.len() - keep..]);
    trimmed
}

/// All human message contents joined by newline, trimmed.
pub fn human_query_text(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .filter(|m| m.is_human())
        .map(|m| m.content.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render messages as `Role: content` lines for prompts.
pub fn render_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.label(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}
