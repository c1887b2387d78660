//! Follow-up questions
//!
//! When the intent is ambiguous the turn suspends with a question for the
//! user; the reply resumes it at intent parsing.

use async_trait::async_trait;
use tracing::warn;

use super::Stage;
use super::graph::Node;
use super::state::{PipelineState, StateUpdate};
use crate::types::{AgentErrorCode, ChatMessage};

/// Checks the follow-up budget; the graph suspends the turn afterwards
pub struct FollowUpStage {
    max_follow_ups: u32,
}

impl FollowUpStage {
    pub fn new(max_follow_ups: u32) -> Self {
        Self { max_follow_ups }
    }
}

#[async_trait]
impl Stage for FollowUpStage {
    fn node(&self) -> Node {
        Node::FollowUp
    }

    async fn run(&self, state: &PipelineState) -> StateUpdate {
        if state.is_terminal() {
            return StateUpdate::none();
        }
        if state.follow_up_count >= self.max_follow_ups {
            warn!(follow_up_count = state.follow_up_count, "Follow-up limit reached");
            return StateUpdate::fail_code(AgentErrorCode::FollowUpLimit);
        }
        StateUpdate::none()
    }
}

/// State changes applied when the user answers a follow-up question
pub fn follow_up_reply(state: &PipelineState, reply: &str) -> StateUpdate {
    StateUpdate {
        messages: vec![ChatMessage::human(reply)],
        follow_up_count: Some(state.follow_up_count + 1),
        schema_retry_count: Some(0),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::state::Terminal;

    #[tokio::test]
    async fn test_follow_up_budget() {
        let stage = FollowUpStage::new(2);
        let mut state = PipelineState::new(vec![ChatMessage::human("q")]);
        assert!(stage.run(&state).await.terminal.is_none());

        state.follow_up_count = 2;
        assert!(matches!(
            stage.run(&state).await.terminal,
            Some(Terminal::Failure {
                code: AgentErrorCode::FollowUpLimit,
                ..
            })
        ));
    }

    #[test]
    fn test_reply_resets_schema_budget() {
        let mut state = PipelineState::new(vec![ChatMessage::human("q")]);
        state.follow_up_count = 1;
        state.schema_retry_count = 2;

        let next = state.clone().apply(follow_up_reply(&state, "2024"));
        assert_eq!(next.follow_up_count, 2);
        assert_eq!(next.schema_retry_count, 0);
        assert_eq!(next.messages.last(), Some(&ChatMessage::human("2024")));
    }
}
