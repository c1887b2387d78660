//! Arbitration judge
//!
//! Last resort after voting failed twice: the model picks one of the
//! executed candidates by number.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::Stage;
use super::graph::Node;
use super::prompts::StagePrompts;
use super::schemas::{JudgeResult, StageSchemas};
use super::state::{PipelineState, StateUpdate};
use crate::ai::StructuredClient;
use crate::types::{AgentErrorCode, trim_messages};

pub struct JudgeStage {
    /// Client over the retrying provider
    client: StructuredClient,
    max_message_pairs: usize,
}

impl JudgeStage {
    pub fn new(client: StructuredClient, max_message_pairs: usize) -> Self {
        Self {
            client,
            max_message_pairs,
        }
    }
}

/// Zero-based index for a 1-based `choice`, if it names a candidate
fn chosen_index(choice: i64, candidates: usize) -> Option<usize> {
    choice
        .checked_sub(1)
        .and_then(|i| usize::try_from(i).ok())
        .filter(|&i| i < candidates)
}

#[async_trait]
impl Stage for JudgeStage {
    fn node(&self) -> Node {
        Node::Judge
    }

    #[instrument(skip_all, fields(candidates = state.executed.len()))]
    async fn run(&self, state: &PipelineState) -> StateUpdate {
        if state.is_terminal() {
            return StateUpdate::none();
        }
        if state.executed.is_empty() {
            warn!("Judge has no candidates");
            return StateUpdate::fail_code(AgentErrorCode::NoSql);
        }

        let candidates: Vec<&str> = state.executed.iter().map(|e| e.sql.as_str()).collect();
        let prompt = StagePrompts::judge(
            &trim_messages(&state.messages, self.max_message_pairs),
            &state.schemas.join("\n\n"),
            &candidates,
        );

        let start = Instant::now();
        let verdict: JudgeResult = match self
            .client
            .complete("judge", &prompt, &StageSchemas::judge_schema(), None)
            .await
        {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!("Judge call failed: {}", e);
                return StateUpdate::fail(AgentErrorCode::LlmError, e.to_string());
            }
        };

        let index = chosen_index(verdict.choice, candidates.len()).unwrap_or_else(|| {
            warn!(choice = verdict.choice, "Judge choice out of range, using first candidate");
            0
        });
        info!(
            index,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Judge selected candidate"
        );

        StateUpdate {
            selected_sql: Some(Some(candidates[index].to_string())),
            ..Default::default()
        }
    }
}
