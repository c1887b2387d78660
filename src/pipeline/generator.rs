//! Candidate SQL generation

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use super::Stage;
use super::graph::Node;
use super::prompts::StagePrompts;
use super::schemas::{SqlResult, StageSchemas};
use super::state::{Candidate, PipelineState, StateUpdate};
use crate::ai::StructuredClient;
use crate::constants::agent::ARBITRATION_CANDIDATE_COUNT;
use crate::sql::normalize_sql;
use crate::types::AgentErrorCode;

pub struct GenerateSqlStage {
    client: StructuredClient,
    candidate_count: usize,
    temperature: f32,
}

impl GenerateSqlStage {
    pub fn new(client: StructuredClient, candidate_count: usize, temperature: f32) -> Self {
        Self {
            client,
            candidate_count,
            temperature,
        }
    }

    /// One extra candidate during arbitration, the full fan-out otherwise
    fn round_size(&self, state: &PipelineState) -> usize {
        if state.needs_arbitration {
            ARBITRATION_CANDIDATE_COUNT
        } else {
            self.candidate_count
        }
    }
}

#[async_trait]
impl Stage for GenerateSqlStage {
    fn node(&self) -> Node {
        Node::GenerateSql
    }

    #[instrument(skip_all, fields(retry_count = state.retry_count))]
    async fn run(&self, state: &PipelineState) -> StateUpdate {
        if state.is_terminal() {
            return StateUpdate::none();
        }

        let Some(ir) = state.intent.as_ref().and_then(|i| i.ir_ast.as_ref()) else {
            return StateUpdate::fail_code(AgentErrorCode::NoIrAst);
        };

        let prompt = StagePrompts::generate(
            &state.schemas.join("\n\n"),
            &ir.to_prompt_json(),
            state.feedback.generation_hint(),
        );
        let schema = StageSchemas::sql_schema();
        let k = self.round_size(state);

        let results = join_all((0..k).map(|_| {
            self.client
                .complete::<SqlResult>("generate_sql", &prompt, &schema, Some(self.temperature))
        }))
        .await;

        let mut last_error = None;
        let candidates: Vec<Candidate> = results
            .into_iter()
            .filter_map(|r| match r {
                Ok(result) => result.sql,
                Err(e) => {
                    debug!("Generation call failed: {}", e);
                    last_error = Some(e.to_string());
                    None
                }
            })
            .map(|sql| normalize_sql(&sql))
            .filter(|sql| !sql.is_empty())
            .map(|sql| Candidate { sql })
            .collect();

        if candidates.is_empty() {
            warn!(requested = k, "No candidate SQL produced");
            let message =
                last_error.unwrap_or_else(|| "Model returned no SQL for any candidate".into());
            return StateUpdate::fail(AgentErrorCode::LlmError, message);
        }

        info!(
            requested = k,
            produced = candidates.len(),
            arbitration = state.needs_arbitration,
            "Candidates generated"
        );

        let mut update = StateUpdate {
            candidates: Some(candidates),
            validated: Some(Vec::new()),
            ..Default::default()
        };
        if !state.needs_arbitration {
            update.executed = Some(Vec::new());
            update.selected_sql = Some(None);
        }
        update
    }
}
