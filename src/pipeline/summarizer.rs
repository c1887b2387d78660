//! Result summary
//!
//! Runs after a successful execution and appends a plain-language answer,
//! prefixed by the executed SQL, to the conversation.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::Stage;
use super::graph::Node;
use super::prompts::StagePrompts;
use super::schemas::{StageSchemas, SummaryResult};
use super::state::{PipelineState, StateUpdate};
use crate::ai::StructuredClient;
use crate::constants::executor::SUMMARY_SAMPLE_ROWS;
use crate::types::{ChatMessage, ResultRow, trim_messages};

/// Plain-language answer appended after a successful run
///
/// Never fails the run: a model failure falls back to a fixed sentence.
pub struct SummarizeStage {
    client: StructuredClient,
    max_message_pairs: usize,
}

impl SummarizeStage {
    pub fn new(client: StructuredClient, max_message_pairs: usize) -> Self {
        Self {
            client,
            max_message_pairs,
        }
    }
}

/// First rows of the result as a JSON array, or `(no data)`
fn result_sample(rows: &[ResultRow]) -> String {
    if rows.is_empty() {
        return "(no data)".to_string();
    }
    let sample = &rows[..rows.len().min(SUMMARY_SAMPLE_ROWS)];
    serde_json::to_string(sample).unwrap_or_else(|_| "(no data)".to_string())
}

fn fallback_summary(row_count: usize) -> String {
    if row_count == 0 {
        "Query finished, no matching data.".to_string()
    } else {
        format!("Query finished, {} rows returned.", row_count)
    }
}

#[async_trait]
impl Stage for SummarizeStage {
    fn node(&self) -> Node {
        Node::Summarize
    }

    #[instrument(skip_all)]
    async fn run(&self, state: &PipelineState) -> StateUpdate {
        if !state.is_success() {
            return StateUpdate::none();
        }

        let sql = state.selected_sql.clone().unwrap_or_default();
        let rows = state.rows.as_deref().unwrap_or_default();
        let prompt = StagePrompts::summarize(
            &trim_messages(&state.messages, self.max_message_pairs),
            &sql,
            rows.len(),
            &result_sample(rows),
        );

        let start = Instant::now();
        let summary = match self
            .client
            .complete::<SummaryResult>("summarize", &prompt, &StageSchemas::summary_schema(), None)
            .await
        {
            Ok(result) if !result.summary.trim().is_empty() => {
                info!(elapsed_ms = start.elapsed().as_millis() as u64, "Result summarized");
                result.summary.trim().to_string()
            }
            Ok(_) => fallback_summary(rows.len()),
            Err(e) => {
                warn!("Summary failed: {}", e);
                fallback_summary(rows.len())
            }
        };

        let content = if sql.is_empty() {
            summary.clone()
        } else {
            format!("```sql\n{}\n```\n\n{}", sql, summary)
        };

        StateUpdate {
            messages: vec![ChatMessage::ai(content)],
            summary: Some(summary),
            ..Default::default()
        }
    }
}
