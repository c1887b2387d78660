//! Final execution of the selected SQL

use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::Stage;
use super::graph::Node;
use super::state::{PipelineState, StateUpdate, Terminal};
use crate::storage::{DbFailure, SharedEngine};
use crate::types::AgentErrorCode;

pub struct ExecuteStage {
    engine: SharedEngine,
    max_rows: usize,
}

impl ExecuteStage {
    pub fn new(engine: SharedEngine, max_rows: usize) -> Self {
        Self { engine, max_rows }
    }
}

#[async_trait]
impl Stage for ExecuteStage {
    fn node(&self) -> Node {
        Node::Execute
    }

    #[instrument(skip_all)]
    async fn run(&self, state: &PipelineState) -> StateUpdate {
        if state.is_terminal() {
            return StateUpdate::none();
        }
        let Some(sql) = state.selected_sql.as_deref() else {
            return StateUpdate::fail_code(AgentErrorCode::NoSql);
        };

        let start = Instant::now();
        match self.engine.execute(sql, self.max_rows).await {
            Ok(rows) => {
                info!(
                    rows = rows.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Query executed"
                );
                StateUpdate {
                    rows: Some(rows),
                    terminal: Some(Terminal::Success),
                    ..Default::default()
                }
            }
            Err(DbFailure::Cancelled) => StateUpdate::fail_code(AgentErrorCode::Cancelled),
            Err(e @ DbFailure::System(_)) => {
                warn!("Execution hit a system failure: {}", e);
                StateUpdate::fail(AgentErrorCode::SystemError, e.to_string())
            }
            Err(e) => {
                warn!("Execution failed: {}", e);
                StateUpdate::fail(AgentErrorCode::ExecutionError, e.to_string())
            }
        }
    }
}
