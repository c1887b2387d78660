//! Orchestration State Machine
//!
//! ```text
//! RetrieveSchema → ParseIntent ─┬→ FollowUp (suspend)
//!        ↑                      ├→ RetrieveSchema
//!        │                      └→ GenerateSql → ValidateSql ─┬→ SelectSql ─┬→ Execute → Summarize
//!        │                              ↑                     │             ├→ GenerateSql (arbitration)
//!        └──────── plan error ──────────┼─────────────────────┤             └→ Judge → Execute
//!                  syntax error ────────┘                     │
//!                  performance ───────→ ParseIntent ←─────────┘
//! ```
//!
//! Every node returns a [`StateUpdate`]; routing is a pure function of the
//! node just run and the merged state. A run ends when the state turns
//! terminal, suspends at a follow-up question, hits the step bound, or is
//! cancelled.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::Stage;
use super::events::{EventSink, PipelineEvent};
use super::executor::ExecuteStage;
use super::follow_up::{FollowUpStage, follow_up_reply};
use super::generator::GenerateSqlStage;
use super::intent::ParseIntentStage;
use super::judge::JudgeStage;
use super::schema::{CatalogSchemaRetriever, RetrieveSchemaStage, SchemaRetriever};
use super::selector::SelectSqlStage;
use super::state::{FailureKind, PipelineState, StateUpdate, Terminal};
use super::summarizer::SummarizeStage;
use super::validator::ValidateSqlStage;
use crate::ai::provider::{RetryPolicy, RetryingProvider, SharedProvider};
use crate::ai::{StructuredClient, TimeoutConfig};
use crate::config::Config;
use crate::storage::{CheckpointStore, SharedEngine};
use crate::types::{AgentErrorCode, ChatMessage, ResultRow, Result, ThreadId};

// =============================================================================
// Nodes and Routing
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    RetrieveSchema,
    ParseIntent,
    FollowUp,
    GenerateSql,
    ValidateSql,
    SelectSql,
    Judge,
    Execute,
    Summarize,
}

impl Node {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RetrieveSchema => "retrieve_schema",
            Self::ParseIntent => "parse_intent",
            Self::FollowUp => "follow_up",
            Self::GenerateSql => "generate_sql",
            Self::ValidateSql => "validate_sql",
            Self::SelectSql => "select_sql",
            Self::Judge => "judge",
            Self::Execute => "execute",
            Self::Summarize => "summarize",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where the run goes after a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    Node(Node),
    /// Pause the turn and ask the user this question
    Suspend(String),
    End,
}

pub fn route_after_intent(state: &PipelineState) -> Next {
    let Some(intent) = state.intent.as_ref() else {
        return Next::Node(Node::GenerateSql);
    };
    if intent.follow_up().is_some() {
        Next::Node(Node::FollowUp)
    } else if intent.need_retry_retrieve {
        Next::Node(Node::RetrieveSchema)
    } else {
        Next::Node(Node::GenerateSql)
    }
}

/// Syntax errors regenerate, plan errors re-retrieve schemas, performance
/// issues reshape the intent
pub fn route_after_validate(state: &PipelineState) -> Next {
    if !state.validated.is_empty() {
        return Next::Node(Node::SelectSql);
    }
    match state.feedback.failure {
        Some(FailureKind::Plan) => Next::Node(Node::RetrieveSchema),
        Some(FailureKind::Performance) => Next::Node(Node::ParseIntent),
        Some(FailureKind::Syntax) | None => Next::Node(Node::GenerateSql),
    }
}

pub fn route_after_select(state: &PipelineState) -> Next {
    if state.selected_sql.is_some() {
        Next::Node(Node::Execute)
    } else if state.needs_arbitration {
        Next::Node(Node::GenerateSql)
    } else {
        Next::Node(Node::Judge)
    }
}

/// Successor of `node` given the merged state
pub fn route(node: Node, state: &PipelineState, summarize: bool) -> Next {
    match node {
        Node::Execute if state.is_success() && summarize => return Next::Node(Node::Summarize),
        Node::Summarize => return Next::End,
        _ if state.is_terminal() => return Next::End,
        _ => {}
    }

    match node {
        Node::RetrieveSchema => Next::Node(Node::ParseIntent),
        Node::ParseIntent => route_after_intent(state),
        Node::FollowUp => state
            .intent
            .as_ref()
            .and_then(|i| i.follow_up())
            .map_or(Next::End, |q| Next::Suspend(q.to_string())),
        Node::GenerateSql => Next::Node(Node::ValidateSql),
        Node::ValidateSql => route_after_validate(state),
        Node::SelectSql => route_after_select(state),
        Node::Judge => Next::Node(Node::Execute),
        Node::Execute | Node::Summarize => Next::End,
    }
}

/// One-line description of what `node` left in the state
fn describe(node: Node, state: &PipelineState) -> String {
    if let Some(Terminal::Failure { code, .. }) = &state.terminal {
        return format!("failed: {}", code);
    }
    match node {
        Node::RetrieveSchema => format!("{} table schemas", state.schemas.len()),
        Node::ParseIntent => match state.intent.as_ref() {
            Some(i) if i.follow_up().is_some() => "needs clarification".to_string(),
            Some(i) if i.need_retry_retrieve => "schemas insufficient".to_string(),
            _ => "intent parsed".to_string(),
        },
        Node::FollowUp => "asking the user".to_string(),
        Node::GenerateSql => format!("{} candidates", state.candidates.len()),
        Node::ValidateSql => format!(
            "{} of {} candidates valid",
            state.validated.len(),
            state.candidates.len()
        ),
        Node::SelectSql if state.selected_sql.is_some() => "winner selected".to_string(),
        Node::SelectSql if state.needs_arbitration => "results disagree".to_string(),
        Node::SelectSql => "no consensus".to_string(),
        Node::Judge => "judge decided".to_string(),
        Node::Execute => format!("{} rows", state.rows.as_ref().map_or(0, Vec::len)),
        Node::Summarize => "summary ready".to_string(),
    }
}

// =============================================================================
// Turn Outcome
// =============================================================================

/// What a turn produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    Success {
        thread_id: ThreadId,
        sql: String,
        rows: Vec<ResultRow>,
        summary: Option<String>,
    },
    /// The turn is paused; answer with [`QueryPipeline::resume`]
    FollowUp {
        thread_id: ThreadId,
        question: String,
    },
    Failure {
        thread_id: ThreadId,
        code: AgentErrorCode,
        message: String,
    },
}

impl TurnOutcome {
    fn from_state(thread_id: ThreadId, state: PipelineState) -> Self {
        match state.terminal {
            Some(Terminal::Success) => Self::Success {
                thread_id,
                sql: state.selected_sql.unwrap_or_default(),
                rows: state.rows.unwrap_or_default(),
                summary: state.summary,
            },
            Some(Terminal::Failure { code, message }) => Self::Failure {
                thread_id,
                code,
                message,
            },
            None => Self::Failure {
                thread_id,
                code: AgentErrorCode::NoSql,
                message: AgentErrorCode::NoSql.message().to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

// =============================================================================
// Pipeline
// =============================================================================

struct Stages {
    retrieve: RetrieveSchemaStage,
    intent: ParseIntentStage,
    follow_up: FollowUpStage,
    generate: GenerateSqlStage,
    validate: ValidateSqlStage,
    select: SelectSqlStage,
    judge: JudgeStage,
    execute: ExecuteStage,
    summarize: SummarizeStage,
}

impl Stages {
    fn get(&self, node: Node) -> &dyn Stage {
        match node {
            Node::RetrieveSchema => &self.retrieve,
            Node::ParseIntent => &self.intent,
            Node::FollowUp => &self.follow_up,
            Node::GenerateSql => &self.generate,
            Node::ValidateSql => &self.validate,
            Node::SelectSql => &self.select,
            Node::Judge => &self.judge,
            Node::Execute => &self.execute,
            Node::Summarize => &self.summarize,
        }
    }
}

/// The NL→SQL state machine
///
/// Owns every stage plus the checkpoint store for suspended turns. One
/// instance serves any number of sequential turns across threads.
pub struct QueryPipeline {
    stages: Stages,
    checkpoints: Arc<CheckpointStore>,
    events: EventSink,
    max_steps: usize,
    summarize: bool,
    max_retrievals: u32,
    top_k: usize,
}

impl QueryPipeline {
    /// Build every stage from `config`
    ///
    /// Judge and summary calls go through a retrying wrapper of `provider`
    /// with the request timeout applied per attempt; generation and intent
    /// calls do not, since a failed candidate is simply dropped. Schemas come from the target database's catalog
    /// unless replaced with [`with_retriever`](Self::with_retriever).
    pub fn new(
        config: &Config,
        provider: SharedProvider,
        engine: SharedEngine,
        checkpoints: Arc<CheckpointStore>,
    ) -> Self {
        let timeout = TimeoutConfig::from_config(config).llm_request;
        let client = StructuredClient::new(provider.clone(), timeout);
        let retrying: SharedProvider = Arc::new(
            RetryingProvider::new(
                provider,
                RetryPolicy::with_attempts(config.llm.retry_attempts),
            )
            .with_attempt_timeout(timeout),
        );
        let retrying_client = StructuredClient::without_deadline(retrying);
        let agent = &config.agent;

        let stages = Stages {
            retrieve: RetrieveSchemaStage::new(
                Arc::new(CatalogSchemaRetriever::new(engine.clone())),
                config.schema.top_k,
                agent.max_schema_retries,
            ),
            intent: ParseIntentStage::new(
                client.clone(),
                agent.max_message_pairs,
                Some(config.llm.temperature),
            ),
            follow_up: FollowUpStage::new(agent.max_follow_ups),
            generate: GenerateSqlStage::new(
                client,
                agent.candidate_count,
                agent.generation_temperature,
            ),
            validate: ValidateSqlStage::new(
                engine.clone(),
                agent.max_retries,
                config.validation.explain_max_rows,
            ),
            select: SelectSqlStage::new(engine.clone(), config.selector.compare_limit),
            judge: JudgeStage::new(retrying_client.clone(), agent.max_message_pairs),
            execute: ExecuteStage::new(engine, config.executor.max_rows),
            summarize: SummarizeStage::new(retrying_client, agent.max_message_pairs),
        };

        Self {
            stages,
            checkpoints,
            events: EventSink::default(),
            max_steps: agent.max_steps,
            summarize: config.executor.summarize,
            max_retrievals: agent.max_schema_retries,
            top_k: config.schema.top_k,
        }
    }

    /// Replace the catalog schema retriever
    pub fn with_retriever(mut self, retriever: Arc<dyn SchemaRetriever>) -> Self {
        self.stages.retrieve = RetrieveSchemaStage::new(retriever, self.top_k, self.max_retrievals);
        self
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Answer `question`, the newest message of `history`
    ///
    /// A paused turn left on `thread_id` is dropped; the question starts a
    /// fresh run.
    #[instrument(skip(self, thread_id, history, question, cancel), fields(thread = %thread_id))]
    pub async fn run_turn(
        &self,
        thread_id: &ThreadId,
        history: &[ChatMessage],
        question: &str,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome> {
        if self.checkpoints.discard(thread_id)? {
            warn!("Dropped paused turn replaced by a new question");
        }

        let mut messages = history.to_vec();
        messages.push(ChatMessage::human(question));
        self.drive(thread_id, PipelineState::new(messages), Node::RetrieveSchema, cancel)
            .await
    }

    /// Continue a turn paused at a follow-up question
    #[instrument(skip(self, thread_id, reply, cancel), fields(thread = %thread_id))]
    pub async fn resume(
        &self,
        thread_id: &ThreadId,
        reply: &str,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome> {
        let state: PipelineState = self.checkpoints.require(thread_id)?;
        let update = follow_up_reply(&state, reply);
        info!(follow_up_count = state.follow_up_count + 1, "Resuming paused turn");
        self.drive(thread_id, state.apply(update), Node::ParseIntent, cancel)
            .await
    }

    /// Drop the paused turn of `thread_id`; false when none existed
    pub fn discard(&self, thread_id: &ThreadId) -> Result<bool> {
        self.checkpoints.discard(thread_id)
    }

    async fn drive(
        &self,
        thread_id: &ThreadId,
        mut state: PipelineState,
        entry: Node,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome> {
        let start = Instant::now();
        let mut node = entry;
        let mut step = 0usize;

        loop {
            if step >= self.max_steps {
                warn!(step, "Step limit reached");
                state = state.apply(StateUpdate::fail_code(AgentErrorCode::StepLimit));
                break;
            }
            step += 1;

            let node_start = Instant::now();
            let stage = self.stages.get(node);
            let update = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(%node, "Turn cancelled");
                    StateUpdate::fail_code(AgentErrorCode::Cancelled)
                }
                update = stage.run(&state) => update,
            };
            state = state.apply(update);

            let detail = describe(node, &state);
            debug!(%node, step, detail = %detail, "Node completed");
            self.events.emit(PipelineEvent::NodeCompleted {
                node,
                step,
                elapsed_ms: node_start.elapsed().as_millis() as u64,
                detail,
            });

            match route(node, &state, self.summarize) {
                Next::Node(next) => node = next,
                Next::Suspend(question) => {
                    self.checkpoints.save(thread_id, &state)?;
                    info!(step, "Turn suspended for follow-up");
                    self.events.emit(PipelineEvent::Suspended {
                        question: question.clone(),
                    });
                    return Ok(TurnOutcome::FollowUp {
                        thread_id: thread_id.clone(),
                        question,
                    });
                }
                Next::End => break,
            }
        }

        self.checkpoints.discard(thread_id)?;
        let total_ms = start.elapsed().as_millis() as u64;
        info!(
            steps = step,
            success = state.is_success(),
            retry_count = state.retry_count,
            total_ms,
            "Turn finished"
        );
        self.events.emit(PipelineEvent::Finished {
            success: state.is_success(),
            total_ms,
        });

        Ok(TurnOutcome::from_state(thread_id.clone(), state))
    }
}
