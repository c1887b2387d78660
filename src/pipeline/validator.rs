//! Candidate validation
//!
//! Every candidate of the round is checked concurrently, in three gates:
//! static syntax, a plan probe against the target database, and the plan
//! performance heuristics. A round succeeds when at least one candidate
//! passes all three.

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use super::Stage;
use super::graph::Node;
use super::state::{
    Candidate, FailureKind, PipelineState, StateUpdate, ValidatedCandidate, ValidationFeedback,
};
use crate::sql::{PlanAnalysis, analyze_plan, check_syntax};
use crate::storage::{DbFailure, SharedEngine};
use crate::types::AgentErrorCode;

/// Verdict for one candidate
#[derive(Debug)]
enum Verdict {
    Valid(ValidatedCandidate),
    Rejected(Rejection),
    /// The database itself failed; no rewrite would help
    Fatal(AgentErrorCode, String),
}

#[derive(Debug)]
enum Rejection {
    Syntax(String),
    Plan(String),
    Performance(PlanAnalysis),
}

impl Rejection {
    fn kind(&self) -> FailureKind {
        match self {
            Self::Syntax(_) => FailureKind::Syntax,
            Self::Plan(_) => FailureKind::Plan,
            Self::Performance(_) => FailureKind::Performance,
        }
    }
}

pub struct ValidateSqlStage {
    engine: SharedEngine,
    max_retries: u32,
    explain_max_rows: u64,
}

impl ValidateSqlStage {
    pub fn new(engine: SharedEngine, max_retries: u32, explain_max_rows: u64) -> Self {
        Self {
            engine,
            max_retries,
            explain_max_rows,
        }
    }

    async fn check(&self, candidate: &Candidate) -> Verdict {
        let syntax = check_syntax(&candidate.sql);
        if let Some(error) = syntax.error() {
            return Verdict::Rejected(Rejection::Syntax(error.to_string()));
        }

        let plan = match self.engine.explain(&candidate.sql).await {
            Ok(plan) => plan,
            Err(DbFailure::Statement(e)) => return Verdict::Rejected(Rejection::Plan(e)),
            Err(DbFailure::Timeout(limit)) => {
                return Verdict::Rejected(Rejection::Performance(PlanAnalysis {
                    ok: false,
                    issues: vec![format!("Plan probe exceeded {:?}", limit)],
                    raw: String::new(),
                }));
            }
            Err(DbFailure::Cancelled) => {
                return Verdict::Fatal(
                    AgentErrorCode::Cancelled,
                    AgentErrorCode::Cancelled.message().to_string(),
                );
            }
            Err(e @ DbFailure::System(_)) => {
                return Verdict::Fatal(AgentErrorCode::SystemError, e.to_string());
            }
        };

        let analysis = analyze_plan(&plan, self.explain_max_rows);
        if !analysis.ok {
            return Verdict::Rejected(Rejection::Performance(analysis));
        }

        Verdict::Valid(ValidatedCandidate {
            sql: candidate.sql.clone(),
            plan,
        })
    }
}

/// Feedback built from the rejections of a round
///
/// Each error slot holds the first message of its kind in candidate order.
/// The failure kind is the most basic one seen: syntax, then plan, then
/// performance.
fn feedback_from(rejections: Vec<Rejection>) -> ValidationFeedback {
    let mut feedback = ValidationFeedback {
        failure: rejections.iter().map(Rejection::kind).min(),
        ..Default::default()
    };
    for rejection in rejections {
        match rejection {
            Rejection::Syntax(e) => {
                feedback.syntax_error.get_or_insert(e);
            }
            Rejection::Plan(e) => {
                feedback.plan_error.get_or_insert(e);
            }
            Rejection::Performance(a) => {
                feedback.performance.get_or_insert(a);
            }
        }
    }
    feedback
}

#[async_trait]
impl Stage for ValidateSqlStage {
    fn node(&self) -> Node {
        Node::ValidateSql
    }

    #[instrument(skip_all, fields(candidates = state.candidates.len(), retry_count = state.retry_count))]
    async fn run(&self, state: &PipelineState) -> StateUpdate {
        if state.is_terminal() {
            return StateUpdate::none();
        }
        if state.candidates.is_empty() {
            return StateUpdate::fail_code(AgentErrorCode::ValidationAllFailed);
        }

        let verdicts = join_all(state.candidates.iter().map(|c| self.check(c))).await;

        let mut validated = Vec::new();
        let mut rejections = Vec::new();
        for verdict in verdicts {
            match verdict {
                Verdict::Valid(v) => validated.push(v),
                Verdict::Rejected(r) => {
                    debug!(kind = ?r.kind(), "Candidate rejected");
                    rejections.push(r)
                }
                Verdict::Fatal(code, message) => {
                    warn!(%code, "Validation aborted: {}", message);
                    return StateUpdate::fail(code, message);
                }
            }
        }

        if !validated.is_empty() {
            info!(
                valid = validated.len(),
                rejected = rejections.len(),
                "Validation round passed"
            );
            return StateUpdate {
                validated: Some(validated),
                feedback: Some(ValidationFeedback::default()),
                ..Default::default()
            };
        }

        let feedback = feedback_from(rejections);
        let retry_count = state.retry_count + 1;
        if retry_count >= self.max_retries {
            let message = feedback
                .primary_message()
                .unwrap_or_else(|| AgentErrorCode::ValidationRetryLimit.message().to_string());
            warn!(retry_count, "Validation retry limit reached");
            return StateUpdate {
                retry_count: Some(retry_count),
                feedback: Some(feedback),
                ..StateUpdate::fail(AgentErrorCode::ValidationRetryLimit, message)
            };
        }

        info!(retry_count, failure = ?feedback.failure, "All candidates rejected");
        StateUpdate {
            validated: Some(Vec::new()),
            retry_count: Some(retry_count),
            feedback: Some(feedback),
            ..Default::default()
        }
    }
}
