//! Pipeline state
//!
//! `PipelineState` is the record threaded through the state machine. Nodes
//! never touch it directly: each returns a [`StateUpdate`] that
//! [`PipelineState::apply`] merges into the next record.

use serde::{Deserialize, Serialize};

use super::ir::IntentParseResult;
use crate::sql::{PlanAnalysis, PlanRow, plan_cost};
use crate::types::{AgentErrorCode, ChatMessage, ResultRow};

// =============================================================================
// Candidates
// =============================================================================

/// SQL produced by one generation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub sql: String,
}

/// Candidate that passed syntax, plan probe and performance checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedCandidate {
    pub sql: String,
    pub plan: Vec<PlanRow>,
}

impl ValidatedCandidate {
    pub fn cost(&self) -> u64 {
        plan_cost(&self.plan)
    }
}

/// Validated candidate plus its deterministic result sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedCandidate {
    pub sql: String,
    pub plan: Vec<PlanRow>,
    pub sample: Vec<ResultRow>,
}

impl ExecutedCandidate {
    pub fn cost(&self) -> u64 {
        plan_cost(&self.plan)
    }
}

/// What the consensus selector decided
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    Winner(String),
    NeedsArbitration(Vec<ExecutedCandidate>),
    NoConsensus(Vec<ExecutedCandidate>),
}

// =============================================================================
// Validation Feedback
// =============================================================================

/// Check that rejected a candidate, ordered by routing priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Syntax,
    Plan,
    Performance,
}

/// What the last validation round found, for the next round's prompts
///
/// Empty after a round in which some candidate validated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFeedback {
    /// Highest-priority rejection kind of the round; drives routing
    pub failure: Option<FailureKind>,
    pub syntax_error: Option<String>,
    pub plan_error: Option<String>,
    pub performance: Option<PlanAnalysis>,
}

impl ValidationFeedback {
    /// Error text for SQL regeneration: syntax first, then plan probe
    pub fn generation_hint(&self) -> Option<&str> {
        self.syntax_error.as_deref().or(self.plan_error.as_deref())
    }

    /// Performance issues joined for intent reshaping
    pub fn performance_hint(&self) -> Option<String> {
        self.performance
            .as_ref()
            .filter(|p| !p.ok)
            .map(|p| p.issues.join("; "))
    }

    /// Message describing the failure that drives routing
    pub fn primary_message(&self) -> Option<String> {
        match self.failure? {
            FailureKind::Syntax => self.syntax_error.clone(),
            FailureKind::Plan => self.plan_error.clone(),
            FailureKind::Performance => self.performance_hint(),
        }
    }
}

// =============================================================================
// Terminal Outcome
// =============================================================================

/// Final verdict of a run; set at most once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Terminal {
    Success,
    Failure {
        code: AgentErrorCode,
        message: String,
    },
}

impl Terminal {
    pub fn failure(code: AgentErrorCode, message: impl Into<String>) -> Self {
        Self::Failure {
            code,
            message: message.into(),
        }
    }

    /// Failure carrying the code's default message
    pub fn from_code(code: AgentErrorCode) -> Self {
        Self::failure(code, code.message())
    }
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub messages: Vec<ChatMessage>,
    /// Retrieved table schemas, de-duplicated in retrieval order
    pub schemas: Vec<String>,
    pub intent: Option<IntentParseResult>,

    pub candidates: Vec<Candidate>,
    pub validated: Vec<ValidatedCandidate>,
    pub executed: Vec<ExecutedCandidate>,
    pub selected_sql: Option<String>,
    pub needs_arbitration: bool,
    pub feedback: ValidationFeedback,

    pub retry_count: u32,
    pub schema_retry_count: u32,
    pub follow_up_count: u32,

    pub rows: Option<Vec<ResultRow>>,
    pub summary: Option<String>,
    pub terminal: Option<Terminal>,
}

impl PipelineState {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    pub fn is_success(&self) -> bool {
        matches!(self.terminal, Some(Terminal::Success))
    }

    /// Merge `update` into this state
    ///
    /// Messages append and schemas merge without duplicates. Once the state
    /// is terminal only messages and the summary still change, and the
    /// terminal verdict itself is never replaced. `retry_count` never
    /// decreases.
    pub fn apply(mut self, update: StateUpdate) -> Self {
        self.messages.extend(update.messages);
        if let Some(summary) = update.summary {
            self.summary = Some(summary);
        }
        if self.is_terminal() {
            return self;
        }

        for schema in update.schemas {
            if !self.schemas.contains(&schema) {
                self.schemas.push(schema);
            }
        }
        if let Some(intent) = update.intent {
            self.intent = Some(intent);
        }
        if let Some(candidates) = update.candidates {
            self.candidates = candidates;
        }
        if let Some(validated) = update.validated {
            self.validated = validated;
        }
        if let Some(executed) = update.executed {
            self.executed = executed;
        }
        if let Some(selected) = update.selected_sql {
            self.selected_sql = selected;
        }
        if let Some(flag) = update.needs_arbitration {
            self.needs_arbitration = flag;
        }
        if let Some(feedback) = update.feedback {
            self.feedback = feedback;
        }
        if let Some(n) = update.retry_count {
            self.retry_count = self.retry_count.max(n);
        }
        if let Some(n) = update.schema_retry_count {
            self.schema_retry_count = n;
        }
        if let Some(n) = update.follow_up_count {
            self.follow_up_count = n;
        }
        if let Some(rows) = update.rows {
            self.rows = Some(rows);
        }
        if let Some(terminal) = update.terminal {
            self.terminal = Some(terminal);
        }
        self
    }
}

/// Partial state produced by one node
///
/// `None` leaves a field untouched. `selected_sql: Some(None)` clears the
/// selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub messages: Vec<ChatMessage>,
    pub schemas: Vec<String>,
    pub intent: Option<IntentParseResult>,
    pub candidates: Option<Vec<Candidate>>,
    pub validated: Option<Vec<ValidatedCandidate>>,
    pub executed: Option<Vec<ExecutedCandidate>>,
    pub selected_sql: Option<Option<String>>,
    pub needs_arbitration: Option<bool>,
    pub feedback: Option<ValidationFeedback>,
    pub retry_count: Option<u32>,
    pub schema_retry_count: Option<u32>,
    pub follow_up_count: Option<u32>,
    pub rows: Option<Vec<ResultRow>>,
    pub summary: Option<String>,
    pub terminal: Option<Terminal>,
}

impl StateUpdate {
    /// No change
    pub fn none() -> Self {
        Self::default()
    }

    /// Terminal failure with an explicit message
    pub fn fail(code: AgentErrorCode, message: impl Into<String>) -> Self {
        Self {
            terminal: Some(Terminal::failure(code, message)),
            ..Default::default()
        }
    }

    /// Terminal failure with the code's default message
    pub fn fail_code(code: AgentErrorCode) -> Self {
        Self::fail(code, code.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validated(sql: &str, rows: &[u64]) -> ValidatedCandidate {
        ValidatedCandidate {
            sql: sql.to_string(),
            plan: rows
                .iter()
                .map(|&r| PlanRow {
                    table: Some("t".into()),
                    join_type: "ALL".into(),
                    estimated_rows: r,
                    ..Default::default()
                })
                .collect(),
        }
    }

    #[test]
    fn test_apply_merges_schemas_and_appends_messages() {
        let state = PipelineState::new(vec![ChatMessage::human("q")]).apply(StateUpdate {
            schemas: vec!["a".into(), "b".into()],
            ..Default::default()
        });
        let state = state.apply(StateUpdate {
            schemas: vec!["b".into(), "c".into()],
            messages: vec![ChatMessage::ai("which one?")],
            ..Default::default()
        });

        assert_eq!(state.schemas, vec!["a", "b", "c"]);
        assert_eq!(state.messages.len(), 2);
    }

    #[test]
    fn test_terminal_freezes_candidate_fields() {
        let state = PipelineState::default()
            .apply(StateUpdate {
                candidates: vec![Candidate { sql: "SELECT 1".into() }].into(),
                ..Default::default()
            })
            .apply(StateUpdate::fail_code(AgentErrorCode::NoSql));
        assert!(state.is_terminal());

        let after = state.clone().apply(StateUpdate {
            candidates: Some(vec![]),
            validated: Some(vec![validated("SELECT 2", &[1])]),
            retry_count: Some(9),
            terminal: Some(Terminal::Success),
            summary: Some("late summary".into()),
            ..Default::default()
        });

        assert_eq!(after.candidates, state.candidates);
        assert!(after.validated.is_empty());
        assert_eq!(after.retry_count, 0);
        assert_eq!(after.terminal, state.terminal);
        assert_eq!(after.summary.as_deref(), Some("late summary"));
    }

    #[test]
    fn test_retry_count_never_decreases() {
        let state = PipelineState::default()
            .apply(StateUpdate {
                retry_count: Some(2),
                ..Default::default()
            })
            .apply(StateUpdate {
                retry_count: Some(1),
                ..Default::default()
            });
        assert_eq!(state.retry_count, 2);
    }

    #[test]
    fn test_selected_sql_clear() {
        let state = PipelineState::default().apply(StateUpdate {
            selected_sql: Some(Some("SELECT 1".into())),
            ..Default::default()
        });
        assert_eq!(state.selected_sql.as_deref(), Some("SELECT 1"));

        let kept = state.clone().apply(StateUpdate::none());
        assert_eq!(kept.selected_sql.as_deref(), Some("SELECT 1"));

        let cleared = state.apply(StateUpdate {
            selected_sql: Some(None),
            ..Default::default()
        });
        assert!(cleared.selected_sql.is_none());
    }

    #[test]
    fn test_candidate_cost_sums_plan_rows() {
        assert_eq!(validated("SELECT 1", &[10, 5]).cost(), 15);
    }

    #[test]
    fn test_feedback_hints() {
        let feedback = ValidationFeedback {
            failure: Some(FailureKind::Performance),
            syntax_error: None,
            plan_error: Some("no such column: x".into()),
            performance: Some(PlanAnalysis {
                ok: false,
                issues: vec!["a".into(), "b".into()],
                raw: String::new(),
            }),
        };
        assert_eq!(feedback.generation_hint(), Some("no such column: x"));
        assert_eq!(feedback.performance_hint().as_deref(), Some("a; b"));
        assert_eq!(feedback.primary_message().as_deref(), Some("a; b"));
        assert_eq!(ValidationFeedback::default().primary_message(), None);
    }

    #[test]
    fn test_state_roundtrips_through_json() {
        let state = PipelineState::new(vec![ChatMessage::human("q")]).apply(StateUpdate {
            validated: Some(vec![validated("SELECT 1", &[3])]),
            follow_up_count: Some(1),
            ..Default::default()
        });
        let json = serde_json::to_string(&state).unwrap();
        let back: PipelineState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
