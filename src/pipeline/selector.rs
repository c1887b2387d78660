//! Consensus selection
//!
//! Validated candidates are executed on a capped, stably ordered sample and
//! grouped by result equivalence. The largest group wins when it has more
//! than one member; its cheapest member (by plan cost) is the winner.
//! Without a majority the first time, one extra candidate is requested;
//! without a majority after that, the judge decides.

use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use super::Stage;
use super::graph::Node;
use super::state::{
    ExecutedCandidate, PipelineState, SelectionOutcome, StateUpdate, ValidatedCandidate,
};
use crate::sql::ensure_deterministic_sample;
use crate::storage::{DbFailure, SharedEngine};
use crate::types::{AgentErrorCode, ResultRow};

// =============================================================================
// Equivalence and Voting
// =============================================================================

/// Rows reduced to sorted value signatures, themselves sorted
fn normalized(rows: &[ResultRow]) -> Vec<Vec<String>> {
    let mut out: Vec<Vec<String>> = rows.iter().map(ResultRow::value_signature).collect();
    out.sort();
    out
}

/// Whether two samples hold the same rows, ignoring row order, column order
/// and column names
pub fn results_equivalent(a: &[ResultRow], b: &[ResultRow]) -> bool {
    a.len() == b.len() && normalized(a) == normalized(b)
}

/// Group indices of `entries` by result equivalence
///
/// Each entry joins the first group whose first member it matches.
pub fn cluster(entries: &[ExecutedCandidate]) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        match groups
            .iter_mut()
            .find(|g| results_equivalent(&entry.sample, &entries[g[0]].sample))
        {
            Some(group) => group.push(i),
            None => groups.push(vec![i]),
        }
    }
    groups
}

/// Cheapest member of the largest group, if that group is a real majority
///
/// Among equally large groups the earliest formed wins. A lone group counts
/// as a majority even with a single member.
pub fn find_majority(entries: &[ExecutedCandidate]) -> Option<&ExecutedCandidate> {
    let groups = cluster(entries);
    let largest = groups
        .iter()
        .fold(None::<&Vec<usize>>, |best, g| match best {
            Some(b) if b.len() >= g.len() => Some(b),
            _ => Some(g),
        })?;

    if largest.len() <= 1 && groups.len() > 1 {
        return None;
    }

    largest
        .iter()
        .map(|&i| &entries[i])
        .min_by_key(|e| e.cost())
}

/// Decide over every executed candidate of the turn
///
/// `has_previous` is true when some of `all` were carried over from the
/// round before arbitration.
pub fn select(all: Vec<ExecutedCandidate>, has_previous: bool) -> SelectionOutcome {
    if all.len() == 1 {
        return SelectionOutcome::Winner(all[0].sql.clone());
    }
    if let Some(winner) = find_majority(&all) {
        return SelectionOutcome::Winner(winner.sql.clone());
    }
    if has_previous {
        SelectionOutcome::NoConsensus(all)
    } else {
        SelectionOutcome::NeedsArbitration(all)
    }
}

// =============================================================================
// SelectSql Stage
// =============================================================================

enum SampleOutcome {
    Executed(ExecutedCandidate),
    Excluded,
    Fatal(AgentErrorCode, String),
}

pub struct SelectSqlStage {
    engine: SharedEngine,
    compare_limit: u64,
}

impl SelectSqlStage {
    pub fn new(engine: SharedEngine, compare_limit: u64) -> Self {
        Self {
            engine,
            compare_limit,
        }
    }

    async fn sample(&self, candidate: &ValidatedCandidate) -> SampleOutcome {
        let sql = ensure_deterministic_sample(&candidate.sql, self.compare_limit);
        match self.engine.execute(&sql, self.compare_limit as usize).await {
            Ok(sample) => SampleOutcome::Executed(ExecutedCandidate {
                sql: candidate.sql.clone(),
                plan: candidate.plan.clone(),
                sample,
            }),
            Err(DbFailure::Cancelled) => SampleOutcome::Fatal(
                AgentErrorCode::Cancelled,
                AgentErrorCode::Cancelled.message().to_string(),
            ),
            Err(e @ DbFailure::System(_)) => {
                SampleOutcome::Fatal(AgentErrorCode::SystemError, e.to_string())
            }
            Err(e) => {
                debug!(sql = %sql, "Comparison execution failed: {}", e);
                SampleOutcome::Excluded
            }
        }
    }
}

#[async_trait]
impl Stage for SelectSqlStage {
    fn node(&self) -> Node {
        Node::SelectSql
    }

    #[instrument(skip_all, fields(validated = state.validated.len(), carried = state.executed.len()))]
    async fn run(&self, state: &PipelineState) -> StateUpdate {
        if state.is_terminal() {
            return StateUpdate::none();
        }

        let new_candidates = &state.validated;
        let previous = &state.executed;
        if new_candidates.is_empty() && previous.is_empty() {
            warn!("No candidates to select from");
            return StateUpdate::fail_code(AgentErrorCode::NoSql);
        }

        let start = Instant::now();
        let outcomes = join_all(new_candidates.iter().map(|c| self.sample(c))).await;

        let mut new_results = Vec::new();
        for outcome in outcomes {
            match outcome {
                SampleOutcome::Executed(e) => new_results.push(e),
                SampleOutcome::Excluded => {}
                SampleOutcome::Fatal(code, message) => return StateUpdate::fail(code, message),
            }
        }
        info!(
            executed = new_results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Comparison samples executed"
        );

        let has_previous = !previous.is_empty();
        let all: Vec<ExecutedCandidate> =
            previous.iter().cloned().chain(new_results).collect();

        if all.is_empty() {
            warn!("Every comparison execution failed");
            return match new_candidates.iter().min_by_key(|c| c.cost()) {
                Some(cheapest) => StateUpdate {
                    selected_sql: Some(Some(cheapest.sql.clone())),
                    needs_arbitration: Some(false),
                    ..Default::default()
                },
                None => StateUpdate::fail_code(AgentErrorCode::ExecutionError),
            };
        }

        match select(all.clone(), has_previous) {
            SelectionOutcome::Winner(sql) => {
                info!(candidates = all.len(), "Consensus reached");
                StateUpdate {
                    selected_sql: Some(Some(sql)),
                    executed: Some(all),
                    needs_arbitration: Some(false),
                    ..Default::default()
                }
            }
            SelectionOutcome::NeedsArbitration(all) => {
                info!(candidates = all.len(), "Results disagree, requesting arbitration round");
                StateUpdate {
                    selected_sql: Some(None),
                    executed: Some(all),
                    needs_arbitration: Some(true),
                    ..Default::default()
                }
            }
            SelectionOutcome::NoConsensus(all) => {
                info!(candidates = all.len(), "No majority after arbitration round");
                StateUpdate {
                    selected_sql: Some(None),
                    executed: Some(all),
                    needs_arbitration: Some(false),
                    ..Default::default()
                }
            }
        }
    }
}
