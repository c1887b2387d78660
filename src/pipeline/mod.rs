//! NL→SQL Pipeline
//!
//! Multi-candidate text-to-SQL with consensus selection:
//!
//! 1. **Schema retrieval**: relevant table DDL for the conversation
//! 2. **Intent parsing**: structured query representation, or a follow-up question
//! 3. **Generation**: K independent candidate queries, concurrently
//! 4. **Validation**: syntax, plan probe and performance heuristics per candidate
//! 5. **Selection**: majority vote over deterministic result samples
//! 6. **Judge**: model arbitration when voting fails twice
//! 7. **Execution** and an optional plain-language summary
//!
//! Retry counters bound every backward edge; see [`graph`] for routing.

pub mod events;
pub mod executor;
pub mod follow_up;
pub mod generator;
pub mod graph;
pub mod intent;
pub mod ir;
pub mod judge;
pub mod prompts;
pub mod schema;
pub mod schemas;
pub mod selector;
pub mod state;
pub mod summarizer;
pub mod validator;

pub use events::{EventSink, PipelineEvent};
pub use graph::{Next, Node, QueryPipeline, TurnOutcome, route};
pub use ir::{IntentParseResult, QueryElement};
pub use schema::{CatalogSchemaRetriever, SchemaRetriever};
pub use selector::{cluster, find_majority, results_equivalent, select};
pub use state::{
    Candidate, ExecutedCandidate, FailureKind, PipelineState, SelectionOutcome, StateUpdate,
    Terminal, ValidatedCandidate, ValidationFeedback,
};

use async_trait::async_trait;

/// One node of the state machine
///
/// A stage reads the current state and returns the changes it wants; it
/// never fails outright. Fatal conditions are reported as a terminal
/// [`StateUpdate`].
#[async_trait]
pub trait Stage: Send + Sync {
    fn node(&self) -> Node;

    async fn run(&self, state: &PipelineState) -> StateUpdate;
}
