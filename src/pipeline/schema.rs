//! Schema retrieval
//!
//! Finds the table schemas relevant to the conversation. The retriever is a
//! seam: production deployments can plug a vector search service in; the
//! shipped [`CatalogSchemaRetriever`] ranks the target database's own DDL by
//! keyword overlap.

use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use super::Stage;
use super::graph::Node;
use super::state::{PipelineState, StateUpdate};
use crate::storage::{SharedEngine, TableSchema};
use crate::types::{AgentErrorCode, QuorumError, Result, human_query_text};

#[async_trait]
pub trait SchemaRetriever: Send + Sync {
    /// Up to `top_k` schema texts, most relevant first
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<String>>;
}

// =============================================================================
// Catalog Retriever
// =============================================================================

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z][A-Za-z0-9]*").expect("Invalid word regex"));

/// Lowercased words with a trailing plural `s` dropped
fn keywords(text: &str) -> HashSet<String> {
    WORD.find_iter(text)
        .map(|m| {
            let word = m.as_str().to_lowercase();
            match word.strip_suffix('s') {
                Some(stem) if stem.len() > 2 => stem.to_string(),
                _ => word,
            }
        })
        .filter(|w| w.len() > 1)
        .collect()
}

/// Relevance of `table` to the query keywords
///
/// One point per query keyword found in the DDL, plus two when the keyword
/// names the table itself.
fn score(query: &HashSet<String>, table: &TableSchema) -> usize {
    let ddl_words = keywords(&table.ddl);
    let name_words = keywords(&table.name.replace('_', " "));
    query
        .iter()
        .map(|w| {
            let mut s = 0;
            if ddl_words.contains(w) {
                s += 1;
            }
            if name_words.contains(w) {
                s += 2;
            }
            s
        })
        .sum()
}

/// Ranks the target database's tables by keyword overlap with the query
///
/// Like a nearest-neighbour search it always returns the `top_k` best
/// tables, even when nothing overlaps; it is empty only for an empty catalog.
pub struct CatalogSchemaRetriever {
    engine: SharedEngine,
}

impl CatalogSchemaRetriever {
    pub fn new(engine: SharedEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl SchemaRetriever for CatalogSchemaRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        let tables = self
            .engine
            .tables()
            .await
            .map_err(|e| QuorumError::Retrieval(e.to_string()))?;

        let query_words = keywords(query);
        let mut ranked: Vec<(usize, TableSchema)> = tables
            .into_iter()
            .map(|t| (score(&query_words, &t), t))
            .collect();
        // stable sort keeps catalog (name) order among equal scores
        ranked.sort_by(|a, b| b.0.cmp(&a.0));

        debug!(
            ranking = ?ranked.iter().map(|(s, t)| (t.name.as_str(), *s)).collect::<Vec<_>>(),
            "Catalog ranking"
        );

        Ok(ranked
            .into_iter()
            .take(top_k)
            .map(|(_, t)| t.ddl)
            .collect())
    }
}

// =============================================================================
// RetrieveSchema Stage
// =============================================================================

pub struct RetrieveSchemaStage {
    retriever: std::sync::Arc<dyn SchemaRetriever>,
    top_k: usize,
    max_retrievals: u32,
}

impl RetrieveSchemaStage {
    pub fn new(
        retriever: std::sync::Arc<dyn SchemaRetriever>,
        top_k: usize,
        max_retrievals: u32,
    ) -> Self {
        Self {
            retriever,
            top_k,
            max_retrievals,
        }
    }
}

#[async_trait]
impl Stage for RetrieveSchemaStage {
    fn node(&self) -> Node {
        Node::RetrieveSchema
    }

    #[instrument(skip_all, fields(schema_retry_count = state.schema_retry_count))]
    async fn run(&self, state: &PipelineState) -> StateUpdate {
        if state.is_terminal() {
            return StateUpdate::none();
        }

        if state.schema_retry_count >= self.max_retrievals {
            warn!("Schema retrieval limit reached");
            return StateUpdate::fail_code(AgentErrorCode::SchemaRetryLimit);
        }

        let query = human_query_text(&state.messages);
        if query.is_empty() {
            return StateUpdate::fail_code(AgentErrorCode::EmptyQuery);
        }

        let schemas = match self.retriever.retrieve(&query, self.top_k).await {
            Ok(schemas) => schemas,
            Err(e) => {
                warn!("Schema retrieval failed: {}", e);
                return StateUpdate::fail(AgentErrorCode::RetrievalError, e.to_string());
            }
        };

        if schemas.is_empty() {
            return StateUpdate::fail_code(AgentErrorCode::NoSchemaResults);
        }

        info!(found = schemas.len(), "Schemas retrieved");
        StateUpdate {
            schemas,
            schema_retry_count: Some(state.schema_retry_count + 1),
            ..Default::default()
        }
    }
}
