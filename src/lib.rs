//! sqlquorum - Natural-Language to SQL with Candidate Consensus
//!
//! Turns a conversational question into one SQL query over a SQLite database
//! by generating several candidates, validating each, and letting the
//! candidates vote on their results.
//!
//! ## Core Features
//!
//! - **Multi-Candidate Generation**: K independent queries per round
//! - **Validation**: syntax, plan probe and performance heuristics
//! - **Consensus Selection**: majority vote over order-insensitive result samples
//! - **Arbitration**: one extra generation round, then a model judge
//! - **Follow-up Questions**: turns pause and resume through a checkpoint store
//!
//! ## Quick Start
//!
//! ```ignore
//! use sqlquorum::{CheckpointStore, ConfigLoader, QueryPipeline, SqliteEngine, ThreadId};
//! use sqlquorum::ai::create_provider;
//!
//! let config = ConfigLoader::load()?;
//! let provider = create_provider(&config.llm.provider_config())?;
//! let engine = Arc::new(SqliteEngine::open(&config.database)?);
//! let checkpoints = Arc::new(CheckpointStore::open(&config.checkpoint.path)?);
//!
//! let pipeline = QueryPipeline::new(&config, provider, engine, checkpoints);
//! let outcome = pipeline
//!     .run_turn(&ThreadId::generate(), &[], "Top 5 customers by revenue", CancellationToken::new())
//!     .await?;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: LLM provider abstraction, structured completion, prompts
//! - [`sql`]: syntax checks, sample rewriting, plan heuristics
//! - [`storage`]: SQLite target engine and checkpoint persistence
//! - [`pipeline`]: the stage nodes and the state machine driving them
//! - [`config`]: layered configuration

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod pipeline;
pub mod sql;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::error::{AgentErrorCode, ErrorCategory, QuorumError, Result, ResultExt};
pub use types::{ChatMessage, ResultRow, Role, ThreadId};

// Storage
pub use storage::{
    CheckpointStore, Database, DbFailure, QueryEngine, SharedDatabase, SharedEngine,
    SqliteEngine,
};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use pipeline::{
    EventSink, Node, PipelineEvent, PipelineState, QueryPipeline, SchemaRetriever, TurnOutcome,
};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{LlmProvider, LlmResponse, SharedProvider, StructuredClient};
