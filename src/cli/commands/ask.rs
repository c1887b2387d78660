//! Ask Command
//!
//! Answer a natural-language question against the configured database.
//!
//! Usage:
//!   sqlquorum ask "<question>" [--thread ID] [--db PATH] [--format json]

use std::path::PathBuf;

use tracing::info;

use super::run_turn_with_progress;
use crate::cli::util::{CommandContext, require_database};
use crate::config::ConfigLoader;
use crate::pipeline::TurnOutcome;
use crate::types::{QuorumError, Result, ThreadId};

pub struct AskOptions {
    pub question: String,
    pub thread: Option<String>,
    pub database: Option<PathBuf>,
    pub format: String,
    pub quiet: bool,
}

pub fn run(options: AskOptions) -> Result<TurnOutcome> {
    let question = options.question.trim().to_string();
    if question.is_empty() {
        return Err(QuorumError::Config("Question must not be empty".to_string()));
    }

    let mut config = ConfigLoader::load()?;
    if let Some(path) = options.database {
        config.database.path = path;
    }
    require_database(&config.database.path)?;
    let context = CommandContext::from_config(config)?;

    let thread_id = options
        .thread
        .map(ThreadId::new)
        .unwrap_or_else(ThreadId::generate);
    info!(thread = %thread_id, "Starting turn");

    run_turn_with_progress(
        &context,
        &options.format,
        !options.quiet && options.format != "json",
        |pipeline, cancel| async move {
            pipeline
                .run_turn(&thread_id, &[], &question, cancel)
                .await
        },
    )
}
