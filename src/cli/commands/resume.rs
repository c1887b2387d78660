//! Resume Command
//!
//! Answer the follow-up question of a paused turn.
//!
//! Usage:
//!   sqlquorum resume <thread> "<reply>" [--format json]

use super::run_turn_with_progress;
use crate::cli::util::CommandContext;
use crate::pipeline::TurnOutcome;
use crate::types::{QuorumError, Result, ThreadId};

pub fn run(thread: &str, reply: &str, format: &str, quiet: bool) -> Result<TurnOutcome> {
    let reply = reply.trim().to_string();
    if reply.is_empty() {
        return Err(QuorumError::Config("Reply must not be empty".to_string()));
    }

    let context = CommandContext::load(None)?;
    let thread_id = ThreadId::new(thread);

    run_turn_with_progress(
        &context,
        format,
        !quiet && format != "json",
        |pipeline, cancel| async move { pipeline.resume(&thread_id, &reply, cancel).await },
    )
}
