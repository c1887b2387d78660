//! Command handlers
//!
//! Each handler is synchronous and builds its own runtime when it needs one.

pub mod ask;
pub mod check;
pub mod config;
pub mod discard;
pub mod resume;

use std::future::Future;

use crate::cli::progress::ConsoleRenderer;
use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, cancel_on_ctrl_c, runtime};
use crate::pipeline::{QueryPipeline, TurnOutcome};
use crate::types::Result;

/// Run one turn with live progress lines and print its outcome
///
/// Progress goes to stderr so `--format json` output stays clean on stdout.
pub(crate) fn run_turn_with_progress<F, Fut>(
    context: &CommandContext,
    format: &str,
    show_progress: bool,
    turn: F,
) -> Result<TurnOutcome>
where
    F: FnOnce(QueryPipeline, tokio_util::sync::CancellationToken) -> Fut,
    Fut: Future<Output = Result<TurnOutcome>>,
{
    let rt = runtime()?;
    let pipeline = context.pipeline();

    let outcome = rt.block_on(async {
        let renderer = show_progress.then(|| ConsoleRenderer::new(pipeline.events()));
        let render_loop = renderer.map(ConsoleRenderer::start_render_loop);
        let cancel = cancel_on_ctrl_c();

        // The pipeline owns the only sender; dropping it closes the loop
        let outcome = turn(pipeline, cancel).await;
        if let Some(handle) = render_loop {
            let _ = handle.await;
        }
        outcome
    })?;

    Output::new().outcome(&outcome, format)?;
    Ok(outcome)
}
