//! Discard Command
//!
//! Drop the paused turn of a thread, or list paused turns.

use crate::cli::ui::Output;
use crate::cli::util::open_checkpoints;
use crate::config::ConfigLoader;
use crate::types::{Result, ThreadId};

pub fn run(thread: &str) -> Result<()> {
    let config = ConfigLoader::load()?;
    let store = open_checkpoints(&config)?;
    let output = Output::new();

    if store.discard(&ThreadId::new(thread))? {
        output.success(&format!("Discarded paused turn of thread {}", thread));
    } else {
        output.warning(&format!("Thread {} has no paused turn", thread));
    }
    Ok(())
}

/// Print every paused thread, newest first
pub fn list(format: &str) -> Result<()> {
    let config = ConfigLoader::load()?;
    let paused = open_checkpoints(&config)?.list()?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&paused)?);
        return Ok(());
    }

    let output = Output::new();
    if paused.is_empty() {
        output.info("No paused turns");
        return Ok(());
    }
    output.section("Paused turns");
    for info in paused {
        println!(
            "  {}  {}",
            info.thread_id,
            info.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}
