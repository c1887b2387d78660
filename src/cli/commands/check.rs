//! Check Command
//!
//! Verify the model provider answers and the target database is readable.

use std::path::PathBuf;

use crate::ai::{TimeoutConfig, with_timeout, with_timeout_map};
use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, runtime};
use crate::types::Result;

/// Returns true when every check passed
pub fn run(database: Option<PathBuf>) -> Result<bool> {
    let context = CommandContext::load(database)?;
    let output = Output::new();
    let rt = runtime()?;
    let timeouts = TimeoutConfig::from_config(&context.config);

    output.header("sqlquorum check");

    let provider_ok = match rt.block_on(with_timeout(
        timeouts.llm_request,
        context.provider.health_check(),
        "provider health check",
    )) {
        Ok(true) => {
            output.success(&format!(
                "Provider {} ({}) is reachable",
                context.provider.name(),
                context.provider.model()
            ));
            true
        }
        Ok(false) => {
            output.error(&format!(
                "Provider {} did not answer",
                context.provider.name()
            ));
            false
        }
        Err(e) => {
            output.error(&format!("Provider check failed: {}", e));
            false
        }
    };

    let database_ok = match rt.block_on(with_timeout_map(
        timeouts.database,
        context.engine.tables(),
        "table listing",
    )) {
        Ok(Ok(tables)) if tables.is_empty() => {
            output.warning(&format!(
                "Database {} has no tables",
                context.config.database.path.display()
            ));
            false
        }
        Ok(Ok(tables)) => {
            output.success(&format!(
                "Database {} is readable ({} tables)",
                context.config.database.path.display(),
                tables.len()
            ));
            true
        }
        Ok(Err(e)) => {
            output.error(&format!("Database check failed: {}", e));
            false
        }
        Err(e) => {
            output.error(&format!("Database check failed: {}", e));
            false
        }
    };

    match context.checkpoints.list() {
        Ok(paused) => output.info(&format!("{} paused turns", paused.len())),
        Err(e) => output.warning(&format!("Checkpoint store unreadable: {}", e)),
    }

    Ok(provider_ok && database_ok)
}
