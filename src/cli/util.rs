//! CLI Common Utilities
//!
//! Shared initialization for the command handlers: configuration, the model
//! provider, the target database and the checkpoint store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ai::{SharedProvider, create_provider};
use crate::config::{Config, ConfigLoader};
use crate::pipeline::QueryPipeline;
use crate::storage::{CheckpointStore, SharedEngine, SqliteEngine};
use crate::types::{QuorumError, Result};

/// Command execution context
///
/// Everything a pipeline needs, resolved from the layered configuration.
pub struct CommandContext {
    pub config: Config,
    pub provider: SharedProvider,
    pub engine: SharedEngine,
    pub checkpoints: Arc<CheckpointStore>,
}

impl CommandContext {
    /// Load configuration and open every resource
    ///
    /// `database` overrides `database.path` from the configuration.
    pub fn load(database: Option<PathBuf>) -> Result<Self> {
        let mut config = ConfigLoader::load()?;
        if let Some(path) = database {
            config.database.path = path;
        }
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let provider = create_provider(&config.llm.provider_config())?;
        let engine: SharedEngine = Arc::new(SqliteEngine::open(&config.database)?);
        let checkpoints = Arc::new(open_checkpoints(&config)?);

        info!(
            provider = provider.name(),
            model = provider.model(),
            database = %config.database.path.display(),
            "Command context ready"
        );

        Ok(Self {
            config,
            provider,
            engine,
            checkpoints,
        })
    }

    pub fn pipeline(&self) -> QueryPipeline {
        QueryPipeline::new(
            &self.config,
            self.provider.clone(),
            self.engine.clone(),
            self.checkpoints.clone(),
        )
    }
}

/// Open the checkpoint store named by `checkpoint.path`
pub fn open_checkpoints(config: &Config) -> Result<CheckpointStore> {
    CheckpointStore::open(&config.checkpoint.path)
}

/// Fail early with a readable message when the target database is missing
pub fn require_database(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(QuorumError::Config(format!(
            "Database not found: {}. Set database.path or pass --db.",
            path.display()
        )))
    }
}

/// Build a runtime for a synchronous command handler
pub fn runtime() -> Result<Runtime> {
    Runtime::new().map_err(QuorumError::Io)
}

/// Token cancelled on the first Ctrl-C
///
/// Must be called inside a runtime.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling the running turn");
            child.cancel();
        }
    });
    token
}
