pub mod checkpoint;
pub mod database;
pub mod engine;

pub use checkpoint::{CheckpointInfo, CheckpointStore};
pub use database::{Database, DbConnection, Migration, PoolConfig, SharedDatabase};
pub use engine::{DbFailure, QueryEngine, SharedEngine, SqliteEngine, TableSchema};
