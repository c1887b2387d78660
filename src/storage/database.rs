//! Database Layer with Connection Pooling
//!
//! SQLite access shared by the target database and the checkpoint store:
//! - Connection pooling via r2d2 for concurrent access
//! - Read-only opening for the queried database
//! - Version-tracked migrations

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};

use crate::config::DatabaseConfig;
use crate::constants::storage;
use crate::types::{QuorumError, Result, ResultExt};

/// Shared database handle for async contexts.
pub type SharedDatabase = Arc<Database>;

/// Pooled connection type
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// A schema migration applied in version order
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool
    pub max_size: u32,
    /// Timeout for acquiring a connection
    pub connection_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: storage::DEFAULT_POOL_SIZE,
            connection_timeout: Duration::from_secs(storage::CONNECTION_TIMEOUT_SECS),
        }
    }
}

impl From<&DatabaseConfig> for PoolConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            max_size: config.pool_size,
            connection_timeout: Duration::from_secs(config.connection_timeout_secs),
        }
    }
}

/// Thread-safe database with connection pooling.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open (creating if needed) a writable database.
    pub fn open<P: AsRef<Path>>(path: P, config: PoolConfig) -> Result<Self> {
        let manager =
            SqliteConnectionManager::file(path.as_ref()).with_init(Self::configure_writable);
        Self::build(manager, config)
    }

    /// Open an existing database read-only.
    ///
    /// Connections also run with `query_only` so nothing reaching the
    /// engine can write.
    pub fn open_read_only<P: AsRef<Path>>(path: P, config: PoolConfig) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(QuorumError::Storage(format!(
                "Database file not found: {}",
                path.display()
            )));
        }

        let manager = SqliteConnectionManager::file(path)
            .with_flags(
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .with_init(|conn| {
                conn.execute_batch(&format!(
                    "PRAGMA query_only = ON; PRAGMA busy_timeout = {};",
                    storage::BUSY_TIMEOUT_MS
                ))
            });
        Self::build(manager, config)
    }

    /// Open an in-memory database for testing or temporary use.
    ///
    /// Single connection so every caller sees the same data.
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        Self::build(
            manager,
            PoolConfig {
                max_size: 1,
                ..PoolConfig::default()
            },
        )
    }

    fn build(manager: SqliteConnectionManager, config: PoolConfig) -> Result<Self> {
        let pool = Pool::builder()
            .max_size(config.max_size)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .map_err(|e| {
                QuorumError::Storage(format!("Failed to create connection pool: {}", e))
            })?;

        Ok(Self { pool })
    }

    fn configure_writable(conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = {};
            "#,
            storage::BUSY_TIMEOUT_MS
        ))
    }

    /// Get a connection from the pool.
    pub fn conn(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Apply `migrations` newer than the stored `user_version`.
    pub fn migrate(&self, migrations: &[Migration]) -> Result<()> {
        let conn = self.conn()?;

        let current_version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        for migration in migrations.iter().filter(|m| m.version > current_version) {
            conn.execute_batch(migration.up).with_context_fn(|| {
                format!(
                    "Failed to apply migration {}: {}",
                    migration.version, migration.description
                )
            })?;
            conn.pragma_update(None, "user_version", migration.version)
                .with_context("Failed to update schema version")?;

            tracing::debug!(
                "Applied migration {}: {}",
                migration.version,
                migration.description
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MIGRATIONS: &[Migration] = &[
        Migration {
            version: 1,
            description: "items table",
            up: "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)",
        },
        Migration {
            version: 2,
            description: "items price",
            up: "ALTER TABLE items ADD COLUMN price REAL",
        },
    ];

    #[test]
    fn test_migrations_apply_once() {
        let db = Database::open_in_memory().unwrap();
        db.migrate(MIGRATIONS).unwrap();
        db.migrate(MIGRATIONS).unwrap();

        let version: u32 = db
            .conn()
            .unwrap()
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("target.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1);")
                .unwrap();
        }

        let db = Database::open_read_only(&path, PoolConfig::default()).unwrap();
        let conn = db.conn().unwrap();
        let x: i64 = conn.query_row("SELECT x FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(x, 1);
        assert!(conn.execute("INSERT INTO t VALUES (2)", []).is_err());
    }

    #[test]
    fn test_read_only_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = Database::open_read_only(dir.path().join("nope.db"), PoolConfig::default());
        assert!(matches!(result, Err(QuorumError::Storage(_))));
    }
}
