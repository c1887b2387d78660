//! Checkpoint Store
//!
//! Persists the state of a suspended turn per conversation thread so a later
//! process can resume it. One row per thread; saving overwrites.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::database::{Database, Migration, PoolConfig};
use crate::types::{QuorumError, Result, ResultExt, ThreadId};

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "checkpoints table",
    up: r#"
        CREATE TABLE IF NOT EXISTS checkpoints (
            thread_id  TEXT PRIMARY KEY,
            state      TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
    "#,
}];

/// Summary row for listing suspended threads
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointInfo {
    pub thread_id: ThreadId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct CheckpointStore {
    db: Database,
}

impl CheckpointStore {
    /// Open the store at `path`, creating parent directories as needed
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::open(
            path,
            PoolConfig {
                max_size: 2,
                ..PoolConfig::default()
            },
        )?;
        Self::with_database(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_database(Database::open_in_memory()?)
    }

    fn with_database(db: Database) -> Result<Self> {
        db.migrate(MIGRATIONS)?;
        Ok(Self { db })
    }

    pub fn save<T: Serialize>(&self, thread_id: &ThreadId, state: &T) -> Result<()> {
        let json = serde_json::to_string(state)?;
        let now = Utc::now().to_rfc3339();

        self.db
            .conn()?
            .execute(
                r#"
                INSERT INTO checkpoints (thread_id, state, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?3)
                ON CONFLICT(thread_id) DO UPDATE SET
                    state = excluded.state,
                    updated_at = excluded.updated_at
                "#,
                params![thread_id.as_str(), json, now],
            )
            .with_context_fn(|| format!("Failed to save checkpoint for {}", thread_id))?;

        tracing::debug!(thread = %thread_id, bytes = json.len(), "Checkpoint saved");
        Ok(())
    }

    pub fn load<T: DeserializeOwned>(&self, thread_id: &ThreadId) -> Result<Option<T>> {
        let json: Option<String> = self
            .db
            .conn()?
            .query_row(
                "SELECT state FROM checkpoints WHERE thread_id = ?1",
                [thread_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|j| serde_json::from_str(&j).map_err(QuorumError::from))
            .transpose()
    }

    /// Like [`load`](Self::load) but a missing checkpoint is an error
    pub fn require<T: DeserializeOwned>(&self, thread_id: &ThreadId) -> Result<T> {
        self.load(thread_id)?
            .ok_or_else(|| QuorumError::CheckpointNotFound(thread_id.to_string()))
    }

    /// Remove the checkpoint; returns whether one existed
    pub fn discard(&self, thread_id: &ThreadId) -> Result<bool> {
        let removed = self.db.conn()?.execute(
            "DELETE FROM checkpoints WHERE thread_id = ?1",
            [thread_id.as_str()],
        )?;
        Ok(removed > 0)
    }

    /// All checkpoints, most recently updated first
    pub fn list(&self) -> Result<Vec<CheckpointInfo>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT thread_id, created_at, updated_at FROM checkpoints ORDER BY updated_at DESC",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter()
            .map(|(thread_id, created, updated)| {
                Ok(CheckpointInfo {
                    thread_id: ThreadId::new(thread_id),
                    created_at: parse_timestamp(&created)?,
                    updated_at: parse_timestamp(&updated)?,
                })
            })
            .collect()
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| QuorumError::Storage(format!("Bad checkpoint timestamp '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Suspended {
        question: String,
        follow_ups: u32,
    }

    fn state(q: &str, n: u32) -> Suspended {
        Suspended {
            question: q.to_string(),
            follow_ups: n,
        }
    }

    #[test]
    fn test_save_load_overwrite_discard() {
        let store = CheckpointStore::open_in_memory().unwrap();
        let thread = ThreadId::from("t-1");

        assert!(store.load::<Suspended>(&thread).unwrap().is_none());

        store.save(&thread, &state("which year?", 1)).unwrap();
        store.save(&thread, &state("which region?", 2)).unwrap();
        assert_eq!(
            store.require::<Suspended>(&thread).unwrap(),
            state("which region?", 2)
        );
        assert_eq!(store.list().unwrap().len(), 1);

        assert!(store.discard(&thread).unwrap());
        assert!(!store.discard(&thread).unwrap());
        assert!(matches!(
            store.require::<Suspended>(&thread),
            Err(QuorumError::CheckpointNotFound(_))
        ));
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("checkpoints.db");
        let thread = ThreadId::from("t-2");

        CheckpointStore::open(&path)
            .unwrap()
            .save(&thread, &state("q", 0))
            .unwrap();

        let reopened = CheckpointStore::open(&path).unwrap();
        assert_eq!(reopened.load(&thread).unwrap(), Some(state("q", 0)));
        let listed = reopened.list().unwrap();
        assert_eq!(listed[0].thread_id, thread);
        assert!(listed[0].updated_at >= listed[0].created_at);
    }
}
