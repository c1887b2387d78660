//! Target Query Engine
//!
//! The database questions are asked against. Plan probes and row fetches run
//! on the blocking pool; each call carries a deadline and is interrupted when
//! the awaiting future is dropped, so abandoned work releases its pooled
//! connection promptly.
//!
//! SQLite's `EXPLAIN QUERY PLAN` output is mapped onto [`PlanRow`]:
//!
//! | SQLite detail                         | join type | extra               |
//! |---------------------------------------|-----------|---------------------|
//! | `SCAN t`                              | `ALL`     |                     |
//! | `SCAN t USING [COVERING] INDEX i`     | `index`   |                     |
//! | `SEARCH t USING ...`                  | `ref`     |                     |
//! | `... AUTOMATIC ... INDEX`             |           | `Using join buffer` |
//! | `USE TEMP B-TREE FOR GROUP BY`        |           | `Using temporary`   |
//! | `USE TEMP B-TREE FOR ORDER BY`        |           | `Using filesort`    |

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use serde_json::Value;
use tracing::{debug, warn};

use super::database::{Database, PoolConfig, SharedDatabase};
use crate::config::DatabaseConfig;
use crate::constants::storage;
use crate::sql::plan::{
    EXTRA_USING_FILESORT, EXTRA_USING_JOIN_BUFFER, EXTRA_USING_TEMPORARY, JOIN_TYPE_ALL,
    JOIN_TYPE_INDEX, JOIN_TYPE_REF,
};
use crate::sql::{PlanRow, table_aliases};
use crate::types::{ResultRow, Result};

// =============================================================================
// Failure Classification
// =============================================================================

/// Why a database call failed
///
/// `Statement` means the query itself is wrong (unknown table, bad column,
/// type error) and is fed back to generation. `System` means the database
/// is unreachable or broken and no rewrite of the query would help.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DbFailure {
    #[error("Database unavailable: {0}")]
    System(String),

    #[error("{0}")]
    Statement(String),

    #[error("Statement exceeded {0:?}")]
    Timeout(Duration),

    #[error("Statement cancelled")]
    Cancelled,
}

impl DbFailure {
    pub fn is_system(&self) -> bool {
        matches!(self, Self::System(_))
    }

    fn from_sqlite(err: rusqlite::Error, cancelled: &AtomicBool, timeout: Duration) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg) => {
                let text = msg.clone().unwrap_or_else(|| err.to_string());
                match e.code {
                    ErrorCode::OperationInterrupted if cancelled.load(Ordering::Relaxed) => {
                        Self::Cancelled
                    }
                    ErrorCode::OperationInterrupted => Self::Timeout(timeout),
                    ErrorCode::Unknown
                    | ErrorCode::ConstraintViolation
                    | ErrorCode::TypeMismatch
                    | ErrorCode::ReadOnly
                    | ErrorCode::TooBig => Self::Statement(text),
                    _ => Self::System(text),
                }
            }
            rusqlite::Error::MultipleStatement | rusqlite::Error::InvalidColumnName(_) => {
                Self::Statement(err.to_string())
            }
            _ => Self::System(err.to_string()),
        }
    }
}

// =============================================================================
// Engine Trait
// =============================================================================

/// A table (or view) as the schema retriever sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub ddl: String,
}

/// Read-only access to the target database
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Plan rows for `sql` without running it
    async fn explain(&self, sql: &str) -> std::result::Result<Vec<PlanRow>, DbFailure>;

    /// Run `sql` and return at most `max_rows` rows
    async fn execute(
        &self,
        sql: &str,
        max_rows: usize,
    ) -> std::result::Result<Vec<ResultRow>, DbFailure>;

    /// Every user table and view with its DDL
    async fn tables(&self) -> std::result::Result<Vec<TableSchema>, DbFailure>;
}

pub type SharedEngine = Arc<dyn QueryEngine>;

// =============================================================================
// SQLite Engine
// =============================================================================

/// Full-scan row estimates per table, dropped after `ttl` so the probe
/// follows tables that grow while the engine is alive
struct RowEstimates {
    entries: Mutex<HashMap<String, (u64, Instant)>>,
    ttl: Duration,
}

impl RowEstimates {
    fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::default(),
            ttl,
        }
    }

    fn get(&self, table: &str) -> Option<u64> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(table)
            .filter(|(_, at)| at.elapsed() < self.ttl)
            .map(|&(rows, _)| rows)
    }

    fn insert(&self, table: &str, rows: u64) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(table.to_string(), (rows, Instant::now()));
    }
}

/// [`QueryEngine`] over a pooled SQLite database
pub struct SqliteEngine {
    db: SharedDatabase,
    timeout: Duration,
    row_estimates: Arc<RowEstimates>,
}

impl SqliteEngine {
    pub fn new(db: SharedDatabase, timeout: Duration) -> Self {
        Self {
            db,
            timeout,
            row_estimates: Arc::new(RowEstimates::new(Duration::from_secs(
                storage::ROW_ESTIMATE_TTL_SECS,
            ))),
        }
    }

    /// How long a table's row estimate is reused before it is taken again
    pub fn with_estimate_ttl(mut self, ttl: Duration) -> Self {
        self.row_estimates = Arc::new(RowEstimates::new(ttl));
        self
    }

    /// Open the configured database file read-only
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let db = Database::open_read_only(&config.path, PoolConfig::from(config))?;
        Ok(Self::new(
            Arc::new(db),
            Duration::from_secs(config.query_timeout_secs),
        ))
    }

    /// Run `f` on a pooled connection on the blocking pool
    async fn run<T, F>(&self, operation: &'static str, f: F) -> std::result::Result<T, DbFailure>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let _cancel_on_drop = CancelOnDrop(cancelled.clone());
        let db = self.db.clone();
        let timeout = self.timeout;
        let start = Instant::now();

        let handle = tokio::task::spawn_blocking(move || {
            let conn = db
                .conn()
                .map_err(|e| DbFailure::System(e.to_string()))?;
            let _interrupt = InterruptGuard::install(&conn, cancelled.clone(), start + timeout);
            f(&conn).map_err(|e| DbFailure::from_sqlite(e, &cancelled, timeout))
        });

        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(DbFailure::System(format!("{} task failed: {}", operation, e))),
        };

        debug!(
            operation,
            elapsed_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Database call finished"
        );
        result
    }
}

#[async_trait]
impl QueryEngine for SqliteEngine {
    async fn explain(&self, sql: &str) -> std::result::Result<Vec<PlanRow>, DbFailure> {
        let sql = sql.to_string();
        let estimates = self.row_estimates.clone();
        self.run("explain", move |conn| probe_plan(conn, &sql, &estimates))
            .await
    }

    async fn execute(
        &self,
        sql: &str,
        max_rows: usize,
    ) -> std::result::Result<Vec<ResultRow>, DbFailure> {
        let sql = sql.to_string();
        self.run("execute", move |conn| fetch_rows(conn, &sql, max_rows))
            .await
    }

    async fn tables(&self) -> std::result::Result<Vec<TableSchema>, DbFailure> {
        self.run("tables", |conn| {
            let mut stmt = conn.prepare(
                "SELECT name, sql FROM sqlite_master \
                 WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name",
            )?;
            let tables = stmt
                .query_map([], |row| {
                    Ok(TableSchema {
                        name: row.get(0)?,
                        ddl: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tables)
        })
        .await
    }
}

/// Flags the blocking call as cancelled once the awaiting future goes away
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Progress handler interrupting on cancel or deadline; removed before the
/// connection returns to the pool
struct InterruptGuard<'a>(&'a Connection);

impl<'a> InterruptGuard<'a> {
    fn install(conn: &'a Connection, cancelled: Arc<AtomicBool>, deadline: Instant) -> Self {
        conn.progress_handler(
            storage::PROGRESS_HANDLER_OPS,
            Some(move || cancelled.load(Ordering::Relaxed) || Instant::now() >= deadline),
        );
        Self(conn)
    }
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        self.0.progress_handler(0, None::<fn() -> bool>);
    }
}

// =============================================================================
// Row Fetch
// =============================================================================

fn fetch_rows(conn: &Connection, sql: &str, max_rows: usize) -> rusqlite::Result<Vec<ResultRow>> {
    let mut stmt = conn.prepare(sql)?;
    let names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while out.len() < max_rows {
        let Some(row) = rows.next()? else {
            break;
        };
        let mut columns = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            columns.push((name.clone(), cell_value(row.get_ref(i)?)));
        }
        out.push(ResultRow::new(columns));
    }
    Ok(out)
}

fn cell_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!(
            "x'{}'",
            bytes.iter().map(|b| format!("{:02x}", b)).collect::<String>()
        )),
    }
}

// =============================================================================
// Plan Probe
// =============================================================================

#[derive(Debug, PartialEq, Eq)]
enum PlanStep {
    Access {
        name: String,
        search: bool,
        uses_index: bool,
        automatic: bool,
    },
    Temp(&'static str),
    Other,
}

fn parse_detail(detail: &str) -> PlanStep {
    if let Some(purpose) = detail.strip_prefix("USE TEMP B-TREE FOR ") {
        return if purpose.contains("ORDER BY") {
            PlanStep::Temp(EXTRA_USING_FILESORT)
        } else {
            PlanStep::Temp(EXTRA_USING_TEMPORARY)
        };
    }

    let (search, rest) = if let Some(rest) = detail.strip_prefix("SCAN ") {
        (false, rest)
    } else if let Some(rest) = detail.strip_prefix("SEARCH ") {
        (true, rest)
    } else {
        return PlanStep::Other;
    };

    let rest = rest.strip_prefix("TABLE ").unwrap_or(rest);
    if rest.starts_with("CONSTANT ROW") {
        return PlanStep::Other;
    }
    let Some(name) = rest.split_whitespace().next() else {
        return PlanStep::Other;
    };

    PlanStep::Access {
        name: name.to_string(),
        search,
        uses_index: rest.contains(" INDEX ") || rest.contains(" PRIMARY KEY"),
        automatic: rest.contains(" AUTOMATIC "),
    }
}

fn base_tables(conn: &Connection) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .map(|name| name.map(|n| n.to_lowercase()))
        .collect();
    names
}

/// Row estimate for a full scan, taken without scanning the table
///
/// Analyzer statistics when present, else the largest rowid, else a count
/// capped at `ROW_ESTIMATE_SCAN_CAP` (tables without rowid). `None` when
/// none of these worked.
fn table_rows(
    conn: &Connection,
    table: &str,
    estimates: &RowEstimates,
) -> rusqlite::Result<Option<u64>> {
    if let Some(rows) = estimates.get(table) {
        return Ok(Some(rows));
    }
    let quoted = format!("\"{}\"", table.replace('"', "\"\""));

    // sqlite_stat1 only exists after ANALYZE
    let from_stats = tolerate(
        conn.query_row(
            "SELECT stat FROM sqlite_stat1 WHERE lower(tbl) = ?1 LIMIT 1",
            [table],
            |row| row.get::<_, String>(0),
        )
        .optional(),
    )?
    .flatten()
    .and_then(|stat| stat.split_whitespace().next()?.parse::<u64>().ok());

    let estimate = match from_stats {
        Some(rows) => Some(rows),
        None => match tolerate(conn.query_row(
            &format!("SELECT max(rowid) FROM {}", quoted),
            [],
            |row| row.get::<_, Option<i64>>(0),
        ))? {
            Some(max_rowid) => Some(max_rowid.unwrap_or(0).max(0) as u64),
            None => tolerate(conn.query_row(
                &format!("SELECT COUNT(*) FROM (SELECT 1 FROM {} LIMIT ?1)", quoted),
                [storage::ROW_ESTIMATE_SCAN_CAP],
                |row| row.get::<_, i64>(0),
            ))?
            .map(|n| n.max(0) as u64),
        },
    };

    match estimate {
        Some(rows) => estimates.insert(table, rows),
        None => debug!(table, "No row estimate, scan left unweighted"),
    }
    Ok(estimate)
}

/// An estimate query that fails leaves the estimate unknown; only an
/// interrupt (cancel or deadline) aborts the probe
fn tolerate<T>(result: rusqlite::Result<T>) -> rusqlite::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if is_interrupt(&e) => Err(e),
        Err(e) => {
            debug!("Row estimate query failed: {}", e);
            Ok(None)
        }
    }
}

fn is_interrupt(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::OperationInterrupted
    )
}

fn probe_plan(
    conn: &Connection,
    sql: &str,
    estimates: &RowEstimates,
) -> rusqlite::Result<Vec<PlanRow>> {
    let details: Vec<String> = {
        let mut stmt = conn.prepare(&format!("EXPLAIN QUERY PLAN {}", sql))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(3))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    let tables = base_tables(conn)?;
    let aliases = table_aliases(sql);
    let mut rows = Vec::with_capacity(details.len());
    let mut temp_flags: Vec<&'static str> = Vec::new();

    for detail in details {
        match parse_detail(&detail) {
            PlanStep::Access {
                name,
                search,
                uses_index,
                automatic,
            } => {
                let key = name.to_lowercase();
                let resolved = aliases.get(&key).cloned().unwrap_or(key);
                let table = tables.contains(&resolved).then_some(resolved);

                let join_type = match (search, uses_index) {
                    (true, _) => JOIN_TYPE_REF,
                    (false, true) => JOIN_TYPE_INDEX,
                    (false, false) => JOIN_TYPE_ALL,
                };
                let estimated_rows = match (&table, search) {
                    (Some(t), false) => table_rows(conn, t, estimates)?.unwrap_or(0),
                    (Some(_), true) => 1,
                    (None, _) => 0,
                };
                let extra = if automatic {
                    vec![EXTRA_USING_JOIN_BUFFER.to_string()]
                } else {
                    Vec::new()
                };

                rows.push(PlanRow {
                    table,
                    join_type: join_type.to_string(),
                    estimated_rows,
                    extra,
                    detail,
                });
            }
            PlanStep::Temp(flag) => {
                if !temp_flags.contains(&flag) {
                    temp_flags.push(flag);
                }
            }
            PlanStep::Other => rows.push(PlanRow {
                detail,
                ..Default::default()
            }),
        }
    }

    if !temp_flags.is_empty() {
        let target = rows.iter().position(|r| r.table.is_some()).unwrap_or(0);
        match rows.get_mut(target) {
            Some(row) => row.extra.extend(temp_flags.iter().map(|f| f.to_string())),
            None => {
                warn!("Plan has sort steps but no access rows");
                rows.push(PlanRow {
                    extra: temp_flags.iter().map(|f| f.to_string()).collect(),
                    ..Default::default()
                });
            }
        }
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::analyze_plan;
    use serde_json::json;

    fn engine(timeout: Duration) -> SqliteEngine {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .unwrap()
            .execute_batch(
                r#"
                CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER);
                CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER, total REAL);
                CREATE INDEX idx_users_name ON users(name);
                INSERT INTO users (name, age) VALUES ('Ann', 31), ('Bob', 45), ('Cid', 27);
                INSERT INTO orders (user_id, total) VALUES (1, 9.5), (1, 20.0), (2, 3.25);
                "#,
            )
            .unwrap();
        SqliteEngine::new(Arc::new(db), timeout)
    }

    #[tokio::test]
    async fn test_execute_returns_named_rows() {
        let engine = engine(Duration::from_secs(5));
        let rows = engine
            .execute("SELECT name, age FROM users ORDER BY id", 10)
            .await
            .unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get("name"), Some(&json!("Ann")));
        assert_eq!(rows[1].get("age"), Some(&json!(45)));
    }

    #[tokio::test]
    async fn test_execute_caps_rows() {
        let engine = engine(Duration::from_secs(5));
        let rows = engine.execute("SELECT * FROM users", 2).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_statement_errors_are_not_system() {
        let engine = engine(Duration::from_secs(5));
        let err = engine
            .execute("SELECT nope FROM users", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, DbFailure::Statement(ref m) if m.contains("nope")));

        let err = engine.explain("SELECT * FROM missing").await.unwrap_err();
        assert!(matches!(err, DbFailure::Statement(_)));
        assert!(!err.is_system());
    }

    #[tokio::test]
    async fn test_explain_full_scan_estimates_rows() {
        let engine = engine(Duration::from_secs(5));
        let plan = engine.explain("SELECT * FROM users WHERE age > 30").await.unwrap();

        let scan = plan.iter().find(|r| r.table.is_some()).unwrap();
        assert_eq!(scan.table.as_deref(), Some("users"));
        assert_eq!(scan.join_type, JOIN_TYPE_ALL);
        assert_eq!(scan.estimated_rows, 3);
    }

    #[tokio::test]
    async fn test_row_estimate_reads_largest_rowid_not_count() {
        let engine = engine(Duration::from_secs(5));
        engine
            .db
            .conn()
            .unwrap()
            .execute("INSERT INTO users (id, name) VALUES (5000000, 'Zed')", [])
            .unwrap();

        let plan = engine.explain("SELECT * FROM users WHERE age > 30").await.unwrap();
        let scan = plan.iter().find(|r| r.table.is_some()).unwrap();
        assert_eq!(scan.estimated_rows, 5_000_000);
    }

    #[test]
    fn test_row_estimate_without_rowid_uses_capped_count() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn().unwrap();
        conn.execute_batch(
            "CREATE TABLE tags (name TEXT PRIMARY KEY) WITHOUT ROWID;
             INSERT INTO tags VALUES ('a'), ('b');",
        )
        .unwrap();

        let estimates = RowEstimates::new(Duration::from_secs(60));
        assert_eq!(table_rows(&conn, "tags", &estimates).unwrap(), Some(2));
        assert_eq!(estimates.get("tags"), Some(2));
    }

    #[test]
    fn test_unknown_estimate_is_not_an_error() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn().unwrap();
        let estimates = RowEstimates::new(Duration::from_secs(60));
        assert_eq!(table_rows(&conn, "missing", &estimates).unwrap(), None);
        assert_eq!(estimates.get("missing"), None);

        let interrupted = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_INTERRUPT),
            None,
        );
        assert!(tolerate::<u64>(Err(interrupted)).is_err());
    }

    #[tokio::test]
    async fn test_row_estimates_expire() {
        let grow = |engine: &SqliteEngine, id: i64| {
            engine
                .db
                .conn()
                .unwrap()
                .execute("INSERT INTO users (id, name) VALUES (?1, 'New')", [id])
                .unwrap();
        };
        let scanned = |plan: Vec<PlanRow>| {
            plan.into_iter()
                .find(|r| r.table.is_some())
                .map(|r| r.estimated_rows)
        };
        let sql = "SELECT * FROM users WHERE age > 30";

        let cached = engine(Duration::from_secs(5));
        assert_eq!(scanned(cached.explain(sql).await.unwrap()), Some(3));
        grow(&cached, 10);
        assert_eq!(scanned(cached.explain(sql).await.unwrap()), Some(3));

        let fresh = engine(Duration::from_secs(5)).with_estimate_ttl(Duration::ZERO);
        assert_eq!(scanned(fresh.explain(sql).await.unwrap()), Some(3));
        grow(&fresh, 10);
        assert_eq!(scanned(fresh.explain(sql).await.unwrap()), Some(10));
    }

    #[tokio::test]
    async fn test_explain_resolves_aliases_and_lookups() {
        let engine = engine(Duration::from_secs(5));
        let plan = engine
            .explain("SELECT u.name, o.total FROM orders o JOIN users u ON u.id = o.user_id")
            .await
            .unwrap();

        let tables: Vec<_> = plan.iter().filter_map(|r| r.table.as_deref()).collect();
        assert!(tables.contains(&"orders"));
        assert!(tables.contains(&"users"));
        assert!(plan.iter().any(|r| r.join_type == JOIN_TYPE_REF));
        assert!(analyze_plan(&plan, 10_000).ok);
    }

    #[tokio::test]
    async fn test_explain_group_and_order_flags() {
        let engine = engine(Duration::from_secs(5));
        let plan = engine
            .explain("SELECT age, COUNT(*) FROM users GROUP BY age ORDER BY 2 DESC")
            .await
            .unwrap();

        let flagged = plan.iter().find(|r| !r.extra.is_empty()).unwrap();
        assert!(flagged.has_extra(EXTRA_USING_TEMPORARY));
        assert!(flagged.has_extra(EXTRA_USING_FILESORT));
    }

    #[tokio::test]
    async fn test_runaway_query_times_out() {
        let engine = engine(Duration::from_millis(100));
        let err = engine
            .execute(
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                 SELECT COUNT(*) FROM c",
                1,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbFailure::Timeout(_)));

        // connection went back to the single-slot pool without its handler
        let rows = engine.execute("SELECT 1 AS one", 1).await.unwrap();
        assert_eq!(rows[0].get("one"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_dropped_call_releases_connection() {
        let engine = engine(Duration::from_secs(60));
        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            engine.execute(
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                 SELECT COUNT(*) FROM c",
                1,
            ),
        )
        .await;
        assert!(abandoned.is_err());

        let rows = tokio::time::timeout(
            Duration::from_secs(10),
            engine.execute("SELECT name FROM users WHERE id = 1", 1),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(rows[0].get("name"), Some(&json!("Ann")));
    }

    #[tokio::test]
    async fn test_tables_lists_ddl() {
        let engine = engine(Duration::from_secs(5));
        let tables = engine.tables().await.unwrap();
        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["orders", "users"]);
        assert!(tables[1].ddl.contains("age INTEGER"));
    }

    #[test]
    fn test_parse_detail_variants() {
        assert_eq!(
            parse_detail("SCAN users"),
            PlanStep::Access {
                name: "users".into(),
                search: false,
                uses_index: false,
                automatic: false,
            }
        );
        assert_eq!(
            parse_detail("SCAN TABLE users AS u USING COVERING INDEX idx"),
            PlanStep::Access {
                name: "users".into(),
                search: false,
                uses_index: true,
                automatic: false,
            }
        );
        assert!(matches!(
            parse_detail("SEARCH o USING AUTOMATIC COVERING INDEX (user_id=?)"),
            PlanStep::Access {
                search: true,
                automatic: true,
                ..
            }
        ));
        assert_eq!(
            parse_detail("USE TEMP B-TREE FOR ORDER BY"),
            PlanStep::Temp(EXTRA_USING_FILESORT)
        );
        assert_eq!(
            parse_detail("USE TEMP B-TREE FOR DISTINCT"),
            PlanStep::Temp(EXTRA_USING_TEMPORARY)
        );
        assert_eq!(parse_detail("SCAN CONSTANT ROW"), PlanStep::Other);
        assert_eq!(parse_detail("COMPOUND QUERY"), PlanStep::Other);
    }

    #[test]
    fn test_cell_values() {
        assert_eq!(cell_value(ValueRef::Null), Value::Null);
        assert_eq!(cell_value(ValueRef::Real(1.5)), json!(1.5));
        assert_eq!(cell_value(ValueRef::Blob(&[0xab, 0x01])), json!("x'ab01'"));
    }
}
