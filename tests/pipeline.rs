//! End-to-end runs of the query pipeline against a seeded SQLite file

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use sqlquorum::ai::{LlmProvider, LlmResponse};
use sqlquorum::{
    AgentErrorCode, CheckpointStore, Config, PipelineEvent, QueryPipeline, QuorumError, Result,
    SchemaRetriever, SqliteEngine, ThreadId, TurnOutcome,
};

// =============================================================================
// Fixtures
// =============================================================================

const SEED: &str = r#"
    CREATE TABLE customers (
        id   INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        city TEXT NOT NULL
    );
    INSERT INTO customers (id, name, city) VALUES
        (1, 'Alice', 'Paris'),
        (2, 'Bruno', 'Lyon'),
        (3, 'Chloe', 'Paris'),
        (4, 'Dmitri', 'Berlin');
"#;

type Responder = Box<dyn Fn(&str, usize) -> Option<Value> + Send + Sync>;

/// Model double that answers by response schema
///
/// Each stage gets its own responder, called with the prompt and the number
/// of earlier calls for that stage. `None` is a provider error.
struct ScriptedModel {
    intent: Responder,
    sql: Responder,
    judge: Responder,
    summary: Responder,
    calls: [AtomicUsize; 4],
    prompts: Mutex<Vec<String>>,
}

const INTENT: usize = 0;
const SQL: usize = 1;
const JUDGE: usize = 2;
const SUMMARY: usize = 3;

impl ScriptedModel {
    fn new(intent: Responder, sql: Responder) -> Self {
        Self {
            intent,
            sql,
            judge: Box::new(|_, _| None),
            summary: Box::new(|_, _| Some(json!({ "summary": "Two customers live in Paris." }))),
            calls: Default::default(),
            prompts: Mutex::default(),
        }
    }

    fn with_judge(mut self, judge: Responder) -> Self {
        self.judge = judge;
        self
    }

    fn calls(&self, stage: usize) -> usize {
        self.calls[stage].load(Ordering::SeqCst)
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

fn stage_of(schema: &Value) -> usize {
    let properties = &schema["properties"];
    if properties.get("need_follow_up").is_some() {
        INTENT
    } else if properties.get("sql").is_some() {
        SQL
    } else if properties.get("choice").is_some() {
        JUDGE
    } else {
        SUMMARY
    }
}

#[async_trait]
impl LlmProvider for ScriptedModel {
    async fn generate(
        &self,
        prompt: &str,
        schema: &Value,
        _temperature: Option<f32>,
    ) -> Result<LlmResponse> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let stage = stage_of(schema);
        let n = self.calls[stage].fetch_add(1, Ordering::SeqCst);
        let responder = match stage {
            INTENT => &self.intent,
            SQL => &self.sql,
            JUDGE => &self.judge,
            _ => &self.summary,
        };
        responder(prompt, n)
            .map(LlmResponse::content_only)
            .ok_or_else(|| QuorumError::LlmApi("scripted failure".into()))
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

fn ready_intent() -> Responder {
    Box::new(|_, _| {
        Some(json!({
            "need_follow_up": false,
            "need_retry_retrieve": false,
            "ir_ast": {
                "select": [{"name": "name"}],
                "from_table": {"name": "customers"},
                "where": {"op": "=", "operands": ["city", "Paris"]}
            }
        }))
    })
}

fn fixed_sql(queries: &'static [&'static str]) -> Responder {
    Box::new(move |_, n| Some(json!({ "sql": queries[n % queries.len()] })))
}

struct Harness {
    _dir: TempDir,
    model: Arc<ScriptedModel>,
    checkpoints: Arc<CheckpointStore>,
    pipeline: QueryPipeline,
}

fn harness(model: ScriptedModel, tweak: impl FnOnce(&mut Config)) -> Harness {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("shop.db");
    rusqlite::Connection::open(&db_path)
        .unwrap()
        .execute_batch(SEED)
        .unwrap();

    let mut config = Config::default();
    config.database.path = db_path;
    config.checkpoint.path = dir.path().join("checkpoints.db");
    config.llm.retry_attempts = 1;
    tweak(&mut config);

    let model = Arc::new(model);
    let engine = Arc::new(SqliteEngine::open(&config.database).unwrap());
    let checkpoints = Arc::new(CheckpointStore::open(&config.checkpoint.path).unwrap());
    let pipeline = QueryPipeline::new(&config, model.clone(), engine, checkpoints.clone());

    Harness {
        _dir: dir,
        model,
        checkpoints,
        pipeline,
    }
}

async fn ask(h: &Harness, thread: &str, question: &str) -> TurnOutcome {
    h.pipeline
        .run_turn(
            &ThreadId::from(thread),
            &[],
            question,
            CancellationToken::new(),
        )
        .await
        .unwrap()
}

fn failure_code(outcome: &TurnOutcome) -> Option<AgentErrorCode> {
    match outcome {
        TurnOutcome::Failure { code, .. } => Some(*code),
        _ => None,
    }
}

// =============================================================================
// Consensus
// =============================================================================

#[tokio::test]
async fn test_majority_answer_is_executed_and_summarized() {
    let h = harness(
        ScriptedModel::new(
            ready_intent(),
            fixed_sql(&[
                "SELECT name FROM customers WHERE city = 'Paris'",
                "```sql\nSELECT c.name AS customer FROM customers c WHERE c.city = 'Paris';\n```",
                "SELECT name FROM customers",
            ]),
        ),
        |_| {},
    );
    let mut events = h.pipeline.events().subscribe();

    let outcome = ask(&h, "t-majority", "Which customers live in Paris?").await;

    let TurnOutcome::Success {
        sql, rows, summary, ..
    } = outcome
    else {
        panic!("expected success, got {:?}", outcome);
    };
    assert!(sql.contains("'Paris'"), "minority query won: {}", sql);
    let mut names: Vec<String> = rows
        .iter()
        .map(|r| r.values().next().unwrap().as_str().unwrap().to_string())
        .collect();
    names.sort();
    assert_eq!(names, ["Alice", "Chloe"]);
    assert_eq!(summary.as_deref(), Some("Two customers live in Paris."));

    assert_eq!(h.model.calls(SQL), 3);
    assert_eq!(h.model.calls(JUDGE), 0);
    assert!(h.checkpoints.list().unwrap().is_empty());

    let mut finished = false;
    while let Ok(event) = events.try_recv() {
        if let PipelineEvent::Finished { success, .. } = event {
            finished = success;
        }
    }
    assert!(finished);
}

#[tokio::test]
async fn test_disagreement_goes_through_arbitration_to_judge() {
    let model = ScriptedModel::new(
        ready_intent(),
        fixed_sql(&[
            "SELECT name FROM customers WHERE id = 1",
            "SELECT name FROM customers WHERE id = 2",
            "SELECT name FROM customers WHERE id = 3",
            "SELECT name FROM customers WHERE id = 4",
        ]),
    )
    .with_judge(Box::new(|prompt, _| {
        let choice = prompt
            .lines()
            .find(|line| line.ends_with("WHERE id = 2"))
            .and_then(|line| line.split('.').next())
            .and_then(|n| n.trim().parse::<i64>().ok())?;
        Some(json!({ "choice": choice }))
    }));
    let h = harness(model, |_| {});

    let outcome = ask(&h, "t-judge", "Who is customer two?").await;

    let TurnOutcome::Success { sql, rows, .. } = &outcome else {
        panic!("expected success, got {:?}", outcome);
    };
    assert_eq!(sql, "SELECT name FROM customers WHERE id = 2");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&json!("Bruno")));

    // Three candidates, then one arbitration candidate
    assert_eq!(h.model.calls(SQL), 4);
    assert_eq!(h.model.calls(JUDGE), 1);
}

#[tokio::test]
async fn test_judge_failure_ends_turn() {
    let h = harness(
        ScriptedModel::new(
            ready_intent(),
            fixed_sql(&[
                "SELECT name FROM customers WHERE id = 1",
                "SELECT name FROM customers WHERE id = 2",
                "SELECT name FROM customers WHERE id = 3",
                "SELECT name FROM customers WHERE id = 4",
            ]),
        ),
        |_| {},
    );

    let outcome = ask(&h, "t-judge-down", "Who?").await;
    assert_eq!(failure_code(&outcome), Some(AgentErrorCode::LlmError));
}

// =============================================================================
// Retry Bounds
// =============================================================================

#[tokio::test]
async fn test_invalid_sql_stops_at_retry_limit() {
    let h = harness(
        ScriptedModel::new(ready_intent(), fixed_sql(&["SELEKT name FROM customers"])),
        |config| config.agent.max_retries = 3,
    );

    let outcome = ask(&h, "t-retry", "Names?").await;

    assert_eq!(
        failure_code(&outcome),
        Some(AgentErrorCode::ValidationRetryLimit)
    );
    // Three rounds of three candidates, intent parsed once
    assert_eq!(h.model.calls(SQL), 9);
    assert_eq!(h.model.calls(INTENT), 1);
    assert!(
        h.model
            .prompts()
            .iter()
            .any(|p| p.contains("Previous Attempt Failed"))
    );
}

#[tokio::test]
async fn test_unknown_column_retrieves_schema_again() {
    let h = harness(
        ScriptedModel::new(
            ready_intent(),
            Box::new(|_, n| {
                let sql = if n < 3 {
                    "SELECT email FROM customers"
                } else {
                    "SELECT name FROM customers WHERE city = 'Lyon'"
                };
                Some(json!({ "sql": sql }))
            }),
        ),
        |_| {},
    );

    let outcome = ask(&h, "t-plan", "Lyon customers").await;

    assert!(outcome.is_success(), "{:?}", outcome);
    assert_eq!(h.model.calls(INTENT), 2);
}

#[tokio::test]
async fn test_step_limit_aborts_run() {
    let h = harness(
        ScriptedModel::new(
            ready_intent(),
            fixed_sql(&["SELECT name FROM customers"]),
        ),
        |config| config.agent.max_steps = 3,
    );

    let outcome = ask(&h, "t-steps", "Names?").await;
    assert_eq!(failure_code(&outcome), Some(AgentErrorCode::StepLimit));
}

// =============================================================================
// Follow-up Questions
// =============================================================================

fn follow_up_then_ready() -> Responder {
    Box::new(|prompt, n| {
        if n == 0 {
            assert!(!prompt.contains("Paris"));
            Some(json!({
                "need_follow_up": true,
                "need_retry_retrieve": false,
                "follow_up_question": "Which city?"
            }))
        } else {
            Some(json!({
                "need_follow_up": false,
                "need_retry_retrieve": false,
                "ir_ast": {"select": [{"name": "name"}], "from_table": {"name": "customers"}}
            }))
        }
    })
}

#[tokio::test]
async fn test_follow_up_suspends_and_resumes() {
    let h = harness(
        ScriptedModel::new(
            follow_up_then_ready(),
            fixed_sql(&["SELECT name FROM customers WHERE city = 'Paris'"]),
        ),
        |_| {},
    );
    let thread = ThreadId::from("t-follow");

    let outcome = ask(&h, "t-follow", "Customers in a city").await;
    assert_eq!(
        outcome,
        TurnOutcome::FollowUp {
            thread_id: thread.clone(),
            question: "Which city?".into(),
        }
    );
    assert_eq!(h.checkpoints.list().unwrap().len(), 1);

    let resumed = h
        .pipeline
        .resume(&thread, "Paris", CancellationToken::new())
        .await
        .unwrap();

    let TurnOutcome::Success { rows, .. } = &resumed else {
        panic!("expected success, got {:?}", resumed);
    };
    assert_eq!(rows.len(), 2);
    assert!(h.checkpoints.list().unwrap().is_empty());

    let resumed_prompt = h
        .model
        .prompts()
        .into_iter()
        .filter(|p| p.contains("Which city?"))
        .last()
        .unwrap();
    assert!(resumed_prompt.contains("Paris"));
}

#[tokio::test]
async fn test_discarded_turn_cannot_resume() {
    let h = harness(
        ScriptedModel::new(follow_up_then_ready(), fixed_sql(&["SELECT 1"])),
        |_| {},
    );
    let thread = ThreadId::from("t-discard");

    ask(&h, "t-discard", "Customers in a city").await;
    assert!(h.pipeline.discard(&thread).unwrap());
    assert!(!h.pipeline.discard(&thread).unwrap());

    let err = h
        .pipeline
        .resume(&thread, "Paris", CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, QuorumError::CheckpointNotFound(_)));
}

#[tokio::test]
async fn test_follow_up_limit() {
    let h = harness(
        ScriptedModel::new(
            Box::new(|_, _| {
                Some(json!({
                    "need_follow_up": true,
                    "need_retry_retrieve": false,
                    "follow_up_question": "Which city?"
                }))
            }),
            fixed_sql(&["SELECT 1"]),
        ),
        |config| config.agent.max_follow_ups = 1,
    );
    let thread = ThreadId::from("t-limit");

    let first = ask(&h, "t-limit", "Customers").await;
    assert!(matches!(first, TurnOutcome::FollowUp { .. }));

    let second = h
        .pipeline
        .resume(&thread, "Somewhere", CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(failure_code(&second), Some(AgentErrorCode::FollowUpLimit));
    assert!(h.checkpoints.list().unwrap().is_empty());
}

#[tokio::test]
async fn test_new_question_replaces_paused_turn() {
    let h = harness(
        ScriptedModel::new(
            follow_up_then_ready(),
            fixed_sql(&["SELECT name FROM customers"]),
        ),
        |_| {},
    );

    ask(&h, "t-replace", "Customers in a city").await;
    let outcome = ask(&h, "t-replace", "All customer names").await;

    assert!(outcome.is_success(), "{:?}", outcome);
    assert!(h.checkpoints.list().unwrap().is_empty());
}

// =============================================================================
// Cancellation and Retrieval
// =============================================================================

#[tokio::test]
async fn test_cancelled_token_stops_turn() {
    let h = harness(
        ScriptedModel::new(ready_intent(), fixed_sql(&["SELECT 1"])),
        |_| {},
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = h
        .pipeline
        .run_turn(&ThreadId::from("t-cancel"), &[], "Names?", cancel)
        .await
        .unwrap();

    assert_eq!(failure_code(&outcome), Some(AgentErrorCode::Cancelled));
    assert_eq!(h.model.calls(INTENT), 0);
}

struct EmptyRetriever;

#[async_trait]
impl SchemaRetriever for EmptyRetriever {
    async fn retrieve(&self, _query: &str, _top_k: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_custom_retriever_without_results() {
    let h = harness(
        ScriptedModel::new(ready_intent(), fixed_sql(&["SELECT 1"])),
        |_| {},
    );
    let pipeline = h.pipeline.with_retriever(Arc::new(EmptyRetriever));

    let outcome = pipeline
        .run_turn(
            &ThreadId::from("t-empty"),
            &[],
            "Names?",
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(failure_code(&outcome), Some(AgentErrorCode::NoSchemaResults));
}
