use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use ch_bridge::schema::schema_from_pairs;
use ch_bridge::{
    BridgeError, Client, ColumnMeta, Driver, DriverError, ErrorCode, QueryOptions, Row, RowEvent,
    RowSink, Value,
};

// ═══════════════════════════════════════════════════════════════
//  Scripted driver
// ═══════════════════════════════════════════════════════════════

/// Replays canned event scripts per statement and records everything it is
/// asked to run.
#[derive(Default)]
struct MockDriver {
    scripts: HashMap<String, Vec<RowEvent>>,
    delays: HashMap<String, u64>,
    statements: Arc<Mutex<Vec<String>>>,
    inserted: Arc<Mutex<Vec<Row>>>,
}

impl MockDriver {
    fn new() -> Self {
        Self::default()
    }

    fn script(mut self, sql: &str, events: Vec<RowEvent>) -> Self {
        self.scripts.insert(sql.to_string(), events);
        self
    }

    fn delay(mut self, sql: &str, ms: u64) -> Self {
        self.delays.insert(sql.to_string(), ms);
        self
    }
}

impl Driver for MockDriver {
    fn select(
        &self,
        sql: &str,
        _options: &QueryOptions,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<RowEvent>, DriverError>> + Send + '_>>
    {
        self.statements.lock().unwrap().push(sql.to_string());
        let events = self.scripts.get(sql).cloned().unwrap_or_else(|| {
            vec![RowEvent::Error(DriverError::new(format!("no script for: {sql}")))]
        });
        let delay = self.delays.get(sql).copied().unwrap_or(0);

        Box::pin(async move {
            let (tx, rx) = mpsc::channel(16);
            tokio::spawn(async move {
                if delay > 0 {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                for event in events {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
            });
            Ok(rx)
        })
    }

    fn insert(
        &self,
        sql: &str,
        _options: &QueryOptions,
    ) -> Pin<Box<dyn Future<Output = Result<RowSink, DriverError>> + Send + '_>> {
        self.statements.lock().unwrap().push(sql.to_string());
        let inserted = self.inserted.clone();

        Box::pin(async move {
            let (tx, mut rx) = mpsc::channel::<Row>(16);
            tokio::spawn(async move {
                while let Some(row) = rx.recv().await {
                    inserted.lock().unwrap().push(row);
                }
            });
            Ok(RowSink::new(tx))
        })
    }

    fn execute(
        &self,
        sql: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), DriverError>> + Send + '_>> {
        self.statements.lock().unwrap().push(sql.to_string());
        Box::pin(async move { Ok(()) })
    }
}

fn visits_meta() -> RowEvent {
    RowEvent::Metadata(vec![
        ColumnMeta::new("id", "UInt32"),
        ColumnMeta::new("name", "String"),
        ColumnMeta::new("seen", "DateTime"),
    ])
}

fn visits_row(id: &str, name: &str, seen: &str) -> RowEvent {
    RowEvent::Data(row(&[
        ("id", Value::String(id.into())),
        ("name", Value::String(name.into())),
        ("seen", Value::String(seen.into())),
    ]))
}

fn row(entries: &[(&str, Value)]) -> Row {
    entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn end() -> RowEvent {
    RowEvent::End(serde_json::Value::Null)
}

async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

// ═══════════════════════════════════════════════════════════════
//  Queries
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn query_rows_decodes_through_metadata_schema() {
    let sql = "SELECT id, name, seen FROM visits";
    let driver = MockDriver::new().script(
        sql,
        vec![
            visits_meta(),
            visits_row("1", "alice", "2020-05-01 10:00:00"),
            visits_row("2", "bob", "1970-01-01 00:00:00"),
            end(),
        ],
    );
    let client = Client::new(Arc::new(driver));

    let rows = client.query_rows(sql).await.expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], Value::UInt(1));
    assert_eq!(rows[0]["name"], Value::String("alice".into()));
    assert!(matches!(rows[0]["seen"], Value::DateTime(_)));
    // null sentinel decodes to Null, not the epoch instant
    assert_eq!(rows[1]["seen"], Value::Null);
}

#[tokio::test]
async fn query_exposes_columns_and_info() {
    let sql = "SELECT id, name, seen FROM visits LIMIT 0";
    let driver = MockDriver::new().script(
        sql,
        vec![visits_meta(), RowEvent::End(serde_json::json!({"read_rows": "0"}))],
    );
    let client = Client::new(Arc::new(driver));

    let result = client.query(sql).await.expect("result");
    assert!(result.rows.is_empty());
    assert_eq!(result.columns.len(), 3);
    assert_eq!(result.info["read_rows"], "0");
}

#[tokio::test]
async fn query_one_returns_none_on_empty_result() {
    let sql = "SELECT id, name, seen FROM visits WHERE 0";
    let driver = MockDriver::new().script(sql, vec![visits_meta(), end()]);
    let client = Client::new(Arc::new(driver));

    assert_eq!(client.query_one(sql).await.expect("result"), None);
}

#[tokio::test]
async fn stream_error_fails_the_query() {
    let sql = "SELECT broken";
    let driver = MockDriver::new().script(
        sql,
        vec![
            visits_meta(),
            visits_row("1", "a", ""),
            RowEvent::Error(DriverError::new("socket reset")),
        ],
    );
    let client = Client::new(Arc::new(driver));

    match client.query(sql).await {
        Err(BridgeError::Driver(e)) => assert!(e.message.contains("socket reset")),
        other => panic!("unexpected: {other:?}"),
    }
}

fn counter_script(n: &str) -> Vec<RowEvent> {
    vec![
        RowEvent::Metadata(vec![ColumnMeta::new("n", "UInt32")]),
        RowEvent::Data(row(&[("n", Value::String(n.into()))])),
        end(),
    ]
}

#[tokio::test]
async fn sequential_batch_preserves_order() {
    let sqls: Vec<String> = (1..=3).map(|i| format!("SELECT {i}")).collect();
    let driver = MockDriver::new()
        .script(&sqls[0], counter_script("1"))
        .script(&sqls[1], counter_script("2"))
        .script(&sqls[2], counter_script("3"));
    let client = Client::new(Arc::new(driver));

    let results = client.query_rows_batch(&sqls, false).await.expect("batch");
    let values: Vec<&Value> = results.iter().map(|rows| &rows[0]["n"]).collect();
    assert_eq!(values, [&Value::UInt(1), &Value::UInt(2), &Value::UInt(3)]);
}

#[tokio::test]
async fn parallel_batch_preserves_submission_order() {
    // slowest first: order must come from submission, not completion
    let sqls: Vec<String> = (1..=3).map(|i| format!("SELECT {i}")).collect();
    let driver = MockDriver::new()
        .script(&sqls[0], counter_script("1"))
        .delay(&sqls[0], 60)
        .script(&sqls[1], counter_script("2"))
        .delay(&sqls[1], 20)
        .script(&sqls[2], counter_script("3"));
    let client = Client::new(Arc::new(driver));

    let results = client.query_rows_batch(&sqls, true).await.expect("batch");
    let values: Vec<&Value> = results.iter().map(|rows| &rows[0]["n"]).collect();
    assert_eq!(values, [&Value::UInt(1), &Value::UInt(2), &Value::UInt(3)]);
}

#[tokio::test]
async fn parallel_batch_fails_when_any_query_fails() {
    let sqls: Vec<String> = vec!["SELECT 1".into(), "SELECT nope".into()];
    let driver = MockDriver::new()
        .script(&sqls[0], counter_script("1"))
        .script(&sqls[1], vec![RowEvent::Error(DriverError::new("bad column"))]);
    let client = Client::new(Arc::new(driver));

    assert!(client.query_batch(&sqls, true).await.is_err());
}

// ═══════════════════════════════════════════════════════════════
//  Inserts
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn insert_with_schema_writes_wire_rows() {
    let driver = MockDriver::new();
    let statements = driver.statements.clone();
    let inserted = driver.inserted.clone();
    let client = Client::new(Arc::new(driver));

    let schema = schema_from_pairs([("id", "UInt32"), ("name", "String")]);
    let rows = vec![
        row(&[("id", Value::Int(7)), ("name", Value::String("alice".into()))]),
        row(&[("id", Value::Int(8)), ("name", Value::String("bob".into()))]),
    ];
    client
        .insert("visits", &rows, Some(&schema), &QueryOptions::new())
        .await
        .expect("insert");

    wait_until(|| inserted.lock().unwrap().len() == 2).await;
    let written = inserted.lock().unwrap();
    assert_eq!(written[0]["id"], Value::String("7".into()));
    assert_eq!(written[1]["name"], Value::String("bob".into()));

    let statements = statements.lock().unwrap();
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0], "INSERT INTO visits (id, name)");
}

#[tokio::test]
async fn insert_without_schema_probes_the_table() {
    let driver = MockDriver::new().script(
        "SELECT * FROM visits LIMIT 1",
        vec![visits_meta(), end()],
    );
    let statements = driver.statements.clone();
    let inserted = driver.inserted.clone();
    let client = Client::new(Arc::new(driver));

    let rows = vec![row(&[
        ("id", Value::Int(1)),
        ("name", Value::String("carol".into())),
        ("seen", Value::String("2020-05-01 10:00:00".into())),
    ])];
    client
        .insert("visits", &rows, None, &QueryOptions::new())
        .await
        .expect("insert");

    wait_until(|| inserted.lock().unwrap().len() == 1).await;
    let written = inserted.lock().unwrap();
    assert_eq!(written[0]["seen"], Value::String("2020-05-01 10:00:00".into()));

    let statements = statements.lock().unwrap();
    assert_eq!(statements[0], "SELECT * FROM visits LIMIT 1");
    assert_eq!(statements[1], "INSERT INTO visits (id, name, seen)");
}

#[tokio::test]
async fn insert_aborts_on_first_bad_row() {
    let driver = MockDriver::new();
    let statements = driver.statements.clone();
    let inserted = driver.inserted.clone();
    let client = Client::new(Arc::new(driver));

    let schema = schema_from_pairs([("id", "UInt8")]);
    let rows = vec![
        row(&[("id", Value::Int(5))]),
        row(&[("id", Value::Int(512))]),
    ];
    match client.insert("visits", &rows, Some(&schema), &QueryOptions::new()).await {
        Err(BridgeError::Codec(e)) => {
            assert_eq!(e.code, ErrorCode::AboveMaximum);
            assert!(e.message.contains("id"));
        }
        other => panic!("unexpected: {other:?}"),
    }
    // nothing reached the driver
    assert!(statements.lock().unwrap().is_empty());
    assert!(inserted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn insert_rejects_column_missing_from_schema() {
    let driver = MockDriver::new();
    let client = Client::new(Arc::new(driver));

    let schema = schema_from_pairs([("id", "UInt8")]);
    let rows = vec![row(&[("ghost", Value::Int(1))])];
    match client.insert("visits", &rows, Some(&schema), &QueryOptions::new()).await {
        Err(BridgeError::Codec(e)) => {
            assert_eq!(e.code, ErrorCode::ColumnNotInSchema);
            assert!(e.message.contains("ghost"));
        }
        other => panic!("unexpected: {other:?}"),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Maintenance
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn optimize_issues_the_statement() {
    let driver = MockDriver::new();
    let statements = driver.statements.clone();
    let client = Client::new(Arc::new(driver));

    client.optimize("visits", false).await.expect("optimize");
    client.optimize("visits", true).await.expect("optimize");

    let statements = statements.lock().unwrap();
    assert_eq!(statements[0], "OPTIMIZE TABLE visits");
    assert_eq!(statements[1], "OPTIMIZE TABLE visits DEDUPLICATE");
}
