//! Drives the core against a scripted single-result driver, so identity
//! selects, batch rules and reconnects can be checked without a server.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use sql_bindcursor::args;
use sql_bindcursor::native::{BufferedResult, BufferedSet};
use sql_bindcursor::prelude::*;

#[derive(Default)]
struct Script {
    connects: usize,
    sql_log: Vec<String>,
    params_log: Vec<Vec<BoundParam>>,
    failures: VecDeque<NativeError>,
}

type Shared = Rc<RefCell<Script>>;

fn respond(sql: &str, request: ExecRequest) -> Vec<BufferedSet> {
    let mut sets = Vec::new();
    if request.leading_dml {
        sets.push(BufferedSet::statement(None, None));
    }
    if sql.contains("@@ROWCOUNT") {
        sets.push(BufferedSet::rows(
            vec!["affected_rows".into(), "insert_id".into()],
            vec![vec![RowValues::Int(1), RowValues::Float(42.0)]],
        ));
    } else if sql.contains("SCOPE_IDENTITY()") {
        sets.push(BufferedSet::rows(
            vec!["insert_id".into()],
            vec![vec![RowValues::Float(42.0)]],
        ));
    } else if request.affected_rows {
        sets = vec![BufferedSet::statement(Some(3), None)];
    } else if !request.leading_dml || request.multi {
        sets.push(BufferedSet::rows(
            vec!["n".into()],
            vec![vec![RowValues::Int(7)]],
        ));
    }
    sets
}

struct FakeConnection {
    script: Shared,
}

struct FakeStatement {
    script: Shared,
    sql: String,
}

impl NativeConnection for FakeConnection {
    fn engine(&self) -> Engine {
        Engine::Mssql
    }

    fn prepare(&mut self, sql: &str) -> Result<Box<dyn NativeStatement>, NativeError> {
        self.script.borrow_mut().sql_log.push(format!("PREPARE {sql}"));
        Ok(Box::new(FakeStatement {
            script: Rc::clone(&self.script),
            sql: sql.to_string(),
        }))
    }

    fn query(
        &mut self,
        sql: &str,
        request: ExecRequest,
    ) -> Result<Box<dyn NativeResult>, NativeError> {
        let mut script = self.script.borrow_mut();
        script.sql_log.push(sql.to_string());
        if let Some(err) = script.failures.pop_front() {
            return Err(err);
        }
        Ok(Box::new(BufferedResult::new(respond(sql, request))))
    }
}

impl NativeStatement for FakeStatement {
    fn execute(
        &mut self,
        params: &[BoundParam],
        request: ExecRequest,
    ) -> Result<Box<dyn NativeResult>, NativeError> {
        let mut script = self.script.borrow_mut();
        script.params_log.push(params.to_vec());
        if let Some(err) = script.failures.pop_front() {
            return Err(err);
        }
        Ok(Box::new(BufferedResult::new(respond(&self.sql, request))))
    }

    fn close(&mut self) {}
}

fn fake_client(script: &Shared) -> DbClient {
    let script = Rc::clone(script);
    DbClient::new(
        "fake",
        "inventory",
        Engine::Mssql,
        move || -> Result<Option<Box<dyn NativeConnection>>, NativeError> {
            script.borrow_mut().connects += 1;
            Ok(Some(Box::new(FakeConnection {
                script: Rc::clone(&script),
            })))
        },
    )
}

fn reset() -> NativeError {
    NativeError::new(10054, "connection reset by peer")
}

#[test]
fn insert_id_reads_the_appended_identity_select() -> Result<(), Box<dyn std::error::Error>> {
    let script = Shared::default();
    let client = fake_client(&script);
    let mut insert = client.query(
        "INSERT INTO items (name) VALUES (?)",
        &QueryOptions::default().with_insert_id(true),
    )?;
    insert.parameters("s", args!["bolt"])?;
    assert!(insert.sql().ends_with("SELECT SCOPE_IDENTITY() AS insert_id"));

    let mut cursor = insert.execute()?;
    assert_eq!(cursor.insert_id("i")?, Some(RowValues::Int(42)));
    assert_eq!(cursor.insert_id("s")?, Some(RowValues::Text("42".into())));
    drop(cursor);

    let logged = script.borrow().sql_log.last().cloned().unwrap_or_default();
    assert!(logged.starts_with("INSERT INTO items (name) VALUES (N'bolt');"));
    Ok(())
}

#[test]
fn affected_rows_and_insert_id_share_the_trailing_row() -> Result<(), Box<dyn std::error::Error>> {
    let script = Shared::default();
    let client = fake_client(&script);
    let mut insert = client.query(
        "INSERT INTO items (name) VALUES ('nut')",
        &QueryOptions::default()
            .with_insert_id(true)
            .with_affected_rows(true),
    )?;
    let mut cursor = insert.execute()?;
    assert_eq!(cursor.affected_rows()?, Some(1));
    assert_eq!(cursor.insert_id("d")?, Some(RowValues::Float(42.0)));
    Ok(())
}

#[test]
fn affected_rows_use_the_execute_path() -> Result<(), Box<dyn std::error::Error>> {
    let script = Shared::default();
    let client = fake_client(&script);
    let mut update = client.query(
        "UPDATE items SET name = 'x'",
        &QueryOptions::default().with_affected_rows(true),
    )?;
    assert_eq!(update.execute()?.affected_rows()?, Some(3));

    let mut plain = client.query("UPDATE items SET name = 'y'", &QueryOptions::default())?;
    let mut cursor = plain.execute()?;
    assert_eq!(cursor.affected_rows().unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(cursor.insert_id("i").unwrap_err().kind(), ErrorKind::InvalidArgument);
    Ok(())
}

#[test]
fn batch_rules_are_checked_at_construction() {
    let script = Shared::default();
    let client = fake_client(&script);

    let err = client
        .multi_query(
            "INSERT INTO items (name) VALUES ('a'); UPDATE items SET name = 'b'",
            &QueryOptions::default().with_insert_id(true),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = client
        .multi_query(
            "SELECT 1; UPDATE items SET name = 'b'",
            &QueryOptions::default(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert!(client
        .multi_query(
            "UPDATE items SET name = 'b'; SELECT COUNT(*) FROM items",
            &QueryOptions::default(),
        )
        .is_ok());
    assert_eq!(script.borrow().connects, 0);
}

#[test]
fn options_are_checked_against_the_engine() {
    let script = Shared::default();
    let client = fake_client(&script);

    let err = client
        .query(
            "SELECT 1",
            &QueryOptions::default().with_result_mode(ResultMode::Store),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = client
        .query(
            "UPDATE items SET name = 'b'",
            &QueryOptions::default()
                .with_affected_rows(true)
                .with_cursor_mode(CursorMode::Static),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn lost_connection_is_retried_once() -> Result<(), Box<dyn std::error::Error>> {
    let script = Shared::default();
    script.borrow_mut().failures.push_back(reset());
    let client = fake_client(&script);

    let mut query = client.query("SELECT 7 AS n", &QueryOptions::default())?;
    assert_eq!(query.execute()?.fetch_field("n")?, Some(RowValues::Int(7)));
    assert_eq!(query.execution_count(), 1);
    assert_eq!(script.borrow().connects, 2);
    assert_eq!(script.borrow().sql_log.len(), 2);
    Ok(())
}

#[test]
fn prepared_statements_are_prepared_again_before_retrying() -> Result<(), Box<dyn std::error::Error>> {
    let script = Shared::default();
    let client = fake_client(&script);
    let bucket = SharedArgs::new(args![5_i64]);
    let mut query = client.query("SELECT ? + 1 AS n", &QueryOptions::default())?;
    query.prepare("i", &bucket)?;
    assert_eq!(query.sql(), "SELECT @P1 + 1 AS n");

    script.borrow_mut().failures.push_back(reset());
    query.execute()?;

    let script = script.borrow();
    assert_eq!(script.connects, 2);
    let prepares = script
        .sql_log
        .iter()
        .filter(|sql| sql.starts_with("PREPARE "))
        .count();
    assert_eq!(prepares, 2);
    assert_eq!(
        script.params_log.last(),
        Some(&vec![BoundParam::new(RowValues::Int(5))])
    );
    Ok(())
}

#[test]
fn no_retry_inside_a_transaction_or_while_streaming() -> Result<(), Box<dyn std::error::Error>> {
    let script = Shared::default();
    let client = fake_client(&script);
    client.transaction_start()?;
    script.borrow_mut().failures.push_back(reset());

    let mut query = client.query("SELECT 7 AS n", &QueryOptions::default())?;
    let err = query.execute().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionLost);
    assert_eq!(script.borrow().connects, 1);
    assert!(!client.is_connected());
    client.transaction_rollback()?;

    script.borrow_mut().failures.push_back(reset());
    let mut forward = client.query(
        "SELECT 7 AS n",
        &QueryOptions::default().with_cursor_mode(CursorMode::Forward),
    )?;
    let err = forward.execute().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionLost);
    assert_eq!(script.borrow().connects, 2);
    Ok(())
}

#[test]
fn provider_without_connection_reports_connection_lost() {
    let attempts = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&attempts);
    let client = DbClient::new(
        "down",
        "inventory",
        Engine::Mssql,
        move || -> Result<Option<Box<dyn NativeConnection>>, NativeError> {
            *counter.borrow_mut() += 1;
            Ok(None)
        },
    );
    let mut query = client
        .query("SELECT 1", &QueryOptions::default())
        .expect("query builds without connecting");
    let err = query.execute().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionLost);
    assert_eq!(*attempts.borrow(), 2);
}

#[test]
fn qualifiers_reach_the_driver_on_prepare() -> Result<(), Box<dyn std::error::Error>> {
    let script = Shared::default();
    let client = fake_client(&script);
    let qualifier = ParamQualifier::sql_type(SqlType::SmallInt);
    let bucket = SharedArgs::new(vec![Argument::qualified(7_i64, qualifier)]);
    let mut query = client.query("SELECT ? AS n", &QueryOptions::default())?;
    query.prepare("i", &bucket)?;
    query.execute()?;
    let logged = script.borrow().params_log.last().cloned().unwrap_or_default();
    assert_eq!(logged[0].qualifier, Some(qualifier));

    let out = SharedArgs::new(vec![Argument::qualified(
        7_i64,
        qualifier.with_direction(ParamDirection::Out),
    )]);
    let mut query = client.query("SELECT ? AS n", &QueryOptions::default())?;
    assert_eq!(
        query.prepare("i", &out).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );

    let mut simple = client.query("SELECT ? AS n", &QueryOptions::default())?;
    assert_eq!(
        simple
            .parameters("i", vec![Argument::qualified(7_i64, qualifier)])
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidArgument
    );
    Ok(())
}

#[test]
fn native_failure_revalidates_every_argument() -> Result<(), Box<dyn std::error::Error>> {
    let script = Shared::default();
    let client = fake_client(&script);
    let small = ParamQualifier::sql_type(SqlType::SmallInt);
    let bucket = SharedArgs::new(vec![
        Argument::new(1_i64),
        Argument::qualified(70_000_i64, small),
    ]);
    let policy = ValidationPolicy::from_bits(ValidationPolicy::FAILURE)?;
    let mut query = client.query(
        "UPDATE items SET qty = ? WHERE bin = ?",
        &QueryOptions::default().with_validate_params(policy),
    )?;
    query.prepare("ii", &bucket)?;

    script.borrow_mut().failures.push_back(NativeError::new(
        8115,
        "Arithmetic overflow error converting expression to data type smallint",
    ));
    let err = query.execute().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentTypeInvalid);
    assert_eq!(err.native().map(|n| n.code), Some(8115));
    let report = err.report().expect("failure report");
    assert_eq!(report.phase, Phase::Failure);
    let indexes: Vec<usize> = report.failures.iter().map(|f| f.index).collect();
    assert_eq!(indexes, vec![1]);
    assert_eq!(script.borrow().connects, 1);

    bucket.set(1, 7_i64)?;
    script.borrow_mut().failures.push_back(NativeError::new(547, "FK conflict"));
    let err = query.execute().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QueryRejected);
    assert!(err.report().is_none());
    Ok(())
}
