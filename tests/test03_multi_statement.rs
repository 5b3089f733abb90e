#![cfg(feature = "sqlite")]
use sql_bindcursor::prelude::*;

fn fk_client() -> Result<DbClient, DbError> {
    let client = SqliteOptionsBuilder::new(":memory:".to_string()).build("multi");
    let mut setup = client.multi_query(
        "CREATE TABLE parent (id INTEGER PRIMARY KEY);
         CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER REFERENCES parent(id));
         CREATE TABLE other (id INTEGER);
         INSERT INTO parent (id) VALUES (1);
         INSERT INTO child (id, parent_id) VALUES (10, 1);
         INSERT INTO other (id) VALUES (1), (2);",
        &QueryOptions::default(),
    )?;
    setup.execute()?.deplete_sets()?;
    drop(setup);
    Ok(client)
}

#[test]
fn later_statement_failure_surfaces_on_next_set() -> Result<(), Box<dyn std::error::Error>> {
    let client = fk_client()?;
    let mut query = client.multi_query(
        "DELETE FROM other; DELETE FROM parent; DELETE FROM child",
        &QueryOptions::default(),
    )?;

    // The first statement succeeds, so execute does too.
    let mut cursor = query.execute()?;
    assert_eq!(cursor.affected_rows()?, Some(2));

    let err = cursor.next_set().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QueryRejected);
    assert_eq!(err.native().map(|n| n.code), Some(787));

    // Nothing runs after the failing statement.
    assert!(!cursor.next_set()?);
    drop(cursor);

    let mut count = client.query("SELECT COUNT(*) FROM child", &QueryOptions::default())?;
    assert_eq!(count.execute()?.fetch_field(0_usize)?, Some(RowValues::Int(1)));
    Ok(())
}

#[test]
fn deplete_sets_reports_deferred_failures() -> Result<(), Box<dyn std::error::Error>> {
    let client = fk_client()?;
    let mut query = client.multi_query(
        "SELECT 1; DELETE FROM parent",
        &QueryOptions::default(),
    )?;
    let mut cursor = query.execute()?;
    let err = cursor.deplete_sets().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QueryRejected);
    Ok(())
}

#[test]
fn each_statement_gets_its_own_set() -> Result<(), Box<dyn std::error::Error>> {
    let client = fk_client()?;
    let mut query = client.multi_query(
        "INSERT INTO other (id) VALUES (3); SELECT id FROM other ORDER BY id; SELECT 'x' AS tag",
        &QueryOptions::default(),
    )?;
    assert!(query.is_multi());
    let mut cursor = query.execute()?;

    assert_eq!(cursor.num_columns()?, 0);
    assert_eq!(cursor.affected_rows()?, Some(1));
    assert_eq!(cursor.fetch_array(FetchShape::Assoc)?, None);

    assert!(cursor.next_set()?);
    let ids = cursor.fetch_field_all(0_usize, None)?.into_list();
    assert_eq!(ids, vec![RowValues::Int(1), RowValues::Int(2), RowValues::Int(3)]);

    assert!(cursor.next_set()?);
    assert_eq!(cursor.column_names()?, vec!["tag"]);
    assert_eq!(cursor.fetch_field("tag")?, Some(RowValues::Text("x".into())));
    assert!(!cursor.next_set()?);
    Ok(())
}

#[test]
fn separators_inside_literals_do_not_split() -> Result<(), Box<dyn std::error::Error>> {
    let client = fk_client()?;
    let mut query = client.query("SELECT 'a;b' AS v", &QueryOptions::default())?;
    assert!(!query.is_multi());
    assert_eq!(
        query.execute()?.fetch_field("v")?,
        Some(RowValues::Text("a;b".into()))
    );
    Ok(())
}

#[test]
fn trigger_bodies_run_as_one_statement() -> Result<(), Box<dyn std::error::Error>> {
    let client = fk_client()?;
    let mut trigger = client.query(
        "CREATE TRIGGER bump AFTER INSERT ON other BEGIN
             UPDATE other SET id = id + 100 WHERE rowid = NEW.rowid;
             DELETE FROM child;
         END",
        &QueryOptions::default(),
    )?;
    assert!(!trigger.is_multi());
    trigger.execute()?;
    drop(trigger);

    let mut batch = client.multi_query(
        "INSERT INTO other (id) VALUES (5); SELECT id FROM other WHERE id > 100",
        &QueryOptions::default(),
    )?;
    let mut cursor = batch.execute()?;
    assert!(cursor.next_set()?);
    assert_eq!(cursor.fetch_field("id")?, Some(RowValues::Int(105)));
    assert!(!cursor.next_set()?);
    drop(cursor);

    let mut count = client.query("SELECT COUNT(*) FROM child", &QueryOptions::default())?;
    assert_eq!(count.execute()?.fetch_field(0_usize)?, Some(RowValues::Int(0)));
    Ok(())
}

#[test]
fn multi_queries_render_parameters_into_each_statement() -> Result<(), Box<dyn std::error::Error>> {
    let client = fk_client()?;
    let mut query = client.multi_query(
        "INSERT INTO other (id) VALUES (?); SELECT COUNT(*) AS n FROM other WHERE id = ?",
        &QueryOptions::default(),
    )?;
    query.parameters("ii", sql_bindcursor::args![7_i64, 7_i64])?;
    let mut cursor = query.execute()?;
    assert!(cursor.next_set()?);
    assert_eq!(cursor.fetch_field("n")?, Some(RowValues::Int(1)));

    let bucket = SharedArgs::new(sql_bindcursor::args![1_i64, 2_i64]);
    drop(cursor);
    let err = query.prepare("ii", &bucket).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    Ok(())
}

#[test]
fn transactions_wrap_multiple_queries() -> Result<(), Box<dyn std::error::Error>> {
    let client = fk_client()?;
    client.transaction_start()?;
    assert!(client.is_transaction_active());
    let mut insert = client.query("INSERT INTO other (id) VALUES (99)", &QueryOptions::default())?;
    insert.execute()?;
    client.transaction_rollback()?;
    assert!(!client.is_transaction_active());

    let mut count = client.query(
        "SELECT COUNT(*) FROM other WHERE id = 99",
        &QueryOptions::default(),
    )?;
    assert_eq!(count.execute()?.fetch_field(0_usize)?, Some(RowValues::Int(0)));

    client.transaction_start()?;
    let err = client.reconnect().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    client.transaction_commit()?;
    Ok(())
}
