#![cfg(feature = "sqlite")]
use sql_bindcursor::args;
use sql_bindcursor::prelude::*;

fn memory_client(name: &str) -> DbClient {
    SqliteOptionsBuilder::new(":memory:".to_string()).build(name)
}

fn run(client: &DbClient, sql: &str) -> Result<(), DbError> {
    let mut query = client.multi_query(sql, &QueryOptions::default())?;
    let mut cursor = query.execute()?;
    cursor.deplete_sets()?;
    Ok(())
}

fn setup(client: &DbClient) -> Result<(), DbError> {
    run(
        client,
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT, price REAL, data BLOB);
         CREATE TABLE tags (item_id INTEGER, tag TEXT);",
    )
}

struct Money(i64);

impl SqlStringable for Money {
    fn to_sql_string(&self) -> String {
        format!("{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

struct Opaque;

#[test]
fn prepared_query_binds_bucket_contents_at_execute() -> Result<(), Box<dyn std::error::Error>> {
    let client = memory_client("bind");
    setup(&client)?;

    let bucket = SharedArgs::new(args!["apple", 1.5_f64]);
    let mut insert = client.query(
        "INSERT INTO items (name, price) VALUES (?, ?)",
        &QueryOptions::default(),
    )?;
    insert.prepare("sd", &bucket)?;
    assert_eq!(insert.mode(), StatementMode::Prepared);
    insert.execute()?;

    bucket.set(0, "pear")?;
    bucket.set(1, 2_i64)?;
    insert.execute()?;
    assert_eq!(insert.execution_count(), 2);

    let mut select = client.query(
        "SELECT name, price FROM items ORDER BY id",
        &QueryOptions::default(),
    )?;
    let mut cursor = select.execute()?;
    let rows = cursor.fetch_array_all(FetchShape::Assoc, None)?.into_list();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("name"), Some(&RowValues::Text("apple".into())));
    assert_eq!(rows[1].get("name"), Some(&RowValues::Text("pear".into())));
    assert_eq!(rows[1].get("price"), Some(&RowValues::Float(2.0)));
    Ok(())
}

#[test]
fn argument_counts_are_checked_before_the_driver() -> Result<(), Box<dyn std::error::Error>> {
    let client = memory_client("count");

    let mut query = client.query("SELECT ?, ?", &QueryOptions::default())?;
    let err = query.parameters("", args![1_i64]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentCountMismatch);

    let err = query.parameters("i", args![1_i64, 2_i64]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentCountMismatch);

    let err = query.execute().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentCountMismatch);
    assert!(!client.is_connected());

    let err = query.parameters("x", args![1_i64, 2_i64]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    Ok(())
}

#[test]
fn literal_rendering_keeps_markers_inside_strings() -> Result<(), Box<dyn std::error::Error>> {
    let client = memory_client("literal");
    let mut query = client.query("SELECT ? AS a, '?' AS b", &QueryOptions::default())?;
    query.parameters("s", args!["O'Hara"])?;
    assert_eq!(query.sql(), "SELECT 'O''Hara' AS a, '?' AS b");

    let mut cursor = query.execute()?;
    let row = cursor.fetch_array(FetchShape::Numeric)?.expect("one row");
    assert_eq!(row.get_by_index(0), Some(&RowValues::Text("O'Hara".into())));
    assert_eq!(row.get_by_index(1), Some(&RowValues::Text("?".into())));
    Ok(())
}

#[test]
fn negative_values_after_a_minus_stay_in_the_statement() -> Result<(), Box<dyn std::error::Error>> {
    let client = memory_client("negative");
    run(
        &client,
        "CREATE TABLE t (id INTEGER PRIMARY KEY, v INTEGER);
         INSERT INTO t (id, v) VALUES (1, 10), (2, 20);",
    )?;

    let mut update = client.query("UPDATE t SET v = v-? WHERE id = ?", &QueryOptions::default())?;
    update.parameters("ii", args![-1_i64, 1_i64])?;
    assert_eq!(update.sql(), "UPDATE t SET v = v-(-1) WHERE id = 1");
    assert_eq!(update.execute()?.affected_rows()?, Some(1));

    let mut select = client.query("SELECT v FROM t ORDER BY id", &QueryOptions::default())?;
    let values = select.execute()?.fetch_field_all(0_usize, None)?.into_list();
    assert_eq!(values, vec![RowValues::Int(11), RowValues::Int(20)]);

    let mut float = client.query("SELECT 1.0-? AS f", &QueryOptions::default())?;
    float.parameters("d", args![-0.5_f64])?;
    assert_eq!(float.execute()?.fetch_field("f")?, Some(RowValues::Float(1.5)));
    Ok(())
}

#[test]
fn stringable_objects_bind_and_opaque_ones_are_refused() -> Result<(), Box<dyn std::error::Error>> {
    let client = memory_client("objects");

    let mut query = client.query("SELECT ?", &QueryOptions::default())?;
    query.parameters("s", vec![Argument::new(ArgValue::stringable(Money(1250)))])?;
    let mut cursor = query.execute()?;
    assert_eq!(
        cursor.fetch_field(0_usize)?,
        Some(RowValues::Text("12.50".into()))
    );
    drop(cursor);

    let mut query = client.query("SELECT ?", &QueryOptions::default())?;
    let err = query
        .parameters("s", vec![Argument::new(ArgValue::opaque(Opaque))])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentNotStringConvertible);
    let report = err.report().expect("validation report");
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 0);
    Ok(())
}

#[test]
fn every_type_tag_round_trips() -> Result<(), Box<dyn std::error::Error>> {
    let client = memory_client("tags");
    setup(&client)?;

    let bucket = SharedArgs::new(args!["7", "widget", 3_i64, vec![0xde_u8, 0xad]]);
    let mut insert = client.query(
        "INSERT INTO items (id, name, price, data) VALUES (?, ?, ?, ?)",
        &QueryOptions::default(),
    )?;
    insert.prepare("isdb", &bucket)?;
    insert.execute()?;

    let mut select = client.query(
        "SELECT id, name, price, data FROM items WHERE id = ?",
        &QueryOptions::default(),
    )?;
    select.parameters("i", args![7_i64])?;
    let mut cursor = select.execute()?;
    let row = cursor.next_row()?.expect("inserted row");
    assert_eq!(row.get("id"), Some(&RowValues::Int(7)));
    assert_eq!(row.get("name"), Some(&RowValues::Text("widget".into())));
    assert_eq!(row.get("price"), Some(&RowValues::Float(3.0)));
    assert_eq!(row.get("data"), Some(&RowValues::Blob(vec![0xde, 0xad])));
    Ok(())
}

#[test]
fn type_failures_report_every_argument() -> Result<(), Box<dyn std::error::Error>> {
    let client = memory_client("report");
    let mut query = client.query("SELECT ?, ?, ?", &QueryOptions::default())?;
    let err = query
        .parameters("iid", args!["abc", 4_i64, "x"])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentTypeInvalid);
    let report = err.report().expect("validation report");
    let indexes: Vec<usize> = report.failures.iter().map(|f| f.index).collect();
    assert_eq!(indexes, vec![0, 2]);
    Ok(())
}

#[test]
fn reuse_rules_follow_the_binding_style() -> Result<(), Box<dyn std::error::Error>> {
    let client = memory_client("reuse");

    let mut simple = client.query("SELECT ?", &QueryOptions::default())?;
    simple.parameters("i", args![1_i64])?;
    simple.execute()?;
    let err = simple.execute().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalReuse);
    simple.parameters("i", args![2_i64])?;
    assert_eq!(simple.execute()?.fetch_field(0_usize)?, Some(RowValues::Int(2)));

    let mut reusable = client.query("SELECT 1", &QueryOptions::default().with_reusable(true))?;
    reusable.execute()?;
    reusable.execute()?;
    assert_eq!(reusable.execution_count(), 2);

    let bucket = SharedArgs::new(args![1_i64]);
    let mut prepared = client.query("SELECT ?", &QueryOptions::default())?;
    prepared.prepare("i", &bucket)?;
    let err = prepared.prepare("i", &bucket).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalReuse);
    let err = prepared.parameters("i", args![1_i64]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalReuse);
    Ok(())
}

#[test]
fn closing_twice_is_harmless_and_blocks_execution() -> Result<(), Box<dyn std::error::Error>> {
    let client = memory_client("close");
    let bucket = SharedArgs::new(args![5_i64]);
    let mut query = client.query("SELECT ?", &QueryOptions::default())?;
    query.prepare("i", &bucket)?;
    query.close();
    query.close();
    assert_eq!(query.state(), QueryState::Closed);
    let err = query.execute().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalReuse);
    assert!(matches!(bucket.get(0), Some(ArgValue::Int(5))));
    Ok(())
}

#[test]
fn qualifiers_are_refused_on_sqlite() -> Result<(), Box<dyn std::error::Error>> {
    let client = memory_client("qualifier");
    let bucket = SharedArgs::new(vec![Argument::qualified(
        1_i64,
        ParamQualifier::sql_type(SqlType::Int),
    )]);
    let mut query = client.query("SELECT ?", &QueryOptions::default())?;
    let err = query.prepare("i", &bucket).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    Ok(())
}

#[test]
fn native_rejections_carry_context_and_codes() -> Result<(), Box<dyn std::error::Error>> {
    let client = memory_client("native");
    setup(&client)?;
    let mut query = client.query(
        "SELECT * FROM missing_table",
        &QueryOptions::default().with_name("lookup"),
    )?;
    let err = query.execute().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QueryRejected);
    assert!(err.native().is_some());
    assert!(query.query_id().ends_with(":lookup"));
    assert!(err.to_string().starts_with("sqlite[native:"));
    Ok(())
}
