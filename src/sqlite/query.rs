use rusqlite::types::Value;
use rusqlite::{Connection, ToSql};

use crate::error::NativeError;
use crate::native::BufferedSet;
use crate::translation::is_insert_like;
use crate::types::RowValues;

// Primary result codes used for failures rusqlite raises itself
const SQLITE_ERROR: i64 = 1;
const SQLITE_MISMATCH: i64 = 20;
const SQLITE_MISUSE: i64 = 21;
const SQLITE_RANGE: i64 = 25;

/// Map a rusqlite error to the native error the classifier understands.
///
/// Engine failures keep their extended result code and message; failures
/// raised inside rusqlite get the primary code closest to their meaning.
#[must_use]
pub fn native_error(err: rusqlite::Error) -> NativeError {
    match err {
        rusqlite::Error::SqliteFailure(ffi_err, message) => NativeError::new(
            i64::from(ffi_err.extended_code),
            message.unwrap_or_else(|| ffi_err.to_string()),
        ),
        rusqlite::Error::InvalidParameterCount(..) | rusqlite::Error::InvalidParameterName(_) => {
            NativeError::new(SQLITE_RANGE, err.to_string())
        }
        rusqlite::Error::ToSqlConversionFailure(_)
        | rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::IntegralValueOutOfRange(..) => {
            NativeError::new(SQLITE_MISMATCH, err.to_string())
        }
        rusqlite::Error::ExecuteReturnedResults
        | rusqlite::Error::InvalidColumnIndex(_)
        | rusqlite::Error::InvalidColumnName(_)
        | rusqlite::Error::QueryReturnedNoRows => NativeError::new(SQLITE_MISUSE, err.to_string()),
        other => NativeError::new(SQLITE_ERROR, other.to_string()),
    }
}

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
///
/// Returns the native error if the value cannot be read.
pub fn sqlite_extract_value(row: &rusqlite::Row, idx: usize) -> Result<RowValues, NativeError> {
    let value: Value = row.get(idx).map_err(native_error)?;
    Ok(match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    })
}

/// Run one statement and read its whole outcome.
///
/// Statements without result columns report their change count, and an
/// identity when they are inserts that changed something.
///
/// # Errors
///
/// Returns the native error of preparing, binding, or stepping.
pub fn run_statement(
    conn: &Connection,
    sql: &str,
    params: &[Value],
) -> Result<BufferedSet, NativeError> {
    let mut stmt = conn.prepare_cached(sql).map_err(native_error)?;
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|v| v as &dyn ToSql).collect();

    if stmt.column_count() == 0 {
        let changed = stmt.execute(&param_refs[..]).map_err(native_error)?;
        let affected = u64::try_from(changed).unwrap_or(u64::MAX);
        let insert_id = (affected > 0 && is_insert_like(sql)).then(|| conn.last_insert_rowid());
        return Ok(BufferedSet::statement(Some(affected), insert_id));
    }

    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let col_count = column_names.len();

    let mut rows_iter = stmt.query(&param_refs[..]).map_err(native_error)?;
    let mut rows = Vec::new();
    while let Some(row) = rows_iter.next().map_err(native_error)? {
        let mut row_values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            row_values.push(sqlite_extract_value(row, i)?);
        }
        rows.push(row_values);
    }

    Ok(BufferedSet::rows(column_names, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_report_changes_and_identity() {
        let conn = Connection::open_in_memory().unwrap();
        run_statement(&conn, "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", &[]).unwrap();
        let set = run_statement(
            &conn,
            "INSERT INTO t (v) VALUES (?1)",
            &[Value::Text("a".into())],
        )
        .unwrap();
        assert_eq!(set.affected_rows, Some(1));
        assert_eq!(set.insert_id, Some(1));

        let set = run_statement(&conn, "UPDATE t SET v = 'b'", &[]).unwrap();
        assert_eq!(set.insert_id, None);

        let set = run_statement(&conn, "SELECT id, v FROM t", &[]).unwrap();
        assert_eq!(set.columns.as_ref(), &vec!["id".to_string(), "v".to_string()]);
        assert_eq!(set.total_rows, 1);
        assert_eq!(set.affected_rows, None);
    }

    #[test]
    fn engine_failures_keep_extended_codes() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE p (id INTEGER PRIMARY KEY);
             CREATE TABLE c (pid INTEGER REFERENCES p(id));",
        )
        .unwrap();
        let err = run_statement(&conn, "INSERT INTO c VALUES (7)", &[]).unwrap_err();
        assert_eq!(err.code, 787);
        let err = run_statement(&conn, "SELEC 1", &[]).unwrap_err();
        assert_eq!(err.code, SQLITE_ERROR);
    }
}
