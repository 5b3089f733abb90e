use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use rusqlite::Connection;
use tracing::debug;

use super::params::Params;
use super::query::{native_error, run_statement};
use crate::error::NativeError;
use crate::native::{
    BoundParam, BufferedSet, ExecRequest, NativeConnection, NativeResult, NativeStatement,
};
use crate::translation::split_statements;
use crate::types::{Engine, RowValues};

/// Native `SQLite` connection.
///
/// Statements and results hold their own `Rc` of the handle, so they stay
/// usable without borrowing the connection object.
pub struct SqliteConnection {
    conn: Rc<Connection>,
}

impl SqliteConnection {
    #[must_use]
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Rc::new(conn),
        }
    }
}

impl NativeConnection for SqliteConnection {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    fn prepare(&mut self, sql: &str) -> Result<Box<dyn NativeStatement>, NativeError> {
        // Compile now so syntax errors surface at prepare time; the cache
        // keeps the compiled statement for execute.
        self.conn.prepare_cached(sql).map_err(native_error)?;
        Ok(Box::new(SqliteStatement {
            conn: Rc::clone(&self.conn),
            sql: sql.to_string(),
            closed: false,
        }))
    }

    fn query(
        &mut self,
        sql: &str,
        request: ExecRequest,
    ) -> Result<Box<dyn NativeResult>, NativeError> {
        let mut remaining: VecDeque<String> = if request.multi {
            split_statements(sql).into()
        } else {
            VecDeque::from([sql.to_string()])
        };
        debug!(statements = remaining.len(), "sqlite query");
        let first = match remaining.pop_front() {
            Some(statement) => Some(run_statement(&self.conn, &statement, &[])?),
            None => None,
        };
        Ok(Box::new(SqliteResult::new(
            Rc::clone(&self.conn),
            first,
            remaining,
        )))
    }
}

/// Prepared `SQLite` statement. Execution goes through the connection's
/// statement cache, so the handle only needs the SQL text.
pub struct SqliteStatement {
    conn: Rc<Connection>,
    sql: String,
    closed: bool,
}

impl NativeStatement for SqliteStatement {
    fn execute(
        &mut self,
        params: &[BoundParam],
        _request: ExecRequest,
    ) -> Result<Box<dyn NativeResult>, NativeError> {
        if self.closed {
            return Err(NativeError::new(21, "statement is closed"));
        }
        let params = Params::convert(params);
        let set = run_statement(&self.conn, &self.sql, params.as_values())?;
        Ok(Box::new(SqliteResult::new(
            Rc::clone(&self.conn),
            Some(set),
            VecDeque::new(),
        )))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Results of one `SQLite` execution.
///
/// The first statement has already run; each later statement runs when
/// its set is reached, and its failure is reported there.
pub struct SqliteResult {
    conn: Option<Rc<Connection>>,
    first: Option<BufferedSet>,
    remaining: VecDeque<String>,
    current: Option<BufferedSet>,
}

impl SqliteResult {
    fn new(conn: Rc<Connection>, first: Option<BufferedSet>, remaining: VecDeque<String>) -> Self {
        Self {
            conn: Some(conn),
            first,
            remaining,
            current: None,
        }
    }
}

impl NativeResult for SqliteResult {
    fn next_set(&mut self) -> Result<bool, NativeError> {
        if let Some(first) = self.first.take() {
            self.current = Some(first);
            return Ok(true);
        }
        self.current = None;
        let Some(conn) = self.conn.as_ref() else {
            return Ok(false);
        };
        let Some(statement) = self.remaining.pop_front() else {
            return Ok(false);
        };
        match run_statement(conn, &statement, &[]) {
            Ok(set) => {
                self.current = Some(set);
                Ok(true)
            }
            Err(err) => {
                // Nothing after a failed statement runs.
                self.remaining.clear();
                Err(err)
            }
        }
    }

    fn columns(&self) -> Arc<Vec<String>> {
        self.current
            .as_ref()
            .map(|set| Arc::clone(&set.columns))
            .unwrap_or_default()
    }

    fn next_row(&mut self) -> Result<Option<Vec<RowValues>>, NativeError> {
        Ok(self.current.as_mut().and_then(|set| set.rows.pop_front()))
    }

    fn num_rows(&self) -> Option<u64> {
        self.current.as_ref().map(|set| set.total_rows)
    }

    fn affected_rows(&self) -> Option<u64> {
        self.current.as_ref().and_then(|set| set.affected_rows)
    }

    fn insert_id(&self) -> Option<i64> {
        self.current.as_ref().and_then(|set| set.insert_id)
    }

    fn free(&mut self) {
        self.first = None;
        self.current = None;
        self.remaining.clear();
        self.conn = None;
    }
}
