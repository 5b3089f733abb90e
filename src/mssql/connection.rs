use std::cell::RefCell;
use std::rc::Rc;

use tiberius::Query;
use tracing::debug;

use super::client::MssqlSession;
use super::params::{bind_values, convert_params};
use super::query::{affected_set, collect_sets, native_error, uses_execute_path};
use crate::error::NativeError;
use crate::native::{
    BoundParam, BufferedResult, ExecRequest, NativeConnection, NativeResult, NativeStatement,
};
use crate::types::Engine;

/// Native SQL Server connection over one session.
pub struct MssqlConnection {
    session: Rc<RefCell<MssqlSession>>,
}

impl MssqlConnection {
    #[must_use]
    pub fn new(session: MssqlSession) -> Self {
        Self {
            session: Rc::new(RefCell::new(session)),
        }
    }
}

impl NativeConnection for MssqlConnection {
    fn engine(&self) -> Engine {
        Engine::Mssql
    }

    fn prepare(&mut self, sql: &str) -> Result<Box<dyn NativeStatement>, NativeError> {
        Ok(Box::new(MssqlStatement {
            session: Rc::clone(&self.session),
            sql: sql.to_string(),
            closed: false,
        }))
    }

    fn query(
        &mut self,
        sql: &str,
        request: ExecRequest,
    ) -> Result<Box<dyn NativeResult>, NativeError> {
        let mut guard = self.session.borrow_mut();
        let MssqlSession { runtime, client } = &mut *guard;
        debug!(execute_path = uses_execute_path(request), "mssql query");
        let sets = runtime.block_on(async {
            if uses_execute_path(request) {
                let result = client.execute(sql, &[]).await.map_err(native_error)?;
                Ok(vec![affected_set(result.rows_affected())])
            } else {
                let stream = client.simple_query(sql).await.map_err(native_error)?;
                collect_sets(stream, request).await
            }
        })?;
        Ok(Box::new(BufferedResult::new(sets)))
    }
}

/// SQL Server statement handle.
///
/// Tiberius has no client-side prepared statement, so the handle keeps the
/// SQL text and binds parameters again on every execution.
pub struct MssqlStatement {
    session: Rc<RefCell<MssqlSession>>,
    sql: String,
    closed: bool,
}

impl NativeStatement for MssqlStatement {
    fn execute(
        &mut self,
        params: &[BoundParam],
        request: ExecRequest,
    ) -> Result<Box<dyn NativeResult>, NativeError> {
        if self.closed {
            return Err(NativeError::new(16916, "statement is closed"));
        }
        let values = convert_params(params)?;
        let mut query = Query::new(self.sql.as_str());
        bind_values(&mut query, values);

        let mut guard = self.session.borrow_mut();
        let MssqlSession { runtime, client } = &mut *guard;
        let sets = runtime.block_on(async {
            if uses_execute_path(request) {
                let result = query.execute(client).await.map_err(native_error)?;
                Ok(vec![affected_set(result.rows_affected())])
            } else {
                let stream = query.query(client).await.map_err(native_error)?;
                collect_sets(stream, request).await
            }
        })?;
        Ok(Box::new(BufferedResult::new(sets)))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
