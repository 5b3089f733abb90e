use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::classify::ErrorClassifier;
use crate::error::{DbError, ErrorContext, NativeError};
use crate::native::{ConnectionProvider, ExecRequest, NativeConnection};
use crate::options::QueryOptions;
use crate::query::Query;
use crate::translation::StatementBuilder;
use crate::types::Engine;

/// State shared by a client and every query it created.
pub(crate) struct ClientInner {
    pub(crate) name: String,
    pub(crate) database: String,
    pub(crate) engine: Engine,
    pub(crate) classifier: ErrorClassifier,
    pub(crate) builder: StatementBuilder,
    provider: RefCell<Box<dyn ConnectionProvider>>,
    connection: RefCell<Option<Box<dyn NativeConnection>>>,
    transaction_open: Cell<bool>,
    next_query_id: Cell<u64>,
}

impl ClientInner {
    pub(crate) fn message_prefix(&self) -> String {
        format!("{}[{}:{}]", self.engine, self.name, self.database)
    }

    pub(crate) fn allocate_query_id(&self) -> u64 {
        let id = self.next_query_id.get() + 1;
        self.next_query_id.set(id);
        id
    }

    pub(crate) fn transaction_open(&self) -> bool {
        self.transaction_open.get()
    }

    pub(crate) fn drop_connection(&self) {
        self.connection.borrow_mut().take();
    }

    fn connect(&self, ctx: &ErrorContext) -> Result<Box<dyn NativeConnection>, DbError> {
        debug!(prefix = %ctx.prefix, "connecting");
        match self.provider.borrow_mut().connect() {
            Ok(Some(conn)) => Ok(conn),
            Ok(None) => Err(DbError::ConnectionLost {
                ctx: ctx.clone(),
                code: crate::error::ErrorKind::ConnectionLost.code(),
                native: NativeError::new(0, "no connection"),
            }),
            Err(native) => Err(self.classifier.to_error(native, ctx)),
        }
    }

    /// Run `op` on the cached connection, connecting first if needed.
    ///
    /// A `ConnectionLost` failure drops the cached connection so the next
    /// call reconnects.
    pub(crate) fn with_connection<T>(
        &self,
        ctx: &ErrorContext,
        op: impl FnOnce(&mut dyn NativeConnection) -> Result<T, NativeError>,
    ) -> Result<T, DbError> {
        let mut slot = self.connection.borrow_mut();
        if slot.is_none() {
            *slot = Some(self.connect(ctx)?);
        }
        let Some(conn) = slot.as_mut() else {
            return Err(DbError::ConnectionLost {
                ctx: ctx.clone(),
                code: crate::error::ErrorKind::ConnectionLost.code(),
                native: NativeError::new(0, "no connection"),
            });
        };
        match op(conn.as_mut()) {
            Ok(value) => Ok(value),
            Err(native) => {
                let err = self.classifier.to_error(native, ctx);
                if err.kind() == crate::error::ErrorKind::ConnectionLost {
                    *slot = None;
                }
                Err(err)
            }
        }
    }

    fn run_control(&self, sql: &str) -> Result<(), DbError> {
        let ctx = ErrorContext::client(self.message_prefix());
        self.with_connection(&ctx, |conn| {
            let mut result = conn.query(sql, ExecRequest::default())?;
            while result.next_set()? {}
            result.free();
            Ok(())
        })
    }
}

/// A named client over one engine.
///
/// Queries created from a client share its connection, its query-id
/// counter and its transaction flag.
///
/// ```rust
/// use sql_bindcursor::prelude::*;
///
/// # fn main() -> Result<(), DbError> {
/// let client = SqliteOptionsBuilder::new(":memory:".to_string()).build("main");
/// let mut query = client.query("SELECT ? + 1", &QueryOptions::default())?;
/// query.parameters("i", sql_bindcursor::args![41_i64])?;
/// let mut cursor = query.execute()?;
/// assert_eq!(cursor.fetch_field(0_usize)?, Some(RowValues::Int(42)));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DbClient {
    inner: Rc<ClientInner>,
}

impl std::fmt::Debug for DbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbClient")
            .field("prefix", &self.inner.message_prefix())
            .field("transaction_open", &self.inner.transaction_open())
            .finish_non_exhaustive()
    }
}

/// Fluent builder for [`DbClient`].
pub struct DbClientBuilder {
    name: String,
    database: String,
    engine: Engine,
    classifier: ErrorClassifier,
    builder: StatementBuilder,
    provider: Box<dyn ConnectionProvider>,
}

impl DbClientBuilder {
    pub fn new(
        name: impl Into<String>,
        database: impl Into<String>,
        engine: Engine,
        provider: impl ConnectionProvider + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            database: database.into(),
            engine,
            classifier: ErrorClassifier::for_engine(engine),
            builder: StatementBuilder::new(),
            provider: Box::new(provider),
        }
    }

    /// Offset added to native error codes.
    #[must_use]
    pub fn code_offset(mut self, offset: i64) -> Self {
        self.classifier = self.classifier.with_offset(offset);
        self
    }

    /// Parameter marker character, `?` by default.
    ///
    /// # Errors
    /// `InvalidArgument` for characters that are SQL syntax.
    pub fn marker(mut self, marker: char) -> Result<Self, DbError> {
        self.builder = self.builder.with_marker(marker)?;
        Ok(self)
    }

    #[must_use]
    pub fn finish(self) -> DbClient {
        DbClient {
            inner: Rc::new(ClientInner {
                name: self.name,
                database: self.database,
                engine: self.engine,
                classifier: self.classifier,
                builder: self.builder,
                provider: RefCell::new(self.provider),
                connection: RefCell::new(None),
                transaction_open: Cell::new(false),
                next_query_id: Cell::new(0),
            }),
        }
    }
}

impl DbClient {
    pub fn new(
        name: impl Into<String>,
        database: impl Into<String>,
        engine: Engine,
        provider: impl ConnectionProvider + 'static,
    ) -> Self {
        DbClientBuilder::new(name, database, engine, provider).finish()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn database(&self) -> &str {
        &self.inner.database
    }

    #[must_use]
    pub fn engine(&self) -> Engine {
        self.inner.engine
    }

    /// `engine[name:database]`, prefixed to every error and log line.
    #[must_use]
    pub fn message_prefix(&self) -> String {
        self.inner.message_prefix()
    }

    #[must_use]
    pub fn classifier(&self) -> ErrorClassifier {
        self.inner.classifier
    }

    /// Build a query. SQL with a statement separator outside literals is
    /// routed to multi mode.
    ///
    /// # Errors
    /// `InvalidArgument` for options the engine does not recognize, for
    /// batches the engine cannot run, or for `insert_id` on a
    /// multi-statement query of the single-statement engine.
    pub fn query(&self, sql: &str, options: &QueryOptions) -> Result<Query, DbError> {
        Query::new(Rc::clone(&self.inner), sql, options, false)
    }

    /// Build a query in multi mode even when the SQL holds one statement.
    ///
    /// # Errors
    /// See [`DbClient::query`].
    pub fn multi_query(&self, sql: &str, options: &QueryOptions) -> Result<Query, DbError> {
        Query::new(Rc::clone(&self.inner), sql, options, true)
    }

    #[must_use]
    pub fn is_transaction_active(&self) -> bool {
        self.inner.transaction_open()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connection.borrow().is_some()
    }

    fn client_error(&self, err: DbError) -> DbError {
        let ctx = ErrorContext::client(self.message_prefix());
        err.in_context(&ctx)
    }

    /// # Errors
    /// `InvalidArgument` when a transaction is already open, or the native
    /// failure of the begin statement.
    pub fn transaction_start(&self) -> Result<(), DbError> {
        if self.inner.transaction_open() {
            return Err(self.client_error(DbError::invalid_argument("transaction already active")));
        }
        self.inner.run_control(self.engine().begin_transaction_sql())?;
        self.inner.transaction_open.set(true);
        debug!(prefix = %self.message_prefix(), "transaction started");
        Ok(())
    }

    /// # Errors
    /// `InvalidArgument` without an open transaction, or the native failure
    /// of the commit statement.
    pub fn transaction_commit(&self) -> Result<(), DbError> {
        if !self.inner.transaction_open() {
            return Err(self.client_error(DbError::invalid_argument("no active transaction")));
        }
        let outcome = self.inner.run_control(self.engine().commit_sql());
        if outcome.is_ok() || !self.is_connected() {
            self.inner.transaction_open.set(false);
        }
        outcome
    }

    /// Roll back. With the connection already gone the transaction is gone
    /// too, and only the flag is cleared.
    ///
    /// # Errors
    /// `InvalidArgument` without an open transaction, or the native failure
    /// of the rollback statement.
    pub fn transaction_rollback(&self) -> Result<(), DbError> {
        if !self.inner.transaction_open() {
            return Err(self.client_error(DbError::invalid_argument("no active transaction")));
        }
        if !self.is_connected() {
            warn!(prefix = %self.message_prefix(), "rollback without connection; transaction already lost");
            self.inner.transaction_open.set(false);
            return Ok(());
        }
        let outcome = self.inner.run_control(self.engine().rollback_sql());
        self.inner.transaction_open.set(false);
        outcome
    }

    /// Drop the cached connection and connect again.
    ///
    /// # Errors
    /// `InvalidArgument` while a transaction is open, or the connection
    /// failure.
    pub fn reconnect(&self) -> Result<(), DbError> {
        if self.inner.transaction_open() {
            return Err(self.client_error(DbError::invalid_argument(
                "cannot reconnect inside an open transaction",
            )));
        }
        warn!(prefix = %self.message_prefix(), "reconnecting");
        self.inner.drop_connection();
        let ctx = ErrorContext::client(self.message_prefix());
        let conn = self.inner.connect(&ctx)?;
        *self.inner.connection.borrow_mut() = Some(conn);
        Ok(())
    }

    /// Drop the cached connection; an open transaction is abandoned.
    pub fn disconnect(&self) {
        if self.inner.transaction_open() {
            warn!(prefix = %self.message_prefix(), "disconnecting with an open transaction");
        }
        self.inner.drop_connection();
        self.inner.transaction_open.set(false);
    }
}
