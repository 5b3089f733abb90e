//! The query binder: argument binding, validation phases, execution with a
//! single reconnect-and-retry, and release of native handles.

use std::rc::Rc;

use tracing::{debug, warn};

use crate::args::{Argument, ParamDirection, SharedArgs, TypeTag, parse_type_string};
use crate::classify::ErrorClassifier;
use crate::client::ClientInner;
use crate::error::{DbError, ErrorContext};
use crate::native::{BoundParam, ExecRequest, NativeResult, NativeStatement};
use crate::options::{OptionSchema, QueryOptions, ResolvedOptions};
use crate::results::ResultCursor;
use crate::results::cursor::{AFFECTED_ROWS_COLUMN, INSERT_ID_COLUMN};
use crate::translation::{ParsedSql, StatementBuilder, is_selecting, render_literal};
use crate::types::Engine;
use crate::validation::{Phase, convert_arguments, validate_arguments};

/// How the SQL reaches the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementMode {
    /// Arguments are rendered as literals into the SQL text.
    Simple,
    /// Arguments are bound to a native prepared statement.
    Prepared,
    /// Several statements, rendered like `Simple`.
    Multi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Unbound,
    Prepared,
    Parameterized,
    Executed,
    Closed,
}

/// One SQL template bound to a client.
///
/// ```rust
/// use sql_bindcursor::prelude::*;
///
/// # fn main() -> Result<(), DbError> {
/// let client = SqliteOptionsBuilder::new(":memory:".to_string()).build("docs");
/// let mut setup = client.query("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", &QueryOptions::default())?;
/// setup.execute()?;
///
/// let bucket = SharedArgs::new(sql_bindcursor::args!["first"]);
/// let mut insert = client.query("INSERT INTO t (v) VALUES (?)", &QueryOptions::default())?;
/// insert.prepare("s", &bucket)?;
/// insert.execute()?;
/// bucket.set(0, "second")?;
/// let id = insert.execute()?.insert_id("i")?;
/// assert_eq!(id, Some(RowValues::Int(2)));
/// # Ok(())
/// # }
/// ```
pub struct Query {
    client: Rc<ClientInner>,
    ctx: ErrorContext,
    options: ResolvedOptions,
    builder: StatementBuilder,
    parsed: ParsedSql,
    mode: StatementMode,
    state: QueryState,
    execution_count: u64,
    armed: bool,
    declared: Vec<Option<TypeTag>>,
    shared: Option<SharedArgs>,
    args: Vec<Argument>,
    sql_to_run: String,
    request: ExecRequest,
    statement: Option<Box<dyn NativeStatement>>,
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("ctx", &self.ctx)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("execution_count", &self.execution_count)
            .field("sql", &self.sql_to_run)
            .finish_non_exhaustive()
    }
}

impl Query {
    pub(crate) fn new(
        client: Rc<ClientInner>,
        sql: &str,
        options: &QueryOptions,
        force_multi: bool,
    ) -> Result<Self, DbError> {
        let id = client.allocate_query_id();
        let query_id = match &options.name {
            Some(name) => format!("{id}:{name}"),
            None => id.to_string(),
        };
        let ctx = ErrorContext::new(client.message_prefix(), query_id);
        let engine = client.engine;

        let options = OptionSchema::for_engine(engine)
            .resolve(options)
            .map_err(|e| e.in_context(&ctx))?;
        let builder = client.builder.with_minify(options.sql_minify);
        let parsed = builder.parse(sql);
        let statements = parsed.statements();
        let Some(first) = statements.first() else {
            return Err(DbError::invalid_argument("SQL holds no statement").in_context(&ctx));
        };
        let multi = force_multi || parsed.is_multi();

        if multi && !engine.supports_multi_query() {
            if options.insert_id {
                return Err(DbError::invalid_argument(
                    "insert_id cannot be combined with a multi-statement query",
                )
                .in_context(&ctx));
            }
            let leading = &statements[..statements.len() - 1];
            if leading.iter().any(|stmt| is_selecting(stmt)) {
                return Err(DbError::invalid_argument(
                    "only the last statement of a batch may select",
                )
                .in_context(&ctx));
            }
        }

        let request = ExecRequest {
            multi,
            affected_rows: options.affected_rows,
            insert_id: options.insert_id && !engine.native_insert_id(),
            leading_dml: !is_selecting(first),
        };

        let mut query = Self {
            client,
            ctx,
            options,
            builder,
            mode: if multi {
                StatementMode::Multi
            } else {
                StatementMode::Simple
            },
            state: QueryState::Unbound,
            execution_count: 0,
            armed: true,
            declared: Vec::new(),
            shared: None,
            args: Vec::new(),
            sql_to_run: String::new(),
            request,
            statement: None,
            parsed,
        };
        query.sql_to_run = query.with_identity_select(query.parsed.sql().to_string());
        debug!(
            query_id = query.ctx.query_id.as_deref().unwrap_or(""),
            prefix = %query.ctx.prefix,
            markers = query.parsed.marker_count(),
            multi,
            "query created"
        );
        Ok(query)
    }

    #[must_use]
    pub fn query_id(&self) -> &str {
        self.ctx.query_id.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn context(&self) -> &ErrorContext {
        &self.ctx
    }

    #[must_use]
    pub fn mode(&self) -> StatementMode {
        self.mode
    }

    #[must_use]
    pub fn state(&self) -> QueryState {
        self.state
    }

    #[must_use]
    pub fn options(&self) -> &ResolvedOptions {
        &self.options
    }

    /// Number of `execute()` calls that reached the driver; the first is 1.
    #[must_use]
    pub fn execution_count(&self) -> u64 {
        self.execution_count
    }

    #[must_use]
    pub fn marker_count(&self) -> usize {
        self.parsed.marker_count()
    }

    #[must_use]
    pub fn is_multi(&self) -> bool {
        self.request.multi
    }

    /// SQL as it will be sent: rendered literals for simple and multi
    /// queries, native markers for prepared ones.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql_to_run
    }

    fn engine(&self) -> Engine {
        self.client.engine
    }

    fn classifier(&self) -> ErrorClassifier {
        self.client.classifier
    }

    fn with_identity_select(&self, sql: String) -> String {
        if !self.request.insert_id {
            return sql;
        }
        let base = sql.trim_end().trim_end_matches(char::from(crate::translation::SEPARATOR));
        if self.options.affected_rows {
            format!(
                "{base};\nSELECT @@ROWCOUNT AS {AFFECTED_ROWS_COLUMN}, SCOPE_IDENTITY() AS {INSERT_ID_COLUMN}"
            )
        } else {
            format!("{base};\nSELECT SCOPE_IDENTITY() AS {INSERT_ID_COLUMN}")
        }
    }

    /// Log a failure with the query's correlation fields and hand it back.
    fn logged(&self, err: DbError) -> DbError {
        warn!(
            query_id = self.query_id(),
            prefix = %self.ctx.prefix,
            kind = %err.kind(),
            error = %err,
            "query failed"
        );
        err
    }

    fn ensure_open(&self) -> Result<(), DbError> {
        if self.state == QueryState::Closed {
            return Err(self.logged(DbError::illegal_reuse("query is closed").in_context(&self.ctx)));
        }
        Ok(())
    }

    fn check_count(&self, supplied: usize) -> Result<(), DbError> {
        if supplied != self.parsed.marker_count() {
            return Err(self.logged(
                DbError::count_mismatch(format!(
                    "SQL has {} parameter markers, {supplied} arguments supplied",
                    self.parsed.marker_count()
                ))
                .in_context(&self.ctx),
            ));
        }
        Ok(())
    }

    fn check_qualifiers(&self, args: &[Argument]) -> Result<(), DbError> {
        for (index, arg) in args.iter().enumerate() {
            let Some(qualifier) = arg.qualifier else {
                continue;
            };
            let message = if self.mode != StatementMode::Prepared {
                format!("argument {index}: type qualifiers are only bound by prepare()")
            } else if self.engine() != Engine::Mssql {
                format!(
                    "argument {index}: type qualifiers are not supported by {}",
                    self.engine()
                )
            } else if qualifier.direction != ParamDirection::In {
                format!("argument {index}: output parameters are not supported")
            } else {
                continue;
            };
            return Err(self.logged(DbError::invalid_argument(message).in_context(&self.ctx)));
        }
        Ok(())
    }

    fn validate(&self, args: &[Argument], declared: &[Option<TypeTag>], phase: Phase) -> Result<(), DbError> {
        validate_arguments(args, declared, phase, self.options.policy)
            .into_result(&self.ctx)
            .map_err(|e| self.logged(e))
    }

    /// A conversion refused after validation passed is reported with the
    /// failure-phase checks over every argument. The single-entry error is
    /// kept only when the policy runs no failure checks.
    fn conversion_error(
        &self,
        args: &[Argument],
        declared: &[Option<TypeTag>],
        err: DbError,
    ) -> DbError {
        let report = validate_arguments(args, declared, Phase::Failure, self.options.policy);
        if report.is_ok() {
            self.logged(err.in_context(&self.ctx))
        } else {
            self.logged(report.into_error(&self.ctx, None))
        }
    }

    /// Bind a native prepared statement to shared argument storage.
    ///
    /// Later changes through `args` are bound by the next `execute()`
    /// without preparing again.
    ///
    /// # Errors
    /// `InvalidArgument` for multi-statement queries and unsupported
    /// qualifiers, `IllegalReuse` when the query was already prepared or
    /// parameterized, `ArgumentCountMismatch` and argument validation errors
    /// before the driver is touched, then native prepare failures.
    pub fn prepare(&mut self, types: &str, args: &SharedArgs) -> Result<(), DbError> {
        self.ensure_open()?;
        if self.mode == StatementMode::Multi {
            return Err(self.logged(
                DbError::invalid_argument("multi-statement queries cannot be prepared")
                    .in_context(&self.ctx),
            ));
        }
        if self.state != QueryState::Unbound {
            return Err(self.logged(
                DbError::illegal_reuse("prepare() may only be called once per query")
                    .in_context(&self.ctx),
            ));
        }

        let snapshot = args.snapshot();
        let declared =
            parse_type_string(types, snapshot.len()).map_err(|e| self.logged(e.in_context(&self.ctx)))?;
        self.check_count(snapshot.len())?;
        self.mode = StatementMode::Prepared;
        if let Err(err) = self.check_qualifiers(&snapshot) {
            self.mode = StatementMode::Simple;
            return Err(err);
        }
        if let Err(err) = self.validate(&snapshot, &declared, Phase::Prepare) {
            self.mode = StatementMode::Simple;
            return Err(err);
        }

        let native_sql = self.with_identity_select(self.builder.native_sql(&self.parsed, self.engine()));
        let statement = match self
            .client
            .with_connection(&self.ctx, |conn| conn.prepare(&native_sql))
        {
            Ok(statement) => statement,
            Err(err) => {
                self.mode = StatementMode::Simple;
                return Err(self.logged(err));
            }
        };

        self.statement = Some(statement);
        self.shared = Some(args.clone());
        self.declared = declared;
        self.sql_to_run = native_sql;
        self.state = QueryState::Prepared;
        self.armed = true;
        debug!(query_id = self.query_id(), sql = %self.sql_to_run, "prepared");
        Ok(())
    }

    /// Copy arguments and render them into the SQL text.
    ///
    /// Re-arms the query for one more `execute()`.
    ///
    /// # Errors
    /// `IllegalReuse` on prepared or closed queries, `InvalidArgument` for
    /// qualified arguments, `ArgumentCountMismatch` and argument validation
    /// errors.
    pub fn parameters(&mut self, types: &str, args: Vec<Argument>) -> Result<(), DbError> {
        self.ensure_open()?;
        if self.mode == StatementMode::Prepared {
            return Err(self.logged(
                DbError::illegal_reuse("parameters() cannot rebind a prepared query")
                    .in_context(&self.ctx),
            ));
        }
        let declared =
            parse_type_string(types, args.len()).map_err(|e| self.logged(e.in_context(&self.ctx)))?;
        self.check_count(args.len())?;
        self.check_qualifiers(&args)?;
        self.validate(&args, &declared, Phase::Prepare)?;

        let values = convert_arguments(&args, &declared, Phase::Prepare)
            .map_err(|e| self.conversion_error(&args, &declared, e))?;
        let literals: Vec<String> = values
            .iter()
            .map(|value| render_literal(self.engine(), value))
            .collect();
        let sql = self
            .builder
            .substitute(&self.parsed, &literals)
            .map_err(|e| self.logged(e.in_context(&self.ctx)))?;

        self.sql_to_run = self.with_identity_select(sql);
        self.args = args;
        self.declared = declared;
        self.state = QueryState::Parameterized;
        self.armed = true;
        Ok(())
    }

    fn current_args(&self) -> Vec<Argument> {
        match &self.shared {
            Some(shared) if self.mode == StatementMode::Prepared => shared.snapshot(),
            _ => self.args.clone(),
        }
    }

    fn bind_shared(&self) -> Result<Vec<BoundParam>, DbError> {
        let shared = self.shared.as_ref().ok_or_else(|| {
            self.logged(DbError::illegal_reuse("prepared arguments are detached").in_context(&self.ctx))
        })?;
        let snapshot = shared.snapshot();
        self.check_count(snapshot.len())?;
        self.validate(&snapshot, &self.declared, Phase::Execute)?;
        let values = convert_arguments(&snapshot, &self.declared, Phase::Execute)
            .map_err(|e| self.conversion_error(&snapshot, &self.declared, e))?;
        Ok(values
            .into_iter()
            .zip(snapshot)
            .map(|(value, arg)| BoundParam {
                value,
                qualifier: arg.qualifier,
            })
            .collect())
    }

    fn run_native(&mut self, params: &[BoundParam]) -> Result<Box<dyn NativeResult>, DbError> {
        let request = self.request;
        match self.mode {
            StatementMode::Prepared => {
                let classifier = self.client.classifier;
                let client = &self.client;
                let ctx = &self.ctx;
                let statement = self.statement.as_mut().ok_or_else(|| {
                    DbError::illegal_reuse("prepared statement handle is gone").in_context(ctx)
                })?;
                statement.execute(params, request).map_err(|native| {
                    let err = classifier.to_error(native, ctx);
                    if err.kind() == crate::error::ErrorKind::ConnectionLost {
                        client.drop_connection();
                    }
                    err
                })
            }
            StatementMode::Simple | StatementMode::Multi => {
                let sql = &self.sql_to_run;
                self.client
                    .with_connection(&self.ctx, |conn| conn.query(sql, request))
            }
        }
    }

    fn may_retry(&self, err: &DbError) -> bool {
        ErrorClassifier::is_retryable(err.kind(), self.client.transaction_open())
            && !self.options.is_streaming()
    }

    fn reprepare(&mut self) -> Result<(), DbError> {
        if self.mode != StatementMode::Prepared {
            return Ok(());
        }
        if let Some(mut stale) = self.statement.take() {
            stale.close();
        }
        let sql = &self.sql_to_run;
        let statement = self
            .client
            .with_connection(&self.ctx, |conn| conn.prepare(sql))?;
        self.statement = Some(statement);
        Ok(())
    }

    /// Re-validate every argument after a native failure so the error
    /// carries the complete report.
    fn diagnose(&self, err: DbError) -> DbError {
        let Some(native) = err.native().cloned() else {
            return self.logged(err);
        };
        let args = self.current_args();
        let report = validate_arguments(&args, &self.declared, Phase::Failure, self.options.policy);
        if report.is_ok() {
            self.logged(err)
        } else {
            self.logged(report.into_error(&self.ctx, Some(native)))
        }
    }

    /// Run the query and return a cursor over its results.
    ///
    /// A lost connection is retried once after reconnecting, unless a
    /// transaction is open or the result mode streams.
    ///
    /// # Errors
    /// `IllegalReuse` when closed or not re-armed, `ArgumentCountMismatch`
    /// when markers were never bound, argument validation errors, and
    /// classified native failures.
    pub fn execute(&mut self) -> Result<ResultCursor<'_>, DbError> {
        self.ensure_open()?;
        if self.state == QueryState::Unbound {
            self.check_count(0)?;
        }
        if !self.armed {
            return Err(self.logged(
                DbError::illegal_reuse(
                    "query already executed; call parameters() again or set the reusable option",
                )
                .in_context(&self.ctx),
            ));
        }

        let params = if self.mode == StatementMode::Prepared {
            self.bind_shared()?
        } else {
            if !self.args.is_empty() {
                self.validate(&self.args, &self.declared, Phase::Execute)?;
            }
            Vec::new()
        };

        self.execution_count += 1;
        debug!(
            query_id = self.query_id(),
            prefix = %self.ctx.prefix,
            execution = self.execution_count,
            mode = ?self.mode,
            "executing"
        );

        let native = match self.run_native(&params) {
            Ok(native) => native,
            Err(err) if self.may_retry(&err) => {
                warn!(
                    query_id = self.query_id(),
                    prefix = %self.ctx.prefix,
                    error = %err,
                    "connection lost, reconnecting for one retry"
                );
                let retried = self.reprepare().and_then(|()| self.run_native(&params));
                match retried {
                    Ok(native) => native,
                    Err(err) => return Err(self.diagnose(err)),
                }
            }
            Err(err) => return Err(self.diagnose(err)),
        };

        self.state = QueryState::Executed;
        if self.mode != StatementMode::Prepared && !self.options.reusable {
            self.armed = false;
        }
        Ok(ResultCursor::new(
            native,
            self.ctx.clone(),
            self.engine(),
            self.classifier(),
            self.options.clone(),
        ))
    }

    /// Release the native statement and detach shared arguments without
    /// clearing them. A second call does nothing.
    pub fn close(&mut self) {
        if self.state == QueryState::Closed {
            return;
        }
        if let Some(mut statement) = self.statement.take() {
            statement.close();
        }
        self.shared = None;
        self.args.clear();
        self.armed = false;
        self.state = QueryState::Closed;
        debug!(query_id = self.query_id(), "closed");
    }
}

impl Drop for Query {
    fn drop(&mut self) {
        self.close();
    }
}
