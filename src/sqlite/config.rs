use std::time::Duration;

use rusqlite::Connection;
use tracing::debug;

use super::connection::SqliteConnection;
use super::query::native_error;
use crate::client::{DbClient, DbClientBuilder};
use crate::error::NativeError;
use crate::native::{ConnectionProvider, NativeConnection};
use crate::types::Engine;

/// Options for opening `SQLite` connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteOptions {
    pub db_path: String,
    pub foreign_keys: bool,
    pub busy_timeout: Option<Duration>,
    pub journal_wal: bool,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            db_path,
            foreign_keys: true,
            busy_timeout: Some(Duration::from_secs(5)),
            journal_wal: true,
        }
    }

    #[must_use]
    pub fn with_foreign_keys(mut self, foreign_keys: bool) -> Self {
        self.foreign_keys = foreign_keys;
        self
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, busy_timeout: Option<Duration>) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    fn is_memory(&self) -> bool {
        self.db_path == ":memory:" || self.db_path.contains("mode=memory")
    }
}

/// Fluent builder for `SQLite` options.
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn foreign_keys(mut self, foreign_keys: bool) -> Self {
        self.opts.foreign_keys = foreign_keys;
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, busy_timeout: Option<Duration>) -> Self {
        self.opts.busy_timeout = busy_timeout;
        self
    }

    /// Switch file databases to WAL journaling on connect.
    #[must_use]
    pub fn journal_wal(mut self, journal_wal: bool) -> Self {
        self.opts.journal_wal = journal_wal;
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }

    /// Client builder for further settings such as the error code offset.
    #[must_use]
    pub fn client_builder(self, name: impl Into<String>) -> DbClientBuilder {
        let opts = self.finish();
        DbClientBuilder::new(
            name,
            opts.db_path.clone(),
            Engine::Sqlite,
            SqliteConnector::new(opts),
        )
    }

    /// Build a client; the connection opens on first use.
    #[must_use]
    pub fn build(self, name: impl Into<String>) -> DbClient {
        self.client_builder(name).finish()
    }
}

/// Open and configure one `SQLite` connection.
///
/// # Errors
///
/// Returns the native error if the file cannot be opened or a pragma fails.
pub fn open_connection(opts: &SqliteOptions) -> Result<Connection, NativeError> {
    let conn = Connection::open(&opts.db_path).map_err(native_error)?;
    if let Some(timeout) = opts.busy_timeout {
        conn.busy_timeout(timeout).map_err(native_error)?;
    }
    if opts.foreign_keys {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(native_error)?;
    }
    if opts.journal_wal && !opts.is_memory() {
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
            .map_err(native_error)?;
    }
    debug!(db_path = %opts.db_path, "sqlite connection opened");
    Ok(conn)
}

/// Opens a fresh connection each time the client asks for one.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    opts: SqliteOptions,
}

impl SqliteConnector {
    #[must_use]
    pub fn new(opts: SqliteOptions) -> Self {
        Self { opts }
    }
}

impl ConnectionProvider for SqliteConnector {
    fn connect(&mut self) -> Result<Option<Box<dyn NativeConnection>>, NativeError> {
        let conn = open_connection(&self.opts)?;
        Ok(Some(Box::new(SqliteConnection::new(conn))))
    }
}
