// SQLite module - the multi-result engine, over rusqlite
//
// This module is split into several sub-modules for better organization:
// - config: Connection options, builder, and the connection provider
// - params: Conversion of bound values into SQLite values
// - query: Statement execution, result extraction, and error mapping
// - connection: The native connection, statement, and result handles

pub mod config;
pub mod connection;
pub mod params;
pub mod query;

// Re-export the public API
pub use config::{SqliteConnector, SqliteOptions, SqliteOptionsBuilder, open_connection};
pub use connection::{SqliteConnection, SqliteResult, SqliteStatement};
pub use params::Params;
pub use query::{native_error, run_statement};
