// MSSQL module - the single-result engine, over tiberius
//
// This module is split into several sub-modules for better organization:
// - config: Connection options, builder, and the connection provider
// - client: Session setup on a current-thread runtime
// - params: Qualifier-driven conversion and binding of parameters
// - query: Result extraction, set collection, and error mapping
// - connection: The native connection and statement handles

pub mod client;
pub mod config;
pub mod connection;
pub mod params;
pub mod query;

// Re-export the public API
pub use client::{MssqlClient, MssqlSession, open_session};
pub use config::{MssqlConnector, MssqlOptions, MssqlOptionsBuilder};
pub use connection::{MssqlConnection, MssqlStatement};
pub use params::{MssqlValue, convert_params};
pub use query::{extract_value, native_error};
