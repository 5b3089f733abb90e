//! Synchronous parameter binding and multi-result cursor traversal over
//! structurally different SQL drivers.
//!
//! A [`DbClient`] builds [`Query`] values from SQL templates with positional
//! markers. A query is bound either by rendering escaped literals into the
//! SQL (`parameters`) or through a native prepared statement aliasing
//! caller-owned [`SharedArgs`] (`prepare`). `execute` returns a
//! [`ResultCursor`] over one or more result sets.

pub mod args;
pub mod classify;
pub mod client;
pub mod error;
pub mod native;
pub mod options;
pub mod prelude;
pub mod query;
pub mod results;
pub mod translation;
pub mod types;
pub mod validation;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "mssql")]
pub mod mssql;

pub use args::{ArgValue, Argument, SharedArgs};
pub use client::{DbClient, DbClientBuilder};
pub use error::{DbError, ErrorKind};
pub use query::Query;
pub use results::ResultCursor;
pub use types::{Engine, RowValues};
