//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::args::{
    ArgValue, Argument, ParamDirection, ParamQualifier, SharedArgs, SqlStringable, SqlType,
    TypeTag,
};
pub use crate::classify::ErrorClassifier;
pub use crate::client::{DbClient, DbClientBuilder};
pub use crate::error::{DbError, ErrorContext, ErrorKind, NativeError};
pub use crate::native::{
    BoundParam, ConnectionProvider, ExecRequest, NativeConnection, NativeResult, NativeStatement,
};
pub use crate::options::{CursorMode, OptionSchema, QueryOptions, ResultMode};
pub use crate::query::{Query, QueryState, StatementMode};
pub use crate::results::{
    ColumnRef, CustomDbRow, FetchShape, FetchedRow, ResultCursor, RowCollection,
};
pub use crate::types::{Engine, RowValues};
pub use crate::validation::{Phase, ValidationPolicy, ValidationReport};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteConnector, SqliteOptions, SqliteOptionsBuilder};

#[cfg(feature = "mssql")]
pub use crate::mssql::{MssqlConnector, MssqlOptions, MssqlOptionsBuilder};
