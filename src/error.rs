use std::fmt;

use thiserror::Error;

use crate::validation::ValidationReport;

/// Abstract failure kinds shared by every engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ArgumentCountMismatch,
    ArgumentTypeInvalid,
    ArgumentNotStringConvertible,
    IllegalReuse,
    ConnectionLost,
    QueryRejected,
    ResultAccessInvalid,
    InvalidArgument,
    Unclassified,
}

impl ErrorKind {
    /// The abstraction's own numeric code for this kind.
    ///
    /// Native codes are offset by [`ErrorClassifier`](crate::classify::ErrorClassifier)
    /// so they never collide with these.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            ErrorKind::ArgumentCountMismatch => 1,
            ErrorKind::ArgumentTypeInvalid => 2,
            ErrorKind::ArgumentNotStringConvertible => 3,
            ErrorKind::IllegalReuse => 4,
            ErrorKind::ConnectionLost => 5,
            ErrorKind::QueryRejected => 6,
            ErrorKind::ResultAccessInvalid => 7,
            ErrorKind::InvalidArgument => 8,
            ErrorKind::Unclassified => 9,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::ArgumentCountMismatch => "argument count mismatch",
            ErrorKind::ArgumentTypeInvalid => "argument type invalid",
            ErrorKind::ArgumentNotStringConvertible => "argument not string convertible",
            ErrorKind::IllegalReuse => "illegal reuse",
            ErrorKind::ConnectionLost => "connection lost",
            ErrorKind::QueryRejected => "query rejected",
            ErrorKind::ResultAccessInvalid => "result access invalid",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::Unclassified => "unclassified",
        };
        f.write_str(label)
    }
}

/// Error as reported by the native driver, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("({code}{}) {message}", sqlstate_suffix(.sqlstate))]
pub struct NativeError {
    pub code: i64,
    pub sqlstate: Option<String>,
    pub message: String,
}

fn sqlstate_suffix(sqlstate: &Option<String>) -> String {
    match sqlstate {
        Some(state) => format!("/{state}"),
        None => String::new(),
    }
}

impl NativeError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            sqlstate: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_sqlstate(mut self, sqlstate: impl Into<String>) -> Self {
        self.sqlstate = Some(sqlstate.into());
        self
    }
}

/// Identifies the query and client an error belongs to, so log lines and
/// raised errors can be correlated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub query_id: Option<String>,
    pub prefix: String,
}

impl ErrorContext {
    pub fn new(prefix: impl Into<String>, query_id: impl Into<String>) -> Self {
        Self {
            query_id: Some(query_id.into()),
            prefix: prefix.into(),
        }
    }

    pub fn client(prefix: impl Into<String>) -> Self {
        Self {
            query_id: None,
            prefix: prefix.into(),
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.query_id, self.prefix.is_empty()) {
            (Some(id), _) => write!(f, "{} query[{}] - ", self.prefix, id),
            (None, false) => write!(f, "{} - ", self.prefix),
            (None, true) => Ok(()),
        }
    }
}

fn native_suffix(native: &Option<NativeError>) -> String {
    match native {
        Some(err) => format!("; native error {err}"),
        None => String::new(),
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{ctx}Argument count mismatch: {message}")]
    ArgumentCountMismatch { ctx: ErrorContext, message: String },

    #[error("{ctx}Argument type invalid: {report}{}", native_suffix(.native))]
    ArgumentTypeInvalid {
        ctx: ErrorContext,
        report: ValidationReport,
        native: Option<NativeError>,
    },

    #[error("{ctx}Argument not string convertible: {report}{}", native_suffix(.native))]
    ArgumentNotStringConvertible {
        ctx: ErrorContext,
        report: ValidationReport,
        native: Option<NativeError>,
    },

    #[error("{ctx}Illegal reuse: {message}")]
    IllegalReuse { ctx: ErrorContext, message: String },

    #[error("{ctx}Connection lost: {native}")]
    ConnectionLost {
        ctx: ErrorContext,
        code: i64,
        #[source]
        native: NativeError,
    },

    #[error("{ctx}Query rejected: {native}")]
    QueryRejected {
        ctx: ErrorContext,
        code: i64,
        #[source]
        native: NativeError,
    },

    #[error("{ctx}Result access invalid: {message}{}", native_suffix(.native))]
    ResultAccessInvalid {
        ctx: ErrorContext,
        message: String,
        native: Option<NativeError>,
    },

    #[error("{ctx}Invalid argument: {message}")]
    InvalidArgument { ctx: ErrorContext, message: String },

    #[error("{ctx}Unclassified database error: {native}")]
    Unclassified {
        ctx: ErrorContext,
        code: i64,
        #[source]
        native: NativeError,
    },
}

impl DbError {
    pub(crate) fn count_mismatch(message: impl Into<String>) -> Self {
        DbError::ArgumentCountMismatch {
            ctx: ErrorContext::default(),
            message: message.into(),
        }
    }

    pub(crate) fn illegal_reuse(message: impl Into<String>) -> Self {
        DbError::IllegalReuse {
            ctx: ErrorContext::default(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        DbError::InvalidArgument {
            ctx: ErrorContext::default(),
            message: message.into(),
        }
    }

    pub(crate) fn result_access(message: impl Into<String>) -> Self {
        DbError::ResultAccessInvalid {
            ctx: ErrorContext::default(),
            message: message.into(),
            native: None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::ArgumentCountMismatch { .. } => ErrorKind::ArgumentCountMismatch,
            DbError::ArgumentTypeInvalid { .. } => ErrorKind::ArgumentTypeInvalid,
            DbError::ArgumentNotStringConvertible { .. } => ErrorKind::ArgumentNotStringConvertible,
            DbError::IllegalReuse { .. } => ErrorKind::IllegalReuse,
            DbError::ConnectionLost { .. } => ErrorKind::ConnectionLost,
            DbError::QueryRejected { .. } => ErrorKind::QueryRejected,
            DbError::ResultAccessInvalid { .. } => ErrorKind::ResultAccessInvalid,
            DbError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            DbError::Unclassified { .. } => ErrorKind::Unclassified,
        }
    }

    #[must_use]
    pub fn context(&self) -> &ErrorContext {
        match self {
            DbError::ArgumentCountMismatch { ctx, .. }
            | DbError::ArgumentTypeInvalid { ctx, .. }
            | DbError::ArgumentNotStringConvertible { ctx, .. }
            | DbError::IllegalReuse { ctx, .. }
            | DbError::ConnectionLost { ctx, .. }
            | DbError::QueryRejected { ctx, .. }
            | DbError::ResultAccessInvalid { ctx, .. }
            | DbError::InvalidArgument { ctx, .. }
            | DbError::Unclassified { ctx, .. } => ctx,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            DbError::ArgumentCountMismatch { ctx, .. }
            | DbError::ArgumentTypeInvalid { ctx, .. }
            | DbError::ArgumentNotStringConvertible { ctx, .. }
            | DbError::IllegalReuse { ctx, .. }
            | DbError::ConnectionLost { ctx, .. }
            | DbError::QueryRejected { ctx, .. }
            | DbError::ResultAccessInvalid { ctx, .. }
            | DbError::InvalidArgument { ctx, .. }
            | DbError::Unclassified { ctx, .. } => ctx,
        }
    }

    /// Attach the query/client context, replacing whatever was there.
    #[must_use]
    pub fn in_context(mut self, ctx: &ErrorContext) -> Self {
        *self.context_mut() = ctx.clone();
        self
    }

    /// The native driver error behind this failure, if any.
    #[must_use]
    pub fn native(&self) -> Option<&NativeError> {
        match self {
            DbError::ConnectionLost { native, .. }
            | DbError::QueryRejected { native, .. }
            | DbError::Unclassified { native, .. } => Some(native),
            DbError::ArgumentTypeInvalid { native, .. }
            | DbError::ArgumentNotStringConvertible { native, .. }
            | DbError::ResultAccessInvalid { native, .. } => native.as_ref(),
            _ => None,
        }
    }

    /// Validation report attached to argument failures.
    #[must_use]
    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            DbError::ArgumentTypeInvalid { report, .. }
            | DbError::ArgumentNotStringConvertible { report, .. } => Some(report),
            _ => None,
        }
    }

    /// Numeric code: the abstraction's own code, or the offset native code.
    #[must_use]
    pub fn code(&self) -> i64 {
        match self {
            DbError::ConnectionLost { code, .. }
            | DbError::QueryRejected { code, .. }
            | DbError::Unclassified { code, .. } => *code,
            other => other.kind().code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_prefixes_message() {
        let ctx = ErrorContext::new("sqlite[main:app]", "3");
        let err = DbError::invalid_argument("bad option").in_context(&ctx);
        assert_eq!(
            err.to_string(),
            "sqlite[main:app] query[3] - Invalid argument: bad option"
        );
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.code(), 8);
    }

    #[test]
    fn native_errors_keep_code_and_message() {
        let native = NativeError::new(547, "FK conflict").with_sqlstate("23000");
        let err = DbError::QueryRejected {
            ctx: ErrorContext::client("mssql[crm:sales]"),
            code: 100_547,
            native,
        };
        assert_eq!(err.code(), 100_547);
        assert_eq!(err.native().map(|n| n.code), Some(547));
        assert!(err.to_string().contains("(547/23000) FK conflict"));
    }
}
