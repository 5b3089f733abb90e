use std::ops::RangeInclusive;

use crate::error::{DbError, ErrorContext, ErrorKind, NativeError};
use crate::types::Engine;

/// Known single native codes, checked first.
struct CodeTable {
    singles: &'static [(i64, ErrorKind)],
    ranges: &'static [(RangeInclusive<i64>, ErrorKind)],
}

// SQLite: singles are extended result codes, ranges apply to the primary
// result code (low byte).
static SQLITE_TABLE: CodeTable = CodeTable {
    singles: &[
        (266, ErrorKind::ConnectionLost), // SQLITE_IOERR_READ
        (778, ErrorKind::ConnectionLost), // SQLITE_IOERR_WRITE
        (787, ErrorKind::QueryRejected), // SQLITE_CONSTRAINT_FOREIGNKEY
        (1555, ErrorKind::QueryRejected), // SQLITE_CONSTRAINT_PRIMARYKEY
        (2067, ErrorKind::QueryRejected), // SQLITE_CONSTRAINT_UNIQUE
        (3091, ErrorKind::ArgumentTypeInvalid), // SQLITE_CONSTRAINT_DATATYPE
    ],
    ranges: &[
        (1..=1, ErrorKind::QueryRejected), // SQLITE_ERROR
        (3..=9, ErrorKind::QueryRejected), // PERM .. INTERRUPT
        (10..=10, ErrorKind::ConnectionLost), // IOERR
        (11..=11, ErrorKind::ConnectionLost), // CORRUPT
        (14..=14, ErrorKind::ConnectionLost), // CANTOPEN
        (18..=18, ErrorKind::ArgumentTypeInvalid), // TOOBIG
        (19..=19, ErrorKind::QueryRejected), // CONSTRAINT
        (20..=20, ErrorKind::ArgumentTypeInvalid), // MISMATCH
        (21..=21, ErrorKind::ResultAccessInvalid), // MISUSE
        (23..=23, ErrorKind::QueryRejected), // AUTH
        (25..=25, ErrorKind::ArgumentTypeInvalid), // RANGE
        (26..=26, ErrorKind::ConnectionLost), // NOTADB
    ],
};

static MSSQL_TABLE: CodeTable = CodeTable {
    singles: &[
        (-2, ErrorKind::ConnectionLost), // client timeout
        (53, ErrorKind::ConnectionLost),
        (64, ErrorKind::ConnectionLost),
        (233, ErrorKind::ConnectionLost),
        (4060, ErrorKind::ConnectionLost),
        (10053, ErrorKind::ConnectionLost),
        (10054, ErrorKind::ConnectionLost),
        (10060, ErrorKind::ConnectionLost),
        (10061, ErrorKind::ConnectionLost),
        (40613, ErrorKind::ConnectionLost),
        (245, ErrorKind::ArgumentTypeInvalid), // conversion failed
        (8114, ErrorKind::ArgumentTypeInvalid),
        (16916, ErrorKind::ResultAccessInvalid), // cursor does not exist
        (16917, ErrorKind::ResultAccessInvalid),
    ],
    ranges: &[
        (100..=999, ErrorKind::QueryRejected), // syntax, object, constraint, permission
        (2601..=2627, ErrorKind::QueryRejected), // duplicate key
        (8100..=8199, ErrorKind::ArgumentTypeInvalid),
        (50000..=50000, ErrorKind::QueryRejected), // RAISERROR
    ],
};

/// Maps native error codes to abstract kinds for one engine.
///
/// ```rust
/// use sql_bindcursor::prelude::*;
///
/// let classifier = ErrorClassifier::for_engine(Engine::Mssql);
/// assert_eq!(classifier.classify(&NativeError::new(547, "FK")), ErrorKind::QueryRejected);
/// assert_eq!(classifier.classify(&NativeError::new(10054, "reset")), ErrorKind::ConnectionLost);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorClassifier {
    engine: Engine,
    code_offset: i64,
}

impl ErrorClassifier {
    /// Default offsets keep native codes clear of the abstraction's own.
    #[must_use]
    pub fn for_engine(engine: Engine) -> Self {
        let code_offset = match engine {
            Engine::Sqlite => 10_000,
            Engine::Mssql => 100_000,
        };
        Self {
            engine,
            code_offset,
        }
    }

    #[must_use]
    pub fn with_offset(mut self, code_offset: i64) -> Self {
        self.code_offset = code_offset;
        self
    }

    #[must_use]
    pub fn code_offset(&self) -> i64 {
        self.code_offset
    }

    fn table(&self) -> &'static CodeTable {
        match self.engine {
            Engine::Sqlite => &SQLITE_TABLE,
            Engine::Mssql => &MSSQL_TABLE,
        }
    }

    /// Single codes first, then ranges, then `Unclassified`.
    #[must_use]
    pub fn classify(&self, native: &NativeError) -> ErrorKind {
        let table = self.table();
        if let Some((_, kind)) = table.singles.iter().find(|(code, _)| *code == native.code) {
            return *kind;
        }
        let range_code = match self.engine {
            Engine::Sqlite => native.code & 0xff,
            Engine::Mssql => native.code,
        };
        table
            .ranges
            .iter()
            .find(|(range, _)| range.contains(&range_code))
            .map_or(ErrorKind::Unclassified, |(_, kind)| *kind)
    }

    /// Whether a failure may be retried once after reconnecting.
    #[must_use]
    pub fn is_retryable(kind: ErrorKind, transaction_open: bool) -> bool {
        kind == ErrorKind::ConnectionLost && !transaction_open
    }

    /// Build the error raised for a native failure.
    #[must_use]
    pub fn to_error(&self, native: NativeError, ctx: &ErrorContext) -> DbError {
        let code = self.code_offset + native.code;
        let ctx = ctx.clone();
        match self.classify(&native) {
            ErrorKind::ConnectionLost => DbError::ConnectionLost { ctx, code, native },
            ErrorKind::QueryRejected => DbError::QueryRejected { ctx, code, native },
            ErrorKind::ArgumentTypeInvalid => DbError::ArgumentTypeInvalid {
                ctx,
                report: crate::validation::ValidationReport::empty(
                    crate::validation::Phase::Failure,
                ),
                native: Some(native),
            },
            ErrorKind::ResultAccessInvalid => DbError::ResultAccessInvalid {
                ctx,
                message: "native cursor error".to_string(),
                native: Some(native),
            },
            _ => DbError::Unclassified { ctx, code, native },
        }
    }
}
