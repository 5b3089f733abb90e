use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde_json::Value as JsonValue;

/// Values read back from a result row, and the converted form of bound
/// arguments handed to the native driver.
///
/// ```rust
/// use sql_bindcursor::prelude::*;
///
/// let id = RowValues::Int(7);
/// assert_eq!(id.as_int(), Some(&7));
/// assert!(RowValues::Null.is_null());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt);
            }
        }
        None
    }

    /// Plain-text rendering used for keys of column-keyed collections.
    #[must_use]
    pub fn to_key_string(&self) -> String {
        match self {
            RowValues::Int(i) => i.to_string(),
            RowValues::Float(f) => f.to_string(),
            RowValues::Text(s) => s.clone(),
            RowValues::Bool(b) => i64::from(*b).to_string(),
            RowValues::Timestamp(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            RowValues::Null => String::new(),
            RowValues::JSON(v) => v.to_string(),
            RowValues::Blob(bytes) => hex::encode(bytes),
        }
    }

    /// JSON rendering used when hydrating rows into caller types.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            RowValues::Int(i) => JsonValue::from(*i),
            RowValues::Float(f) => JsonValue::from(*f),
            RowValues::Text(s) => JsonValue::from(s.as_str()),
            RowValues::Bool(b) => JsonValue::from(*b),
            RowValues::Timestamp(dt) => {
                JsonValue::from(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            RowValues::Null => JsonValue::Null,
            RowValues::JSON(v) => v.clone(),
            RowValues::Blob(bytes) => JsonValue::from(bytes.clone()),
        }
    }
}

/// The database engines this crate drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Engine {
    /// `SQLite` through rusqlite; multi-statement capable, native insert id.
    Sqlite,
    /// SQL Server through tiberius; single statement or batch, no native insert id.
    Mssql,
}

impl Engine {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Engine::Sqlite => "sqlite",
            Engine::Mssql => "mssql",
        }
    }

    /// Whether a multi-statement string yields independent result sets.
    ///
    /// The other engine only accepts batches whose last statement is the
    /// only selecting one.
    #[must_use]
    pub fn supports_multi_query(self) -> bool {
        matches!(self, Engine::Sqlite)
    }

    /// Whether the driver exposes the generated identity directly.
    #[must_use]
    pub fn native_insert_id(self) -> bool {
        matches!(self, Engine::Sqlite)
    }

    #[must_use]
    pub fn begin_transaction_sql(self) -> &'static str {
        match self {
            Engine::Sqlite => "BEGIN",
            Engine::Mssql => "BEGIN TRANSACTION",
        }
    }

    #[must_use]
    pub fn commit_sql(self) -> &'static str {
        match self {
            Engine::Sqlite => "COMMIT",
            Engine::Mssql => "COMMIT TRANSACTION",
        }
    }

    #[must_use]
    pub fn rollback_sql(self) -> &'static str {
        match self {
            Engine::Sqlite => "ROLLBACK",
            Engine::Mssql => "ROLLBACK TRANSACTION",
        }
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
