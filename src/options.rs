//! Per-query options and the per-engine schema that validates them.

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::DbError;
use crate::types::Engine;
use crate::validation::ValidationPolicy;

/// Result mode of the multi-result engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultMode {
    /// Rows of each set are read in full when the set is reached.
    Store,
    /// Rows are streamed; the row count of a set is unknown.
    Use,
}

/// Cursor mode of the single-statement engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorMode {
    /// Non-scrollable; the only mode that reports affected rows.
    Forward,
    Static,
    Dynamic,
    Keyset,
    /// Client-side buffered.
    Buffered,
}

impl CursorMode {
    /// Whether the row count of a set is available.
    #[must_use]
    pub fn is_scrollable(self) -> bool {
        matches!(self, CursorMode::Static | CursorMode::Keyset | CursorMode::Buffered)
    }
}

/// Options for a single query.
///
/// Build typed:
/// ```rust
/// use sql_bindcursor::prelude::*;
///
/// let options = QueryOptions::default()
///     .with_name("load-users")
///     .with_sql_minify(true)
///     .with_reusable(true);
/// # let _ = options;
/// ```
/// or from JSON, where unknown keys are refused:
/// ```rust
/// use sql_bindcursor::prelude::*;
///
/// let ok = QueryOptions::from_json(&serde_json::json!({"reusable": true, "validate_params": 15}));
/// assert!(ok.is_ok());
/// let typo = QueryOptions::from_json(&serde_json::json!({"reuseable": true}));
/// assert_eq!(typo.unwrap_err().kind(), ErrorKind::InvalidArgument);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub name: Option<String>,
    pub sql_minify: Option<bool>,
    pub reusable: Option<bool>,
    pub validate_params: Option<ValidationPolicy>,
    pub result_mode: Option<ResultMode>,
    pub cursor_mode: Option<CursorMode>,
    pub affected_rows: Option<bool>,
    pub insert_id: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOptions {
    name: Option<String>,
    sql_minify: Option<bool>,
    reusable: Option<bool>,
    validate_params: Option<u8>,
    result_mode: Option<ResultMode>,
    cursor_mode: Option<CursorMode>,
    affected_rows: Option<bool>,
    insert_id: Option<bool>,
}

impl QueryOptions {
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_sql_minify(mut self, minify: bool) -> Self {
        self.sql_minify = Some(minify);
        self
    }

    #[must_use]
    pub fn with_reusable(mut self, reusable: bool) -> Self {
        self.reusable = Some(reusable);
        self
    }

    #[must_use]
    pub fn with_validate_params(mut self, policy: ValidationPolicy) -> Self {
        self.validate_params = Some(policy);
        self
    }

    #[must_use]
    pub fn with_result_mode(mut self, mode: ResultMode) -> Self {
        self.result_mode = Some(mode);
        self
    }

    #[must_use]
    pub fn with_cursor_mode(mut self, mode: CursorMode) -> Self {
        self.cursor_mode = Some(mode);
        self
    }

    #[must_use]
    pub fn with_affected_rows(mut self, affected_rows: bool) -> Self {
        self.affected_rows = Some(affected_rows);
        self
    }

    #[must_use]
    pub fn with_insert_id(mut self, insert_id: bool) -> Self {
        self.insert_id = Some(insert_id);
        self
    }

    /// Parse options from a JSON object.
    ///
    /// # Errors
    /// `InvalidArgument` for unknown keys, values of the wrong type, unknown
    /// mode names or unknown `validate_params` bits.
    pub fn from_json(value: &JsonValue) -> Result<Self, DbError> {
        let raw = RawOptions::deserialize(value)
            .map_err(|e| DbError::invalid_argument(format!("query options: {e}")))?;
        let validate_params = raw
            .validate_params
            .map(ValidationPolicy::from_bits)
            .transpose()?;
        Ok(Self {
            name: raw.name,
            sql_minify: raw.sql_minify,
            reusable: raw.reusable,
            validate_params,
            result_mode: raw.result_mode,
            cursor_mode: raw.cursor_mode,
            affected_rows: raw.affected_rows,
            insert_id: raw.insert_id,
        })
    }

    fn set_keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.name.is_some() {
            keys.push("name");
        }
        if self.sql_minify.is_some() {
            keys.push("sql_minify");
        }
        if self.reusable.is_some() {
            keys.push("reusable");
        }
        if self.validate_params.is_some() {
            keys.push("validate_params");
        }
        if self.result_mode.is_some() {
            keys.push("result_mode");
        }
        if self.cursor_mode.is_some() {
            keys.push("cursor_mode");
        }
        if self.affected_rows.is_some() {
            keys.push("affected_rows");
        }
        if self.insert_id.is_some() {
            keys.push("insert_id");
        }
        keys
    }
}

/// Option keys an engine recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionSchema {
    pub engine: Engine,
    pub keys: &'static [&'static str],
}

const SQLITE_KEYS: &[&str] = &[
    "name",
    "sql_minify",
    "reusable",
    "validate_params",
    "result_mode",
];

const MSSQL_KEYS: &[&str] = &[
    "name",
    "sql_minify",
    "reusable",
    "validate_params",
    "cursor_mode",
    "affected_rows",
    "insert_id",
];

/// Options after schema validation and defaulting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOptions {
    pub name: Option<String>,
    pub sql_minify: bool,
    pub reusable: bool,
    pub policy: ValidationPolicy,
    pub result_mode: Option<ResultMode>,
    pub cursor_mode: Option<CursorMode>,
    pub affected_rows: bool,
    pub insert_id: bool,
}

impl ResolvedOptions {
    /// Rows are streamed rather than buffered; retrying would corrupt the
    /// cursor position.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        matches!(self.result_mode, Some(ResultMode::Use))
            || matches!(self.cursor_mode, Some(CursorMode::Forward | CursorMode::Dynamic))
    }

    /// Whether `num_rows()` is answerable.
    #[must_use]
    pub fn row_count_available(&self) -> bool {
        match (self.result_mode, self.cursor_mode) {
            (Some(ResultMode::Use), _) => false,
            (_, Some(mode)) => mode.is_scrollable(),
            _ => true,
        }
    }
}

impl OptionSchema {
    #[must_use]
    pub fn for_engine(engine: Engine) -> Self {
        let keys = match engine {
            Engine::Sqlite => SQLITE_KEYS,
            Engine::Mssql => MSSQL_KEYS,
        };
        Self { engine, keys }
    }

    /// Check keys against the engine and apply defaults.
    ///
    /// # Errors
    /// `InvalidArgument` for a key the engine does not recognize, or for
    /// `affected_rows` combined with a cursor mode other than `forward`.
    pub fn resolve(&self, options: &QueryOptions) -> Result<ResolvedOptions, DbError> {
        for key in options.set_keys() {
            if !self.keys.contains(&key) {
                return Err(DbError::invalid_argument(format!(
                    "option '{key}' is not recognized by {} queries",
                    self.engine
                )));
            }
        }

        let affected_rows = options.affected_rows.unwrap_or(false);
        let (result_mode, cursor_mode) = match self.engine {
            Engine::Sqlite => (Some(options.result_mode.unwrap_or(ResultMode::Store)), None),
            Engine::Mssql => {
                let default = if affected_rows {
                    CursorMode::Forward
                } else {
                    CursorMode::Static
                };
                let mode = options.cursor_mode.unwrap_or(default);
                if affected_rows && mode != CursorMode::Forward {
                    return Err(DbError::invalid_argument(format!(
                        "affected_rows requires cursor_mode forward, not {mode:?}"
                    )));
                }
                (None, Some(mode))
            }
        };

        Ok(ResolvedOptions {
            name: options.name.clone(),
            sql_minify: options.sql_minify.unwrap_or(false),
            reusable: options.reusable.unwrap_or(false),
            policy: options.validate_params.unwrap_or_default(),
            result_mode,
            cursor_mode,
            affected_rows,
            insert_id: options.insert_id.unwrap_or(false),
        })
    }
}
