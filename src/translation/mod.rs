//! Statement building: marker counting, minification, multi-statement
//! detection and literal substitution.
//!
//! Everything here works on the segment stream of [`scanner`], so markers
//! and separators inside quoted literals, quoted identifiers and comments
//! are never treated as syntax.

mod literal;
mod parsers;
mod scanner;

use std::ops::Range;

use lazy_static::lazy_static;
use regex::Regex;

pub use literal::render_literal;
pub(crate) use scanner::{SegmentKind, segments};

use parsers::{TriggerBody, is_word_byte};

use crate::error::DbError;
use crate::types::Engine;

/// Statement separator.
pub const SEPARATOR: u8 = b';';

lazy_static! {
    static ref SELECTING: Regex =
        Regex::new(r"(?i)^[\s(]*(SELECT|WITH|VALUES|PRAGMA)\b").expect("static regex");
    static ref INSERT_LIKE: Regex =
        Regex::new(r"(?i)^\s*(INSERT|REPLACE)\b").expect("static regex");
}

/// Parsed SQL template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSql {
    sql: String,
    markers: Vec<usize>,
    statements: Vec<Range<usize>>,
}

impl ParsedSql {
    /// The (possibly minified) SQL the marker offsets refer to.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    /// Whether a separator divides two significant statements.
    ///
    /// A single trailing separator does not make a statement multi.
    #[must_use]
    pub fn is_multi(&self) -> bool {
        self.statements.len() > 1
    }

    #[must_use]
    pub fn statements(&self) -> Vec<&str> {
        self.statements
            .iter()
            .map(|r| self.sql[r.clone()].trim())
            .collect()
    }
}

/// Parses SQL templates and produces the SQL actually sent to the driver.
///
/// ```rust
/// use sql_bindcursor::translation::StatementBuilder;
///
/// let builder = StatementBuilder::new().with_minify(true);
/// let parsed = builder.parse("SELECT * FROM t /* ? */ WHERE a = ? AND b = '?'");
/// assert_eq!(parsed.marker_count(), 1);
/// assert_eq!(parsed.sql(), "SELECT * FROM t WHERE a = ? AND b = '?'");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementBuilder {
    marker: u8,
    minify: bool,
}

impl Default for StatementBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            marker: b'?',
            minify: false,
        }
    }

    /// Use another marker character.
    ///
    /// # Errors
    /// `InvalidArgument` unless the marker is ASCII punctuation that is not
    /// a quote, bracket, comment or separator character.
    pub fn with_marker(mut self, marker: char) -> Result<Self, DbError> {
        let reserved = ['\'', '"', '[', ']', '`', '-', '/', '*', ';'];
        if !marker.is_ascii_punctuation() || reserved.contains(&marker) {
            return Err(DbError::invalid_argument(format!(
                "'{marker}' cannot be used as parameter marker"
            )));
        }
        self.marker = marker as u8;
        Ok(self)
    }

    #[must_use]
    pub fn with_minify(mut self, minify: bool) -> Self {
        self.minify = minify;
        self
    }

    #[must_use]
    pub fn marker(&self) -> char {
        char::from(self.marker)
    }

    /// Count markers and locate statements, minifying first if enabled.
    ///
    /// Separators inside a `CREATE TRIGGER` body do not end the statement.
    #[must_use]
    pub fn parse(&self, sql: &str) -> ParsedSql {
        let text = if self.minify {
            minify(sql)
        } else {
            sql.to_string()
        };

        let mut markers = Vec::new();
        let mut statements = Vec::new();
        let mut stmt_start = 0;
        let mut significant = false;
        let mut body = TriggerBody::default();

        for seg in segments(&text) {
            match seg.kind {
                SegmentKind::Comment => {}
                SegmentKind::Literal => significant = true,
                SegmentKind::Code => {
                    let bytes = &text.as_bytes()[seg.range.clone()];
                    let mut word_start = None;
                    for (offset, &b) in bytes.iter().enumerate() {
                        let pos = seg.range.start + offset;
                        if b != self.marker && is_word_byte(b) {
                            word_start.get_or_insert(pos);
                            significant = true;
                            continue;
                        }
                        if let Some(start) = word_start.take() {
                            body.word(&text[start..pos]);
                        }
                        if b == self.marker {
                            markers.push(pos);
                            significant = true;
                        } else if b == SEPARATOR && !body.is_open() {
                            if significant {
                                statements.push(stmt_start..pos);
                            }
                            stmt_start = pos + 1;
                            significant = false;
                            body = TriggerBody::default();
                        } else if !b.is_ascii_whitespace() {
                            significant = true;
                        }
                    }
                    if let Some(start) = word_start {
                        body.word(&text[start..seg.range.end]);
                    }
                }
            }
        }
        if significant {
            statements.push(stmt_start..text.len());
        }

        ParsedSql {
            sql: text,
            markers,
            statements,
        }
    }

    /// Replace every marker with its rendered literal, in order.
    ///
    /// Purely textual. Separators inside rendered literals are left alone;
    /// they sit inside quotes and never split a statement.
    ///
    /// # Errors
    /// `ArgumentCountMismatch` when the literal count differs from the
    /// marker count.
    pub fn substitute(&self, parsed: &ParsedSql, literals: &[String]) -> Result<String, DbError> {
        if literals.len() != parsed.marker_count() {
            return Err(DbError::count_mismatch(format!(
                "SQL has {} parameter markers, {} arguments supplied",
                parsed.marker_count(),
                literals.len()
            )));
        }
        Ok(splice(parsed, |i| literals[i].clone()))
    }

    /// Rewrite positional markers as SQL Server named parameters `@P1..@Pn`.
    #[must_use]
    pub fn to_named_markers(&self, parsed: &ParsedSql) -> String {
        splice(parsed, |i| format!("@P{}", i + 1))
    }

    /// Rewrite markers as `SQLite` numbered parameters `?1..?n`.
    #[must_use]
    pub fn to_numbered_markers(&self, parsed: &ParsedSql) -> String {
        splice(parsed, |i| format!("?{}", i + 1))
    }

    /// SQL with markers in the form the engine binds natively.
    #[must_use]
    pub fn native_sql(&self, parsed: &ParsedSql, engine: Engine) -> String {
        match engine {
            Engine::Sqlite if self.marker == b'?' => parsed.sql().to_string(),
            Engine::Sqlite => self.to_numbered_markers(parsed),
            Engine::Mssql => self.to_named_markers(parsed),
        }
    }
}

fn splice(parsed: &ParsedSql, mut replacement: impl FnMut(usize) -> String) -> String {
    let mut out = String::with_capacity(parsed.sql.len() + parsed.markers.len() * 8);
    let mut last = 0;
    for (i, &pos) in parsed.markers.iter().enumerate() {
        out.push_str(&parsed.sql[last..pos]);
        out.push_str(&replacement(i));
        last = pos + 1;
    }
    out.push_str(&parsed.sql[last..]);
    out
}

fn push_space(out: &mut String) {
    if !out.is_empty() && !out.ends_with(' ') {
        out.push(' ');
    }
}

/// Strip comments, collapse whitespace outside literals, trim.
#[must_use]
pub fn minify(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    for seg in segments(sql) {
        let text = &sql[seg.range];
        match seg.kind {
            SegmentKind::Comment => push_space(&mut out),
            SegmentKind::Literal => out.push_str(text),
            SegmentKind::Code => {
                for ch in text.chars() {
                    if ch.is_whitespace() {
                        push_space(&mut out);
                    } else {
                        out.push(ch);
                    }
                }
            }
        }
    }
    out.trim().to_string()
}

/// Split SQL into its significant statements.
#[must_use]
pub fn split_statements(sql: &str) -> Vec<String> {
    StatementBuilder::new()
        .parse(sql)
        .statements()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Whether a statement produces rows (`SELECT`, `WITH`, `VALUES`, `PRAGMA`).
#[must_use]
pub fn is_selecting(statement: &str) -> bool {
    SELECTING.is_match(&minify(statement))
}

/// Whether a statement may generate an identity value.
#[must_use]
pub fn is_insert_like(statement: &str) -> bool {
    INSERT_LIKE.is_match(&minify(statement))
}
