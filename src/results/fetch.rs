use std::collections::BTreeMap;

use crate::error::DbError;
use crate::results::row::CustomDbRow;
use crate::types::RowValues;

/// Shape rows are returned in by `fetch_array`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchShape {
    /// Keyed by column name.
    Assoc,
    /// Positional only.
    Numeric,
}

/// A row in the requested [`FetchShape`].
#[derive(Debug, Clone, PartialEq)]
pub enum FetchedRow {
    Assoc(CustomDbRow),
    Numeric(Vec<RowValues>),
}

impl FetchedRow {
    pub(crate) fn shaped(row: CustomDbRow, shape: FetchShape) -> Self {
        match shape {
            FetchShape::Assoc => FetchedRow::Assoc(row),
            FetchShape::Numeric => FetchedRow::Numeric(row.into_values()),
        }
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        match self {
            FetchedRow::Assoc(row) => row.get_by_index(index),
            FetchedRow::Numeric(values) => values.get(index),
        }
    }

    /// Lookup by name; always `None` for numeric rows.
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        match self {
            FetchedRow::Assoc(row) => row.get(column_name),
            FetchedRow::Numeric(_) => None,
        }
    }
}

/// Column addressed by position or by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRef<'a> {
    Index(usize),
    Name(&'a str),
}

impl From<usize> for ColumnRef<'_> {
    fn from(index: usize) -> Self {
        ColumnRef::Index(index)
    }
}

impl<'a> From<&'a str> for ColumnRef<'a> {
    fn from(name: &'a str) -> Self {
        ColumnRef::Name(name)
    }
}

/// Result of a bulk fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum RowCollection<T> {
    List(Vec<T>),
    /// Keyed by a column's value; a later row replaces an earlier one with
    /// the same key.
    Keyed(BTreeMap<String, T>),
}

impl<T> RowCollection<T> {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            RowCollection::List(items) => items.len(),
            RowCollection::Keyed(items) => items.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn into_list(self) -> Vec<T> {
        match self {
            RowCollection::List(items) => items,
            RowCollection::Keyed(items) => items.into_values().collect(),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&T> {
        match self {
            RowCollection::List(_) => None,
            RowCollection::Keyed(items) => items.get(key),
        }
    }
}

/// Representation requested from `insert_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertIdType {
    Integer,
    Float,
    String,
}

impl InsertIdType {
    /// `i`, `d`, `s`, or empty for the default string form.
    ///
    /// # Errors
    /// `InvalidArgument` for anything else.
    pub fn parse(as_type: &str) -> Result<Self, DbError> {
        match as_type {
            "i" => Ok(InsertIdType::Integer),
            "d" => Ok(InsertIdType::Float),
            "" | "s" => Ok(InsertIdType::String),
            other => Err(DbError::invalid_argument(format!(
                "insert id type '{other}' is not one of i, d, s"
            ))),
        }
    }

    /// Convert a raw identity value; `None` for NULL or unparseable text.
    #[must_use]
    pub fn convert(self, raw: &RowValues) -> Option<RowValues> {
        let as_int = match raw {
            RowValues::Int(i) => Some(*i),
            #[allow(clippy::cast_possible_truncation)]
            RowValues::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            RowValues::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }?;
        Some(match self {
            InsertIdType::Integer => RowValues::Int(as_int),
            #[allow(clippy::cast_precision_loss)]
            InsertIdType::Float => RowValues::Float(as_int as f64),
            InsertIdType::String => RowValues::Text(as_int.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn insert_id_types() {
        assert_eq!(InsertIdType::parse("").unwrap(), InsertIdType::String);
        assert_eq!(
            InsertIdType::parse("x").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        let raw = RowValues::Float(42.0);
        assert_eq!(InsertIdType::Integer.convert(&raw), Some(RowValues::Int(42)));
        assert_eq!(InsertIdType::Float.convert(&raw), Some(RowValues::Float(42.0)));
        assert_eq!(
            InsertIdType::String.convert(&RowValues::Int(42)),
            Some(RowValues::Text("42".into()))
        );
        assert_eq!(InsertIdType::Integer.convert(&RowValues::Null), None);
    }

    #[test]
    fn keyed_collection_lookup() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), 1);
        let keyed = RowCollection::Keyed(map);
        assert_eq!(keyed.get("a"), Some(&1));
        assert_eq!(keyed.into_list(), vec![1]);
    }
}
