use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};

use crate::types::RowValues;

/// Column names of one result set with a name → position index, shared by
/// every row of that set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSet {
    names: Arc<Vec<String>>,
    index: Arc<HashMap<String, usize>>,
}

impl ColumnSet {
    #[must_use]
    pub fn new(names: Arc<Vec<String>>) -> Self {
        // First occurrence wins for duplicated names
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            index.entry(name.clone()).or_insert(i);
        }
        Self {
            names,
            index: Arc::new(index),
        }
    }

    #[must_use]
    pub fn names(&self) -> &Arc<Vec<String>> {
        &self.names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[must_use]
    pub fn position(&self, column_name: &str) -> Option<usize> {
        self.index.get(column_name).copied()
    }
}

/// A row from a database query result
///
/// This struct represents a single row from a database query result,
/// with access to both the column names and the values.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomDbRow {
    columns: ColumnSet,
    /// The values for this row
    pub rows: Vec<RowValues>,
}

impl CustomDbRow {
    #[must_use]
    pub fn new(columns: ColumnSet, rows: Vec<RowValues>) -> Self {
        Self { columns, rows }
    }

    /// The column names for this row (shared across all rows in a result set)
    #[must_use]
    pub fn column_names(&self) -> &Arc<Vec<String>> {
        self.columns.names()
    }

    /// Get the index of a column by name
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        self.columns.position(column_name)
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.get_column_index(column_name)
            .and_then(|idx| self.rows.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.rows.get(index)
    }

    #[must_use]
    pub fn into_values(self) -> Vec<RowValues> {
        self.rows
    }

    /// JSON object keyed by column name, used to hydrate caller types.
    #[must_use]
    pub fn to_json_object(&self) -> JsonValue {
        let mut map = Map::with_capacity(self.rows.len());
        for (name, value) in self.columns.names().iter().zip(&self.rows) {
            if !map.contains_key(name) {
                map.insert(name.clone(), value.to_json());
            }
        }
        JsonValue::Object(map)
    }
}
