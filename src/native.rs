//! The seam between the binding/cursor core and a concrete driver.
//!
//! A backend implements these traits over its own handles. The core never
//! sees driver types: values cross as [`RowValues`], failures as
//! [`NativeError`]. Every handle is `'static` so queries and cursors can
//! own theirs without borrowing the connection.

use std::sync::Arc;

use crate::args::ParamQualifier;
use crate::error::NativeError;
use crate::types::{Engine, RowValues};

/// One converted argument, ready to bind.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParam {
    pub value: RowValues,
    pub qualifier: Option<ParamQualifier>,
}

impl BoundParam {
    #[must_use]
    pub fn new(value: RowValues) -> Self {
        Self {
            value,
            qualifier: None,
        }
    }
}

/// What the core expects back from one execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecRequest {
    /// SQL holds several statements.
    pub multi: bool,
    /// Report affected rows; on the single-statement engine this selects
    /// the non-scanning execute path.
    pub affected_rows: bool,
    /// SQL ends with an appended identity select.
    pub insert_id: bool,
    /// The first statement selects nothing, so the engine must present an
    /// empty leading set for it.
    pub leading_dml: bool,
}

/// Native result handle.
///
/// Starts positioned before the first set. The first `next_set` moves onto
/// the set of the statement that already ran; later calls may run further
/// statements and are where deferred failures surface.
pub trait NativeResult {
    /// # Errors
    /// The native failure of the statement behind the next set.
    fn next_set(&mut self) -> Result<bool, NativeError>;

    /// Column names of the current set; empty for non-selecting statements.
    fn columns(&self) -> Arc<Vec<String>>;

    /// # Errors
    /// Native failures while reading the row.
    fn next_row(&mut self) -> Result<Option<Vec<RowValues>>, NativeError>;

    /// Row count of the current set, when the engine knows it.
    fn num_rows(&self) -> Option<u64>;

    fn affected_rows(&self) -> Option<u64>;

    /// Identity generated by the current set's statement.
    fn insert_id(&self) -> Option<i64>;

    /// Release native resources. Must be safe to call repeatedly.
    fn free(&mut self);
}

/// Native prepared statement.
pub trait NativeStatement {
    /// # Errors
    /// Native failures while binding or executing.
    fn execute(
        &mut self,
        params: &[BoundParam],
        request: ExecRequest,
    ) -> Result<Box<dyn NativeResult>, NativeError>;

    /// Release the handle. Must be safe to call repeatedly.
    fn close(&mut self);
}

/// Native connection.
pub trait NativeConnection {
    fn engine(&self) -> Engine;

    /// # Errors
    /// Native failures while preparing, such as syntax errors.
    fn prepare(&mut self, sql: &str) -> Result<Box<dyn NativeStatement>, NativeError>;

    /// Run SQL text without bound parameters.
    ///
    /// # Errors
    /// Native failures of the first statement.
    fn query(&mut self, sql: &str, request: ExecRequest)
    -> Result<Box<dyn NativeResult>, NativeError>;
}

/// Supplies native connections on demand.
///
/// `Ok(None)` means "no connection" and is reported by the core as
/// `ConnectionLost` rather than treated as a driver failure.
pub trait ConnectionProvider {
    /// # Errors
    /// The native failure of the connection attempt.
    fn connect(&mut self) -> Result<Option<Box<dyn NativeConnection>>, NativeError>;
}

impl<F> ConnectionProvider for F
where
    F: FnMut() -> Result<Option<Box<dyn NativeConnection>>, NativeError>,
{
    fn connect(&mut self) -> Result<Option<Box<dyn NativeConnection>>, NativeError> {
        self()
    }
}

/// One fully read result set, for engines that buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferedSet {
    pub columns: Arc<Vec<String>>,
    pub rows: std::collections::VecDeque<Vec<RowValues>>,
    pub total_rows: u64,
    pub affected_rows: Option<u64>,
    pub insert_id: Option<i64>,
}

impl BufferedSet {
    /// Set of a statement that selected nothing.
    #[must_use]
    pub fn statement(affected_rows: Option<u64>, insert_id: Option<i64>) -> Self {
        Self {
            affected_rows,
            insert_id,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn rows(columns: Vec<String>, rows: Vec<Vec<RowValues>>) -> Self {
        Self {
            columns: Arc::new(columns),
            total_rows: rows.len() as u64,
            rows: rows.into(),
            affected_rows: None,
            insert_id: None,
        }
    }
}

/// A [`NativeResult`] over sets that are all read up front.
#[derive(Debug, Default)]
pub struct BufferedResult {
    pending: std::collections::VecDeque<BufferedSet>,
    current: Option<BufferedSet>,
}

impl BufferedResult {
    #[must_use]
    pub fn new(sets: Vec<BufferedSet>) -> Self {
        Self {
            pending: sets.into(),
            current: None,
        }
    }
}

impl NativeResult for BufferedResult {
    fn next_set(&mut self) -> Result<bool, NativeError> {
        self.current = self.pending.pop_front();
        Ok(self.current.is_some())
    }

    fn columns(&self) -> Arc<Vec<String>> {
        self.current
            .as_ref()
            .map(|set| set.columns.clone())
            .unwrap_or_default()
    }

    fn next_row(&mut self) -> Result<Option<Vec<RowValues>>, NativeError> {
        Ok(self.current.as_mut().and_then(|set| set.rows.pop_front()))
    }

    fn num_rows(&self) -> Option<u64> {
        self.current.as_ref().map(|set| set.total_rows)
    }

    fn affected_rows(&self) -> Option<u64> {
        self.current.as_ref().and_then(|set| set.affected_rows)
    }

    fn insert_id(&self) -> Option<i64> {
        self.current.as_ref().and_then(|set| set.insert_id)
    }

    fn free(&mut self) {
        self.pending.clear();
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_result_walks_sets_in_order() {
        let mut result = BufferedResult::new(vec![
            BufferedSet::statement(Some(2), Some(9)),
            BufferedSet::rows(vec!["a".into()], vec![vec![RowValues::Int(1)]]),
        ]);
        assert!(result.columns().is_empty());
        assert!(result.next_set().unwrap());
        assert_eq!(result.affected_rows(), Some(2));
        assert_eq!(result.insert_id(), Some(9));
        assert!(result.next_set().unwrap());
        assert_eq!(result.num_rows(), Some(1));
        assert_eq!(result.next_row().unwrap(), Some(vec![RowValues::Int(1)]));
        assert_eq!(result.next_row().unwrap(), None);
        assert!(!result.next_set().unwrap());
        result.free();
        result.free();
    }
}
