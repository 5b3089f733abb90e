use std::collections::BTreeMap;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::classify::ErrorClassifier;
use crate::error::{DbError, ErrorContext, NativeError};
use crate::native::NativeResult;
use crate::options::ResolvedOptions;
use crate::results::fetch::{ColumnRef, FetchShape, FetchedRow, InsertIdType, RowCollection};
use crate::results::row::{ColumnSet, CustomDbRow};
use crate::types::{Engine, RowValues};

/// Column the appended identity select reports the identity in.
pub(crate) const INSERT_ID_COLUMN: &str = "insert_id";
/// Column the appended identity select reports the row count in.
pub(crate) const AFFECTED_ROWS_COLUMN: &str = "affected_rows";

/// Cursor over the result sets of one execution.
///
/// Positions start before the first set and before its first row; the
/// first row or field read moves onto set 0. Exhaustion is never an error:
/// fetches return `None` and `next_set` returns `false`.
///
/// The cursor borrows its query mutably, so the query cannot execute again
/// or close while a cursor from it is alive.
pub struct ResultCursor<'q> {
    native: Option<Box<dyn NativeResult>>,
    ctx: ErrorContext,
    engine: Engine,
    classifier: ErrorClassifier,
    options: ResolvedOptions,
    columns: ColumnSet,
    set_index: i64,
    row_index: i64,
    sets_depleted: bool,
    freed: bool,
    trailing: Option<Option<CustomDbRow>>,
    _query: PhantomData<&'q mut ()>,
}

impl std::fmt::Debug for ResultCursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCursor")
            .field("ctx", &self.ctx)
            .field("set_index", &self.set_index)
            .field("row_index", &self.row_index)
            .field("freed", &self.freed)
            .finish_non_exhaustive()
    }
}

impl ResultCursor<'_> {
    pub(crate) fn new(
        native: Box<dyn NativeResult>,
        ctx: ErrorContext,
        engine: Engine,
        classifier: ErrorClassifier,
        options: ResolvedOptions,
    ) -> Self {
        Self {
            native: Some(native),
            ctx,
            engine,
            classifier,
            options,
            columns: ColumnSet::default(),
            set_index: -1,
            row_index: -1,
            sets_depleted: false,
            freed: false,
            trailing: None,
            _query: PhantomData,
        }
    }

    /// Index of the current set, `-1` before the first.
    #[must_use]
    pub fn set_index(&self) -> i64 {
        self.set_index
    }

    /// Index of the last row read in the current set, `-1` before the first.
    #[must_use]
    pub fn row_index(&self) -> i64 {
        self.row_index
    }

    fn native_failure(&self, native: NativeError) -> DbError {
        let err = self.classifier.to_error(native, &self.ctx);
        warn!(
            query_id = self.ctx.query_id.as_deref().unwrap_or(""),
            prefix = %self.ctx.prefix,
            set = self.set_index,
            row = self.row_index,
            error = %err,
            "result traversal failed"
        );
        err
    }

    fn native_mut(&mut self) -> Result<&mut Box<dyn NativeResult>, DbError> {
        if self.freed {
            return Err(DbError::result_access("result has been freed").in_context(&self.ctx));
        }
        let ctx = &self.ctx;
        self.native
            .as_mut()
            .ok_or_else(|| DbError::result_access("no native result").in_context(ctx))
    }

    fn native_ref(&self) -> Result<&dyn NativeResult, DbError> {
        if self.freed {
            return Err(DbError::result_access("result has been freed").in_context(&self.ctx));
        }
        self.native
            .as_deref()
            .ok_or_else(|| DbError::result_access("no native result").in_context(&self.ctx))
    }

    fn advance_set(&mut self) -> Result<bool, DbError> {
        if self.sets_depleted {
            return Ok(false);
        }
        let moved = match self.native_mut()?.next_set() {
            Ok(moved) => moved,
            Err(native) => {
                self.sets_depleted = true;
                return Err(self.native_failure(native));
            }
        };
        if moved {
            self.set_index += 1;
            self.row_index = -1;
            let names = self.native_ref()?.columns();
            self.columns = ColumnSet::new(names);
            debug!(
                query_id = self.ctx.query_id.as_deref().unwrap_or(""),
                set = self.set_index,
                columns = self.columns.len(),
                "moved to result set"
            );
        } else {
            self.sets_depleted = true;
            self.columns = ColumnSet::default();
        }
        Ok(moved)
    }

    /// Move onto set 0 if nothing has been read yet.
    fn ensure_set(&mut self) -> Result<bool, DbError> {
        if self.freed {
            return Err(DbError::result_access("result has been freed").in_context(&self.ctx));
        }
        if self.set_index < 0 && !self.sets_depleted {
            return self.advance_set();
        }
        Ok(!self.sets_depleted)
    }

    /// Advance to the next result set.
    ///
    /// Errors of statements behind later sets may surface here rather than
    /// at execute time.
    ///
    /// # Errors
    /// The classified native failure of the statement behind the next set,
    /// or `ResultAccessInvalid` after `free()`.
    pub fn next_set(&mut self) -> Result<bool, DbError> {
        self.native_ref()?;
        if !self.ensure_set()? {
            return Ok(false);
        }
        self.advance_set()
    }

    /// Read the next row of the current set.
    ///
    /// # Errors
    /// Native read failures, or `ResultAccessInvalid` after `free()`.
    pub fn next_row(&mut self) -> Result<Option<CustomDbRow>, DbError> {
        if !self.ensure_set()? {
            return Ok(None);
        }
        match self.native_mut()?.next_row() {
            Ok(Some(values)) => {
                self.row_index += 1;
                Ok(Some(CustomDbRow::new(self.columns.clone(), values)))
            }
            Ok(None) => Ok(None),
            Err(native) => Err(self.native_failure(native)),
        }
    }

    fn column_position(&self, column: ColumnRef<'_>) -> Result<usize, DbError> {
        match column {
            ColumnRef::Index(idx) if idx < self.columns.len() => Ok(idx),
            ColumnRef::Index(idx) => Err(DbError::invalid_argument(format!(
                "column {idx} out of range, set {} has {} columns",
                self.set_index,
                self.columns.len()
            ))
            .in_context(&self.ctx)),
            ColumnRef::Name(name) => self.columns.position(name).ok_or_else(|| {
                DbError::invalid_argument(format!(
                    "set {} has no column '{name}'",
                    self.set_index
                ))
                .in_context(&self.ctx)
            }),
        }
    }

    /// Read one field of the next row.
    ///
    /// # Errors
    /// `InvalidArgument` when the column does not exist in the current set;
    /// the row is not consumed in that case.
    pub fn fetch_field<'c>(
        &mut self,
        column: impl Into<ColumnRef<'c>>,
    ) -> Result<Option<RowValues>, DbError> {
        if !self.ensure_set()? {
            return Ok(None);
        }
        let idx = self.column_position(column.into())?;
        Ok(self
            .next_row()?
            .and_then(|row| row.into_values().into_iter().nth(idx)))
    }

    /// # Errors
    /// See [`ResultCursor::next_row`].
    pub fn fetch_array(&mut self, shape: FetchShape) -> Result<Option<FetchedRow>, DbError> {
        Ok(self
            .next_row()?
            .map(|row| FetchedRow::shaped(row, shape)))
    }

    fn hydrate<T: DeserializeOwned>(&self, row: &CustomDbRow) -> Result<T, DbError> {
        serde_json::from_value(row.to_json_object()).map_err(|e| {
            DbError::result_access(format!(
                "row {} of set {} cannot hydrate {}: {e}",
                self.row_index,
                self.set_index,
                std::any::type_name::<T>()
            ))
            .in_context(&self.ctx)
        })
    }

    /// Hydrate the next row into `T` through its column names.
    ///
    /// # Errors
    /// `ResultAccessInvalid` when the row does not deserialize into `T`.
    pub fn fetch_object<T: DeserializeOwned>(&mut self) -> Result<Option<T>, DbError> {
        match self.next_row()? {
            Some(row) => self.hydrate(&row).map(Some),
            None => Ok(None),
        }
    }

    fn collect_rows<T>(
        &mut self,
        list_by_column: Option<&str>,
        mut map: impl FnMut(&Self, CustomDbRow) -> Result<T, DbError>,
    ) -> Result<RowCollection<T>, DbError> {
        if !self.ensure_set()? {
            return Ok(match list_by_column {
                Some(_) => RowCollection::Keyed(BTreeMap::new()),
                None => RowCollection::List(Vec::new()),
            });
        }
        match list_by_column {
            None => {
                let mut items = Vec::new();
                while let Some(row) = self.next_row()? {
                    items.push(map(self, row)?);
                }
                Ok(RowCollection::List(items))
            }
            Some(column) => {
                let key_idx = self.column_position(ColumnRef::Name(column))?;
                let mut items = BTreeMap::new();
                while let Some(row) = self.next_row()? {
                    let key = row
                        .get_by_index(key_idx)
                        .map(RowValues::to_key_string)
                        .unwrap_or_default();
                    items.insert(key, map(self, row)?);
                }
                Ok(RowCollection::Keyed(items))
            }
        }
    }

    /// One field of every remaining row in the current set.
    ///
    /// # Errors
    /// `InvalidArgument` for unknown columns.
    pub fn fetch_field_all<'c>(
        &mut self,
        column: impl Into<ColumnRef<'c>>,
        list_by_column: Option<&str>,
    ) -> Result<RowCollection<RowValues>, DbError> {
        let column = column.into();
        if self.ensure_set()? {
            self.column_position(column)?;
        }
        self.collect_rows(list_by_column, |cursor, row| {
            let idx = cursor.column_position(column)?;
            Ok(row.into_values().into_iter().nth(idx).unwrap_or(RowValues::Null))
        })
    }

    /// Every remaining row of the current set.
    ///
    /// # Errors
    /// `InvalidArgument` when `list_by_column` is combined with
    /// [`FetchShape::Numeric`], checked before anything is read, or names an
    /// unknown column.
    pub fn fetch_array_all(
        &mut self,
        shape: FetchShape,
        list_by_column: Option<&str>,
    ) -> Result<RowCollection<FetchedRow>, DbError> {
        if shape == FetchShape::Numeric && list_by_column.is_some() {
            return Err(DbError::invalid_argument(
                "list_by_column cannot key positionally indexed rows",
            )
            .in_context(&self.ctx));
        }
        self.collect_rows(list_by_column, |_, row| Ok(FetchedRow::shaped(row, shape)))
    }

    /// Hydrate every remaining row of the current set.
    ///
    /// # Errors
    /// `ResultAccessInvalid` when a row does not deserialize into `T`.
    pub fn fetch_object_all<T: DeserializeOwned>(
        &mut self,
        list_by_column: Option<&str>,
    ) -> Result<RowCollection<T>, DbError> {
        self.collect_rows(list_by_column, |cursor, row| cursor.hydrate(&row))
    }

    /// Row count of the current set.
    ///
    /// # Errors
    /// `ResultAccessInvalid` when the result or cursor mode streams rows.
    pub fn num_rows(&mut self) -> Result<u64, DbError> {
        if !self.options.row_count_available() {
            return Err(DbError::result_access(
                "row count is not available in a streaming result or cursor mode",
            )
            .in_context(&self.ctx));
        }
        if !self.ensure_set()? {
            return Ok(0);
        }
        self.native_ref()?
            .num_rows()
            .ok_or_else(|| DbError::result_access("engine reports no row count").in_context(&self.ctx))
    }

    /// # Errors
    /// `ResultAccessInvalid` after `free()`.
    pub fn num_columns(&mut self) -> Result<usize, DbError> {
        self.ensure_set()?;
        Ok(self.columns.len())
    }

    /// # Errors
    /// `ResultAccessInvalid` after `free()`.
    pub fn column_names(&mut self) -> Result<Vec<String>, DbError> {
        self.ensure_set()?;
        Ok(self.columns.names().as_ref().clone())
    }

    /// Read the appended identity set once, leaving the cursor after it.
    fn trailing_row(&mut self) -> Result<Option<CustomDbRow>, DbError> {
        if let Some(row) = &self.trailing {
            return Ok(row.clone());
        }
        let mut found = None;
        let mut on_set = self.ensure_set()?;
        while on_set {
            if self.columns.position(INSERT_ID_COLUMN).is_some() {
                found = self.next_row()?;
            }
            on_set = self.advance_set()?;
        }
        self.trailing = Some(found.clone());
        Ok(found)
    }

    /// Rows changed by the current set's statement, `None` for statements
    /// that select.
    ///
    /// # Errors
    /// `InvalidArgument` on the single-statement engine when the query was
    /// built without the `affected_rows` option.
    pub fn affected_rows(&mut self) -> Result<Option<u64>, DbError> {
        if self.engine == Engine::Mssql {
            if !self.options.affected_rows {
                return Err(DbError::invalid_argument(
                    "affected rows need the affected_rows query option",
                )
                .in_context(&self.ctx));
            }
            if self.options.insert_id {
                let row = self.trailing_row()?;
                return Ok(row
                    .as_ref()
                    .and_then(|r| r.get(AFFECTED_ROWS_COLUMN))
                    .and_then(|v| v.as_int().copied())
                    .and_then(|n| u64::try_from(n).ok()));
            }
        }
        if !self.ensure_set()? {
            return Ok(None);
        }
        Ok(self.native_ref()?.affected_rows())
    }

    /// Identity generated by the insert, converted to `as_type`
    /// (`i` integer, `d` float, `s` or empty string). `None` when the
    /// statement generated none.
    ///
    /// On the single-statement engine this reads the appended identity set
    /// and leaves the cursor positioned after it.
    ///
    /// # Errors
    /// `InvalidArgument` for an unknown `as_type`, or on the
    /// single-statement engine when the query was built without the
    /// `insert_id` option.
    pub fn insert_id(&mut self, as_type: &str) -> Result<Option<RowValues>, DbError> {
        let as_type = InsertIdType::parse(as_type).map_err(|e| e.in_context(&self.ctx))?;
        let raw = if self.engine.native_insert_id() {
            if !self.ensure_set()? {
                return Ok(None);
            }
            self.native_ref()?.insert_id().map(RowValues::Int)
        } else {
            if !self.options.insert_id {
                return Err(DbError::invalid_argument(
                    "insert id needs the insert_id query option on this engine",
                )
                .in_context(&self.ctx));
            }
            self.trailing_row()?
                .and_then(|row| row.get(INSERT_ID_COLUMN).cloned())
        };
        Ok(raw.and_then(|value| as_type.convert(&value)))
    }

    /// Consume the remaining rows of the current set without building them.
    ///
    /// # Errors
    /// Native failures while reading.
    pub fn deplete_rows(&mut self) -> Result<u64, DbError> {
        if !self.ensure_set()? {
            return Ok(0);
        }
        let mut skipped = 0;
        loop {
            match self.native_mut()?.next_row() {
                Ok(Some(_)) => {
                    self.row_index += 1;
                    skipped += 1;
                }
                Ok(None) => return Ok(skipped),
                Err(native) => return Err(self.native_failure(native)),
            }
        }
    }

    /// Move through every remaining set so deferred failures surface.
    ///
    /// # Errors
    /// The first deferred native failure.
    pub fn deplete_sets(&mut self) -> Result<(), DbError> {
        while self.next_set()? {}
        Ok(())
    }

    /// Consume every remaining row of every remaining set.
    ///
    /// # Errors
    /// The first native failure met.
    pub fn deplete_all(&mut self) -> Result<(), DbError> {
        self.native_ref()?;
        loop {
            self.deplete_rows()?;
            if !self.next_set()? {
                return Ok(());
            }
        }
    }

    /// Release native result resources. A second call does nothing.
    pub fn free(&mut self) {
        if self.freed {
            return;
        }
        if let Some(mut native) = self.native.take() {
            native.free();
        }
        self.freed = true;
    }

    #[must_use]
    pub fn is_freed(&self) -> bool {
        self.freed
    }
}

impl Drop for ResultCursor<'_> {
    fn drop(&mut self) {
        self.free();
    }
}
