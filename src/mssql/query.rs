use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures_util::TryStreamExt;
use tiberius::error::Error as TiberiusError;
use tiberius::{ColumnData, FromSql, QueryItem, QueryStream};

use crate::error::NativeError;
use crate::native::{BufferedSet, ExecRequest};
use crate::types::RowValues;

const CONNECTION_RESET: i64 = 10054;
const CONVERSION_FAILED: i64 = 8114;

/// Map a tiberius error to a native error.
///
/// Server errors keep the server's number; transport failures look like a
/// reset connection so the classifier treats them as lost.
#[must_use]
pub fn native_error(err: TiberiusError) -> NativeError {
    match err {
        TiberiusError::Server(token) => {
            NativeError::new(i64::from(token.code()), token.message().to_string())
        }
        TiberiusError::Io { message, .. } => NativeError::new(CONNECTION_RESET, message),
        TiberiusError::Tls(message) => NativeError::new(CONNECTION_RESET, message),
        TiberiusError::Conversion(message) => {
            NativeError::new(CONVERSION_FAILED, message.into_owned())
        }
        other => NativeError::new(0, other.to_string()),
    }
}

fn datetime_of(data: &ColumnData<'static>) -> Result<Option<NaiveDateTime>, NativeError> {
    NaiveDateTime::from_sql(data).map_err(native_error)
}

/// Extract a `RowValues` from one cell.
///
/// # Errors
/// Returns the native error when a temporal value cannot be decoded.
pub fn extract_value(data: &ColumnData<'static>) -> Result<RowValues, NativeError> {
    let value = match data {
        ColumnData::U8(v) => v.map(|n| RowValues::Int(i64::from(n))),
        ColumnData::I16(v) => v.map(|n| RowValues::Int(i64::from(n))),
        ColumnData::I32(v) => v.map(|n| RowValues::Int(i64::from(n))),
        ColumnData::I64(v) => v.map(RowValues::Int),
        ColumnData::F32(v) => v.map(|f| RowValues::Float(f64::from(f))),
        ColumnData::F64(v) => v.map(RowValues::Float),
        ColumnData::Bit(v) => v.map(RowValues::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| RowValues::Text(s.to_string())),
        ColumnData::Guid(v) => v.map(|g| RowValues::Text(g.to_string())),
        ColumnData::Binary(v) => v.as_ref().map(|b| RowValues::Blob(b.to_vec())),
        ColumnData::Numeric(v) => v.map(|n| {
            if n.scale() == 0 {
                i64::try_from(n.value())
                    .map_or_else(|_| RowValues::Float(f64::from(n)), RowValues::Int)
            } else {
                RowValues::Float(f64::from(n))
            }
        }),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|x| RowValues::Text(x.as_ref().clone().into_string())),
        ColumnData::Date(_) => NaiveDate::from_sql(data)
            .map_err(native_error)?
            .map(|d| RowValues::Timestamp(d.and_time(chrono::NaiveTime::MIN))),
        ColumnData::DateTimeOffset(_) => DateTime::<Utc>::from_sql(data)
            .map_err(native_error)?
            .map(|dt| RowValues::Timestamp(dt.naive_utc())),
        ColumnData::Time(_) => chrono::NaiveTime::from_sql(data)
            .map_err(native_error)?
            .map(|t| RowValues::Text(t.to_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            datetime_of(data)?.map(RowValues::Timestamp)
        }
    };
    Ok(value.unwrap_or(RowValues::Null))
}

/// Read every result set of a stream into buffered sets.
///
/// Statements that select nothing produce no set; when the batch starts
/// with one, an empty set stands in for it.
///
/// # Errors
/// The first native error in the stream.
pub async fn collect_sets(
    mut stream: QueryStream<'_>,
    request: ExecRequest,
) -> Result<Vec<BufferedSet>, NativeError> {
    let mut sets = Vec::new();
    if request.leading_dml {
        sets.push(BufferedSet::statement(None, None));
    }
    let mut current: Option<(Vec<String>, Vec<Vec<RowValues>>)> = None;

    while let Some(item) = stream.try_next().await.map_err(native_error)? {
        match item {
            QueryItem::Metadata(meta) => {
                if let Some((columns, rows)) = current.take() {
                    sets.push(BufferedSet::rows(columns, rows));
                }
                let columns = meta
                    .columns()
                    .iter()
                    .map(|col| col.name().to_string())
                    .collect();
                current = Some((columns, Vec::new()));
            }
            QueryItem::Row(row) => {
                let mut values = Vec::with_capacity(row.len());
                for (_, data) in row.cells() {
                    values.push(extract_value(data)?);
                }
                if let Some((_, rows)) = current.as_mut() {
                    rows.push(values);
                }
            }
        }
    }
    if let Some((columns, rows)) = current.take() {
        sets.push(BufferedSet::rows(columns, rows));
    }
    Ok(sets)
}

/// Whether the request takes the non-scanning execute path, which only
/// reports the summed row count.
#[must_use]
pub fn uses_execute_path(request: ExecRequest) -> bool {
    request.affected_rows && !request.insert_id && request.leading_dml
}

#[must_use]
pub fn affected_set(rows_affected: &[u64]) -> BufferedSet {
    BufferedSet::statement(Some(rows_affected.iter().sum()), None)
}
