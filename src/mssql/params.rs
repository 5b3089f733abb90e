use chrono::NaiveDateTime;
use tiberius::Query;

use crate::args::{ParamQualifier, SqlType};
use crate::error::NativeError;
use crate::native::BoundParam;
use crate::types::RowValues;

// Server codes reported for values the server would refuse anyway
const CONVERSION_FAILED: i64 = 8114;
const ARITHMETIC_OVERFLOW: i64 = 8115;
const TRUNCATED: i64 = 8152;

/// A value in the native type it will be bound as.
#[derive(Debug, Clone, PartialEq)]
pub enum MssqlValue {
    Null(Option<SqlType>),
    Bit(bool),
    TinyInt(u8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f64),
    Text(String),
    Binary(Vec<u8>),
    DateTime(NaiveDateTime),
}

fn conversion_failed(value: &RowValues, target: SqlType) -> NativeError {
    NativeError::new(
        CONVERSION_FAILED,
        format!(
            "Error converting '{}' to {target:?}",
            value.to_key_string()
        ),
    )
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

fn as_integer(value: &RowValues, target: SqlType) -> Result<i64, NativeError> {
    match value {
        RowValues::Int(i) => Ok(*i),
        RowValues::Bool(b) => Ok(i64::from(*b)),
        #[allow(clippy::cast_possible_truncation)]
        RowValues::Float(f) if f.fract() == 0.0 && f.is_finite() => Ok(*f as i64),
        RowValues::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| conversion_failed(value, target)),
        _ => Err(conversion_failed(value, target)),
    }
}

fn narrowed<T: TryFrom<i64>>(value: &RowValues, target: SqlType) -> Result<T, NativeError> {
    let wide = as_integer(value, target)?;
    T::try_from(wide).map_err(|_| {
        NativeError::new(
            ARITHMETIC_OVERFLOW,
            format!("Arithmetic overflow error converting {wide} to {target:?}"),
        )
    })
}

fn check_length(len: usize, limit: Option<u32>) -> Result<(), NativeError> {
    match limit {
        Some(max) if len > max as usize => Err(NativeError::new(
            TRUNCATED,
            format!("String or binary data would be truncated ({len} > {max})"),
        )),
        _ => Ok(()),
    }
}

/// Convert a value without a qualifier; the type follows the value.
#[must_use]
pub fn natural_value(value: &RowValues) -> MssqlValue {
    match value {
        RowValues::Int(i) => MssqlValue::BigInt(*i),
        RowValues::Float(f) => MssqlValue::Float(*f),
        RowValues::Text(s) => MssqlValue::Text(s.clone()),
        RowValues::Bool(b) => MssqlValue::Bit(*b),
        RowValues::Timestamp(dt) => MssqlValue::DateTime(*dt),
        RowValues::Null => MssqlValue::Null(None),
        RowValues::JSON(jsval) => MssqlValue::Text(jsval.to_string()),
        RowValues::Blob(bytes) => MssqlValue::Binary(bytes.clone()),
    }
}

/// Convert a value to the type its qualifier names.
///
/// # Errors
/// Conversion failures, overflow, and length overruns are reported with
/// the server's own codes.
pub fn qualified_value(
    value: &RowValues,
    qualifier: &ParamQualifier,
) -> Result<MssqlValue, NativeError> {
    let Some(target) = qualifier.sql_type else {
        return Ok(natural_value(value));
    };
    if matches!(value, RowValues::Null) {
        return Ok(MssqlValue::Null(Some(target)));
    }
    Ok(match target {
        SqlType::Bit => MssqlValue::Bit(as_integer(value, target)? != 0),
        SqlType::TinyInt => MssqlValue::TinyInt(narrowed(value, target)?),
        SqlType::SmallInt => MssqlValue::SmallInt(narrowed(value, target)?),
        SqlType::Int => MssqlValue::Int(narrowed(value, target)?),
        SqlType::BigInt => MssqlValue::BigInt(as_integer(value, target)?),
        SqlType::Float => match value {
            RowValues::Float(f) => MssqlValue::Float(*f),
            #[allow(clippy::cast_precision_loss)]
            RowValues::Int(i) => MssqlValue::Float(*i as f64),
            RowValues::Text(s) => MssqlValue::Float(
                s.trim()
                    .parse()
                    .map_err(|_| conversion_failed(value, target))?,
            ),
            _ => return Err(conversion_failed(value, target)),
        },
        SqlType::NVarChar | SqlType::VarChar => {
            let text = value.to_key_string();
            check_length(text.chars().count(), qualifier.length)?;
            MssqlValue::Text(text)
        }
        SqlType::VarBinary => {
            let bytes = match value {
                RowValues::Blob(bytes) => bytes.clone(),
                RowValues::Text(s) => s.clone().into_bytes(),
                _ => return Err(conversion_failed(value, target)),
            };
            check_length(bytes.len(), qualifier.length)?;
            MssqlValue::Binary(bytes)
        }
        SqlType::DateTime2 => match value {
            RowValues::Timestamp(dt) => MssqlValue::DateTime(*dt),
            RowValues::Text(s) => MssqlValue::DateTime(
                parse_timestamp(s.trim()).ok_or_else(|| conversion_failed(value, target))?,
            ),
            _ => return Err(conversion_failed(value, target)),
        },
    })
}

/// Convert bound parameters for one execution.
///
/// # Errors
/// The first value that does not convert to its qualified type.
pub fn convert_params(params: &[BoundParam]) -> Result<Vec<MssqlValue>, NativeError> {
    params
        .iter()
        .map(|p| match &p.qualifier {
            Some(qualifier) => qualified_value(&p.value, qualifier),
            None => Ok(natural_value(&p.value)),
        })
        .collect()
}

/// Bind converted values to a query, in marker order.
pub fn bind_values(query: &mut Query<'_>, values: Vec<MssqlValue>) {
    for value in values {
        match value {
            MssqlValue::Null(sql_type) => bind_null(query, sql_type),
            MssqlValue::Bit(b) => query.bind(b),
            MssqlValue::TinyInt(n) => query.bind(n),
            MssqlValue::SmallInt(n) => query.bind(n),
            MssqlValue::Int(n) => query.bind(n),
            MssqlValue::BigInt(n) => query.bind(n),
            MssqlValue::Float(f) => query.bind(f),
            MssqlValue::Text(s) => query.bind(s),
            MssqlValue::Binary(bytes) => query.bind(bytes),
            MssqlValue::DateTime(dt) => query.bind(dt),
        }
    }
}

fn bind_null(query: &mut Query<'_>, sql_type: Option<SqlType>) {
    match sql_type {
        Some(SqlType::Bit) => query.bind(Option::<bool>::None),
        Some(SqlType::TinyInt) => query.bind(Option::<u8>::None),
        Some(SqlType::SmallInt) => query.bind(Option::<i16>::None),
        Some(SqlType::Int) => query.bind(Option::<i32>::None),
        Some(SqlType::BigInt) => query.bind(Option::<i64>::None),
        Some(SqlType::Float) => query.bind(Option::<f64>::None),
        Some(SqlType::VarBinary) => query.bind(Option::<Vec<u8>>::None),
        Some(SqlType::DateTime2) => query.bind(Option::<NaiveDateTime>::None),
        Some(SqlType::NVarChar | SqlType::VarChar) | None => query.bind(Option::<String>::None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(sql_type: SqlType) -> ParamQualifier {
        ParamQualifier::sql_type(sql_type)
    }

    #[test]
    fn qualifiers_pick_the_native_type() {
        assert_eq!(
            qualified_value(&RowValues::Text("7".into()), &typed(SqlType::TinyInt)).unwrap(),
            MssqlValue::TinyInt(7)
        );
        assert_eq!(
            qualified_value(&RowValues::Int(1), &typed(SqlType::Bit)).unwrap(),
            MssqlValue::Bit(true)
        );
        assert_eq!(
            qualified_value(&RowValues::Null, &typed(SqlType::Int)).unwrap(),
            MssqlValue::Null(Some(SqlType::Int))
        );
        assert_eq!(
            qualified_value(
                &RowValues::Text("2024-01-02 03:04:05".into()),
                &typed(SqlType::DateTime2)
            )
            .unwrap(),
            MssqlValue::DateTime(parse_timestamp("2024-01-02 03:04:05").unwrap())
        );
    }

    #[test]
    fn refused_values_carry_server_codes() {
        let err = qualified_value(&RowValues::Int(300), &typed(SqlType::TinyInt)).unwrap_err();
        assert_eq!(err.code, ARITHMETIC_OVERFLOW);
        let err = qualified_value(&RowValues::Text("abc".into()), &typed(SqlType::Int)).unwrap_err();
        assert_eq!(err.code, CONVERSION_FAILED);
        let err = qualified_value(
            &RowValues::Text("abcdef".into()),
            &typed(SqlType::NVarChar).with_length(3),
        )
        .unwrap_err();
        assert_eq!(err.code, TRUNCATED);
    }

    #[test]
    fn unqualified_values_follow_their_kind() {
        let values = convert_params(&[
            BoundParam::new(RowValues::Int(5)),
            BoundParam::new(RowValues::Blob(vec![0xAB])),
        ])
        .unwrap();
        assert_eq!(
            values,
            vec![MssqlValue::BigInt(5), MssqlValue::Binary(vec![0xAB])]
        );
    }
}
