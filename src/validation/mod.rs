//! Argument validation.
//!
//! [`coerce`] is the single source of truth for which values a declared
//! tag accepts; binding uses it to convert, validation uses it to diagnose.
//! Validation also runs over every argument and collects all failures
//! instead of stopping at the first, and checks converted values against
//! their SQL Server qualifiers, which the driver would otherwise reject.

mod infer;
mod policy;

use std::fmt;

pub use infer::{infer_tag, resolve_tag};
pub use policy::{Phase, PhaseChecks, ValidationPolicy};

use crate::args::{ArgValue, Argument, ParamQualifier, SqlType, TypeTag};
use crate::error::{DbError, ErrorContext, NativeError};
use crate::types::RowValues;

/// Why an argument was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnosis {
    TypeMismatch {
        expected: TypeTag,
        actual: &'static str,
    },
    NotStringConvertible {
        type_name: &'static str,
    },
    NotFinite,
    OutOfRange {
        sql_type: SqlType,
    },
    TooLong {
        length: usize,
        limit: u32,
    },
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnosis::TypeMismatch { expected, actual } => {
                write!(f, "{actual} is not {expected}-compatible")
            }
            Diagnosis::NotStringConvertible { type_name } => {
                write!(f, "object {type_name} has no string conversion")
            }
            Diagnosis::NotFinite => f.write_str("float is NaN or infinite"),
            Diagnosis::OutOfRange { sql_type } => write!(f, "value overflows {sql_type:?}"),
            Diagnosis::TooLong { length, limit } => {
                write!(f, "length {length} exceeds the declared {limit}")
            }
        }
    }
}

/// One refused argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentFailure {
    pub index: usize,
    pub tag: TypeTag,
    pub diagnosis: Diagnosis,
}

/// Every failure found in one validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub phase: Phase,
    pub failures: Vec<ArgumentFailure>,
}

impl ValidationReport {
    #[must_use]
    pub fn empty(phase: Phase) -> Self {
        Self {
            phase,
            failures: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    fn has_unconvertible(&self) -> bool {
        self.failures
            .iter()
            .any(|f| matches!(f.diagnosis, Diagnosis::NotStringConvertible { .. }))
    }

    /// Turn a failing report into the matching error.
    ///
    /// Reports holding any string-conversion failure become
    /// `ArgumentNotStringConvertible`, the rest `ArgumentTypeInvalid`.
    #[must_use]
    pub fn into_error(self, ctx: &ErrorContext, native: Option<NativeError>) -> DbError {
        if self.has_unconvertible() {
            DbError::ArgumentNotStringConvertible {
                ctx: ctx.clone(),
                report: self,
                native,
            }
        } else {
            DbError::ArgumentTypeInvalid {
                ctx: ctx.clone(),
                report: self,
                native,
            }
        }
    }

    /// `Ok` when nothing failed, the matching error otherwise.
    ///
    /// # Errors
    /// See [`ValidationReport::into_error`].
    pub fn into_result(self, ctx: &ErrorContext) -> Result<(), DbError> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self.into_error(ctx, None))
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation:", self.phase)?;
        if self.failures.is_empty() {
            return f.write_str(" no argument failures");
        }
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { " " } else { "; " };
            write!(
                f,
                "{sep}arg {} ({}) {}",
                failure.index, failure.tag, failure.diagnosis
            )?;
        }
        Ok(())
    }
}

/// Render a finite float so it stays a float literal.
pub(crate) fn format_float(value: f64) -> String {
    let rendered = value.to_string();
    if rendered.contains(['.', 'e', 'E']) {
        rendered
    } else {
        format!("{rendered}.0")
    }
}

fn mismatch(expected: TypeTag, value: &ArgValue) -> Diagnosis {
    Diagnosis::TypeMismatch {
        expected,
        actual: value.type_label(),
    }
}

/// Convert a value to what the driver receives for `tag`.
///
/// # Errors
/// A [`Diagnosis`] when the value is incompatible with the tag.
pub fn coerce(value: &ArgValue, tag: TypeTag) -> Result<RowValues, Diagnosis> {
    if let ArgValue::Null = value {
        return Ok(RowValues::Null);
    }
    match tag {
        TypeTag::Integer => match value {
            ArgValue::Bool(b) => Ok(RowValues::Int(i64::from(*b))),
            ArgValue::Int(i) => Ok(RowValues::Int(*i)),
            #[allow(clippy::cast_possible_truncation)]
            ArgValue::Float(f)
                if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e18 =>
            {
                Ok(RowValues::Int(*f as i64))
            }
            ArgValue::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(RowValues::Int)
                .map_err(|_| mismatch(tag, value)),
            _ => Err(mismatch(tag, value)),
        },
        TypeTag::Float => match value {
            ArgValue::Bool(b) => Ok(RowValues::Float(if *b { 1.0 } else { 0.0 })),
            #[allow(clippy::cast_precision_loss)]
            ArgValue::Int(i) => Ok(RowValues::Float(*i as f64)),
            ArgValue::Float(f) if f.is_finite() => Ok(RowValues::Float(*f)),
            ArgValue::Float(_) => Err(Diagnosis::NotFinite),
            ArgValue::Text(s) => match s.trim().parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(RowValues::Float(f)),
                _ => Err(mismatch(tag, value)),
            },
            _ => Err(mismatch(tag, value)),
        },
        TypeTag::String => match value {
            ArgValue::Bool(b) => Ok(RowValues::Text(i64::from(*b).to_string())),
            ArgValue::Int(i) => Ok(RowValues::Text(i.to_string())),
            ArgValue::Float(f) if f.is_finite() => Ok(RowValues::Text(format_float(*f))),
            ArgValue::Float(_) => Err(Diagnosis::NotFinite),
            ArgValue::Text(s) => Ok(RowValues::Text(s.clone())),
            ArgValue::Timestamp(dt) => Ok(RowValues::Text(
                dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            )),
            ArgValue::Stringable(obj) => Ok(RowValues::Text(obj.to_sql_string())),
            ArgValue::Binary(bytes) => String::from_utf8(bytes.clone())
                .map(RowValues::Text)
                .map_err(|_| mismatch(tag, value)),
            ArgValue::Opaque { type_name, .. } => Err(Diagnosis::NotStringConvertible {
                type_name: *type_name,
            }),
            ArgValue::Null => Ok(RowValues::Null),
        },
        TypeTag::Binary => match value {
            ArgValue::Binary(bytes) => Ok(RowValues::Blob(bytes.clone())),
            ArgValue::Text(s) => Ok(RowValues::Blob(s.as_bytes().to_vec())),
            _ => Err(mismatch(tag, value)),
        },
    }
}

/// Check a converted value against its SQL Server type qualifier.
///
/// # Errors
/// `OutOfRange` for integers the qualified type cannot hold, `TooLong` for
/// text or binary longer than the declared length.
pub fn check_qualifier(value: &RowValues, qualifier: &ParamQualifier) -> Result<(), Diagnosis> {
    let Some(sql_type) = qualifier.sql_type else {
        return Ok(());
    };
    let fits = match (sql_type, value) {
        (SqlType::TinyInt, RowValues::Int(i)) => u8::try_from(*i).is_ok(),
        (SqlType::SmallInt, RowValues::Int(i)) => i16::try_from(*i).is_ok(),
        (SqlType::Int, RowValues::Int(i)) => i32::try_from(*i).is_ok(),
        _ => true,
    };
    if !fits {
        return Err(Diagnosis::OutOfRange { sql_type });
    }
    let length = match (sql_type, value) {
        (SqlType::NVarChar | SqlType::VarChar, RowValues::Text(s)) => s.chars().count(),
        (SqlType::VarBinary, RowValues::Blob(bytes)) => bytes.len(),
        (SqlType::VarBinary, RowValues::Text(s)) => s.len(),
        _ => return Ok(()),
    };
    match qualifier.length {
        Some(limit) if length > limit as usize => Err(Diagnosis::TooLong { length, limit }),
        _ => Ok(()),
    }
}

/// Check only the string-conversion capability of a `string` argument.
///
/// # Errors
/// `NotStringConvertible` for an opaque object under a `string` tag.
pub fn check_stringable(value: &ArgValue, tag: TypeTag) -> Result<(), Diagnosis> {
    match (tag, value) {
        (TypeTag::String, ArgValue::Opaque { type_name, .. }) => {
            Err(Diagnosis::NotStringConvertible {
                type_name: *type_name,
            })
        }
        _ => Ok(()),
    }
}

/// Validate every argument for `phase` under `policy`.
///
/// Never stops at the first failure. Returns an empty report when the
/// policy runs no check in this phase.
#[must_use]
pub fn validate_arguments(
    args: &[Argument],
    declared: &[Option<TypeTag>],
    phase: Phase,
    policy: ValidationPolicy,
) -> ValidationReport {
    let checks = policy.checks(phase);
    let mut report = ValidationReport::empty(phase);
    if !checks.any() {
        return report;
    }
    for (index, arg) in args.iter().enumerate() {
        let tag = resolve_tag(declared.get(index).copied().flatten(), &arg.value);
        let outcome = if checks.types {
            coerce(&arg.value, tag).and_then(|converted| match &arg.qualifier {
                Some(qualifier) => check_qualifier(&converted, qualifier),
                None => Ok(()),
            })
        } else {
            check_stringable(&arg.value, tag)
        };
        if let Err(diagnosis) = outcome {
            report.failures.push(ArgumentFailure {
                index,
                tag,
                diagnosis,
            });
        }
    }
    report
}

/// Convert every argument for the driver, stopping at the first failure.
///
/// Runs regardless of policy, so an unconvertible value never reaches the
/// driver even with validation switched off.
///
/// # Errors
/// The first refused argument as a single-entry report error.
pub fn convert_arguments(
    args: &[Argument],
    declared: &[Option<TypeTag>],
    phase: Phase,
) -> Result<Vec<RowValues>, DbError> {
    let mut converted = Vec::with_capacity(args.len());
    for (index, arg) in args.iter().enumerate() {
        let tag = resolve_tag(declared.get(index).copied().flatten(), &arg.value);
        match coerce(&arg.value, tag) {
            Ok(value) => converted.push(value),
            Err(diagnosis) => {
                let report = ValidationReport {
                    phase,
                    failures: vec![ArgumentFailure {
                        index,
                        tag,
                        diagnosis,
                    }],
                };
                return Err(report.into_error(&ErrorContext::default(), None));
            }
        }
    }
    Ok(converted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::SqlStringable;
    use crate::error::ErrorKind;

    struct Sku(u32);

    impl SqlStringable for Sku {
        fn to_sql_string(&self) -> String {
            format!("SKU-{}", self.0)
        }
    }

    struct Unprintable;

    #[test]
    fn integer_tag_accepts_integer_representable_values() {
        assert_eq!(coerce(&ArgValue::Int(3), TypeTag::Integer), Ok(RowValues::Int(3)));
        assert_eq!(coerce(&ArgValue::from(" 42 "), TypeTag::Integer), Ok(RowValues::Int(42)));
        assert_eq!(coerce(&ArgValue::Float(2.0), TypeTag::Integer), Ok(RowValues::Int(2)));
        assert!(coerce(&ArgValue::Float(2.5), TypeTag::Integer).is_err());
        assert!(coerce(&ArgValue::from("abc"), TypeTag::Integer).is_err());
    }

    #[test]
    fn binary_tag_requires_bytes() {
        assert!(coerce(&ArgValue::Int(1), TypeTag::Binary).is_err());
        assert_eq!(
            coerce(&ArgValue::Binary(vec![0, 1]), TypeTag::Binary),
            Ok(RowValues::Blob(vec![0, 1]))
        );
    }

    #[test]
    fn stringable_objects_convert_and_opaque_ones_do_not() {
        assert_eq!(
            coerce(&ArgValue::stringable(Sku(9)), TypeTag::String),
            Ok(RowValues::Text("SKU-9".into()))
        );
        assert!(matches!(
            coerce(&ArgValue::opaque(Unprintable), TypeTag::String),
            Err(Diagnosis::NotStringConvertible { .. })
        ));
    }

    #[test]
    fn report_collects_every_failure() {
        let args = vec![
            Argument::new("x"),
            Argument::new(1_i64),
            Argument::new(ArgValue::opaque(Unprintable)),
        ];
        let tags = vec![Some(TypeTag::Integer), None, None];
        let report = validate_arguments(&args, &tags, Phase::Failure, ValidationPolicy::default());
        let indexes: Vec<usize> = report.failures.iter().map(|f| f.index).collect();
        assert_eq!(indexes, vec![0, 2]);
        let err = report.into_error(&ErrorContext::default(), None);
        assert_eq!(err.kind(), ErrorKind::ArgumentNotStringConvertible);
    }

    #[test]
    fn stringable_only_check_ignores_type_mismatch() {
        let args = vec![Argument::new("x"), Argument::new(ArgValue::opaque(Unprintable))];
        let tags = vec![Some(TypeTag::Integer), Some(TypeTag::String)];
        let policy = ValidationPolicy::from_bits(ValidationPolicy::EXECUTE_STRINGABLE).unwrap();
        let report = validate_arguments(&args, &tags, Phase::Execute, policy);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
    }

    #[test]
    fn qualified_values_must_fit_their_sql_type() {
        let small = ParamQualifier::sql_type(SqlType::SmallInt);
        assert_eq!(check_qualifier(&RowValues::Int(300), &small), Ok(()));
        assert_eq!(
            check_qualifier(&RowValues::Int(70_000), &small),
            Err(Diagnosis::OutOfRange { sql_type: SqlType::SmallInt })
        );
        let short = ParamQualifier::sql_type(SqlType::NVarChar).with_length(3);
        assert_eq!(
            check_qualifier(&RowValues::Text("abcd".into()), &short),
            Err(Diagnosis::TooLong { length: 4, limit: 3 })
        );

        let args = vec![Argument::new(1_i64), Argument::qualified(70_000_i64, small)];
        let report = validate_arguments(&args, &[], Phase::Failure, ValidationPolicy::default());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
    }

    #[test]
    fn conversion_refuses_even_without_validation() {
        let args = vec![Argument::new(ArgValue::opaque(Unprintable))];
        let err = convert_arguments(&args, &[None], Phase::Execute).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentNotStringConvertible);
    }

    #[test]
    fn floats_keep_a_decimal_point() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.25), "0.25");
    }
}
