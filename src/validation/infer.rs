use crate::args::{ArgValue, TypeTag};

/// Derive a type tag from a value when none was declared.
///
/// Total over every value: objects default to `String`, leaving the
/// string-conversion check to the validator.
#[must_use]
pub fn infer_tag(value: &ArgValue) -> TypeTag {
    match value {
        ArgValue::Bool(_) | ArgValue::Int(_) => TypeTag::Integer,
        ArgValue::Float(_) => TypeTag::Float,
        ArgValue::Binary(_) => TypeTag::Binary,
        ArgValue::Null
        | ArgValue::Text(_)
        | ArgValue::Timestamp(_)
        | ArgValue::Stringable(_)
        | ArgValue::Opaque { .. } => TypeTag::String,
    }
}

/// Declared tag if present, inferred otherwise.
#[must_use]
pub fn resolve_tag(declared: Option<TypeTag>, value: &ArgValue) -> TypeTag {
    declared.unwrap_or_else(|| infer_tag(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Money;

    #[test]
    fn infers_every_variant() {
        assert_eq!(infer_tag(&ArgValue::Bool(true)), TypeTag::Integer);
        assert_eq!(infer_tag(&ArgValue::Int(4)), TypeTag::Integer);
        assert_eq!(infer_tag(&ArgValue::Float(0.5)), TypeTag::Float);
        assert_eq!(infer_tag(&ArgValue::Binary(vec![1])), TypeTag::Binary);
        assert_eq!(infer_tag(&ArgValue::from("x")), TypeTag::String);
        assert_eq!(infer_tag(&ArgValue::Null), TypeTag::String);
        assert_eq!(infer_tag(&ArgValue::opaque(Money)), TypeTag::String);
    }

    #[test]
    fn declared_tag_wins() {
        assert_eq!(
            resolve_tag(Some(TypeTag::Binary), &ArgValue::from("x")),
            TypeTag::Binary
        );
    }
}
