//! Query arguments.
//!
//! Arguments are a tagged union rather than arbitrary objects: a value that
//! knows how to render itself as SQL text is wrapped as
//! [`ArgValue::Stringable`], while an object without that capability is
//! wrapped as [`ArgValue::Opaque`] and is always rejected before any native
//! call.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use chrono::NaiveDateTime;

use crate::error::DbError;

/// Explicit string conversion for objects passed as `string` arguments.
pub trait SqlStringable {
    fn to_sql_string(&self) -> String;
}

/// Declared type of an argument position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Integer,
    Float,
    String,
    Binary,
}

impl TypeTag {
    /// Parse one character of a type string (`i`, `d`, `s`, `b`).
    #[must_use]
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'i' => Some(TypeTag::Integer),
            'd' => Some(TypeTag::Float),
            's' => Some(TypeTag::String),
            'b' => Some(TypeTag::Binary),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            TypeTag::Integer => 'i',
            TypeTag::Float => 'd',
            TypeTag::String => 's',
            TypeTag::Binary => 'b',
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TypeTag::Integer => "integer",
            TypeTag::Float => "float",
            TypeTag::String => "string",
            TypeTag::Binary => "binary",
        })
    }
}

/// Split a type string into one declared tag per argument.
///
/// An empty type string means every tag is inferred from its value.
///
/// # Errors
/// `InvalidArgument` for an unknown tag character, `ArgumentCountMismatch`
/// when the type string and the argument list differ in length.
pub fn parse_type_string(types: &str, arg_count: usize) -> Result<Vec<Option<TypeTag>>, DbError> {
    if types.is_empty() {
        return Ok(vec![None; arg_count]);
    }
    let mut tags = Vec::with_capacity(arg_count);
    for (pos, c) in types.chars().enumerate() {
        let tag = TypeTag::from_char(c).ok_or_else(|| {
            DbError::invalid_argument(format!(
                "type string char '{c}' at position {pos} is not one of i, d, s, b"
            ))
        })?;
        tags.push(Some(tag));
    }
    if tags.len() != arg_count {
        return Err(DbError::count_mismatch(format!(
            "type string declares {} arguments, {arg_count} supplied",
            tags.len()
        )));
    }
    Ok(tags)
}

/// Argument value.
#[derive(Clone)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Binary(Vec<u8>),
    Timestamp(NaiveDateTime),
    /// Object with an explicit SQL string conversion.
    Stringable(Rc<dyn SqlStringable>),
    /// Object without string conversion; carries its type name for diagnostics.
    Opaque {
        type_name: &'static str,
        value: Rc<dyn Any>,
    },
}

impl ArgValue {
    pub fn stringable<T: SqlStringable + 'static>(value: T) -> Self {
        ArgValue::Stringable(Rc::new(value))
    }

    pub fn opaque<T: Any>(value: T) -> Self {
        ArgValue::Opaque {
            type_name: std::any::type_name::<T>(),
            value: Rc::new(value),
        }
    }

    /// Short runtime type label used in diagnostics.
    #[must_use]
    pub fn type_label(&self) -> &'static str {
        match self {
            ArgValue::Null => "null",
            ArgValue::Bool(_) => "bool",
            ArgValue::Int(_) => "int",
            ArgValue::Float(_) => "float",
            ArgValue::Text(_) => "text",
            ArgValue::Binary(_) => "binary",
            ArgValue::Timestamp(_) => "timestamp",
            ArgValue::Stringable(_) => "stringable object",
            ArgValue::Opaque { type_name, .. } => *type_name,
        }
    }
}

impl fmt::Debug for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Null => f.write_str("Null"),
            ArgValue::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            ArgValue::Int(i) => f.debug_tuple("Int").field(i).finish(),
            ArgValue::Float(v) => f.debug_tuple("Float").field(v).finish(),
            ArgValue::Text(s) => f.debug_tuple("Text").field(s).finish(),
            ArgValue::Binary(b) => f.debug_tuple("Binary").field(&b.len()).finish(),
            ArgValue::Timestamp(dt) => f.debug_tuple("Timestamp").field(dt).finish(),
            ArgValue::Stringable(s) => f.debug_tuple("Stringable").field(&s.to_sql_string()).finish(),
            ArgValue::Opaque { type_name, .. } => f.debug_tuple("Opaque").field(type_name).finish(),
        }
    }
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        ArgValue::Int(v)
    }
}

impl From<i32> for ArgValue {
    fn from(v: i32) -> Self {
        ArgValue::Int(i64::from(v))
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        ArgValue::Bool(v)
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        ArgValue::Float(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        ArgValue::Text(v.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        ArgValue::Text(v)
    }
}

impl From<Vec<u8>> for ArgValue {
    fn from(v: Vec<u8>) -> Self {
        ArgValue::Binary(v)
    }
}

impl From<NaiveDateTime> for ArgValue {
    fn from(v: NaiveDateTime) -> Self {
        ArgValue::Timestamp(v)
    }
}

impl<T: Into<ArgValue>> From<Option<T>> for ArgValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ArgValue::Null, Into::into)
    }
}

/// Direction of an SQL Server parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamDirection {
    #[default]
    In,
    Out,
    InOut,
}

/// SQL Server type a qualified parameter is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Bit,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    NVarChar,
    VarChar,
    VarBinary,
    DateTime2,
}

/// Native type qualifier for SQL Server arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParamQualifier {
    pub direction: ParamDirection,
    pub sql_type: Option<SqlType>,
    pub length: Option<u32>,
}

impl ParamQualifier {
    #[must_use]
    pub fn sql_type(sql_type: SqlType) -> Self {
        Self {
            direction: ParamDirection::In,
            sql_type: Some(sql_type),
            length: None,
        }
    }

    #[must_use]
    pub fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    #[must_use]
    pub fn with_direction(mut self, direction: ParamDirection) -> Self {
        self.direction = direction;
        self
    }
}

/// One positional argument.
#[derive(Debug, Clone)]
pub struct Argument {
    pub value: ArgValue,
    pub qualifier: Option<ParamQualifier>,
}

impl Argument {
    pub fn new(value: impl Into<ArgValue>) -> Self {
        Self {
            value: value.into(),
            qualifier: None,
        }
    }

    pub fn qualified(value: impl Into<ArgValue>, qualifier: ParamQualifier) -> Self {
        Self {
            value: value.into(),
            qualifier: Some(qualifier),
        }
    }
}

impl From<ArgValue> for Argument {
    fn from(value: ArgValue) -> Self {
        Argument::new(value)
    }
}

/// Build an argument list from heterogeneous values.
///
/// ```rust
/// use sql_bindcursor::args;
///
/// let list = args![1_i64, "alice", 2.5_f64];
/// assert_eq!(list.len(), 3);
/// ```
#[macro_export]
macro_rules! args {
    () => { Vec::<$crate::args::Argument>::new() };
    ($($value:expr),+ $(,)?) => {
        vec![$($crate::args::Argument::new($value)),+]
    };
}

/// Argument storage shared between the caller and a prepared query.
///
/// Mutating an entry after `prepare()` is part of the contract: the next
/// `execute()` binds whatever the bucket holds at that moment, without
/// preparing again.
///
/// ```rust
/// use sql_bindcursor::prelude::*;
///
/// let bucket = SharedArgs::new(sql_bindcursor::args![1_i64]);
/// let alias = bucket.clone();
/// alias.set(0, 2_i64).unwrap();
/// assert!(matches!(bucket.get(0), Some(ArgValue::Int(2))));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SharedArgs(Rc<RefCell<Vec<Argument>>>);

impl SharedArgs {
    #[must_use]
    pub fn new(args: Vec<Argument>) -> Self {
        Self(Rc::new(RefCell::new(args)))
    }

    /// Replace the value at `index`, keeping its qualifier.
    ///
    /// # Errors
    /// `InvalidArgument` when `index` is outside the bucket.
    pub fn set(&self, index: usize, value: impl Into<ArgValue>) -> Result<(), DbError> {
        let mut args = self.0.borrow_mut();
        let len = args.len();
        let slot = args.get_mut(index).ok_or_else(|| {
            DbError::invalid_argument(format!("argument index {index} out of range 0..{len}"))
        })?;
        slot.value = value.into();
        Ok(())
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<ArgValue> {
        self.0.borrow().get(index).map(|a| a.value.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Argument> {
        self.0.borrow().clone()
    }

    /// Whether both handles point at the same storage.
    #[must_use]
    pub fn shares_storage_with(&self, other: &SharedArgs) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn type_string_splits_per_position() {
        let tags = parse_type_string("isdb", 4).unwrap();
        assert_eq!(
            tags,
            vec![
                Some(TypeTag::Integer),
                Some(TypeTag::String),
                Some(TypeTag::Float),
                Some(TypeTag::Binary)
            ]
        );
        assert_eq!(parse_type_string("", 2).unwrap(), vec![None, None]);
    }

    #[test]
    fn type_string_errors() {
        let err = parse_type_string("ix", 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = parse_type_string("ii", 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentCountMismatch);
    }

    #[test]
    fn shared_args_alias_storage() {
        let bucket = SharedArgs::new(vec![Argument::new(1_i64), Argument::new("a")]);
        let alias = bucket.clone();
        alias.set(1, "b").unwrap();
        assert!(matches!(bucket.get(1), Some(ArgValue::Text(ref s)) if s == "b"));
        assert!(bucket.shares_storage_with(&alias));
        assert_eq!(
            bucket.set(5, 1_i64).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }
}
