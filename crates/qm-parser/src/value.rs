use std::{fmt, rc::Rc};

use itertools::Itertools;
use smol_str::SmolStr;

use crate::types::{RecordType, Type};

/// A named query source, the terminal constant a chain starts from.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    pub name: SmolStr,
    pub item_type: Type,
}

impl DataSource {
    pub fn new(name: impl Into<SmolStr>, item_type: Type) -> Self {
        Self {
            name: name.into(),
            item_type,
        }
    }
}

/// A record instance produced by evaluating a new-object node.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordValue {
    pub record: Rc<RecordType>,
    pub fields: Vec<Value>,
}

impl RecordValue {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.record
            .field_index(name)
            .and_then(|index| self.fields.get(index))
    }
}

/// A constant value held by a constant node.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(SmolStr),
    Array(Rc<Vec<Value>>),
    Record(Rc<RecordValue>),
    Source(DataSource),
}

impl Value {
    /// The natural static type of this value.
    pub fn ty(&self) -> Type {
        match self {
            Value::Null => Type::Object,
            Value::Boolean(_) => Type::Boolean,
            Value::Int32(_) => Type::Int32,
            Value::Int64(_) => Type::Int64,
            Value::Double(_) => Type::Double,
            Value::String(_) => Type::String,
            Value::Array(items) => {
                Type::sequence(items.first().map(Value::ty).unwrap_or(Type::Object))
            }
            Value::Record(record) => Type::Record(Rc::clone(&record.record)),
            Value::Source(source) => Type::queryable(source.item_type.clone()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Record(_) => "record",
            Value::Source(_) => "source",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.into())
    }
}

impl From<DataSource> for Value {
    fn from(value: DataSource) -> Self {
        Value::Source(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Int32(n) => write!(f, "{n}"),
            Value::Int64(n) => write!(f, "{n}"),
            Value::Double(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "\"{s}\""),
            Value::Array(items) => write!(f, "{{{}}}", items.iter().join(", ")),
            Value::Record(record) => write!(
                f,
                "{} {{ {} }}",
                record.record.name,
                record
                    .record
                    .fields
                    .iter()
                    .zip(record.fields.iter())
                    .map(|((name, _), value)| format!("{name} = {value}"))
                    .join(", ")
            ),
            Value::Source(source) => write!(f, "{}", source.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::null(Value::Null, "null")]
    #[case::int(Value::Int32(10), "10")]
    #[case::string(Value::from("abc"), "\"abc\"")]
    #[case::array(Value::Array(Rc::new(vec![1.into(), 2.into()])), "{1, 2}")]
    #[case::source(Value::from(DataSource::new("Source", Type::Int32)), "Source")]
    fn test_display(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(value.to_string(), expected);
    }

    #[test]
    fn test_source_type_is_queryable() {
        let value = Value::from(DataSource::new("Source", Type::Int32));
        assert_eq!(value.ty(), Type::queryable(Type::Int32));
    }

    #[test]
    fn test_record_field_lookup() {
        let pair = RecordType::new("Pair", [("Item1", Type::Int32), ("Item2", Type::Int32)]);
        let value = RecordValue {
            record: pair,
            fields: vec![1.into(), 2.into()],
        };

        assert_eq!(value.get("Item2"), Some(&Value::Int32(2)));
        assert_eq!(value.get("Item3"), None);
    }
}
