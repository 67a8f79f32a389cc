use std::{fmt, rc::Rc};

use itertools::Itertools;
use smol_str::SmolStr;

/// Static type of a tree node.
///
/// The set is deliberately small: enough to type predicates, projections,
/// groupings and query sources. Display names follow the conventions used in
/// the canonical query model rendering (`Int32`, `IQueryable<Int32>`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Boolean,
    Int32,
    Int64,
    Double,
    String,
    Object,
    /// An in-memory enumerable sequence.
    Sequence(Rc<Type>),
    /// A query source, i.e. a sequence whose operators are parsed rather than executed.
    Queryable(Rc<Type>),
    /// A group of elements sharing a key, itself a sequence of elements.
    Grouping(Rc<Type>, Rc<Type>),
    Record(Rc<RecordType>),
    Function(Rc<[Type]>, Rc<Type>),
}

impl Type {
    pub fn sequence(item: Type) -> Self {
        Type::Sequence(Rc::new(item))
    }

    pub fn queryable(item: Type) -> Self {
        Type::Queryable(Rc::new(item))
    }

    pub fn grouping(key: Type, element: Type) -> Self {
        Type::Grouping(Rc::new(key), Rc::new(element))
    }

    pub fn function(params: impl IntoIterator<Item = Type>, ret: Type) -> Self {
        Type::Function(params.into_iter().collect(), Rc::new(ret))
    }

    /// Returns the element type for any kind of sequence.
    pub fn item_type(&self) -> Option<&Type> {
        match self {
            Type::Sequence(item) | Type::Queryable(item) => Some(item),
            Type::Grouping(_, element) => Some(element),
            _ => None,
        }
    }

    pub fn is_sequence(&self) -> bool {
        self.item_type().is_some()
    }

    pub fn is_queryable(&self) -> bool {
        matches!(self, Type::Queryable(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int32 | Type::Int64 | Type::Double)
    }

    /// Builds a sequence of `item` that keeps the container flavour of `self`.
    ///
    /// A query source stays a query source; anything else becomes an
    /// in-memory sequence.
    pub fn with_item(&self, item: Type) -> Type {
        match self {
            Type::Queryable(_) => Type::queryable(item),
            _ => Type::sequence(item),
        }
    }

    /// The type of the member `name` when read from a value of this type.
    pub fn member_type(&self, name: &str) -> Option<Type> {
        match (self, name) {
            (Type::Record(record), _) => record.field(name).cloned(),
            (Type::Grouping(key, _), "Key") => Some((**key).clone()),
            (Type::String, "Length") => Some(Type::Int32),
            (Type::Sequence(_), "Count") => Some(Type::Int32),
            _ => None,
        }
    }

    /// Whether a value of type `other` can stand where `self` is expected.
    pub fn is_assignable_from(&self, other: &Type) -> bool {
        if self == other || *self == Type::Object {
            return true;
        }

        match (self, other) {
            (Type::Sequence(item), other) => other
                .item_type()
                .is_some_and(|other_item| item.is_assignable_from(other_item)),
            (Type::Queryable(item), Type::Queryable(other_item)) => {
                item.is_assignable_from(other_item)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Boolean => write!(f, "Boolean"),
            Type::Int32 => write!(f, "Int32"),
            Type::Int64 => write!(f, "Int64"),
            Type::Double => write!(f, "Double"),
            Type::String => write!(f, "String"),
            Type::Object => write!(f, "Object"),
            Type::Sequence(item) => write!(f, "IEnumerable<{item}>"),
            Type::Queryable(item) => write!(f, "IQueryable<{item}>"),
            Type::Grouping(key, element) => write!(f, "IGrouping<{key}, {element}>"),
            Type::Record(record) => write!(f, "{}", record.name),
            Type::Function(params, ret) => {
                write!(f, "Func<")?;
                for param in params.iter() {
                    write!(f, "{param}, ")?;
                }
                write!(f, "{ret}>")
            }
        }
    }
}

/// A named record with ordered, typed fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordType {
    pub name: SmolStr,
    pub fields: Vec<(SmolStr, Type)>,
}

impl RecordType {
    pub fn new<N: Into<SmolStr>>(name: N, fields: impl IntoIterator<Item = (N, Type)>) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            fields: fields
                .into_iter()
                .map(|(field, ty)| (field.into(), ty))
                .collect(),
        })
    }

    pub fn field(&self, name: &str) -> Option<&Type> {
        self.fields
            .iter()
            .find_map(|(field, ty)| (field == name).then_some(ty))
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(field, _)| field == name)
    }

    pub fn field_names(&self) -> String {
        self.fields.iter().map(|(name, _)| name).join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::int(Type::Int32, "Int32")]
    #[case::queryable(Type::queryable(Type::Int32), "IQueryable<Int32>")]
    #[case::grouping(Type::grouping(Type::String, Type::Int32), "IGrouping<String, Int32>")]
    #[case::function(Type::function([Type::Int32], Type::Boolean), "Func<Int32, Boolean>")]
    fn test_display(#[case] ty: Type, #[case] expected: &str) {
        assert_eq!(ty.to_string(), expected);
    }

    #[rstest]
    #[case::same(Type::Int32, Type::Int32, true)]
    #[case::object(Type::Object, Type::String, true)]
    #[case::different(Type::Int32, Type::Int64, false)]
    #[case::sequence_from_queryable(
        Type::sequence(Type::Int32),
        Type::queryable(Type::Int32),
        true
    )]
    #[case::sequence_from_grouping(
        Type::sequence(Type::Int32),
        Type::grouping(Type::String, Type::Int32),
        true
    )]
    #[case::queryable_from_sequence(
        Type::queryable(Type::Int32),
        Type::sequence(Type::Int32),
        false
    )]
    fn test_is_assignable_from(#[case] target: Type, #[case] source: Type, #[case] expected: bool) {
        assert_eq!(target.is_assignable_from(&source), expected);
    }

    #[test]
    fn test_member_type() {
        let pair = RecordType::new("Pair", [("Item1", Type::Int32), ("Item2", Type::String)]);
        let ty = Type::Record(pair);

        assert_eq!(ty.member_type("Item2"), Some(Type::String));
        assert_eq!(ty.member_type("Item3"), None);
        assert_eq!(
            Type::grouping(Type::String, Type::Int32).member_type("Key"),
            Some(Type::String)
        );
    }
}
