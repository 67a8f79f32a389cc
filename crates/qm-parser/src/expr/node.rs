use std::{fmt, rc::Rc};

use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::{
    error::typing::TypeError,
    eval::error::EvalError,
    types::{RecordType, Type},
    value::Value,
};

use super::extension::ExtensionExpr;

pub type Args = SmallVec<[Rc<Expr>; 4]>;
pub type Params = SmallVec<[Rc<Parameter>; 2]>;
pub type NativeFn = fn(Option<&Value>, &[Value]) -> Result<Value, EvalError>;

/// A lambda parameter.
///
/// Parameters are compared by identity: two parameters with the same name and
/// type are still different parameters.
#[derive(Debug)]
pub struct Parameter {
    pub name: SmolStr,
    pub ty: Type,
}

impl Parameter {
    pub fn new(name: impl Into<SmolStr>, ty: Type) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            ty,
        })
    }
}

#[derive(Clone)]
pub enum MethodKind {
    /// A chained query operator such as `Where` or `Select`.
    QueryOperator,
    /// A method with an in-memory implementation, usable for folding.
    Native(NativeFn),
    /// A method that can only be translated, never run in memory.
    Opaque,
}

impl fmt::Debug for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodKind::QueryOperator => write!(f, "QueryOperator"),
            MethodKind::Native(_) => write!(f, "Native"),
            MethodKind::Opaque => write!(f, "Opaque"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Method {
    pub declaring_type: SmolStr,
    pub name: SmolStr,
    pub type_args: SmallVec<[Type; 1]>,
    pub return_type: Type,
    pub kind: MethodKind,
}

impl Method {
    pub const QUERYABLE: &'static str = "Queryable";

    pub fn query_operator(
        name: impl Into<SmolStr>,
        type_args: impl IntoIterator<Item = Type>,
        return_type: Type,
    ) -> Rc<Self> {
        Rc::new(Self {
            declaring_type: Self::QUERYABLE.into(),
            name: name.into(),
            type_args: type_args.into_iter().collect(),
            return_type,
            kind: MethodKind::QueryOperator,
        })
    }

    pub fn native(
        declaring_type: impl Into<SmolStr>,
        name: impl Into<SmolStr>,
        return_type: Type,
        func: NativeFn,
    ) -> Rc<Self> {
        Rc::new(Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            type_args: SmallVec::new(),
            return_type,
            kind: MethodKind::Native(func),
        })
    }

    pub fn opaque(
        declaring_type: impl Into<SmolStr>,
        name: impl Into<SmolStr>,
        return_type: Type,
    ) -> Rc<Self> {
        Rc::new(Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            type_args: SmallVec::new(),
            return_type,
            kind: MethodKind::Opaque,
        })
    }

    pub fn is_query_operator(&self) -> bool {
        matches!(self.kind, MethodKind::QueryOperator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    AndAlso,
    OrElse,
    Coalesce,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::AndAlso => "&&",
            BinaryOp::OrElse => "||",
            BinaryOp::Coalesce => "??",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::AndAlso | BinaryOp::OrElse)
    }

    fn result_type(&self, left: &Type, right: &Type) -> Type {
        if self.is_comparison() || self.is_logical() {
            return Type::Boolean;
        }

        match (self, left, right) {
            (BinaryOp::Coalesce, left, _) => left.clone(),
            (BinaryOp::Add, Type::String, _) | (BinaryOp::Add, _, Type::String) => Type::String,
            (_, Type::Double, _) | (_, _, Type::Double) => Type::Double,
            (_, Type::Int64, _) | (_, _, Type::Int64) => Type::Int64,
            (_, left, _) => left.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Negate,
    /// Conversion to the static type of the node.
    Convert,
}

/// Tag identifying the kind of a node, used to key rewrite rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Constant,
    Parameter,
    Binary,
    Unary,
    Call,
    Member,
    Conditional,
    New,
    ListInit,
    Lambda,
    Extension(&'static str),
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Extension(name) => write!(f, "Extension({name})"),
            kind => write!(f, "{kind:?}"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Constant(Value),
    Parameter(Rc<Parameter>),
    Binary {
        op: BinaryOp,
        left: Rc<Expr>,
        right: Rc<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Rc<Expr>,
    },
    Call {
        method: Rc<Method>,
        object: Option<Rc<Expr>>,
        args: Args,
    },
    /// Member read; `object` is `None` for a static member.
    Member {
        object: Option<Rc<Expr>>,
        name: SmolStr,
    },
    Conditional {
        test: Rc<Expr>,
        if_true: Rc<Expr>,
        if_false: Rc<Expr>,
    },
    New {
        record: Rc<RecordType>,
        args: Args,
    },
    ListInit {
        items: Args,
    },
    Lambda {
        params: Params,
        body: Rc<Expr>,
    },
    Extension(Rc<dyn ExtensionExpr>),
}

/// An immutable tree node with its static type.
#[derive(Debug, Clone)]
pub struct Expr {
    kind: ExprKind,
    ty: Type,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type) -> Rc<Self> {
        Rc::new(Self { kind, ty })
    }

    pub fn constant(value: impl Into<Value>) -> Rc<Self> {
        let value = value.into();
        let ty = value.ty();
        Self::new(ExprKind::Constant(value), ty)
    }

    pub fn typed_constant(value: Value, ty: Type) -> Rc<Self> {
        Self::new(ExprKind::Constant(value), ty)
    }

    pub fn parameter(param: &Rc<Parameter>) -> Rc<Self> {
        Self::new(ExprKind::Parameter(Rc::clone(param)), param.ty.clone())
    }

    pub fn binary(op: BinaryOp, left: Rc<Expr>, right: Rc<Expr>) -> Rc<Self> {
        let ty = op.result_type(left.ty(), right.ty());
        Self::new(ExprKind::Binary { op, left, right }, ty)
    }

    pub fn not(operand: Rc<Expr>) -> Rc<Self> {
        Self::new(
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            },
            Type::Boolean,
        )
    }

    pub fn negate(operand: Rc<Expr>) -> Rc<Self> {
        let ty = operand.ty().clone();
        Self::new(
            ExprKind::Unary {
                op: UnaryOp::Negate,
                operand,
            },
            ty,
        )
    }

    pub fn convert(operand: Rc<Expr>, ty: Type) -> Rc<Self> {
        Self::new(
            ExprKind::Unary {
                op: UnaryOp::Convert,
                operand,
            },
            ty,
        )
    }

    pub fn call(
        method: Rc<Method>,
        object: Option<Rc<Expr>>,
        args: impl IntoIterator<Item = Rc<Expr>>,
    ) -> Rc<Self> {
        let ty = method.return_type.clone();
        Self::new(
            ExprKind::Call {
                method,
                object,
                args: args.into_iter().collect(),
            },
            ty,
        )
    }

    pub fn member(object: Option<Rc<Expr>>, name: impl Into<SmolStr>, ty: Type) -> Rc<Self> {
        Self::new(
            ExprKind::Member {
                object,
                name: name.into(),
            },
            ty,
        )
    }

    /// Reads a member whose type is known from the object's type.
    pub fn field(object: Rc<Expr>, name: impl Into<SmolStr>) -> Result<Rc<Self>, TypeError> {
        let name = name.into();
        let ty = object
            .ty()
            .member_type(&name)
            .ok_or_else(|| TypeError::UnknownMember {
                ty: object.ty().clone(),
                member: name.clone(),
            })?;
        Ok(Self::member(Some(object), name, ty))
    }

    pub fn conditional(test: Rc<Expr>, if_true: Rc<Expr>, if_false: Rc<Expr>) -> Rc<Self> {
        let ty = if_true.ty().clone();
        Self::new(
            ExprKind::Conditional {
                test,
                if_true,
                if_false,
            },
            ty,
        )
    }

    pub fn new_record(record: &Rc<RecordType>, args: impl IntoIterator<Item = Rc<Expr>>) -> Rc<Self> {
        Self::new(
            ExprKind::New {
                record: Rc::clone(record),
                args: args.into_iter().collect(),
            },
            Type::Record(Rc::clone(record)),
        )
    }

    pub fn list(item_type: Type, items: impl IntoIterator<Item = Rc<Expr>>) -> Rc<Self> {
        Self::new(
            ExprKind::ListInit {
                items: items.into_iter().collect(),
            },
            Type::sequence(item_type),
        )
    }

    pub fn lambda(params: impl IntoIterator<Item = Rc<Parameter>>, body: Rc<Expr>) -> Rc<Self> {
        let params: Params = params.into_iter().collect();
        let ty = Type::function(params.iter().map(|p| p.ty.clone()), body.ty().clone());
        Self::new(ExprKind::Lambda { params, body }, ty)
    }

    pub fn extension(extension: Rc<dyn ExtensionExpr>) -> Rc<Self> {
        let ty = extension.ty();
        Self::new(ExprKind::Extension(extension), ty)
    }

    #[inline(always)]
    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    #[inline(always)]
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn node_kind(&self) -> NodeKind {
        match &self.kind {
            ExprKind::Constant(_) => NodeKind::Constant,
            ExprKind::Parameter(_) => NodeKind::Parameter,
            ExprKind::Binary { .. } => NodeKind::Binary,
            ExprKind::Unary { .. } => NodeKind::Unary,
            ExprKind::Call { .. } => NodeKind::Call,
            ExprKind::Member { .. } => NodeKind::Member,
            ExprKind::Conditional { .. } => NodeKind::Conditional,
            ExprKind::New { .. } => NodeKind::New,
            ExprKind::ListInit { .. } => NodeKind::ListInit,
            ExprKind::Lambda { .. } => NodeKind::Lambda,
            ExprKind::Extension(extension) => NodeKind::Extension(extension.name()),
        }
    }

    /// Direct children in evaluation order. Extensions are opaque here.
    pub fn children(&self) -> SmallVec<[&Rc<Expr>; 4]> {
        match &self.kind {
            ExprKind::Constant(_) | ExprKind::Parameter(_) | ExprKind::Extension(_) => {
                SmallVec::new()
            }
            ExprKind::Binary { left, right, .. } => smallvec::smallvec![left, right],
            ExprKind::Unary { operand, .. } => smallvec::smallvec![operand],
            ExprKind::Call { object, args, .. } => object.iter().chain(args.iter()).collect(),
            ExprKind::Member { object, .. } => object.iter().collect(),
            ExprKind::Conditional {
                test,
                if_true,
                if_false,
            } => smallvec::smallvec![test, if_true, if_false],
            ExprKind::New { args, .. } => args.iter().collect(),
            ExprKind::ListInit { items } => items.iter().collect(),
            ExprKind::Lambda { body, .. } => smallvec::smallvec![body],
        }
    }

    pub fn as_lambda(&self) -> Option<(&[Rc<Parameter>], &Rc<Expr>)> {
        match &self.kind {
            ExprKind::Lambda { params, body } => Some((params.as_slice(), body)),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&Value> {
        match &self.kind {
            ExprKind::Constant(value) => Some(value),
            _ => None,
        }
    }

    /// Downcasts an extension node to its concrete type.
    pub fn as_extension<T: ExtensionExpr>(&self) -> Option<&T> {
        match &self.kind {
            ExprKind::Extension(extension) => extension.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn is_lambda(&self) -> bool {
        matches!(self.kind, ExprKind::Lambda { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::int_add(BinaryOp::Add, Type::Int32, Type::Int32, Type::Int32)]
    #[case::promote_long(BinaryOp::Multiply, Type::Int32, Type::Int64, Type::Int64)]
    #[case::promote_double(BinaryOp::Subtract, Type::Int64, Type::Double, Type::Double)]
    #[case::string_concat(BinaryOp::Add, Type::String, Type::Int32, Type::String)]
    #[case::comparison(BinaryOp::GreaterThan, Type::Int32, Type::Int32, Type::Boolean)]
    #[case::logical(BinaryOp::AndAlso, Type::Boolean, Type::Boolean, Type::Boolean)]
    fn test_binary_type(
        #[case] op: BinaryOp,
        #[case] left: Type,
        #[case] right: Type,
        #[case] expected: Type,
    ) {
        let left = Expr::new(ExprKind::Constant(Value::Null), left);
        let right = Expr::new(ExprKind::Constant(Value::Null), right);
        assert_eq!(*Expr::binary(op, left, right).ty(), expected);
    }

    #[test]
    fn test_lambda_type() {
        let x = Parameter::new("x", Type::Int32);
        let body = Expr::binary(
            BinaryOp::GreaterThan,
            Expr::parameter(&x),
            Expr::constant(10),
        );
        let lambda = Expr::lambda([x], body);

        assert_eq!(
            *lambda.ty(),
            Type::function([Type::Int32], Type::Boolean)
        );
        assert_eq!(lambda.node_kind(), NodeKind::Lambda);
    }

    #[test]
    fn test_field_unknown_member() {
        let pair = RecordType::new("Pair", [("Item1", Type::Int32)]);
        let object = Expr::new_record(&pair, [Expr::constant(1)]);

        assert!(Expr::field(Rc::clone(&object), "Item1").is_ok());
        assert_eq!(
            Expr::field(object, "Item9").unwrap_err(),
            TypeError::UnknownMember {
                ty: Type::Record(pair),
                member: "Item9".into(),
            }
        );
    }

    #[test]
    fn test_children_order() {
        let test = Expr::constant(true);
        let if_true = Expr::constant(1);
        let if_false = Expr::constant(2);
        let conditional = Expr::conditional(
            Rc::clone(&test),
            Rc::clone(&if_true),
            Rc::clone(&if_false),
        );
        let children = conditional.children();

        assert_eq!(children.len(), 3);
        assert!(Rc::ptr_eq(children[0], &test));
        assert!(Rc::ptr_eq(children[2], &if_false));
    }
}
