use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use super::node::{Expr, ExprKind, UnaryOp};

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Constant(value) => write!(f, "{value}"),
            ExprKind::Parameter(param) => write!(f, "{}", param.name),
            ExprKind::Binary { op, left, right } => {
                write!(f, "({left} {} {right})", op.symbol())
            }
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => write!(f, "Not({operand})"),
            ExprKind::Unary {
                op: UnaryOp::Negate,
                operand,
            } => write!(f, "-{operand}"),
            ExprKind::Unary {
                op: UnaryOp::Convert,
                operand,
            } => write!(f, "Convert({operand}, {})", self.ty()),
            ExprKind::Call {
                method,
                object,
                args,
            } => {
                if let Some(object) = object {
                    write!(f, "{object}.")?;
                }
                write!(f, "{}", method.name)?;
                if !method.type_args.is_empty() {
                    write!(f, "<{}>", method.type_args.iter().join(", "))?;
                }
                write!(f, "({})", args.iter().join(", "))
            }
            ExprKind::Member {
                object: Some(object),
                name,
            } => write!(f, "{object}.{name}"),
            ExprKind::Member { object: None, name } => write!(f, "{name}"),
            ExprKind::Conditional {
                test,
                if_true,
                if_false,
            } => write!(f, "IIF({test}, {if_true}, {if_false})"),
            ExprKind::New { record, args } => write!(
                f,
                "new {}({})",
                record.name,
                record
                    .fields
                    .iter()
                    .zip(args.iter())
                    .map(|((name, _), arg)| format!("{name} = {arg}"))
                    .join(", ")
            ),
            ExprKind::ListInit { items } => write!(f, "{{{}}}", items.iter().join(", ")),
            ExprKind::Lambda { params, body } => match params.as_slice() {
                [param] => write!(f, "{} => {body}", param.name),
                params => write!(
                    f,
                    "({}) => {body}",
                    params.iter().map(|param| &param.name).join(", ")
                ),
            },
            ExprKind::Extension(extension) => extension.fmt_expr(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use rstest::rstest;

    use super::*;
    use crate::{
        expr::node::{BinaryOp, Method, Parameter},
        types::{RecordType, Type},
    };

    fn x() -> Rc<Parameter> {
        Parameter::new("x", Type::Int32)
    }

    #[rstest]
    #[case::binary(
        Expr::binary(BinaryOp::Add, Expr::constant(2), Expr::constant(3)),
        "(2 + 3)"
    )]
    #[case::not(Expr::not(Expr::constant(true)), "Not(true)")]
    #[case::negate(Expr::negate(Expr::constant(1)), "-1")]
    #[case::convert(Expr::convert(Expr::constant(1), Type::Int64), "Convert(1, Int64)")]
    #[case::conditional(
        Expr::conditional(Expr::constant(true), Expr::constant(1), Expr::constant(2)),
        "IIF(true, 1, 2)"
    )]
    #[case::list(
        Expr::list(Type::Int32, [Expr::constant(1), Expr::constant(2)]),
        "{1, 2}"
    )]
    #[case::generic_call(
        Expr::call(
            Method::query_operator("Cast", [Type::Int64], Type::queryable(Type::Int64)),
            None,
            [Expr::constant(1)]
        ),
        "Cast<Int64>(1)"
    )]
    fn test_display(#[case] expr: Rc<Expr>, #[case] expected: &str) {
        assert_eq!(expr.to_string(), expected);
    }

    #[test]
    fn test_display_lambda_with_new() {
        let x = x();
        let pair = RecordType::new("Pair", [("Item1", Type::Int32), ("Item2", Type::Int32)]);
        let body = Expr::new_record(
            &pair,
            [
                Expr::parameter(&x),
                Expr::binary(BinaryOp::Multiply, Expr::parameter(&x), Expr::constant(2)),
            ],
        );

        assert_eq!(
            Expr::lambda([x], body).to_string(),
            "x => new Pair(Item1 = x, Item2 = (x * 2))"
        );
    }

    #[test]
    fn test_display_multi_parameter_lambda() {
        let a = Parameter::new("a", Type::Int32);
        let b = Parameter::new("b", Type::Int32);
        let body = Expr::binary(BinaryOp::Add, Expr::parameter(&a), Expr::parameter(&b));

        assert_eq!(Expr::lambda([a, b], body).to_string(), "(a, b) => (a + b)");
    }
}
