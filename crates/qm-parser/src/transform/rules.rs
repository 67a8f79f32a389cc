use std::rc::Rc;

use crate::{
    error::transform::TransformError,
    expr::{Expr, ExprKind, NodeKind, UnaryOp},
    value::Value,
};

use super::{RewriteRule, TransformationRegistry};

pub(super) fn register_defaults(registry: &mut TransformationRegistry) {
    registry.register(RewriteRule::new(
        "double_negation",
        [NodeKind::Unary],
        double_negation,
    ));
    registry.register(RewriteRule::new(
        "member_of_new",
        [NodeKind::Member],
        member_of_new,
    ));
    registry.register(RewriteRule::new(
        "constant_condition",
        [NodeKind::Conditional],
        constant_condition,
    ));
}

/// `Not(Not(x))` => `x`
fn double_negation(expr: &Rc<Expr>) -> Result<Rc<Expr>, TransformError> {
    if let ExprKind::Unary {
        op: UnaryOp::Not,
        operand,
    } = expr.kind()
        && let ExprKind::Unary {
            op: UnaryOp::Not,
            operand: inner,
        } = operand.kind()
    {
        return Ok(Rc::clone(inner));
    }

    Ok(Rc::clone(expr))
}

/// `new Pair(Item1 = a, Item2 = b).Item2` => `b`
fn member_of_new(expr: &Rc<Expr>) -> Result<Rc<Expr>, TransformError> {
    if let ExprKind::Member {
        object: Some(object),
        name,
    } = expr.kind()
        && let ExprKind::New { record, args } = object.kind()
        && let Some(arg) = record.field_index(name).and_then(|index| args.get(index))
    {
        return Ok(Rc::clone(arg));
    }

    Ok(Rc::clone(expr))
}

/// `IIF(true, a, b)` => `a`
fn constant_condition(expr: &Rc<Expr>) -> Result<Rc<Expr>, TransformError> {
    if let ExprKind::Conditional {
        test,
        if_true,
        if_false,
    } = expr.kind()
        && let Some(Value::Boolean(test)) = test.as_constant()
    {
        return Ok(Rc::clone(if *test { if_true } else { if_false }));
    }

    Ok(Rc::clone(expr))
}
