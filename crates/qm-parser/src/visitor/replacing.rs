use std::rc::Rc;

use crate::{
    expr::{Expr, ExprKind, Parameter},
    model::{QuerySourceReference, SubQueryExpr},
};

use super::{QueryExprVisitor, UnknownKindPolicy, VisitResult, Visitor, dispatch};

#[derive(Debug)]
enum Target<'a> {
    Parameter(&'a Rc<Parameter>),
    Node(&'a Rc<Expr>),
}

/// Replaces every occurrence of one parameter, or of one node, with another tree.
///
/// Sub-query models found along the way are updated in place. Opaque extension
/// nodes are passed through unchanged.
#[derive(Debug)]
pub struct ReplacingVisitor<'a> {
    target: Target<'a>,
    replacement: &'a Rc<Expr>,
}

impl<'a> ReplacingVisitor<'a> {
    pub fn replace_parameter(
        parameter: &'a Rc<Parameter>,
        replacement: &'a Rc<Expr>,
        tree: &Rc<Expr>,
    ) -> VisitResult {
        Self {
            target: Target::Parameter(parameter),
            replacement,
        }
        .visit(tree)
    }

    pub fn replace_node(
        target: &'a Rc<Expr>,
        replacement: &'a Rc<Expr>,
        tree: &Rc<Expr>,
    ) -> VisitResult {
        Self {
            target: Target::Node(target),
            replacement,
        }
        .visit(tree)
    }

    fn is_target(&self, expr: &Rc<Expr>) -> bool {
        match (&self.target, expr.kind()) {
            (Target::Parameter(target), ExprKind::Parameter(param)) => Rc::ptr_eq(target, param),
            (Target::Parameter(_), _) => false,
            (Target::Node(target), _) => Rc::ptr_eq(target, expr),
        }
    }
}

impl Visitor for ReplacingVisitor<'_> {
    fn visit(&mut self, expr: &Rc<Expr>) -> VisitResult {
        if self.is_target(expr) {
            return Ok(Rc::clone(self.replacement));
        }

        dispatch(self, expr)
    }

    fn unknown_kind_policy(&self) -> UnknownKindPolicy {
        UnknownKindPolicy::PassThrough
    }

    fn query_capability(&mut self) -> Option<&mut dyn QueryExprVisitor> {
        Some(self)
    }
}

impl QueryExprVisitor for ReplacingVisitor<'_> {
    fn visit_query_source_reference(
        &mut self,
        expr: &Rc<Expr>,
        _reference: &QuerySourceReference,
    ) -> VisitResult {
        Ok(Rc::clone(expr))
    }

    fn visit_sub_query(&mut self, expr: &Rc<Expr>, sub_query: &SubQueryExpr) -> VisitResult {
        sub_query
            .model_mut()
            .transform_expressions(&mut |e| self.visit(e))?;
        Ok(Rc::clone(expr))
    }
}
