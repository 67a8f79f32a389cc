use std::{any::Any, fmt, rc::Rc};

use rustc_hash::FxHashSet;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    error::InnerError,
    eval::{Evaluator, error::EvalError},
    expr::{Expr, ExprKind, ExtensionExpr, Method, MethodKind},
    model::{QuerySourceReference, SubQueryExpr},
    types::Type,
    value::Value,
    visitor::{VisitResult, Visitor, dispatch},
};

/// What to do when folding a parameter-independent sub-tree fails.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvaluationErrorPolicy {
    /// Keep the original sub-tree behind a [`PartialEvaluationFailure`] node,
    /// so the failure surfaces when the query is executed.
    #[default]
    Defer,
    /// Abort the parse with an evaluation error.
    Propagate,
}

/// Caller-supplied policy deciding which nodes may be folded.
///
/// Parameters, lambdas, query source references and sub-queries are never
/// evaluatable regardless of the filter.
pub trait EvaluatableFilter {
    fn is_evaluatable_call(&self, _method: &Method) -> bool {
        true
    }

    fn is_evaluatable_member(&self, _object: &Expr, _name: &str) -> bool {
        true
    }

    /// Extensions are excluded unless nominated here and reducible.
    fn is_evaluatable_extension(&self, _extension: &dyn ExtensionExpr) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEvaluatableFilter;

impl EvaluatableFilter for DefaultEvaluatableFilter {}

/// Marks a sub-tree whose folding failed.
///
/// Reduces to the original sub-tree; evaluating the node re-raises the
/// recorded failure.
#[derive(Debug)]
pub struct PartialEvaluationFailure {
    error: EvalError,
    evaluated: Rc<Expr>,
}

impl PartialEvaluationFailure {
    pub const NAME: &'static str = "PartialEvaluationFailure";

    pub fn expr(error: EvalError, evaluated: Rc<Expr>) -> Rc<Expr> {
        Expr::extension(Rc::new(Self { error, evaluated }))
    }

    pub fn error(&self) -> &EvalError {
        &self.error
    }

    pub fn evaluated(&self) -> &Rc<Expr> {
        &self.evaluated
    }
}

impl ExtensionExpr for PartialEvaluationFailure {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn ty(&self) -> Type {
        self.evaluated.ty().clone()
    }

    fn visit_children(&self, this: &Rc<Expr>, visitor: &mut dyn Visitor) -> VisitResult {
        let evaluated = visitor.visit(&self.evaluated)?;

        if Rc::ptr_eq(&evaluated, &self.evaluated) {
            Ok(Rc::clone(this))
        } else {
            Ok(Self::expr(self.error.clone(), evaluated))
        }
    }

    fn reduce(&self) -> Option<Rc<Expr>> {
        Some(Rc::clone(&self.evaluated))
    }

    fn fmt_expr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartialEvalException (\"{}\", {})", self.error, self.evaluated)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Folds every maximal parameter-independent sub-tree of `tree` into a constant.
pub fn evaluate_independent_subtrees(
    tree: &Rc<Expr>,
    filter: &dyn EvaluatableFilter,
    policy: EvaluationErrorPolicy,
) -> VisitResult {
    let evaluatable = find_evaluatable_subtrees(tree, filter);
    tracing::trace!(count = evaluatable.len(), "found evaluatable nodes");

    SubtreeEvaluator {
        evaluatable: &evaluatable,
        policy,
        evaluator: Evaluator::new(),
    }
    .visit(tree)
}

/// Marks every node that can be evaluated without parameters.
///
/// Post-order over an explicit stack: a node is decided once all of its
/// children are.
fn find_evaluatable_subtrees(
    tree: &Rc<Expr>,
    filter: &dyn EvaluatableFilter,
) -> FxHashSet<*const Expr> {
    let mut evaluatable = FxHashSet::default();
    let mut stack: Vec<(&Rc<Expr>, bool)> = vec![(tree, false)];

    while let Some((expr, children_done)) = stack.pop() {
        if !children_done {
            stack.push((expr, true));
            stack.extend(expr.children().into_iter().map(|child| (child, false)));
            continue;
        }

        let children_evaluatable = expr
            .children()
            .iter()
            .all(|child| evaluatable.contains(&Rc::as_ptr(child)));

        if children_evaluatable && is_evaluatable_node(expr, filter) {
            evaluatable.insert(Rc::as_ptr(expr));
        }
    }

    evaluatable
}

fn is_evaluatable_node(expr: &Expr, filter: &dyn EvaluatableFilter) -> bool {
    if expr.ty().is_queryable() {
        return false;
    }

    match expr.kind() {
        ExprKind::Constant(value) => !matches!(value, Value::Source(_)),
        ExprKind::Parameter(_) | ExprKind::Lambda { .. } => false,
        ExprKind::Binary { .. }
        | ExprKind::Unary { .. }
        | ExprKind::Conditional { .. }
        | ExprKind::New { .. }
        | ExprKind::ListInit { .. } => true,
        ExprKind::Call {
            method,
            object,
            args,
        } => {
            matches!(method.kind, MethodKind::Native(_))
                && filter.is_evaluatable_call(method)
                && object
                    .iter()
                    .chain(args.iter())
                    .all(|operand| !operand.ty().is_queryable())
        }
        ExprKind::Member {
            object: Some(object),
            name,
        } => !object.ty().is_queryable() && filter.is_evaluatable_member(object, name),
        ExprKind::Member { object: None, .. } => false,
        ExprKind::Extension(extension) => {
            !matches!(
                extension.name(),
                QuerySourceReference::NAME | SubQueryExpr::NAME | PartialEvaluationFailure::NAME
            ) && filter.is_evaluatable_extension(extension.as_ref())
                && extension.reduce().is_some()
        }
    }
}

/// Replaces the outermost evaluatable nodes with their values.
struct SubtreeEvaluator<'a> {
    evaluatable: &'a FxHashSet<*const Expr>,
    policy: EvaluationErrorPolicy,
    evaluator: Evaluator,
}

impl SubtreeEvaluator<'_> {
    fn fold(&self, expr: &Rc<Expr>) -> VisitResult {
        match self.evaluator.evaluate(expr) {
            Ok(value) => {
                tracing::trace!(%expr, %value, "folded sub-tree");
                Ok(Expr::typed_constant(value, expr.ty().clone()))
            }
            Err(err) => match self.policy {
                EvaluationErrorPolicy::Defer => {
                    tracing::debug!(%expr, error = %err, "deferring evaluation failure");
                    Ok(PartialEvaluationFailure::expr(err, Rc::clone(expr)))
                }
                EvaluationErrorPolicy::Propagate => Err(InnerError::Evaluation {
                    expression: expr.to_string(),
                    cause: err,
                }),
            },
        }
    }
}

impl Visitor for SubtreeEvaluator<'_> {
    fn visit(&mut self, expr: &Rc<Expr>) -> VisitResult {
        if self.evaluatable.contains(&Rc::as_ptr(expr)) {
            return match expr.kind() {
                ExprKind::Constant(_) => Ok(Rc::clone(expr)),
                _ => self.fold(expr),
            };
        }

        match expr.kind() {
            ExprKind::Extension(_) => Ok(Rc::clone(expr)),
            _ => dispatch(self, expr),
        }
    }
}
