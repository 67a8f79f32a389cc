mod replacing;

use std::rc::Rc;

use smallvec::SmallVec;

pub use replacing::ReplacingVisitor;

use crate::{
    error::{InnerError, recognition::RecognitionError, typing::TypeError},
    expr::{Args, Expr, ExprKind},
    model::{QuerySourceReference, SubQueryExpr},
};

pub type VisitResult = Result<Rc<Expr>, InnerError>;

/// What a visitor does with an extension node it cannot look into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownKindPolicy {
    #[default]
    Reject,
    PassThrough,
}

/// Upcast to a trait object, so default methods can re-enter dispatch.
pub trait AsDynVisitor {
    fn as_dyn(&mut self) -> &mut dyn Visitor;
}

impl<T: Visitor> AsDynVisitor for T {
    fn as_dyn(&mut self) -> &mut dyn Visitor {
        self
    }
}

/// Handlers for the query model's own extension nodes.
///
/// Visitors that return themselves from [`Visitor::query_capability`] receive
/// query source references and sub-queries here instead of through
/// [`Visitor::visit_extension`].
pub trait QueryExprVisitor {
    fn visit_query_source_reference(
        &mut self,
        expr: &Rc<Expr>,
        reference: &QuerySourceReference,
    ) -> VisitResult;

    fn visit_sub_query(&mut self, expr: &Rc<Expr>, sub_query: &SubQueryExpr) -> VisitResult;
}

/// Identity-preserving tree visitor.
///
/// Every method returns the node to use in place of the visited one. The
/// default implementations rebuild a parent only when one of its children was
/// replaced, so visiting without changes returns the input `Rc`.
pub trait Visitor: AsDynVisitor {
    fn visit(&mut self, expr: &Rc<Expr>) -> VisitResult {
        dispatch(self.as_dyn(), expr)
    }

    fn visit_constant(&mut self, expr: &Rc<Expr>) -> VisitResult {
        Ok(Rc::clone(expr))
    }

    fn visit_parameter(&mut self, expr: &Rc<Expr>) -> VisitResult {
        Ok(Rc::clone(expr))
    }

    fn visit_binary(&mut self, expr: &Rc<Expr>) -> VisitResult {
        walk_children(self.as_dyn(), expr)
    }

    fn visit_unary(&mut self, expr: &Rc<Expr>) -> VisitResult {
        walk_children(self.as_dyn(), expr)
    }

    fn visit_call(&mut self, expr: &Rc<Expr>) -> VisitResult {
        walk_children(self.as_dyn(), expr)
    }

    fn visit_member(&mut self, expr: &Rc<Expr>) -> VisitResult {
        walk_children(self.as_dyn(), expr)
    }

    fn visit_conditional(&mut self, expr: &Rc<Expr>) -> VisitResult {
        walk_children(self.as_dyn(), expr)
    }

    fn visit_new(&mut self, expr: &Rc<Expr>) -> VisitResult {
        walk_children(self.as_dyn(), expr)
    }

    fn visit_list_init(&mut self, expr: &Rc<Expr>) -> VisitResult {
        walk_children(self.as_dyn(), expr)
    }

    fn visit_lambda(&mut self, expr: &Rc<Expr>) -> VisitResult {
        walk_children(self.as_dyn(), expr)
    }

    /// Generic extension handler, reached when the extension did not route
    /// itself to a specialised capability.
    fn visit_extension(&mut self, expr: &Rc<Expr>) -> VisitResult {
        match expr.kind() {
            ExprKind::Extension(extension) => extension.visit_children(expr, self.as_dyn()),
            _ => dispatch(self.as_dyn(), expr),
        }
    }

    fn visit_unknown_extension(&mut self, expr: &Rc<Expr>) -> VisitResult {
        match self.unknown_kind_policy() {
            UnknownKindPolicy::PassThrough => Ok(Rc::clone(expr)),
            UnknownKindPolicy::Reject => Err(RecognitionError::UnknownExtension {
                kind: match expr.kind() {
                    ExprKind::Extension(extension) => extension.name(),
                    _ => "unknown",
                },
                expression: expr.to_string(),
            }
            .into()),
        }
    }

    fn unknown_kind_policy(&self) -> UnknownKindPolicy {
        UnknownKindPolicy::Reject
    }

    fn query_capability(&mut self) -> Option<&mut dyn QueryExprVisitor> {
        None
    }
}

/// Routes `expr` to the handler for its kind.
pub fn dispatch(visitor: &mut dyn Visitor, expr: &Rc<Expr>) -> VisitResult {
    match expr.kind() {
        ExprKind::Constant(_) => visitor.visit_constant(expr),
        ExprKind::Parameter(_) => visitor.visit_parameter(expr),
        ExprKind::Binary { .. } => visitor.visit_binary(expr),
        ExprKind::Unary { .. } => visitor.visit_unary(expr),
        ExprKind::Call { .. } => visitor.visit_call(expr),
        ExprKind::Member { .. } => visitor.visit_member(expr),
        ExprKind::Conditional { .. } => visitor.visit_conditional(expr),
        ExprKind::New { .. } => visitor.visit_new(expr),
        ExprKind::ListInit { .. } => visitor.visit_list_init(expr),
        ExprKind::Lambda { .. } => visitor.visit_lambda(expr),
        ExprKind::Extension(extension) => extension.accept(expr, visitor),
    }
}

/// Visits the children of a built-in node and rebuilds it if any changed.
pub fn walk_children(visitor: &mut dyn Visitor, expr: &Rc<Expr>) -> VisitResult {
    let mut changed = false;

    let kind = match expr.kind() {
        ExprKind::Constant(_) | ExprKind::Parameter(_) | ExprKind::Extension(_) => {
            return Ok(Rc::clone(expr));
        }
        ExprKind::Binary { op, left, right } => ExprKind::Binary {
            op: *op,
            left: visit_child(visitor, left, &mut changed)?,
            right: visit_child(visitor, right, &mut changed)?,
        },
        ExprKind::Unary { op, operand } => ExprKind::Unary {
            op: *op,
            operand: visit_child(visitor, operand, &mut changed)?,
        },
        ExprKind::Call {
            method,
            object,
            args,
        } => ExprKind::Call {
            method: Rc::clone(method),
            object: object
                .as_ref()
                .map(|object| visit_child(visitor, object, &mut changed))
                .transpose()?,
            args: visit_args(visitor, args, &mut changed)?,
        },
        ExprKind::Member { object, name } => ExprKind::Member {
            object: object
                .as_ref()
                .map(|object| visit_child(visitor, object, &mut changed))
                .transpose()?,
            name: name.clone(),
        },
        ExprKind::Conditional {
            test,
            if_true,
            if_false,
        } => ExprKind::Conditional {
            test: visit_child(visitor, test, &mut changed)?,
            if_true: visit_child(visitor, if_true, &mut changed)?,
            if_false: visit_child(visitor, if_false, &mut changed)?,
        },
        ExprKind::New { record, args } => ExprKind::New {
            record: Rc::clone(record),
            args: visit_args(visitor, args, &mut changed)?,
        },
        ExprKind::ListInit { items } => ExprKind::ListInit {
            items: visit_args(visitor, items, &mut changed)?,
        },
        ExprKind::Lambda { params, body } => ExprKind::Lambda {
            params: params.clone(),
            body: visit_child(visitor, body, &mut changed)?,
        },
    };

    if changed {
        Ok(Expr::new(kind, expr.ty().clone()))
    } else {
        Ok(Rc::clone(expr))
    }
}

fn visit_child(visitor: &mut dyn Visitor, child: &Rc<Expr>, changed: &mut bool) -> VisitResult {
    let visited = visitor.visit(child)?;

    if !Rc::ptr_eq(&visited, child) {
        if !child.ty().is_assignable_from(visited.ty()) {
            return Err(TypeError::Mismatch {
                original: child.to_string(),
                expected: child.ty().clone(),
                replacement: visited.to_string(),
                actual: visited.ty().clone(),
            }
            .into());
        }
        *changed = true;
    }

    Ok(visited)
}

fn visit_args(
    visitor: &mut dyn Visitor,
    args: &Args,
    changed: &mut bool,
) -> Result<Args, InnerError> {
    args.iter()
        .map(|arg| visit_child(visitor, arg, changed))
        .collect::<Result<SmallVec<_>, _>>()
}

#[cfg(test)]
mod tests {
    use std::{any::Any, fmt};

    use rstest::rstest;

    use super::*;
    use crate::{
        expr::{BinaryOp, ExtensionExpr, Parameter},
        types::Type,
        value::Value,
    };

    /// Replaces every integer constant with its successor.
    struct Increment;

    impl Visitor for Increment {
        fn visit_constant(&mut self, expr: &Rc<Expr>) -> VisitResult {
            match expr.as_constant() {
                Some(Value::Int32(n)) => Ok(Expr::constant(n + 1)),
                _ => Ok(Rc::clone(expr)),
            }
        }
    }

    /// Leaves everything as it is.
    struct Identity(UnknownKindPolicy);

    impl Visitor for Identity {
        fn unknown_kind_policy(&self) -> UnknownKindPolicy {
            self.0
        }
    }

    /// Replaces every node with a boolean constant.
    struct Retype;

    impl Visitor for Retype {
        fn visit_constant(&mut self, _expr: &Rc<Expr>) -> VisitResult {
            Ok(Expr::constant(true))
        }
    }

    #[derive(Debug)]
    struct Opaque;

    impl ExtensionExpr for Opaque {
        fn name(&self) -> &'static str {
            "Opaque"
        }

        fn ty(&self) -> Type {
            Type::Int32
        }

        fn fmt_expr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "Opaque")
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct Reducible(Rc<Expr>);

    impl ExtensionExpr for Reducible {
        fn name(&self) -> &'static str {
            "Reducible"
        }

        fn ty(&self) -> Type {
            self.0.ty().clone()
        }

        fn reduce(&self) -> Option<Rc<Expr>> {
            Some(Rc::clone(&self.0))
        }

        fn fmt_expr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "Reducible({})", self.0)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn predicate() -> Rc<Expr> {
        let x = Parameter::new("x", Type::Int32);
        Expr::lambda(
            [Rc::clone(&x)],
            Expr::binary(BinaryOp::GreaterThan, Expr::parameter(&x), Expr::constant(10)),
        )
    }

    #[test]
    fn test_unchanged_tree_keeps_identity() {
        let tree = predicate();
        let visited = Identity(UnknownKindPolicy::Reject)
            .visit(&tree)
            .expect("visit succeeds");

        assert!(Rc::ptr_eq(&tree, &visited));
    }

    #[test]
    fn test_changed_child_rebuilds_parents_only() {
        let x = Parameter::new("x", Type::Int32);
        let untouched = Expr::parameter(&x);
        let tree = Expr::binary(BinaryOp::Add, Rc::clone(&untouched), Expr::constant(1));
        let visited = Increment.visit(&tree).expect("visit succeeds");

        assert_eq!(visited.to_string(), "(x + 2)");
        assert!(!Rc::ptr_eq(&tree, &visited));
        match visited.kind() {
            ExprKind::Binary { left, .. } => assert!(Rc::ptr_eq(left, &untouched)),
            _ => panic!("expected a binary node"),
        }
    }

    #[test]
    fn test_incompatible_replacement_is_type_error() {
        let tree = Expr::binary(BinaryOp::Add, Expr::constant(1), Expr::constant(2));

        assert!(matches!(
            Retype.visit(&tree),
            Err(InnerError::Type(TypeError::Mismatch { .. }))
        ));
    }

    #[rstest]
    #[case::reject(UnknownKindPolicy::Reject, true)]
    #[case::pass_through(UnknownKindPolicy::PassThrough, false)]
    fn test_opaque_extension_policy(#[case] policy: UnknownKindPolicy, #[case] fails: bool) {
        let tree = Expr::binary(
            BinaryOp::Add,
            Expr::extension(Rc::new(Opaque)),
            Expr::constant(1),
        );
        let result = Identity(policy).visit(&tree);

        assert_eq!(
            result.is_err(),
            fails,
            "unexpected result for {policy:?}: {result:?}"
        );
        if let Err(err) = result {
            assert!(matches!(
                err,
                InnerError::Recognition(RecognitionError::UnknownExtension { kind: "Opaque", .. })
            ));
        }
    }

    #[test]
    fn test_reducible_extension_is_visited_through_reduction() {
        let tree = Expr::extension(Rc::new(Reducible(Expr::constant(1))));
        let visited = Increment.visit(&tree).expect("visit succeeds");

        assert_eq!(visited.to_string(), "2");
    }
}
