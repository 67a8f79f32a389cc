use std::{any::Any, fmt, rc::Rc};

use crate::{
    types::Type,
    visitor::{VisitResult, Visitor},
};

use super::node::Expr;

/// A user-defined node kind.
///
/// Visiting goes through double dispatch: [`ExtensionExpr::accept`] may ask the
/// visitor for a specialised capability and otherwise hands itself to
/// [`Visitor::visit_extension`], which in turn calls
/// [`ExtensionExpr::visit_children`].
///
/// An extension that neither overrides `visit_children` nor reduces to
/// built-in nodes is opaque. Visitors reject opaque nodes unless they opt
/// into pass-through.
pub trait ExtensionExpr: fmt::Debug + Any {
    /// Stable name of the kind, used to key rewrite rules.
    fn name(&self) -> &'static str;

    fn ty(&self) -> Type;

    fn accept(&self, this: &Rc<Expr>, visitor: &mut dyn Visitor) -> VisitResult {
        visitor.visit_extension(this)
    }

    fn visit_children(&self, this: &Rc<Expr>, visitor: &mut dyn Visitor) -> VisitResult {
        match self.reduce() {
            Some(reduced) => visitor.visit(&reduced),
            None => visitor.visit_unknown_extension(this),
        }
    }

    /// An equivalent tree of built-in nodes, if one exists.
    fn reduce(&self) -> Option<Rc<Expr>> {
        None
    }

    fn fmt_expr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;

    fn as_any(&self) -> &dyn Any;
}
