use std::{
    any::Any,
    cell::{Ref, RefCell, RefMut},
    fmt,
    rc::Rc,
};

use crate::{
    expr::{Expr, ExtensionExpr},
    types::Type,
    visitor::{VisitResult, Visitor},
};

use super::{QueryModel, QuerySource};

/// Stands for the item produced by an earlier clause.
#[derive(Debug)]
pub struct QuerySourceReference {
    source: Rc<QuerySource>,
}

impl QuerySourceReference {
    pub const NAME: &'static str = "QuerySourceReference";

    pub fn expr(source: &Rc<QuerySource>) -> Rc<Expr> {
        Expr::extension(Rc::new(Self {
            source: Rc::clone(source),
        }))
    }

    pub fn source(&self) -> &Rc<QuerySource> {
        &self.source
    }

    pub fn refers_to(&self, source: &Rc<QuerySource>) -> bool {
        Rc::ptr_eq(&self.source, source)
    }
}

impl ExtensionExpr for QuerySourceReference {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn ty(&self) -> Type {
        self.source.item_type.clone()
    }

    fn accept(&self, this: &Rc<Expr>, visitor: &mut dyn Visitor) -> VisitResult {
        match visitor.query_capability() {
            Some(query_visitor) => query_visitor.visit_query_source_reference(this, self),
            None => visitor.visit_extension(this),
        }
    }

    fn visit_children(&self, this: &Rc<Expr>, _visitor: &mut dyn Visitor) -> VisitResult {
        Ok(Rc::clone(this))
    }

    fn fmt_expr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source.item_name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Wraps a nested query model found inside another expression.
///
/// The node itself is immutable, but the model behind it is updated in place
/// when references into enclosing clauses get resolved.
#[derive(Debug)]
pub struct SubQueryExpr {
    model: RefCell<QueryModel>,
    ty: Type,
}

impl SubQueryExpr {
    pub const NAME: &'static str = "SubQuery";

    pub fn expr(model: QueryModel, ty: Type) -> Rc<Expr> {
        Expr::extension(Rc::new(Self {
            model: RefCell::new(model),
            ty,
        }))
    }

    pub fn model(&self) -> Ref<'_, QueryModel> {
        self.model.borrow()
    }

    pub fn model_mut(&self) -> RefMut<'_, QueryModel> {
        self.model.borrow_mut()
    }
}

impl ExtensionExpr for SubQueryExpr {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn ty(&self) -> Type {
        self.ty.clone()
    }

    fn accept(&self, this: &Rc<Expr>, visitor: &mut dyn Visitor) -> VisitResult {
        match visitor.query_capability() {
            Some(query_visitor) => query_visitor.visit_sub_query(this, self),
            None => visitor.visit_extension(this),
        }
    }

    fn visit_children(&self, this: &Rc<Expr>, _visitor: &mut dyn Visitor) -> VisitResult {
        Ok(Rc::clone(this))
    }

    fn fmt_expr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.model.try_borrow() {
            Ok(model) => write!(f, "{{{model}}}"),
            Err(_) => write!(f, "{{...}}"),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
