use std::{fmt, rc::Rc};

use itertools::Itertools;

use crate::{error::InnerError, expr::Expr};

use super::{ExprTransform, QuerySource};

fn transform(slot: &mut Rc<Expr>, f: &mut ExprTransform<'_>) -> Result<(), InnerError> {
    *slot = f(&*slot)?;
    Ok(())
}

/// The clause a query starts from: `from <Type> <id> in <source>`.
#[derive(Debug, Clone)]
pub struct MainFromClause {
    pub source: Rc<QuerySource>,
    pub from_expression: Rc<Expr>,
}

impl MainFromClause {
    pub fn new(source: Rc<QuerySource>, from_expression: Rc<Expr>) -> Self {
        Self {
            source,
            from_expression,
        }
    }

    pub fn transform_expressions(&mut self, f: &mut ExprTransform<'_>) -> Result<(), InnerError> {
        transform(&mut self.from_expression, f)
    }
}

impl fmt::Display for MainFromClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "from {} in {}", self.source, self.from_expression)
    }
}

/// A further `from` clause, produced by flattening a nested collection.
#[derive(Debug, Clone)]
pub struct AdditionalFromClause {
    pub source: Rc<QuerySource>,
    pub from_expression: Rc<Expr>,
}

impl fmt::Display for AdditionalFromClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "from {} in {}", self.source, self.from_expression)
    }
}

#[derive(Debug, Clone)]
pub struct WhereClause {
    pub predicate: Rc<Expr>,
}

impl fmt::Display for WhereClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "where {}", self.predicate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderingDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderingDirection::Asc => write!(f, "asc"),
            OrderingDirection::Desc => write!(f, "desc"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ordering {
    pub expression: Rc<Expr>,
    pub direction: OrderingDirection,
}

impl fmt::Display for Ordering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.expression, self.direction)
    }
}

/// One `orderby` clause; `ThenBy` operators append to the last one.
#[derive(Debug, Clone, Default)]
pub struct OrderByClause {
    pub orderings: Vec<Ordering>,
}

impl fmt::Display for OrderByClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "orderby {}", self.orderings.iter().join(", "))
    }
}

#[derive(Debug, Clone)]
pub struct JoinClause {
    pub source: Rc<QuerySource>,
    pub inner_sequence: Rc<Expr>,
    pub outer_key_selector: Rc<Expr>,
    /// Refers to the items of this clause itself.
    pub inner_key_selector: Rc<Expr>,
}

impl JoinClause {
    fn transform_expressions(&mut self, f: &mut ExprTransform<'_>) -> Result<(), InnerError> {
        transform(&mut self.inner_sequence, f)?;
        transform(&mut self.outer_key_selector, f)?;
        transform(&mut self.inner_key_selector, f)
    }
}

impl fmt::Display for JoinClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "join {} in {} on {} equals {}",
            self.source, self.inner_sequence, self.outer_key_selector, self.inner_key_selector
        )
    }
}

#[derive(Debug, Clone)]
pub struct GroupJoinClause {
    /// The group of matching inner items.
    pub source: Rc<QuerySource>,
    pub join_clause: JoinClause,
}

impl fmt::Display for GroupJoinClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} into {}", self.join_clause, self.source)
    }
}

#[derive(Debug, Clone)]
pub enum BodyClause {
    Where(WhereClause),
    OrderBy(OrderByClause),
    AdditionalFrom(AdditionalFromClause),
    Join(JoinClause),
    GroupJoin(GroupJoinClause),
}

impl BodyClause {
    /// The query source this clause introduces, if any.
    pub fn query_source(&self) -> Option<&Rc<QuerySource>> {
        match self {
            BodyClause::Where(_) | BodyClause::OrderBy(_) => None,
            BodyClause::AdditionalFrom(clause) => Some(&clause.source),
            BodyClause::Join(clause) => Some(&clause.source),
            BodyClause::GroupJoin(clause) => Some(&clause.source),
        }
    }

    pub fn transform_expressions(&mut self, f: &mut ExprTransform<'_>) -> Result<(), InnerError> {
        match self {
            BodyClause::Where(clause) => transform(&mut clause.predicate, f),
            BodyClause::OrderBy(clause) => clause
                .orderings
                .iter_mut()
                .try_for_each(|ordering| transform(&mut ordering.expression, f)),
            BodyClause::AdditionalFrom(clause) => transform(&mut clause.from_expression, f),
            BodyClause::Join(clause) => clause.transform_expressions(f),
            BodyClause::GroupJoin(clause) => clause.join_clause.transform_expressions(f),
        }
    }
}

impl fmt::Display for BodyClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyClause::Where(clause) => write!(f, "{clause}"),
            BodyClause::OrderBy(clause) => write!(f, "{clause}"),
            BodyClause::AdditionalFrom(clause) => write!(f, "{clause}"),
            BodyClause::Join(clause) => write!(f, "{clause}"),
            BodyClause::GroupJoin(clause) => write!(f, "{clause}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectClause {
    pub selector: Rc<Expr>,
}

impl SelectClause {
    pub fn new(selector: Rc<Expr>) -> Self {
        Self { selector }
    }

    pub fn transform_expressions(&mut self, f: &mut ExprTransform<'_>) -> Result<(), InnerError> {
        transform(&mut self.selector, f)
    }
}

impl fmt::Display for SelectClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "select {}", self.selector)
    }
}
