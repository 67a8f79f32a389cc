use std::{fmt, rc::Rc};

use crate::{error::InnerError, expr::Expr, types::Type};

use super::{ExprTransform, QuerySource};

/// An operation applied to the selected items after the select clause.
#[derive(Debug, Clone)]
pub enum ResultOperator {
    Take(Rc<Expr>),
    Skip(Rc<Expr>),
    Distinct,
    Reverse,
    Count,
    LongCount,
    Any,
    All(Rc<Expr>),
    Contains(Rc<Expr>),
    First { or_default: bool },
    Last { or_default: bool },
    Single { or_default: bool },
    Sum,
    Min,
    Max,
    Average,
    /// `func` is a lambda over the accumulator; the item is already resolved.
    Aggregate { func: Rc<Expr> },
    AggregateFromSeed {
        seed: Rc<Expr>,
        func: Rc<Expr>,
        result_selector: Option<Rc<Expr>>,
    },
    /// Groups the selected items; the groups form a query source of their own.
    GroupBy {
        source: Rc<QuerySource>,
        key_selector: Rc<Expr>,
        element_selector: Rc<Expr>,
    },
    Union(Rc<Expr>),
    Concat(Rc<Expr>),
    Intersect(Rc<Expr>),
    Except(Rc<Expr>),
    Cast(Type),
    OfType(Type),
    DefaultIfEmpty(Option<Rc<Expr>>),
}

fn body_type(lambda: &Expr) -> Type {
    lambda
        .as_lambda()
        .map(|(_, body)| body.ty().clone())
        .unwrap_or_else(|| lambda.ty().clone())
}

impl ResultOperator {
    pub fn name(&self) -> &'static str {
        match self {
            ResultOperator::Take(_) => "Take",
            ResultOperator::Skip(_) => "Skip",
            ResultOperator::Distinct => "Distinct",
            ResultOperator::Reverse => "Reverse",
            ResultOperator::Count => "Count",
            ResultOperator::LongCount => "LongCount",
            ResultOperator::Any => "Any",
            ResultOperator::All(_) => "All",
            ResultOperator::Contains(_) => "Contains",
            ResultOperator::First { or_default: false } => "First",
            ResultOperator::First { or_default: true } => "FirstOrDefault",
            ResultOperator::Last { or_default: false } => "Last",
            ResultOperator::Last { or_default: true } => "LastOrDefault",
            ResultOperator::Single { or_default: false } => "Single",
            ResultOperator::Single { or_default: true } => "SingleOrDefault",
            ResultOperator::Sum => "Sum",
            ResultOperator::Min => "Min",
            ResultOperator::Max => "Max",
            ResultOperator::Average => "Average",
            ResultOperator::Aggregate { .. } | ResultOperator::AggregateFromSeed { .. } => {
                "Aggregate"
            }
            ResultOperator::GroupBy { .. } => "GroupBy",
            ResultOperator::Union(_) => "Union",
            ResultOperator::Concat(_) => "Concat",
            ResultOperator::Intersect(_) => "Intersect",
            ResultOperator::Except(_) => "Except",
            ResultOperator::Cast(_) => "Cast",
            ResultOperator::OfType(_) => "OfType",
            ResultOperator::DefaultIfEmpty(_) => "DefaultIfEmpty",
        }
    }

    /// The type of the query result once this operator is applied to `input`.
    pub fn result_type(&self, input: &Type) -> Type {
        match self {
            ResultOperator::Take(_)
            | ResultOperator::Skip(_)
            | ResultOperator::Distinct
            | ResultOperator::Reverse
            | ResultOperator::Union(_)
            | ResultOperator::Concat(_)
            | ResultOperator::Intersect(_)
            | ResultOperator::Except(_)
            | ResultOperator::DefaultIfEmpty(_) => input.clone(),
            ResultOperator::Count => Type::Int32,
            ResultOperator::LongCount => Type::Int64,
            ResultOperator::Any | ResultOperator::All(_) | ResultOperator::Contains(_) => {
                Type::Boolean
            }
            ResultOperator::First { .. }
            | ResultOperator::Last { .. }
            | ResultOperator::Single { .. }
            | ResultOperator::Sum
            | ResultOperator::Min
            | ResultOperator::Max => input.item_type().cloned().unwrap_or(Type::Object),
            ResultOperator::Average => Type::Double,
            ResultOperator::Aggregate { func } => body_type(func),
            ResultOperator::AggregateFromSeed {
                seed,
                result_selector,
                ..
            } => result_selector
                .as_deref()
                .map(body_type)
                .unwrap_or_else(|| seed.ty().clone()),
            ResultOperator::GroupBy { source, .. } => input.with_item(source.item_type.clone()),
            ResultOperator::Cast(ty) | ResultOperator::OfType(ty) => input.with_item(ty.clone()),
        }
    }

    pub fn query_source(&self) -> Option<&Rc<QuerySource>> {
        match self {
            ResultOperator::GroupBy { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn transform_expressions(&mut self, f: &mut ExprTransform<'_>) -> Result<(), InnerError> {
        let slots: Vec<&mut Rc<Expr>> = match self {
            ResultOperator::Take(expr)
            | ResultOperator::Skip(expr)
            | ResultOperator::All(expr)
            | ResultOperator::Contains(expr)
            | ResultOperator::Union(expr)
            | ResultOperator::Concat(expr)
            | ResultOperator::Intersect(expr)
            | ResultOperator::Except(expr)
            | ResultOperator::Aggregate { func: expr } => vec![expr],
            ResultOperator::DefaultIfEmpty(expr) => expr.iter_mut().collect(),
            ResultOperator::AggregateFromSeed {
                seed,
                func,
                result_selector,
            } => [seed, func].into_iter().chain(result_selector).collect(),
            ResultOperator::GroupBy {
                key_selector,
                element_selector,
                ..
            } => vec![key_selector, element_selector],
            _ => Vec::new(),
        };

        for slot in slots {
            *slot = f(&*slot)?;
        }

        Ok(())
    }
}

impl fmt::Display for ResultOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        match self {
            ResultOperator::Take(expr)
            | ResultOperator::Skip(expr)
            | ResultOperator::All(expr)
            | ResultOperator::Contains(expr)
            | ResultOperator::Union(expr)
            | ResultOperator::Concat(expr)
            | ResultOperator::Intersect(expr)
            | ResultOperator::Except(expr)
            | ResultOperator::Aggregate { func: expr }
            | ResultOperator::DefaultIfEmpty(Some(expr)) => write!(f, "{name}({expr})"),
            ResultOperator::AggregateFromSeed {
                seed,
                func,
                result_selector: Some(result_selector),
            } => write!(f, "{name}({seed}, {func}, {result_selector})"),
            ResultOperator::AggregateFromSeed { seed, func, .. } => {
                write!(f, "{name}({seed}, {func})")
            }
            ResultOperator::GroupBy {
                key_selector,
                element_selector,
                ..
            } => write!(f, "{name}({key_selector}, {element_selector})"),
            ResultOperator::Cast(ty) | ResultOperator::OfType(ty) => write!(f, "{name}<{ty}>()"),
            _ => write!(f, "{name}()"),
        }
    }
}
