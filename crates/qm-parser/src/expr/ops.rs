//! Constructors for chained query operator calls.
//!
//! Every operator is a static call whose first argument is the source
//! sequence, so `ops::take(ops::where_(source, pred), count)` builds the chain
//! `Take(Where(Source, pred), count)`.

use std::{iter, rc::Rc};

use crate::{
    types::Type,
    value::{DataSource, Value},
};

use super::node::{Expr, Method};

/// A named query source yielding items of `item_type`.
pub fn source(name: &str, item_type: Type) -> Rc<Expr> {
    Expr::constant(Value::Source(DataSource::new(name, item_type)))
}

/// A query operator call with an explicit return type.
pub fn query_operator(
    name: &str,
    type_args: impl IntoIterator<Item = Type>,
    source: Rc<Expr>,
    args: impl IntoIterator<Item = Rc<Expr>>,
    return_type: Type,
) -> Rc<Expr> {
    Expr::call(
        Method::query_operator(name, type_args, return_type),
        None,
        iter::once(source).chain(args),
    )
}

fn item_type(source: &Expr) -> Type {
    source.ty().item_type().cloned().unwrap_or(Type::Object)
}

fn body_type(lambda: &Expr) -> Type {
    lambda
        .as_lambda()
        .map(|(_, body)| body.ty().clone())
        .unwrap_or(Type::Object)
}

fn same_type(name: &str, source: Rc<Expr>, args: impl IntoIterator<Item = Rc<Expr>>) -> Rc<Expr> {
    let ty = source.ty().clone();
    query_operator(name, [], source, args, ty)
}

pub fn where_(source: Rc<Expr>, predicate: Rc<Expr>) -> Rc<Expr> {
    same_type("Where", source, [predicate])
}

pub fn select(source: Rc<Expr>, selector: Rc<Expr>) -> Rc<Expr> {
    let ty = source.ty().with_item(body_type(&selector));
    query_operator("Select", [], source, [selector], ty)
}

pub fn select_many(
    source: Rc<Expr>,
    collection_selector: Rc<Expr>,
    result_selector: Option<Rc<Expr>>,
) -> Rc<Expr> {
    let item = match &result_selector {
        Some(result_selector) => body_type(result_selector),
        None => body_type(&collection_selector)
            .item_type()
            .cloned()
            .unwrap_or(Type::Object),
    };
    let ty = source.ty().with_item(item);
    query_operator(
        "SelectMany",
        [],
        source,
        iter::once(collection_selector).chain(result_selector),
        ty,
    )
}

pub fn order_by(source: Rc<Expr>, key_selector: Rc<Expr>) -> Rc<Expr> {
    same_type("OrderBy", source, [key_selector])
}

pub fn order_by_descending(source: Rc<Expr>, key_selector: Rc<Expr>) -> Rc<Expr> {
    same_type("OrderByDescending", source, [key_selector])
}

pub fn then_by(source: Rc<Expr>, key_selector: Rc<Expr>) -> Rc<Expr> {
    same_type("ThenBy", source, [key_selector])
}

pub fn then_by_descending(source: Rc<Expr>, key_selector: Rc<Expr>) -> Rc<Expr> {
    same_type("ThenByDescending", source, [key_selector])
}

pub fn join(
    outer: Rc<Expr>,
    inner: Rc<Expr>,
    outer_key_selector: Rc<Expr>,
    inner_key_selector: Rc<Expr>,
    result_selector: Rc<Expr>,
) -> Rc<Expr> {
    let ty = outer.ty().with_item(body_type(&result_selector));
    query_operator(
        "Join",
        [],
        outer,
        [inner, outer_key_selector, inner_key_selector, result_selector],
        ty,
    )
}

pub fn group_join(
    outer: Rc<Expr>,
    inner: Rc<Expr>,
    outer_key_selector: Rc<Expr>,
    inner_key_selector: Rc<Expr>,
    result_selector: Rc<Expr>,
) -> Rc<Expr> {
    let ty = outer.ty().with_item(body_type(&result_selector));
    query_operator(
        "GroupJoin",
        [],
        outer,
        [inner, outer_key_selector, inner_key_selector, result_selector],
        ty,
    )
}

pub fn group_by(
    source: Rc<Expr>,
    key_selector: Rc<Expr>,
    element_selector: Option<Rc<Expr>>,
    result_selector: Option<Rc<Expr>>,
) -> Rc<Expr> {
    let item = match &result_selector {
        Some(result_selector) => body_type(result_selector),
        None => Type::grouping(
            body_type(&key_selector),
            element_selector
                .as_deref()
                .map(body_type)
                .unwrap_or_else(|| item_type(&source)),
        ),
    };
    let ty = source.ty().with_item(item);
    query_operator(
        "GroupBy",
        [],
        source,
        iter::once(key_selector)
            .chain(element_selector)
            .chain(result_selector),
        ty,
    )
}

pub fn take(source: Rc<Expr>, count: Rc<Expr>) -> Rc<Expr> {
    same_type("Take", source, [count])
}

pub fn skip(source: Rc<Expr>, count: Rc<Expr>) -> Rc<Expr> {
    same_type("Skip", source, [count])
}

pub fn distinct(source: Rc<Expr>) -> Rc<Expr> {
    same_type("Distinct", source, [])
}

pub fn reverse(source: Rc<Expr>) -> Rc<Expr> {
    same_type("Reverse", source, [])
}

pub fn count(source: Rc<Expr>, predicate: Option<Rc<Expr>>) -> Rc<Expr> {
    query_operator("Count", [], source, predicate, Type::Int32)
}

pub fn long_count(source: Rc<Expr>, predicate: Option<Rc<Expr>>) -> Rc<Expr> {
    query_operator("LongCount", [], source, predicate, Type::Int64)
}

pub fn any(source: Rc<Expr>, predicate: Option<Rc<Expr>>) -> Rc<Expr> {
    query_operator("Any", [], source, predicate, Type::Boolean)
}

pub fn all(source: Rc<Expr>, predicate: Rc<Expr>) -> Rc<Expr> {
    query_operator("All", [], source, [predicate], Type::Boolean)
}

pub fn contains(source: Rc<Expr>, item: Rc<Expr>) -> Rc<Expr> {
    query_operator("Contains", [], source, [item], Type::Boolean)
}

/// `First`, `FirstOrDefault`, `Last`, `LastOrDefault`, `Single` or `SingleOrDefault`.
pub fn element(name: &str, source: Rc<Expr>, predicate: Option<Rc<Expr>>) -> Rc<Expr> {
    let ty = item_type(&source);
    query_operator(name, [], source, predicate, ty)
}

pub fn first(source: Rc<Expr>, predicate: Option<Rc<Expr>>) -> Rc<Expr> {
    element("First", source, predicate)
}

pub fn single(source: Rc<Expr>, predicate: Option<Rc<Expr>>) -> Rc<Expr> {
    element("Single", source, predicate)
}

/// `Sum`, `Min`, `Max` or `Average`, optionally projecting first.
pub fn aggregate_value(name: &str, source: Rc<Expr>, selector: Option<Rc<Expr>>) -> Rc<Expr> {
    let ty = match (name, &selector) {
        ("Average", _) => Type::Double,
        (_, Some(selector)) => body_type(selector),
        (_, None) => item_type(&source),
    };
    query_operator(name, [], source, selector, ty)
}

pub fn sum(source: Rc<Expr>, selector: Option<Rc<Expr>>) -> Rc<Expr> {
    aggregate_value("Sum", source, selector)
}

pub fn max(source: Rc<Expr>, selector: Option<Rc<Expr>>) -> Rc<Expr> {
    aggregate_value("Max", source, selector)
}

pub fn aggregate(source: Rc<Expr>, func: Rc<Expr>) -> Rc<Expr> {
    let ty = body_type(&func);
    query_operator("Aggregate", [], source, [func], ty)
}

pub fn aggregate_with_seed(
    source: Rc<Expr>,
    seed: Rc<Expr>,
    func: Rc<Expr>,
    result_selector: Option<Rc<Expr>>,
) -> Rc<Expr> {
    let ty = match &result_selector {
        Some(result_selector) => body_type(result_selector),
        None => seed.ty().clone(),
    };
    query_operator(
        "Aggregate",
        [],
        source,
        [seed, func].into_iter().chain(result_selector),
        ty,
    )
}

/// `Union`, `Concat`, `Intersect` or `Except`.
pub fn set_operation(name: &str, source: Rc<Expr>, other: Rc<Expr>) -> Rc<Expr> {
    same_type(name, source, [other])
}

pub fn union(source: Rc<Expr>, other: Rc<Expr>) -> Rc<Expr> {
    set_operation("Union", source, other)
}

pub fn cast(source: Rc<Expr>, item_type: Type) -> Rc<Expr> {
    let ty = source.ty().with_item(item_type.clone());
    query_operator("Cast", [item_type], source, [], ty)
}

pub fn of_type(source: Rc<Expr>, item_type: Type) -> Rc<Expr> {
    let ty = source.ty().with_item(item_type.clone());
    query_operator("OfType", [item_type], source, [], ty)
}

pub fn default_if_empty(source: Rc<Expr>, default_value: Option<Rc<Expr>>) -> Rc<Expr> {
    same_type("DefaultIfEmpty", source, default_value)
}
