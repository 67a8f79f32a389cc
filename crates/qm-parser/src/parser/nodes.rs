use std::{cell::OnceCell, rc::Rc};

use crate::{
    error::{InnerError, structural::StructuralError, typing::TypeError},
    expr::{Expr, Method, Parameter},
    model::{
        AdditionalFromClause, BodyClause, GroupJoinClause, JoinClause, MainFromClause,
        OrderByClause, Ordering, OrderingDirection, QuerySource, QuerySourceReference,
        ResultOperator, WhereClause,
    },
    types::Type,
    visitor::{ReplacingVisitor, VisitResult},
};

use super::{
    builder::QueryModelBuilder,
    chain::{NodeId, OperationChain, OperationNode, ParseInfo},
    context::{ClauseGenerationContext, ContextInfo, ResolveCx},
    registry::unexpected_operands,
    single_param_lambda, two_param_lambda,
};

fn item_type_of(expr: &Expr) -> Result<Type, TypeError> {
    expr.ty()
        .item_type()
        .cloned()
        .ok_or_else(|| TypeError::NotASequence {
            expression: expr.to_string(),
            ty: expr.ty().clone(),
        })
}

/// Replaces `parameter` with a reference to the query source `id` introduced.
fn resolve_to_query_source(
    id: NodeId,
    parameter: &Rc<Parameter>,
    expression: &Rc<Expr>,
    cx: &ResolveCx<'_>,
) -> VisitResult {
    let reference = QuerySourceReference::expr(&cx.query_source(id)?);
    ReplacingVisitor::replace_parameter(parameter, &reference, expression)
}

/// Resolves a cached selector once and reuses it for every later reference.
fn cached(cell: &OnceCell<Rc<Expr>>, resolve: impl FnOnce() -> VisitResult) -> VisitResult {
    if let Some(resolved) = cell.get() {
        return Ok(Rc::clone(resolved));
    }

    let resolved = resolve()?;
    Ok(Rc::clone(cell.get_or_init(|| resolved)))
}

/// The root of a chain: the sequence the query reads from.
#[derive(Debug)]
pub struct MainSourceNode {
    info: ParseInfo,
}

impl MainSourceNode {
    pub fn new(info: ParseInfo) -> Self {
        Self { info }
    }
}

impl OperationNode for MainSourceNode {
    fn name(&self) -> &str {
        "MainSource"
    }

    fn info(&self) -> &ParseInfo {
        &self.info
    }

    fn source(&self) -> Option<NodeId> {
        None
    }

    fn resolve(
        &self,
        id: NodeId,
        parameter: &Rc<Parameter>,
        expression: &Rc<Expr>,
        cx: &ResolveCx<'_>,
    ) -> VisitResult {
        resolve_to_query_source(id, parameter, expression, cx)
    }

    fn apply(
        &self,
        id: NodeId,
        builder: &mut QueryModelBuilder,
        context: &mut ClauseGenerationContext,
        _chain: &OperationChain,
    ) -> Result<(), InnerError> {
        let source = QuerySource::new(
            self.info.associated_identifier.clone(),
            item_type_of(&self.info.call)?,
        );
        builder.set_main_from_clause(MainFromClause::new(
            Rc::clone(&source),
            Rc::clone(&self.info.call),
        ));
        context.add(id, &self.info.call, ContextInfo::QuerySource(source))?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct WhereNode {
    info: ParseInfo,
    source: NodeId,
    predicate: Rc<Expr>,
}

impl WhereNode {
    pub fn new(info: ParseInfo, source: NodeId, predicate: Rc<Expr>) -> Self {
        Self {
            info,
            source,
            predicate,
        }
    }
}

pub fn where_node(
    chain: &mut OperationChain,
    source: NodeId,
    info: ParseInfo,
    operands: &[Rc<Expr>],
    method: &Method,
) -> Result<NodeId, InnerError> {
    let [predicate] = operands else {
        return Err(unexpected_operands(method, &info, operands));
    };
    Ok(chain.add(WhereNode::new(info, source, Rc::clone(predicate))))
}

impl OperationNode for WhereNode {
    fn name(&self) -> &str {
        "Where"
    }

    fn info(&self) -> &ParseInfo {
        &self.info
    }

    fn source(&self) -> Option<NodeId> {
        Some(self.source)
    }

    fn resolve(
        &self,
        _id: NodeId,
        parameter: &Rc<Parameter>,
        expression: &Rc<Expr>,
        cx: &ResolveCx<'_>,
    ) -> VisitResult {
        cx.resolve(self.source, parameter, expression)
    }

    fn apply(
        &self,
        id: NodeId,
        builder: &mut QueryModelBuilder,
        context: &mut ClauseGenerationContext,
        chain: &OperationChain,
    ) -> Result<(), InnerError> {
        let predicate = ResolveCx::new(chain, context).resolve_lambda(self.source, &self.predicate)?;
        let index = builder.add_body_clause(BodyClause::Where(WhereClause { predicate }));
        context.add(id, &self.info.call, ContextInfo::BodyClause(index))?;
        Ok(())
    }
}

/// A projection. Later references to its items are replaced by the resolved selector.
#[derive(Debug)]
pub struct SelectNode {
    info: ParseInfo,
    source: NodeId,
    selector: Rc<Expr>,
    resolved_selector: OnceCell<Rc<Expr>>,
}

impl SelectNode {
    pub fn new(info: ParseInfo, source: NodeId, selector: Rc<Expr>) -> Self {
        Self {
            info,
            source,
            selector,
            resolved_selector: OnceCell::new(),
        }
    }

    fn resolved_selector(&self, cx: &ResolveCx<'_>) -> VisitResult {
        cached(&self.resolved_selector, || {
            cx.resolve_lambda(self.source, &self.selector)
        })
    }
}

pub fn select_node(
    chain: &mut OperationChain,
    source: NodeId,
    info: ParseInfo,
    operands: &[Rc<Expr>],
    method: &Method,
) -> Result<NodeId, InnerError> {
    let [selector] = operands else {
        return Err(unexpected_operands(method, &info, operands));
    };
    Ok(chain.add(SelectNode::new(info, source, Rc::clone(selector))))
}

impl OperationNode for SelectNode {
    fn name(&self) -> &str {
        "Select"
    }

    fn info(&self) -> &ParseInfo {
        &self.info
    }

    fn source(&self) -> Option<NodeId> {
        Some(self.source)
    }

    fn resolve(
        &self,
        _id: NodeId,
        parameter: &Rc<Parameter>,
        expression: &Rc<Expr>,
        cx: &ResolveCx<'_>,
    ) -> VisitResult {
        let selector = self.resolved_selector(cx)?;
        ReplacingVisitor::replace_parameter(parameter, &selector, expression)
    }

    fn apply(
        &self,
        id: NodeId,
        builder: &mut QueryModelBuilder,
        context: &mut ClauseGenerationContext,
        chain: &OperationChain,
    ) -> Result<(), InnerError> {
        let selector = self.resolved_selector(&ResolveCx::new(chain, context))?;
        builder.set_selector(selector);
        context.add(id, &self.info.call, ContextInfo::Selector)?;
        Ok(())
    }
}

/// Flattens a nested collection into an additional from clause.
#[derive(Debug)]
pub struct SelectManyNode {
    info: ParseInfo,
    source: NodeId,
    collection_selector: Rc<Expr>,
    result_selector: Option<Rc<Expr>>,
    resolved_result_selector: OnceCell<Rc<Expr>>,
}

pub fn select_many_node(
    chain: &mut OperationChain,
    source: NodeId,
    info: ParseInfo,
    operands: &[Rc<Expr>],
    method: &Method,
) -> Result<NodeId, InnerError> {
    let (collection_selector, result_selector) = match operands {
        [collection_selector] => (collection_selector, None),
        [collection_selector, result_selector] => (collection_selector, Some(result_selector)),
        _ => return Err(unexpected_operands(method, &info, operands)),
    };

    Ok(chain.add(SelectManyNode {
        info,
        source,
        collection_selector: Rc::clone(collection_selector),
        result_selector: result_selector.cloned(),
        resolved_result_selector: OnceCell::new(),
    }))
}

impl SelectManyNode {
    fn resolved_result_selector(&self, id: NodeId, cx: &ResolveCx<'_>) -> VisitResult {
        cached(&self.resolved_result_selector, || match &self.result_selector {
            Some(result_selector) => {
                let (item, collection_item, body) = two_param_lambda(result_selector)?;
                let body = cx.resolve(self.source, item, body)?;
                resolve_to_query_source(id, collection_item, &body, cx)
            }
            None => Ok(QuerySourceReference::expr(&cx.query_source(id)?)),
        })
    }
}

impl OperationNode for SelectManyNode {
    fn name(&self) -> &str {
        "SelectMany"
    }

    fn info(&self) -> &ParseInfo {
        &self.info
    }

    fn source(&self) -> Option<NodeId> {
        Some(self.source)
    }

    fn resolve(
        &self,
        id: NodeId,
        parameter: &Rc<Parameter>,
        expression: &Rc<Expr>,
        cx: &ResolveCx<'_>,
    ) -> VisitResult {
        let selector = self.resolved_result_selector(id, cx)?;
        ReplacingVisitor::replace_parameter(parameter, &selector, expression)
    }

    fn apply(
        &self,
        id: NodeId,
        builder: &mut QueryModelBuilder,
        context: &mut ClauseGenerationContext,
        chain: &OperationChain,
    ) -> Result<(), InnerError> {
        let from_expression =
            ResolveCx::new(chain, context).resolve_lambda(self.source, &self.collection_selector)?;
        let item_name = match &self.result_selector {
            Some(result_selector) => two_param_lambda(result_selector)?.1.name.clone(),
            None => self.info.associated_identifier.clone(),
        };
        let source = QuerySource::new(item_name, item_type_of(&from_expression)?);

        builder.add_body_clause(BodyClause::AdditionalFrom(AdditionalFromClause {
            source: Rc::clone(&source),
            from_expression,
        }));
        context.add(id, &self.info.call, ContextInfo::QuerySource(source))?;

        let selector = self.resolved_result_selector(id, &ResolveCx::new(chain, context))?;
        builder.set_selector(selector);
        Ok(())
    }
}

/// `OrderBy`, `OrderByDescending`, `ThenBy` or `ThenByDescending`.
#[derive(Debug)]
pub struct OrderByNode {
    info: ParseInfo,
    source: NodeId,
    name: &'static str,
    key_selector: Rc<Expr>,
    direction: OrderingDirection,
    then_by: bool,
}

pub fn order_by_node(
    chain: &mut OperationChain,
    source: NodeId,
    info: ParseInfo,
    operands: &[Rc<Expr>],
    method: &Method,
) -> Result<NodeId, InnerError> {
    let (name, direction, then_by) = match method.name.as_str() {
        "OrderBy" => ("OrderBy", OrderingDirection::Asc, false),
        "OrderByDescending" => ("OrderByDescending", OrderingDirection::Desc, false),
        "ThenBy" => ("ThenBy", OrderingDirection::Asc, true),
        "ThenByDescending" => ("ThenByDescending", OrderingDirection::Desc, true),
        _ => return Err(unexpected_operands(method, &info, operands)),
    };
    let [key_selector] = operands else {
        return Err(unexpected_operands(method, &info, operands));
    };

    Ok(chain.add(OrderByNode {
        info,
        source,
        name,
        key_selector: Rc::clone(key_selector),
        direction,
        then_by,
    }))
}

impl OperationNode for OrderByNode {
    fn name(&self) -> &str {
        self.name
    }

    fn info(&self) -> &ParseInfo {
        &self.info
    }

    fn source(&self) -> Option<NodeId> {
        Some(self.source)
    }

    fn resolve(
        &self,
        _id: NodeId,
        parameter: &Rc<Parameter>,
        expression: &Rc<Expr>,
        cx: &ResolveCx<'_>,
    ) -> VisitResult {
        cx.resolve(self.source, parameter, expression)
    }

    fn apply(
        &self,
        id: NodeId,
        builder: &mut QueryModelBuilder,
        context: &mut ClauseGenerationContext,
        chain: &OperationChain,
    ) -> Result<(), InnerError> {
        let ordering = Ordering {
            expression: ResolveCx::new(chain, context)
                .resolve_lambda(self.source, &self.key_selector)?,
            direction: self.direction,
        };

        let index = if self.then_by {
            let Some(clause) = builder.last_order_by_mut() else {
                return Err(StructuralError::OrderingExpected(self.info.call.to_string()).into());
            };
            clause.orderings.push(ordering);
            builder.body_clauses().len() - 1
        } else {
            builder.add_body_clause(BodyClause::OrderBy(OrderByClause {
                orderings: vec![ordering],
            }))
        };

        context.add(id, &self.info.call, ContextInfo::BodyClause(index))?;
        Ok(())
    }
}

/// `Join` or `GroupJoin`.
#[derive(Debug)]
pub struct JoinNode {
    info: ParseInfo,
    source: NodeId,
    inner_sequence: Rc<Expr>,
    outer_key_selector: Rc<Expr>,
    inner_key_selector: Rc<Expr>,
    result_selector: Rc<Expr>,
    group_join: bool,
    resolved_result_selector: OnceCell<Rc<Expr>>,
}

pub fn join_node(
    chain: &mut OperationChain,
    source: NodeId,
    info: ParseInfo,
    operands: &[Rc<Expr>],
    method: &Method,
) -> Result<NodeId, InnerError> {
    let [inner_sequence, outer_key_selector, inner_key_selector, result_selector] = operands
    else {
        return Err(unexpected_operands(method, &info, operands));
    };

    Ok(chain.add(JoinNode {
        info,
        source,
        inner_sequence: Rc::clone(inner_sequence),
        outer_key_selector: Rc::clone(outer_key_selector),
        inner_key_selector: Rc::clone(inner_key_selector),
        result_selector: Rc::clone(result_selector),
        group_join: method.name == "GroupJoin",
        resolved_result_selector: OnceCell::new(),
    }))
}

impl JoinNode {
    fn join_clause(&self, cx: &ResolveCx<'_>) -> Result<JoinClause, InnerError> {
        let (inner_item, inner_key) = single_param_lambda(&self.inner_key_selector)?;
        let source = QuerySource::new(inner_item.name.clone(), item_type_of(&self.inner_sequence)?);
        let reference = QuerySourceReference::expr(&source);

        Ok(JoinClause {
            inner_key_selector: ReplacingVisitor::replace_parameter(
                inner_item, &reference, inner_key,
            )?,
            outer_key_selector: cx.resolve_lambda(self.source, &self.outer_key_selector)?,
            inner_sequence: Rc::clone(&self.inner_sequence),
            source,
        })
    }

    fn resolved_result_selector(&self, id: NodeId, cx: &ResolveCx<'_>) -> VisitResult {
        cached(&self.resolved_result_selector, || {
            let (outer_item, joined, body) = two_param_lambda(&self.result_selector)?;
            let body = cx.resolve(self.source, outer_item, body)?;
            resolve_to_query_source(id, joined, &body, cx)
        })
    }
}

impl OperationNode for JoinNode {
    fn name(&self) -> &str {
        if self.group_join { "GroupJoin" } else { "Join" }
    }

    fn info(&self) -> &ParseInfo {
        &self.info
    }

    fn source(&self) -> Option<NodeId> {
        Some(self.source)
    }

    fn resolve(
        &self,
        id: NodeId,
        parameter: &Rc<Parameter>,
        expression: &Rc<Expr>,
        cx: &ResolveCx<'_>,
    ) -> VisitResult {
        let selector = self.resolved_result_selector(id, cx)?;
        ReplacingVisitor::replace_parameter(parameter, &selector, expression)
    }

    fn apply(
        &self,
        id: NodeId,
        builder: &mut QueryModelBuilder,
        context: &mut ClauseGenerationContext,
        chain: &OperationChain,
    ) -> Result<(), InnerError> {
        let join_clause = self.join_clause(&ResolveCx::new(chain, context))?;

        let (clause, source) = if self.group_join {
            let (_, group, _) = two_param_lambda(&self.result_selector)?;
            let source = QuerySource::new(
                group.name.clone(),
                Type::sequence(join_clause.source.item_type.clone()),
            );
            (
                BodyClause::GroupJoin(GroupJoinClause {
                    source: Rc::clone(&source),
                    join_clause,
                }),
                source,
            )
        } else {
            let source = Rc::clone(&join_clause.source);
            (BodyClause::Join(join_clause), source)
        };

        builder.add_body_clause(clause);
        context.add(id, &self.info.call, ContextInfo::QuerySource(source))?;

        let selector = self.resolved_result_selector(id, &ResolveCx::new(chain, context))?;
        builder.set_selector(selector);
        Ok(())
    }
}

/// Groups the selected items. A result operator whose groups form a query source.
#[derive(Debug)]
pub struct GroupByNode {
    info: ParseInfo,
    source: NodeId,
    key_selector: Rc<Expr>,
    element_selector: Option<Rc<Expr>>,
}

/// Builds a `GroupBy` node; a result selector becomes a projection of the groups.
pub fn group_by_node(
    chain: &mut OperationChain,
    source: NodeId,
    info: ParseInfo,
    operands: &[Rc<Expr>],
    method: &Method,
) -> Result<NodeId, InnerError> {
    let (key_selector, element_selector, result_selector) = match operands {
        [key] => (key, None, None),
        [key, element] if element.as_lambda().is_some_and(|(params, _)| params.len() == 1) => {
            (key, Some(element), None)
        }
        [key, result] => (key, None, Some(result)),
        [key, element, result] => (key, Some(element), Some(result)),
        _ => return Err(unexpected_operands(method, &info, operands)),
    };

    let Some(result_selector) = result_selector else {
        return Ok(chain.add(GroupByNode {
            info,
            source,
            key_selector: Rc::clone(key_selector),
            element_selector: element_selector.cloned(),
        }));
    };

    // (key, elements) => body  becomes  group => body[key := group.Key, elements := group]
    let (key, elements, body) = two_param_lambda(result_selector)?;
    let (item, key_body) = single_param_lambda(key_selector)?;
    let element_type = match element_selector {
        Some(element_selector) => single_param_lambda(element_selector)?.1.ty().clone(),
        None => item.ty.clone(),
    };
    let group = Parameter::new(
        elements.name.clone(),
        Type::grouping(key_body.ty().clone(), element_type),
    );
    let group_key = Expr::field(Expr::parameter(&group), "Key")?;
    let body = ReplacingVisitor::replace_parameter(key, &group_key, body)?;
    let body = ReplacingVisitor::replace_parameter(elements, &Expr::parameter(&group), &body)?;

    let group_by = chain.add(GroupByNode {
        info: ParseInfo::new(group.name.clone(), Rc::clone(&info.call)),
        source,
        key_selector: Rc::clone(key_selector),
        element_selector: element_selector.cloned(),
    });
    Ok(chain.add(SelectNode::new(
        info,
        group_by,
        Expr::lambda([group], body),
    )))
}

impl OperationNode for GroupByNode {
    fn name(&self) -> &str {
        "GroupBy"
    }

    fn info(&self) -> &ParseInfo {
        &self.info
    }

    fn source(&self) -> Option<NodeId> {
        Some(self.source)
    }

    fn is_result_operator(&self) -> bool {
        true
    }

    fn resolve(
        &self,
        id: NodeId,
        parameter: &Rc<Parameter>,
        expression: &Rc<Expr>,
        cx: &ResolveCx<'_>,
    ) -> VisitResult {
        resolve_to_query_source(id, parameter, expression, cx)
    }

    fn apply(
        &self,
        id: NodeId,
        builder: &mut QueryModelBuilder,
        context: &mut ClauseGenerationContext,
        chain: &OperationChain,
    ) -> Result<(), InnerError> {
        let cx = ResolveCx::new(chain, context);
        let key_selector = cx.resolve_lambda(self.source, &self.key_selector)?;
        let element_selector = match &self.element_selector {
            Some(element_selector) => cx.resolve_lambda(self.source, element_selector)?,
            None => {
                let (item, _) = single_param_lambda(&self.key_selector)?;
                cx.resolve(self.source, item, &Expr::parameter(item))?
            }
        };
        let source = QuerySource::new(
            self.info.associated_identifier.clone(),
            Type::grouping(key_selector.ty().clone(), element_selector.ty().clone()),
        );

        builder.add_result_operator(ResultOperator::GroupBy {
            source: Rc::clone(&source),
            key_selector,
            element_selector,
        });
        context.add(id, &self.info.call, ContextInfo::QuerySource(source))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        expr::{BinaryOp, ops},
        parser::{builder::build_query_model, chain::ChainParser, registry::NodeTypeRegistry},
        types::RecordType,
    };

    fn parse(query: &Rc<Expr>) -> String {
        let registry = NodeTypeRegistry::with_defaults();
        let (chain, result) = ChainParser::new(&registry, query)
            .parse_chain(query)
            .expect("chain is recognized");
        build_query_model(&chain, result)
            .expect("model builds")
            .to_string()
    }

    fn lambda(name: &str, ty: Type, body: impl FnOnce(Rc<Expr>) -> Rc<Expr>) -> Rc<Expr> {
        let param = Parameter::new(name, ty);
        let body = body(Expr::parameter(&param));
        Expr::lambda([param], body)
    }

    #[test]
    fn test_order_by_then_by() {
        let query = ops::then_by_descending(
            ops::order_by(
                ops::source("Source", Type::String),
                lambda("s", Type::String, |s| {
                    Expr::field(s, "Length").expect("strings have a length")
                }),
            ),
            lambda("s", Type::String, |s| s),
        );

        assert_eq!(
            parse(&query),
            "from String s in Source orderby s.Length asc, s desc select s"
        );
    }

    #[test]
    fn test_select_many_with_result_selector() {
        let customer = RecordType::new(
            "Customer",
            [("Name", Type::String), ("Orders", Type::sequence(Type::Int32))],
        );
        let c = Parameter::new("c", Type::Record(Rc::clone(&customer)));
        let o = Parameter::new("o", Type::Int32);
        let query = ops::select_many(
            ops::source("Customers", Type::Record(Rc::clone(&customer))),
            lambda("c", Type::Record(Rc::clone(&customer)), |c| {
                Expr::field(c, "Orders").expect("customers have orders")
            }),
            Some(Expr::lambda(
                [Rc::clone(&c), Rc::clone(&o)],
                Expr::binary(
                    BinaryOp::Add,
                    Expr::field(Expr::parameter(&c), "Name").expect("customers have a name"),
                    Expr::parameter(&o),
                ),
            )),
        );

        assert_eq!(
            parse(&query),
            "from Customer c in Customers from Int32 o in c.Orders select (c.Name + o)"
        );
    }

    #[rstest]
    #[case::join(false, "from Int32 x in Source join Int32 y in Source2 on x equals y select (x + y)")]
    #[case::group_join(
        true,
        "from Int32 x in Source join Int32 y in Source2 on x equals y into IEnumerable<Int32> g select x"
    )]
    fn test_join(#[case] group_join: bool, #[case] expected: &str) {
        let x = Parameter::new("x", Type::Int32);
        let query = if group_join {
            let g = Parameter::new("g", Type::sequence(Type::Int32));
            ops::group_join(
                ops::source("Source", Type::Int32),
                ops::source("Source2", Type::Int32),
                lambda("x", Type::Int32, |x| x),
                lambda("y", Type::Int32, |y| y),
                Expr::lambda([Rc::clone(&x), g], Expr::parameter(&x)),
            )
        } else {
            let y = Parameter::new("y", Type::Int32);
            ops::join(
                ops::source("Source", Type::Int32),
                ops::source("Source2", Type::Int32),
                lambda("x", Type::Int32, |x| x),
                lambda("y", Type::Int32, |y| y),
                Expr::lambda(
                    [Rc::clone(&x), Rc::clone(&y)],
                    Expr::binary(BinaryOp::Add, Expr::parameter(&x), Expr::parameter(&y)),
                ),
            )
        };

        assert_eq!(parse(&query), expected);
    }

    #[test]
    fn test_group_by_with_result_selector() {
        let k = Parameter::new("k", Type::Int32);
        let items = Parameter::new("items", Type::sequence(Type::Int32));
        let query = ops::group_by(
            ops::source("Source", Type::Int32),
            lambda("x", Type::Int32, |x| {
                Expr::binary(BinaryOp::Modulo, x, Expr::constant(2))
            }),
            None,
            Some(Expr::lambda(
                [Rc::clone(&k), Rc::clone(&items)],
                Expr::binary(
                    BinaryOp::Add,
                    Expr::parameter(&k),
                    Expr::field(Expr::parameter(&items), "Count").expect("sequences have a count"),
                ),
            )),
        );

        assert_eq!(
            parse(&query),
            "from IGrouping<Int32, Int32> items in {from Int32 x in Source select x => GroupBy((x % 2), x)} select (items.Key + items.Count)"
        );
    }

    #[test]
    fn test_then_by_without_order_by() {
        let query = ops::then_by(
            ops::source("Source", Type::Int32),
            lambda("x", Type::Int32, |x| x),
        );
        let registry = NodeTypeRegistry::with_defaults();
        let (chain, result) = ChainParser::new(&registry, &query)
            .parse_chain(&query)
            .expect("chain is recognized");

        assert_eq!(
            build_query_model(&chain, result).unwrap_err(),
            InnerError::Structural(StructuralError::OrderingExpected(query.to_string()))
        );
    }
}
