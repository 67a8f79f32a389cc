use std::rc::Rc;

use crate::{
    error::InnerError,
    expr::{Expr, ExprKind, Method, Parameter},
    model::ResultOperator,
    types::Type,
    visitor::{ReplacingVisitor, VisitResult},
};

use super::{
    builder::QueryModelBuilder,
    chain::{NodeId, OperationChain, OperationNode, ParseInfo},
    context::{ClauseGenerationContext, ContextInfo, ResolveCx},
    lambda_parts,
    nodes::{SelectNode, WhereNode},
    registry::unexpected_operands,
};

/// A result operator other than `GroupBy`.
///
/// Lambdas held by the operator are stored unresolved and resolved when the
/// node is applied.
#[derive(Debug)]
pub struct ResultOperatorNode {
    info: ParseInfo,
    source: NodeId,
    operator: ResultOperator,
    input_item_type: Type,
}

fn input_item_type(call: &Expr) -> Type {
    match call.kind() {
        ExprKind::Call { args, .. } => args
            .first()
            .and_then(|source| source.ty().item_type().cloned())
            .unwrap_or(Type::Object),
        _ => Type::Object,
    }
}

pub fn result_operator_node(
    chain: &mut OperationChain,
    source: NodeId,
    info: ParseInfo,
    operands: &[Rc<Expr>],
    method: &Method,
) -> Result<NodeId, InnerError> {
    let input_item_type = input_item_type(&info.call);
    let type_arg = || {
        method
            .type_args
            .first()
            .or_else(|| info.call.ty().item_type())
            .cloned()
            .unwrap_or(Type::Object)
    };

    let operator = match (method.name.as_str(), operands) {
        ("Take", [count]) => ResultOperator::Take(Rc::clone(count)),
        ("Skip", [count]) => ResultOperator::Skip(Rc::clone(count)),
        ("Distinct", []) => ResultOperator::Distinct,
        ("Reverse", []) => ResultOperator::Reverse,
        ("Count", []) => ResultOperator::Count,
        ("LongCount", []) => ResultOperator::LongCount,
        ("Any", []) => ResultOperator::Any,
        ("All", [predicate]) => ResultOperator::All(Rc::clone(predicate)),
        ("Contains", [item]) => ResultOperator::Contains(Rc::clone(item)),
        ("First", []) => ResultOperator::First { or_default: false },
        ("FirstOrDefault", []) => ResultOperator::First { or_default: true },
        ("Last", []) => ResultOperator::Last { or_default: false },
        ("LastOrDefault", []) => ResultOperator::Last { or_default: true },
        ("Single", []) => ResultOperator::Single { or_default: false },
        ("SingleOrDefault", []) => ResultOperator::Single { or_default: true },
        ("Sum", []) => ResultOperator::Sum,
        ("Min", []) => ResultOperator::Min,
        ("Max", []) => ResultOperator::Max,
        ("Average", []) => ResultOperator::Average,
        ("Aggregate", [func]) => ResultOperator::Aggregate {
            func: Rc::clone(func),
        },
        ("Aggregate", [seed, func]) => ResultOperator::AggregateFromSeed {
            seed: Rc::clone(seed),
            func: Rc::clone(func),
            result_selector: None,
        },
        ("Aggregate", [seed, func, result_selector]) => ResultOperator::AggregateFromSeed {
            seed: Rc::clone(seed),
            func: Rc::clone(func),
            result_selector: Some(Rc::clone(result_selector)),
        },
        ("Union", [other]) => ResultOperator::Union(Rc::clone(other)),
        ("Concat", [other]) => ResultOperator::Concat(Rc::clone(other)),
        ("Intersect", [other]) => ResultOperator::Intersect(Rc::clone(other)),
        ("Except", [other]) => ResultOperator::Except(Rc::clone(other)),
        ("Cast", []) => ResultOperator::Cast(type_arg()),
        ("OfType", []) => ResultOperator::OfType(type_arg()),
        ("DefaultIfEmpty", []) => ResultOperator::DefaultIfEmpty(None),
        ("DefaultIfEmpty", [value]) => ResultOperator::DefaultIfEmpty(Some(Rc::clone(value))),
        _ => return Err(unexpected_operands(method, &info, operands)),
    };

    Ok(chain.add(ResultOperatorNode {
        info,
        source,
        operator,
        input_item_type,
    }))
}

/// `Count(predicate)` and friends: a `Where` followed by the plain operator.
pub fn filtered_node(
    chain: &mut OperationChain,
    source: NodeId,
    info: ParseInfo,
    operands: &[Rc<Expr>],
    method: &Method,
) -> Result<NodeId, InnerError> {
    let [predicate] = operands else {
        return Err(unexpected_operands(method, &info, operands));
    };
    let filtered = chain.add(WhereNode::new(info.clone(), source, Rc::clone(predicate)));
    result_operator_node(chain, filtered, info, &[], method)
}

/// `Sum(selector)` and friends: a `Select` followed by the plain operator.
pub fn projected_node(
    chain: &mut OperationChain,
    source: NodeId,
    info: ParseInfo,
    operands: &[Rc<Expr>],
    method: &Method,
) -> Result<NodeId, InnerError> {
    let [selector] = operands else {
        return Err(unexpected_operands(method, &info, operands));
    };
    let projected = chain.add(SelectNode::new(info.clone(), source, Rc::clone(selector)));
    result_operator_node(chain, projected, info, &[], method)
}

impl ResultOperatorNode {
    /// `(acc, item) => body` becomes `acc => body` with the item resolved.
    fn resolve_accumulator(&self, cx: &ResolveCx<'_>, func: &Rc<Expr>) -> VisitResult {
        let (params, body) = lambda_parts(func)?;
        let [accumulator, item] = params else {
            return Ok(Rc::clone(func));
        };
        let body = cx.resolve(self.source, item, body)?;
        Ok(Expr::lambda([Rc::clone(accumulator)], body))
    }
}

impl OperationNode for ResultOperatorNode {
    fn name(&self) -> &str {
        self.operator.name()
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
        _id: NodeId,
        parameter: &Rc<Parameter>,
        expression: &Rc<Expr>,
        cx: &ResolveCx<'_>,
    ) -> VisitResult {
        match &self.operator {
            ResultOperator::Cast(_) | ResultOperator::OfType(_) => {
                let item = Parameter::new(parameter.name.clone(), self.input_item_type.clone());
                let converted = Expr::convert(Expr::parameter(&item), parameter.ty.clone());
                let expression =
                    ReplacingVisitor::replace_parameter(parameter, &converted, expression)?;
                cx.resolve(self.source, &item, &expression)
            }
            _ => cx.resolve(self.source, parameter, expression),
        }
    }

    fn apply(
        &self,
        id: NodeId,
        builder: &mut QueryModelBuilder,
        context: &mut ClauseGenerationContext,
        chain: &OperationChain,
    ) -> Result<(), InnerError> {
        let cx = ResolveCx::new(chain, context);
        let operator = match &self.operator {
            ResultOperator::All(predicate) => {
                ResultOperator::All(cx.resolve_lambda(self.source, predicate)?)
            }
            ResultOperator::Aggregate { func } => ResultOperator::Aggregate {
                func: self.resolve_accumulator(&cx, func)?,
            },
            ResultOperator::AggregateFromSeed {
                seed,
                func,
                result_selector,
            } => ResultOperator::AggregateFromSeed {
                seed: Rc::clone(seed),
                func: self.resolve_accumulator(&cx, func)?,
                result_selector: result_selector.clone(),
            },
            operator => operator.clone(),
        };

        let index = builder.add_result_operator(operator);
        context.add(id, &self.info.call, ContextInfo::ResultOperator(index))?;
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

    fn greater_than(name: &str, value: i32) -> Rc<Expr> {
        let param = Parameter::new(name, Type::Int32);
        Expr::lambda(
            [Rc::clone(&param)],
            Expr::binary(
                BinaryOp::GreaterThan,
                Expr::parameter(&param),
                Expr::constant(value),
            ),
        )
    }

    fn numbers() -> Rc<Expr> {
        ops::source("Source", Type::Int32)
    }

    #[rstest]
    #[case::count_with_predicate(
        ops::count(numbers(), Some(greater_than("x", 1))),
        "from Int32 x in Source where (x > 1) select x => Count()"
    )]
    #[case::first_or_default(
        ops::element("FirstOrDefault", numbers(), None),
        "from Int32 <generated>_1 in Source select <generated>_1 => FirstOrDefault()"
    )]
    #[case::sum_with_selector(
        {
            let x = Parameter::new("x", Type::Int32);
            ops::sum(
                numbers(),
                Some(Expr::lambda(
                    [Rc::clone(&x)],
                    Expr::binary(BinaryOp::Multiply, Expr::parameter(&x), Expr::constant(2)),
                )),
            )
        },
        "from Int32 x in Source select (x * 2) => Sum()"
    )]
    #[case::all(
        ops::all(numbers(), greater_than("x", 0)),
        "from Int32 x in Source select x => All((x > 0))"
    )]
    #[case::take_skip(
        ops::skip(ops::take(numbers(), Expr::constant(10)), Expr::constant(2)),
        "from Int32 <generated>_2 in Source select <generated>_2 => Take(10) => Skip(2)"
    )]
    #[case::cast(
        ops::cast(numbers(), Type::Object),
        "from Int32 <generated>_1 in Source select <generated>_1 => Cast<Object>()"
    )]
    fn test_result_operators(#[case] query: Rc<Expr>, #[case] expected: &str) {
        assert_eq!(parse(&query), expected);
    }

    #[test]
    fn test_aggregate_resolves_item() {
        let acc = Parameter::new("acc", Type::Int32);
        let x = Parameter::new("x", Type::Int32);
        let query = ops::aggregate_with_seed(
            numbers(),
            Expr::constant(0),
            Expr::lambda(
                [Rc::clone(&acc), Rc::clone(&x)],
                Expr::binary(BinaryOp::Add, Expr::parameter(&acc), Expr::parameter(&x)),
            ),
            None,
        );

        assert_eq!(
            parse(&query),
            "from Int32 x in Source select x => Aggregate(0, acc => (acc + x))"
        );
    }

    #[test]
    fn test_predicate_after_cast_is_converted() {
        let o = Parameter::new("o", Type::Object);
        let query = ops::all(
            ops::cast(numbers(), Type::Object),
            Expr::lambda(
                [Rc::clone(&o)],
                Expr::binary(BinaryOp::Equal, Expr::parameter(&o), Expr::constant(1)),
            ),
        );

        assert_eq!(
            parse(&query),
            "from Int32 <generated>_1 in Source select <generated>_1 => Cast<Object>() => All((Convert(<generated>_1, Object) == 1))"
        );
    }
}
