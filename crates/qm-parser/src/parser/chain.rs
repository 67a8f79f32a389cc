use std::{fmt, ops::Index, rc::Rc};

use itertools::Itertools;
use smol_str::SmolStr;

use crate::{
    arena::{Arena, ArenaId},
    error::{InnerError, recognition::RecognitionError, typing::TypeError},
    expr::{Args, Expr, ExprKind, Parameter},
    model::{QueryModel, SubQueryExpr},
    visitor::{UnknownKindPolicy, VisitResult, Visitor, dispatch},
};

use super::{
    builder::{QueryModelBuilder, build_query_model},
    context::{ClauseGenerationContext, ResolveCx},
    nodes::MainSourceNode,
    registry::{ArgShape, NodeTypeRegistry},
};

pub type NodeId = ArenaId<Box<dyn OperationNode>>;

/// Parse-time facts shared by every operation node.
#[derive(Debug, Clone)]
pub struct ParseInfo {
    /// Name given to the items this node produces.
    pub associated_identifier: SmolStr,
    /// The call (or, for the chain root, the source expression) this node came from.
    pub call: Rc<Expr>,
}

impl ParseInfo {
    pub fn new(associated_identifier: impl Into<SmolStr>, call: Rc<Expr>) -> Self {
        Self {
            associated_identifier: associated_identifier.into(),
            call,
        }
    }
}

/// One link of a classified operation chain.
pub trait OperationNode: fmt::Debug {
    fn name(&self) -> &str;

    fn info(&self) -> &ParseInfo;

    /// The node producing this node's input, `None` for the chain root.
    fn source(&self) -> Option<NodeId>;

    fn is_result_operator(&self) -> bool {
        false
    }

    /// Rewrites `expression`, in which `parameter` stands for an item produced
    /// by this node, in terms of the clauses of the query model.
    fn resolve(
        &self,
        id: NodeId,
        parameter: &Rc<Parameter>,
        expression: &Rc<Expr>,
        cx: &ResolveCx<'_>,
    ) -> VisitResult;

    /// Adds this node's clause to the model under construction.
    fn apply(
        &self,
        id: NodeId,
        builder: &mut QueryModelBuilder,
        context: &mut ClauseGenerationContext,
        chain: &OperationChain,
    ) -> Result<(), InnerError>;
}

/// Operation nodes of one chain, source-most first.
#[derive(Debug, Default)]
pub struct OperationChain {
    nodes: Arena<Box<dyn OperationNode>>,
}

impl OperationChain {
    pub fn add(&mut self, node: impl OperationNode + 'static) -> NodeId {
        self.nodes.alloc(Box::new(node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &dyn OperationNode)> {
        self.nodes.iter().map(|(id, node)| (id, node.as_ref()))
    }
}

impl Index<NodeId> for OperationChain {
    type Output = dyn OperationNode;

    fn index(&self, id: NodeId) -> &Self::Output {
        self.nodes[id].as_ref()
    }
}

impl fmt::Display for OperationChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.iter()
                .map(|(id, node)| format!("{id}: {}", node.name()))
                .join(" -> ")
        )
    }
}

/// Classifies chained operator calls into operation nodes and builds the
/// query model for them.
pub(crate) struct ChainParser<'a> {
    registry: &'a NodeTypeRegistry,
    chain_text: String,
    generated_identifiers: usize,
}

impl<'a> ChainParser<'a> {
    pub fn new(registry: &'a NodeTypeRegistry, root: &Expr) -> Self {
        Self {
            registry,
            chain_text: root.to_string(),
            generated_identifiers: 0,
        }
    }

    pub fn parse_model(&mut self, expr: &Rc<Expr>) -> Result<QueryModel, InnerError> {
        let (chain, result) = self.parse_chain(expr)?;
        tracing::trace!(%chain, "classified operation chain");
        build_query_model(&chain, result)
    }

    pub fn parse_chain(&mut self, expr: &Rc<Expr>) -> Result<(OperationChain, NodeId), InnerError> {
        let mut chain = OperationChain::default();
        let identifier = self.generate_identifier();
        let result = self.parse_node(&mut chain, expr, identifier)?;
        Ok((chain, result))
    }

    fn parse_node(
        &mut self,
        chain: &mut OperationChain,
        expr: &Rc<Expr>,
        identifier: SmolStr,
    ) -> Result<NodeId, InnerError> {
        let ExprKind::Call {
            method,
            object: None,
            args,
        } = expr.kind()
        else {
            return self.parse_main_source(chain, expr, identifier);
        };
        let Some((source, operands)) = args.split_first().filter(|_| method.is_query_operator())
        else {
            return self.parse_main_source(chain, expr, identifier);
        };

        let shape = operands.iter().map(|operand| ArgShape::of(operand)).collect::<Vec<_>>();
        let Some(constructor) = self.registry.lookup(&method.name, &shape) else {
            return Err(RecognitionError::UnknownOperation {
                name: method.name.clone(),
                shape: shape.iter().join(", "),
                call: expr.to_string(),
                chain: self.chain_text.clone(),
            }
            .into());
        };

        let source_identifier = item_parameter(&method.name, operands)
            .map(|param| param.name.clone())
            .unwrap_or_else(|| self.generate_identifier());
        let source = self.parse_node(chain, source, source_identifier)?;

        let operands = operands
            .iter()
            .map(|operand| SubQueryFinder { parser: &mut *self }.visit(operand))
            .collect::<Result<Args, _>>()?;

        constructor(
            chain,
            source,
            ParseInfo::new(identifier, Rc::clone(expr)),
            &operands,
            method,
        )
    }

    fn parse_main_source(
        &mut self,
        chain: &mut OperationChain,
        expr: &Rc<Expr>,
        identifier: SmolStr,
    ) -> Result<NodeId, InnerError> {
        if !expr.ty().is_sequence() {
            return Err(TypeError::NotASequence {
                expression: expr.to_string(),
                ty: expr.ty().clone(),
            }
            .into());
        }

        Ok(chain.add(MainSourceNode::new(ParseInfo::new(
            identifier,
            Rc::clone(expr),
        ))))
    }

    fn generate_identifier(&mut self) -> SmolStr {
        let identifier = smol_str::format_smolstr!("<generated>_{}", self.generated_identifiers);
        self.generated_identifiers += 1;
        identifier
    }
}

/// The lambda parameter that stands for the items of an operation's source.
fn item_parameter<'e>(operation: &str, operands: &'e [Rc<Expr>]) -> Option<&'e Rc<Parameter>> {
    let mut lambdas = operands.iter().filter_map(|operand| operand.as_lambda());

    match operation {
        // (accumulator, item) => ...
        "Aggregate" => lambdas
            .find(|(params, _)| params.len() == 2)
            .and_then(|(params, _)| params.last()),
        _ => lambdas.next().and_then(|(params, _)| params.first()),
    }
}

/// Turns query operator calls inside operation arguments into sub-queries.
struct SubQueryFinder<'p, 'a> {
    parser: &'p mut ChainParser<'a>,
}

impl Visitor for SubQueryFinder<'_, '_> {
    fn visit(&mut self, expr: &Rc<Expr>) -> VisitResult {
        if let ExprKind::Call { method, .. } = expr.kind()
            && method.is_query_operator()
        {
            let model = self.parser.parse_model(expr)?;
            tracing::trace!(%model, "found sub-query");
            return Ok(SubQueryExpr::expr(model, expr.ty().clone()));
        }

        dispatch(self, expr)
    }

    fn unknown_kind_policy(&self) -> UnknownKindPolicy {
        UnknownKindPolicy::PassThrough
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        expr::{BinaryOp, ops},
        types::Type,
    };

    fn predicate(name: &str) -> Rc<Expr> {
        let param = Parameter::new(name, Type::Int32);
        Expr::lambda(
            [Rc::clone(&param)],
            Expr::binary(BinaryOp::GreaterThan, Expr::parameter(&param), Expr::constant(1)),
        )
    }

    #[test]
    fn test_chain_is_source_first() {
        let registry = NodeTypeRegistry::with_defaults();
        let query = ops::take(
            ops::where_(ops::source("Source", Type::Int32), predicate("x")),
            Expr::constant(3),
        );
        let (chain, result) = ChainParser::new(&registry, &query)
            .parse_chain(&query)
            .expect("chain is recognized");

        assert_eq!(chain.to_string(), "#0: MainSource -> #1: Where -> #2: Take");
        assert_eq!(result, NodeId::new(2));
        assert_eq!(chain[NodeId::new(0)].info().associated_identifier, "x");
        assert_eq!(chain[result].info().associated_identifier, "<generated>_0");
        assert_eq!(chain[result].source(), Some(NodeId::new(1)));
    }

    #[rstest]
    #[case::indexed_where(
        {
            let x = Parameter::new("x", Type::Int32);
            let i = Parameter::new("i", Type::Int32);
            ops::query_operator(
                "Where",
                [],
                ops::source("Source", Type::Int32),
                [Expr::lambda([Rc::clone(&x), i], Expr::constant(true))],
                Type::queryable(Type::Int32),
            )
        },
        "Where"
    )]
    #[case::unknown_name(
        ops::query_operator("Shuffle", [], ops::source("Source", Type::Int32), [], Type::queryable(Type::Int32)),
        "Shuffle"
    )]
    fn test_unknown_operation(#[case] query: Rc<Expr>, #[case] expected_name: &str) {
        let registry = NodeTypeRegistry::with_defaults();
        let err = ChainParser::new(&registry, &query)
            .parse_chain(&query)
            .unwrap_err();

        match err {
            InnerError::Recognition(RecognitionError::UnknownOperation { name, chain, .. }) => {
                assert_eq!(name, expected_name);
                assert_eq!(chain, query.to_string());
            }
            err => panic!("unexpected error: {err}"),
        }
    }

    #[test]
    fn test_non_sequence_root() {
        let registry = NodeTypeRegistry::with_defaults();
        let query = Expr::constant(1);

        assert!(matches!(
            ChainParser::new(&registry, &query).parse_chain(&query),
            Err(InnerError::Type(TypeError::NotASequence { .. }))
        ));
    }
}
