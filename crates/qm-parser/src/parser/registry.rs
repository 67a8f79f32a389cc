use std::{fmt, rc::Rc};

use itertools::Itertools;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::{
    error::{InnerError, recognition::RecognitionError},
    expr::{Expr, Method},
};

use super::{
    chain::{NodeId, OperationChain, ParseInfo},
    nodes, result_operators,
};

/// Builds the operation node(s) for one recognized call.
///
/// Receives the already classified source node and the call's remaining
/// arguments, with embedded sub-queries already extracted. Returns the node
/// that stands for the whole call.
pub type NodeConstructor = fn(
    chain: &mut OperationChain,
    source: NodeId,
    info: ParseInfo,
    operands: &[Rc<Expr>],
    method: &Method,
) -> Result<NodeId, InnerError>;

/// The shape of one operation argument, used to tell overloads apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgShape {
    Sequence,
    /// A lambda with the given number of parameters.
    Lambda(usize),
    Value,
}

impl ArgShape {
    pub fn of(expr: &Expr) -> Self {
        match expr.as_lambda() {
            Some((params, _)) => ArgShape::Lambda(params.len()),
            None if expr.ty().is_sequence() => ArgShape::Sequence,
            None => ArgShape::Value,
        }
    }
}

impl fmt::Display for ArgShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgShape::Sequence => write!(f, "sequence"),
            ArgShape::Lambda(arity) => write!(f, "lambda/{arity}"),
            ArgShape::Value => write!(f, "value"),
        }
    }
}

type Signature = SmallVec<[ArgShape; 4]>;

/// Maps operation names and argument shapes to node constructors.
///
/// The shape excludes the leading source argument.
#[derive(Clone, Default)]
pub struct NodeTypeRegistry {
    entries: FxHashMap<SmolStr, Vec<(Signature, NodeConstructor)>>,
}

impl NodeTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `constructor` for `name` with the given shape, replacing an
    /// earlier registration of the same signature.
    pub fn register(
        &mut self,
        name: impl Into<SmolStr>,
        shape: impl IntoIterator<Item = ArgShape>,
        constructor: NodeConstructor,
    ) {
        let shape: Signature = shape.into_iter().collect();
        let overloads = self.entries.entry(name.into()).or_default();

        match overloads.iter_mut().find(|(signature, _)| *signature == shape) {
            Some((_, existing)) => *existing = constructor,
            None => overloads.push((shape, constructor)),
        }
    }

    pub fn lookup(&self, name: &str, shape: &[ArgShape]) -> Option<NodeConstructor> {
        self.entries
            .get(name)?
            .iter()
            .find_map(|(signature, constructor)| (signature.as_slice() == shape).then_some(*constructor))
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A registry recognizing the standard query operators.
    ///
    /// The indexed overloads of `Select` and `Where` are not recognized.
    pub fn with_defaults() -> Self {
        use ArgShape::{Lambda, Sequence, Value};

        let mut registry = Self::new();

        registry.register("Where", [Lambda(1)], nodes::where_node);
        registry.register("Select", [Lambda(1)], nodes::select_node);
        registry.register("SelectMany", [Lambda(1)], nodes::select_many_node);
        registry.register("SelectMany", [Lambda(1), Lambda(2)], nodes::select_many_node);
        for name in ["OrderBy", "OrderByDescending", "ThenBy", "ThenByDescending"] {
            registry.register(name, [Lambda(1)], nodes::order_by_node);
        }
        registry.register(
            "Join",
            [Sequence, Lambda(1), Lambda(1), Lambda(2)],
            nodes::join_node,
        );
        registry.register(
            "GroupJoin",
            [Sequence, Lambda(1), Lambda(1), Lambda(2)],
            nodes::join_node,
        );
        registry.register("GroupBy", [Lambda(1)], nodes::group_by_node);
        registry.register("GroupBy", [Lambda(1), Lambda(1)], nodes::group_by_node);
        registry.register("GroupBy", [Lambda(1), Lambda(2)], nodes::group_by_node);
        registry.register(
            "GroupBy",
            [Lambda(1), Lambda(1), Lambda(2)],
            nodes::group_by_node,
        );

        for name in ["Take", "Skip", "Contains"] {
            registry.register(name, [Value], result_operators::result_operator_node);
        }
        for name in ["Distinct", "Reverse"] {
            registry.register(name, [], result_operators::result_operator_node);
        }
        for name in [
            "Count",
            "LongCount",
            "Any",
            "First",
            "FirstOrDefault",
            "Last",
            "LastOrDefault",
            "Single",
            "SingleOrDefault",
        ] {
            registry.register(name, [], result_operators::result_operator_node);
            registry.register(name, [Lambda(1)], result_operators::filtered_node);
        }
        registry.register("All", [Lambda(1)], result_operators::result_operator_node);
        for name in ["Sum", "Min", "Max", "Average"] {
            registry.register(name, [], result_operators::result_operator_node);
            registry.register(name, [Lambda(1)], result_operators::projected_node);
        }
        registry.register("Aggregate", [Lambda(2)], result_operators::result_operator_node);
        registry.register(
            "Aggregate",
            [Value, Lambda(2)],
            result_operators::result_operator_node,
        );
        registry.register(
            "Aggregate",
            [Value, Lambda(2), Lambda(1)],
            result_operators::result_operator_node,
        );
        for name in ["Union", "Concat", "Intersect", "Except"] {
            registry.register(name, [Sequence], result_operators::result_operator_node);
        }
        for name in ["Cast", "OfType"] {
            registry.register(name, [], result_operators::result_operator_node);
        }
        registry.register("DefaultIfEmpty", [], result_operators::result_operator_node);
        registry.register(
            "DefaultIfEmpty",
            [Value],
            result_operators::result_operator_node,
        );

        registry
    }
}

impl fmt::Debug for NodeTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().sorted_by_key(|(name, _)| *name).map(
                |(name, overloads)| {
                    (
                        name,
                        overloads
                            .iter()
                            .map(|(signature, _)| format!("({})", signature.iter().join(", ")))
                            .collect::<Vec<_>>(),
                    )
                },
            ))
            .finish()
    }
}

/// The error for a constructor handed operands it was not registered for.
#[cold]
pub(super) fn unexpected_operands(
    method: &Method,
    info: &ParseInfo,
    operands: &[Rc<Expr>],
) -> InnerError {
    RecognitionError::UnknownOperation {
        name: method.name.clone(),
        shape: operands.iter().map(|operand| ArgShape::of(operand)).join(", "),
        call: info.call.to_string(),
        chain: info.call.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        expr::{BinaryOp, Parameter, ops},
        types::Type,
    };

    #[rstest]
    #[case::where_predicate("Where", vec![ArgShape::Lambda(1)], true)]
    #[case::indexed_where("Where", vec![ArgShape::Lambda(2)], false)]
    #[case::group_by_result("GroupBy", vec![ArgShape::Lambda(1), ArgShape::Lambda(2)], true)]
    #[case::count("Count", vec![], true)]
    #[case::count_predicate("Count", vec![ArgShape::Lambda(1)], true)]
    #[case::take_lambda("Take", vec![ArgShape::Lambda(1)], false)]
    #[case::unknown("Shuffle", vec![], false)]
    fn test_lookup(#[case] name: &str, #[case] shape: Vec<ArgShape>, #[case] found: bool) {
        let registry = NodeTypeRegistry::with_defaults();

        assert_eq!(registry.lookup(name, &shape).is_some(), found);
    }

    #[test]
    fn test_register_replaces_same_signature() {
        let mut registry = NodeTypeRegistry::new();
        registry.register("Where", [ArgShape::Lambda(1)], nodes::where_node);
        registry.register("Where", [ArgShape::Lambda(1)], nodes::where_node);
        registry.register("Where", [ArgShape::Lambda(2)], nodes::where_node);

        assert_eq!(registry.len(), 2);
        assert!(registry.is_registered("Where"));
        assert!(!registry.is_registered("Select"));
    }

    #[test]
    fn test_arg_shape() {
        let x = Parameter::new("x", Type::Int32);
        let lambda = Expr::lambda(
            [Rc::clone(&x)],
            Expr::binary(BinaryOp::Add, Expr::parameter(&x), Expr::constant(1)),
        );

        assert_eq!(ArgShape::of(&lambda), ArgShape::Lambda(1));
        assert_eq!(
            ArgShape::of(&ops::source("Source", Type::Int32)),
            ArgShape::Sequence
        );
        assert_eq!(ArgShape::of(&Expr::constant(5)), ArgShape::Value);
        assert_eq!(ArgShape::Lambda(2).to_string(), "lambda/2");
    }
}
