mod builder;
mod chain;
mod context;
mod nodes;
mod registry;
mod result_operators;
mod validate;

use std::{fmt, rc::Rc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use builder::QueryModelBuilder;
pub use chain::{NodeId, OperationChain, OperationNode, ParseInfo};
pub use context::{ClauseGenerationContext, ContextInfo, ResolveCx};
pub use registry::{ArgShape, NodeConstructor, NodeTypeRegistry};
pub use validate::validate;

use crate::{
    error::{Error, InnerError, typing::TypeError},
    expr::{Expr, Parameter},
    model::QueryModel,
    partial_eval::{
        DefaultEvaluatableFilter, EvaluatableFilter, EvaluationErrorPolicy,
        evaluate_independent_subtrees,
    },
    transform::{RewriteOptions, TransformationRegistry, rewrite},
    visitor::VisitResult,
};

use chain::ChainParser;

pub(crate) fn lambda_parts(expr: &Rc<Expr>) -> Result<(&[Rc<Parameter>], &Rc<Expr>), TypeError> {
    expr.as_lambda().ok_or_else(|| TypeError::NotALambda {
        expression: expr.to_string(),
    })
}

pub(crate) fn single_param_lambda(
    expr: &Rc<Expr>,
) -> Result<(&Rc<Parameter>, &Rc<Expr>), TypeError> {
    match lambda_parts(expr)? {
        ([param], body) => Ok((param, body)),
        _ => Err(TypeError::NotALambda {
            expression: expr.to_string(),
        }),
    }
}

pub(crate) fn two_param_lambda(
    expr: &Rc<Expr>,
) -> Result<(&Rc<Parameter>, &Rc<Parameter>, &Rc<Expr>), TypeError> {
    match lambda_parts(expr)? {
        ([first, second], body) => Ok((first, second, body)),
        _ => Err(TypeError::NotALambda {
            expression: expr.to_string(),
        }),
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserOptions {
    /// Fold parameter-independent sub-trees before classification.
    pub partial_evaluation: bool,
    pub evaluation_error_policy: EvaluationErrorPolicy,
    pub rewrite: RewriteOptions,
    /// Check the finished model for references to clauses that are not visible.
    pub validate: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            partial_evaluation: true,
            evaluation_error_policy: EvaluationErrorPolicy::default(),
            rewrite: RewriteOptions::default(),
            validate: true,
        }
    }
}

/// The registries driving a parse.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub node_types: NodeTypeRegistry,
    pub rewrite_rules: TransformationRegistry,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            node_types: NodeTypeRegistry::with_defaults(),
            rewrite_rules: TransformationRegistry::with_default_rules(),
        }
    }
}

/// Turns a chained query expression into a [`QueryModel`].
///
/// The tree is partially evaluated and rewritten first; the result is then
/// classified into an operation chain and applied clause by clause.
pub struct QueryParser {
    config: PipelineConfig,
    options: ParserOptions,
    filter: Box<dyn EvaluatableFilter>,
}

impl Default for QueryParser {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl fmt::Debug for QueryParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryParser")
            .field("config", &self.config)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl QueryParser {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            options: ParserOptions::default(),
            filter: Box::new(DefaultEvaluatableFilter),
        }
    }

    pub fn with_options(mut self, options: ParserOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_evaluatable_filter(mut self, filter: impl EvaluatableFilter + 'static) -> Self {
        self.filter = Box::new(filter);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Runs partial evaluation and the rewrite pass over `expr`.
    pub fn preprocess(&self, expr: &Rc<Expr>) -> VisitResult {
        let evaluated = if self.options.partial_evaluation {
            let evaluated = evaluate_independent_subtrees(
                expr,
                self.filter.as_ref(),
                self.options.evaluation_error_policy,
            )?;
            tracing::debug!(expression = %evaluated, "partial evaluation finished");
            evaluated
        } else {
            Rc::clone(expr)
        };

        let rewritten = rewrite(&evaluated, &self.config.rewrite_rules, self.options.rewrite)?;
        tracing::debug!(expression = %rewritten, "rewrite pass finished");
        Ok(rewritten)
    }

    #[allow(clippy::result_large_err)]
    pub fn parse(&self, expr: &Rc<Expr>) -> Result<QueryModel, Error> {
        let tree = self
            .preprocess(expr)
            .map_err(|cause| Error::from_error(expr.to_string(), cause))?;

        self.build(&tree)
            .map_err(|cause| Error::from_error(tree.to_string(), cause))
    }

    fn build(&self, tree: &Rc<Expr>) -> Result<QueryModel, InnerError> {
        let model = ChainParser::new(&self.config.node_types, tree).parse_model(tree)?;
        tracing::debug!(%model, "query model built");

        if self.options.validate {
            validate(&model)?;
        }

        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{
        expr::{BinaryOp, ops},
        types::Type,
    };

    #[fixture]
    fn parser() -> QueryParser {
        QueryParser::default()
    }

    fn predicate(name: &str, right: Rc<Expr>) -> Rc<Expr> {
        let param = Parameter::new(name, Type::Int32);
        Expr::lambda(
            [Rc::clone(&param)],
            Expr::binary(BinaryOp::GreaterThan, Expr::parameter(&param), right),
        )
    }

    #[rstest]
    #[case::folded(
        ParserOptions::default(),
        "from Int32 x in Source where (x > 5) select x"
    )]
    #[case::not_folded(
        ParserOptions { partial_evaluation: false, ..ParserOptions::default() },
        "from Int32 x in Source where (x > (2 + 3)) select x"
    )]
    fn test_partial_evaluation_option(#[case] options: ParserOptions, #[case] expected: &str) {
        let query = ops::where_(
            ops::source("Source", Type::Int32),
            predicate(
                "x",
                Expr::binary(BinaryOp::Add, Expr::constant(2), Expr::constant(3)),
            ),
        );

        let model = QueryParser::default()
            .with_options(options)
            .parse(&query)
            .expect("query parses");

        assert_eq!(model.to_string(), expected);
    }

    #[rstest]
    fn test_error_locates_call(parser: QueryParser) {
        let x = Parameter::new("x", Type::Int32);
        let i = Parameter::new("i", Type::Int32);
        let query = ops::query_operator(
            "Where",
            [],
            ops::source("Source", Type::Int32),
            [Expr::lambda(
                [Rc::clone(&x), Rc::clone(&i)],
                Expr::binary(BinaryOp::GreaterThan, Expr::parameter(&x), Expr::parameter(&i)),
            )],
            Type::queryable(Type::Int32),
        );

        let err = parser.parse(&query).unwrap_err();

        assert!(matches!(
            err.cause,
            InnerError::Recognition(crate::error::recognition::RecognitionError::UnknownOperation { .. })
        ));
        assert_eq!(err.source_code, query.to_string());
    }

    #[rstest]
    #[case::single(predicate("x", Expr::constant(1)), true)]
    #[case::not_a_lambda(Expr::constant(1), false)]
    fn test_single_param_lambda(#[case] expr: Rc<Expr>, #[case] ok: bool) {
        assert_eq!(single_param_lambda(&expr).is_ok(), ok);
        assert!(two_param_lambda(&expr).is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_options_from_partial_json() {
        let options: ParserOptions = serde_json::from_str(
            r#"{"validate": false, "evaluation_error_policy": "Propagate"}"#,
        )
        .unwrap();

        assert_eq!(
            options,
            ParserOptions {
                validate: false,
                evaluation_error_policy: EvaluationErrorPolicy::Propagate,
                ..ParserOptions::default()
            }
        );
    }
}
