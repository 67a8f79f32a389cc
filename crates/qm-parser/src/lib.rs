//! `qm-parser` turns chained query expressions into a resolved query model.
//!
//! A query such as `Source.Where(x => x > 10).Select(x => x * 2).Count()` is
//! given as an expression tree of operator calls, each taking the previous
//! call as its source. Parsing folds constant sub-trees, applies rewrite rules
//! and then builds a [`QueryModel`]: one main from clause, body clauses, a
//! select clause and result operators, with every lambda parameter replaced by
//! a reference to the clause that produces its items.
//!
//! ## Examples
//!
//! ```rust
//! use std::rc::Rc;
//! use qm_parser::{BinaryOp, Expr, Parameter, Type, ops};
//!
//! let x = Parameter::new("x", Type::Int32);
//! let query = ops::where_(
//!     ops::source("Source", Type::Int32),
//!     Expr::lambda(
//!         [Rc::clone(&x)],
//!         Expr::binary(BinaryOp::GreaterThan, Expr::parameter(&x), Expr::constant(10)),
//!     ),
//! );
//!
//! let model = qm_parser::parse(&query).unwrap();
//!
//! assert_eq!(model.to_string(), "from Int32 x in Source where (x > 10) select x");
//! ```
pub mod arena;
pub mod error;
pub mod eval;
pub mod expr;
pub mod model;
pub mod parser;
pub mod partial_eval;
pub mod transform;
pub mod types;
pub mod value;
pub mod visitor;

use std::rc::Rc;

pub use arena::{Arena, ArenaId};
pub use error::{
    Error, InnerError, recognition::RecognitionError, structural::StructuralError,
    transform::TransformError, typing::TypeError,
};
pub use eval::{Evaluator, error::EvalError};
pub use expr::{
    BinaryOp, Expr, ExprKind, ExtensionExpr, Method, MethodKind, NodeKind, Parameter, UnaryOp, ops,
};
pub use model::{
    BodyClause, MainFromClause, QueryModel, QuerySource, QuerySourceReference, ResultOperator,
    SelectClause, SubQueryExpr,
};
pub use parser::{ParserOptions, PipelineConfig, QueryParser};
pub use partial_eval::{
    DefaultEvaluatableFilter, EvaluatableFilter, EvaluationErrorPolicy, PartialEvaluationFailure,
};
pub use transform::{RewriteOptions, RewriteRule, TransformationRegistry};
pub use types::{RecordType, Type};
pub use value::{DataSource, Value};
pub use visitor::{ReplacingVisitor, UnknownKindPolicy, VisitResult, Visitor};

/// Parses `expr` with the default registries and options.
#[allow(clippy::result_large_err)]
pub fn parse(expr: &Rc<Expr>) -> Result<QueryModel, Error> {
    QueryParser::default().parse(expr)
}
