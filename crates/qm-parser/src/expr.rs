mod display;
pub mod extension;
pub mod node;
pub mod ops;

pub use extension::ExtensionExpr;
pub use node::{
    Args, BinaryOp, Expr, ExprKind, Method, MethodKind, NativeFn, NodeKind, Parameter, Params,
    UnaryOp,
};
