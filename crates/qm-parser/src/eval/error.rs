use smol_str::SmolStr;
use thiserror::Error;

use crate::types::Type;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Divided by 0")]
    ZeroDivision,
    #[error("Arithmetic overflow in \"{0}\"")]
    Overflow(String),
    #[error(r#"Invalid types for "{}", got {}"#, op, args.join(", "))]
    InvalidTypes { op: SmolStr, args: Vec<SmolStr> },
    #[error("Parameter \"{0}\" is not bound")]
    UnboundParameter(SmolStr),
    #[error("\"{0}\" cannot be evaluated in memory")]
    NotEvaluatable(String),
    #[error("\"{1}\" is not defined on {0}")]
    UnknownMember(SmolStr, SmolStr),
    #[error("Cannot convert {from} to {to}")]
    InvalidConversion { from: SmolStr, to: Type },
    #[error("{message}")]
    UserDefined { message: String },
}
