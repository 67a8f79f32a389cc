use smol_str::SmolStr;
use thiserror::Error;

use crate::{expr::NodeKind, types::Type};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypeError {
    #[error(
        "Cannot replace '{original}' of type {expected} with '{replacement}' of incompatible type {actual}"
    )]
    Mismatch {
        original: String,
        expected: Type,
        replacement: String,
        actual: Type,
    },
    #[error("Rewrite rule '{rule}' is registered for {expected} but was invoked on a {actual} node")]
    KindMismatch {
        rule: SmolStr,
        expected: String,
        actual: NodeKind,
    },
    #[error("'{expression}' of type {ty} is not a sequence")]
    NotASequence { expression: String, ty: Type },
    #[error("'{expression}' is not a lambda expression")]
    NotALambda { expression: String },
    #[error("Type {ty} has no member '{member}'")]
    UnknownMember { ty: Type, member: SmolStr },
}

impl TypeError {
    #[cold]
    pub fn fragment(&self) -> Option<&str> {
        match self {
            TypeError::Mismatch { original, .. } => Some(original),
            TypeError::NotASequence { expression, .. } | TypeError::NotALambda { expression } => {
                Some(expression)
            }
            TypeError::KindMismatch { .. } | TypeError::UnknownMember { .. } => None,
        }
    }
}
