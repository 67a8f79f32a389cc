use smol_str::SmolStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("Rewrite rule '{rule}' failed: {message}")]
    RuleFailed { rule: SmolStr, message: String },
    #[error("Rewriting '{expression}' did not reach a fixed point after {limit} rewrites")]
    RewriteLimitExceeded { expression: String, limit: usize },
}
