use smol_str::SmolStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecognitionError {
    #[error(
        "Could not parse expression '{call}': no operation is registered for '{name}' with arguments ({shape}). Full chain: {chain}"
    )]
    UnknownOperation {
        name: SmolStr,
        shape: String,
        call: String,
        chain: String,
    },
    #[error("Cannot visit extension node '{expression}' of kind '{kind}': it has no children to visit and cannot be reduced")]
    UnknownExtension { kind: &'static str, expression: String },
}

impl RecognitionError {
    /// Text of the offending call or node.
    #[cold]
    pub fn fragment(&self) -> &str {
        match self {
            RecognitionError::UnknownOperation { call, .. } => call,
            RecognitionError::UnknownExtension { expression, .. } => expression,
        }
    }
}
