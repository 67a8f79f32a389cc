use smol_str::SmolStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StructuralError {
    #[error(
        "Cannot resolve query source reference '{reference}' in clause '{clause}': it does not refer to an earlier clause"
    )]
    UnresolvedReference { clause: String, reference: SmolStr },
    #[error("Parameter '{parameter}' in clause '{clause}' is not bound by an enclosing lambda")]
    DanglingParameter { clause: String, parameter: SmolStr },
    #[error("Operation '{0}' has already been applied to the query model")]
    AlreadyProcessed(String),
    #[error("Operation '{0}' has not been applied to the query model yet")]
    NotProcessed(String),
    #[error("Operation '{0}' does not produce a query source")]
    NotAQuerySource(String),
    #[error("'{0}' is only allowed directly after an ordering operation")]
    OrderingExpected(String),
    #[error("Query model has no main from clause")]
    MissingMainFromClause,
}

impl StructuralError {
    #[cold]
    pub fn fragment(&self) -> Option<&str> {
        match self {
            StructuralError::UnresolvedReference { reference, .. } => Some(reference),
            StructuralError::DanglingParameter { parameter, .. } => Some(parameter),
            StructuralError::AlreadyProcessed(call)
            | StructuralError::NotProcessed(call)
            | StructuralError::NotAQuerySource(call)
            | StructuralError::OrderingExpected(call) => Some(call),
            StructuralError::MissingMainFromClause => None,
        }
    }
}
