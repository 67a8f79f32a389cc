pub mod recognition;
pub mod structural;
pub mod transform;
pub mod typing;

use miette::{Diagnostic, SourceOffset, SourceSpan};

use crate::eval::error::EvalError;
use recognition::RecognitionError;
use structural::StructuralError;
use transform::TransformError;
use typing::TypeError;

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum InnerError {
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("Failed to evaluate '{expression}': {cause}")]
    Evaluation { expression: String, cause: EvalError },
    #[error(transparent)]
    Transform(#[from] TransformError),
}

impl InnerError {
    #[cold]
    fn fragment(&self) -> Option<&str> {
        match self {
            InnerError::Recognition(err) => Some(err.fragment()),
            InnerError::Structural(err) => err.fragment(),
            InnerError::Type(err) => err.fragment(),
            InnerError::Evaluation { expression, .. } => Some(expression),
            InnerError::Transform(TransformError::RewriteLimitExceeded { expression, .. }) => {
                Some(expression)
            }
            InnerError::Transform(TransformError::RuleFailed { .. }) => None,
        }
    }
}

/// A failed parse, carrying the rendered input chain for diagnostics.
#[derive(PartialEq, Debug, thiserror::Error)]
#[error("{cause}")]
pub struct Error {
    /// The underlying cause of the error.
    pub cause: InnerError,
    /// The rendered operation chain that was being parsed.
    pub source_code: String,
    /// The location of the offending node within `source_code`.
    pub location: SourceSpan,
}

impl Error {
    pub fn from_error(source_code: impl Into<String>, cause: InnerError) -> Self {
        let source_code = source_code.into();
        let location = match cause
            .fragment()
            .and_then(|fragment| source_code.find(fragment).map(|start| (start, fragment.len())))
        {
            Some((start, len)) => SourceSpan::new(SourceOffset::from(start), len.max(1)),
            None => SourceSpan::new(SourceOffset::from(0), source_code.len()),
        };

        Self {
            cause,
            source_code,
            location,
        }
    }
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let c = match &self.cause {
            InnerError::Recognition(RecognitionError::UnknownOperation { .. }) => {
                "RecognitionError::UnknownOperation"
            }
            InnerError::Recognition(RecognitionError::UnknownExtension { .. }) => {
                "RecognitionError::UnknownExtension"
            }
            InnerError::Structural(StructuralError::UnresolvedReference { .. }) => {
                "StructuralError::UnresolvedReference"
            }
            InnerError::Structural(StructuralError::DanglingParameter { .. }) => {
                "StructuralError::DanglingParameter"
            }
            InnerError::Structural(StructuralError::AlreadyProcessed(_)) => {
                "StructuralError::AlreadyProcessed"
            }
            InnerError::Structural(StructuralError::NotProcessed(_)) => {
                "StructuralError::NotProcessed"
            }
            InnerError::Structural(StructuralError::NotAQuerySource(_)) => {
                "StructuralError::NotAQuerySource"
            }
            InnerError::Structural(StructuralError::OrderingExpected(_)) => {
                "StructuralError::OrderingExpected"
            }
            InnerError::Structural(StructuralError::MissingMainFromClause) => {
                "StructuralError::MissingMainFromClause"
            }
            InnerError::Type(TypeError::Mismatch { .. }) => "TypeError::Mismatch",
            InnerError::Type(TypeError::KindMismatch { .. }) => "TypeError::KindMismatch",
            InnerError::Type(TypeError::NotASequence { .. }) => "TypeError::NotASequence",
            InnerError::Type(TypeError::NotALambda { .. }) => "TypeError::NotALambda",
            InnerError::Type(TypeError::UnknownMember { .. }) => "TypeError::UnknownMember",
            InnerError::Evaluation { .. } => "EvaluationError",
            InnerError::Transform(TransformError::RuleFailed { .. }) => {
                "TransformError::RuleFailed"
            }
            InnerError::Transform(TransformError::RewriteLimitExceeded { .. }) => {
                "TransformError::RewriteLimitExceeded"
            }
        };

        Some(Box::new(c))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let msg = match &self.cause {
            InnerError::Recognition(RecognitionError::UnknownOperation { name, .. }) => Some(
                format!("Register a node type for '{name}' with this argument shape, or rewrite the call before parsing."),
            ),
            InnerError::Recognition(RecognitionError::UnknownExtension { .. }) => Some(
                "Override `visit_children` or `reduce` on the extension node.".to_string(),
            ),
            InnerError::Structural(StructuralError::UnresolvedReference { .. }) => Some(
                "A clause may only refer to clauses that appear before it in the same or an enclosing query.".to_string(),
            ),
            InnerError::Structural(StructuralError::DanglingParameter { parameter, .. }) => Some(
                format!("'{parameter}' is neither a lambda parameter in scope nor an item of an earlier clause."),
            ),
            InnerError::Structural(StructuralError::OrderingExpected(_)) => Some(
                "Use OrderBy or OrderByDescending before ThenBy.".to_string(),
            ),
            InnerError::Type(TypeError::Mismatch { .. }) => {
                Some("A replacement node must keep the static type of the node it replaces.".to_string())
            }
            InnerError::Type(TypeError::KindMismatch { .. }) => {
                Some("Check the node kinds the rewrite rule was registered for.".to_string())
            }
            InnerError::Evaluation { .. } => Some(
                "Use the deferring evaluation error policy to postpone this failure to execution time.".to_string(),
            ),
            InnerError::Transform(TransformError::RewriteLimitExceeded { .. }) => Some(
                "The registered rewrite rules undo each other at this node.".to_string(),
            ),
            _ => None,
        };

        msg.map(|m| Box::new(m) as Box<dyn std::fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(
            miette::LabeledSpan::new_with_span(Some(format!("{}", self.cause)), self.location),
        )))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.source_code)
    }
}
