//! Link-time error variants (spec.md §4.3 "Additional checks", §7).
//!
//! Flattened into `MslError` the same way the parser's `ParseError` and
//! the evaluator's `EvalError` are — see `crate::errors`.

use thiserror::Error;

use crate::errors::MslError;

#[derive(Debug, Error, Clone)]
pub enum LinkError {
    #[error("'{0}' is called like a function but does not resolve to one")]
    CallSyntaxOnNonFunction(String),
    #[error("missing function argument '{0}'")]
    MissingArgument(String),
    #[error("'{0}' is not assignable")]
    NotAssignable(String),
    #[error("'{0}' is declared as both a function and a variable in the same block")]
    AmbiguousLocalDefinition(String),
}

impl From<LinkError> for MslError {
    fn from(e: LinkError) -> Self {
        MslError::new(e.to_string())
    }
}
