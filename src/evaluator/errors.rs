//! Runtime errors raised while walking a session's tree (spec.md §7
//! "Runtime errors").

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvalError {
    #[error("unresolved function call '{0}'")]
    UnresolvedCall(String),

    #[error("missing function argument '{0}'")]
    MissingArgument(String),

    #[error("assignment target is not a variable")]
    AssignToNonVariable,

    #[error("variable definition outside of a block")]
    VariableDefOutsideBlock,

    #[error("wait is not permitted to transition from shell context")]
    WaitTransitionDenied,

    #[error("context action failed: {0}")]
    ContextAction(String),

    #[error("context query failed: {0}")]
    ContextQuery(String),

    #[error("internal evaluator error: frames remain but session is neither waiting nor transitioning")]
    MysteriousState,
}

impl From<EvalError> for crate::errors::MslError {
    fn from(e: EvalError) -> Self {
        crate::errors::MslError::new(e.to_string())
    }
}
