//! Parse-time error type.

use thiserror::Error;

use crate::token::Token;

/// A single parse error, accumulated on the compilation unit rather than
/// aborting the parse (spec.md §4.2 "Errors are accumulated with {line,
/// column, token, detail}").
#[derive(Debug, Clone, Error)]
#[error("parse error at {line}:{column}: {detail}")]
pub struct ParseError {
    pub line: u32,
    pub column: u32,
    pub token: Option<String>,
    pub detail: String,
}

impl ParseError {
    pub fn new(detail: impl Into<String>, line: u32, column: u32) -> Self {
        ParseError { line, column, token: None, detail: detail.into() }
    }

    pub fn at_token(detail: impl Into<String>, token: &Token) -> Self {
        ParseError {
            line: token.line,
            column: token.column,
            token: Some(token.value.clone()),
            detail: detail.into(),
        }
    }
}
