//! The flat, host-visible error shape attached to compilation units and
//! sessions (spec.md §7 "Propagation: parse/link errors and warnings
//! attach to the compilation unit... Runtime errors attach to the
//! session").
//!
//! Leaf subsystems (parser, linker, evaluator, conductor) use their own
//! `thiserror` enums internally; this is the flattened record a host
//! actually inspects.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct MslError {
    pub line: u32,
    pub column: u32,
    pub detail: String,
}

impl MslError {
    pub fn new(detail: impl Into<String>) -> Self {
        MslError { line: 0, column: 0, detail: detail.into() }
    }

    pub fn at(line: u32, column: u32, detail: impl Into<String>) -> Self {
        MslError { line, column, detail: detail.into() }
    }
}

impl fmt::Display for MslError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}", self.detail)
        } else {
            write!(f, "{}:{}: {}", self.line, self.column, self.detail)
        }
    }
}

impl From<crate::parser::ParseError> for MslError {
    fn from(e: crate::parser::ParseError) -> Self {
        MslError::at(e.line, e.column, e.detail)
    }
}
