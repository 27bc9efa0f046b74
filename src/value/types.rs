//! The dynamically typed `Value` and named `Binding` slot.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Soft cap on binding names, matching the original `char[128]` buffer.
/// Unlike the C source this never overflows memory; names longer than
/// this are truncated and a warning is logged.
pub const MAX_SHORT_STRING: usize = 128;

/// A name-sized string used for binding and variable identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShortString(String);

impl ShortString {
    pub fn new(s: impl Into<String>) -> Self {
        let mut s = s.into();
        if s.len() > MAX_SHORT_STRING {
            warn!(len = s.len(), "binding name exceeds {MAX_SHORT_STRING} bytes, truncating");
            s.truncate(MAX_SHORT_STRING);
        }
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShortString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ShortString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ShortString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// One cell of an immutable cons list. Lists are built by appending at the
/// tail; once built, the chain of cells is never mutated in place, so
/// cloning a `Value::List` is a cheap `Rc` clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListCell {
    pub head: Value,
    pub tail: Option<Rc<ListCell>>,
}

/// A dynamically typed scalar, or a cons-list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    /// An enumerated value: both its ordinal and its textual name are
    /// retained so comparisons can match either representation (see
    /// `Value::loose_eq`).
    Enum { ordinal: i32, name: String },
    /// A bare word the linker left unresolved on purpose — evaluates to
    /// its own name (spec.md Testable Property 11).
    Keyword(String),
    List(Rc<ListCell>),
}

impl Value {
    pub fn int(v: i64) -> Self {
        Value::Int(v)
    }

    pub fn float(v: f64) -> Self {
        Value::Float(v)
    }

    pub fn string(v: impl Into<String>) -> Self {
        Value::String(v.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Append `v` to the tail of `self`, returning a new list head. If
    /// `self` is not a list, it becomes the first element.
    pub fn append(self, v: Value) -> Value {
        match self {
            Value::Null => Value::List(Rc::new(ListCell { head: v, tail: None })),
            Value::List(cell) => {
                Value::List(Rc::new(append_cell(cell, v)))
            }
            other => {
                let first = Rc::new(ListCell { head: other, tail: None });
                Value::List(Rc::new(append_cell(first, v)))
            }
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Keyword(_) | Value::Enum { .. } => true,
            Value::List(_) => true,
        }
    }

    pub fn as_int(&self) -> i64 {
        match self {
            Value::Int(i) => *i,
            Value::Float(f) => *f as i64,
            Value::Bool(b) => {
                if *b {
                    1
                } else {
                    0
                }
            }
            Value::String(s) => s.trim().parse::<i64>().unwrap_or(0),
            Value::Enum { ordinal, .. } => *ordinal as i64,
            _ => 0,
        }
    }

    pub fn as_float(&self) -> f64 {
        match self {
            Value::Float(f) => *f,
            Value::Int(i) => *i as f64,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
            Value::Enum { ordinal, .. } => *ordinal as f64,
            _ => 0.0,
        }
    }

    /// Render the way `echo`/`print`/string concatenation do.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::String(s) => s.clone(),
            Value::Enum { name, .. } => name.clone(),
            Value::Keyword(k) => k.clone(),
            Value::List(cell) => {
                let mut parts = Vec::new();
                let mut cur = Some(cell.clone());
                while let Some(c) = cur {
                    parts.push(c.head.to_display_string());
                    cur = c.tail.clone();
                }
                parts.join(" ")
            }
        }
    }

    /// Comparison semantics specified for `==`/`!=` (spec.md §4.4):
    /// string-insensitive equality if either side is a `String`; integer
    /// equality otherwise; if one side is an `Enum`, compare by ordinal OR
    /// by the string form of the other side. This is what lets
    /// `switchQuantize == loop` work when `loop` is an unresolved keyword.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
            (Value::String(a), b) | (b, Value::String(a)) => {
                a.eq_ignore_ascii_case(&b.to_display_string())
            }
            (Value::Enum { ordinal, name }, other) | (other, Value::Enum { ordinal, name }) => {
                match other {
                    Value::Enum { ordinal: o2, .. } => ordinal == o2,
                    Value::Int(i) => *ordinal as i64 == *i,
                    _ => name.eq_ignore_ascii_case(&other.to_display_string()),
                }
            }
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Keyword(a), Value::Keyword(b)) => a.eq_ignore_ascii_case(b),
            (Value::Keyword(a), b) | (b, Value::Keyword(a)) => {
                a.eq_ignore_ascii_case(&b.to_display_string())
            }
            _ => self.as_int() == other.as_int(),
        }
    }
}

fn append_cell(cell: Rc<ListCell>, v: Value) -> ListCell {
    match &cell.tail {
        Some(tail) => ListCell {
            head: cell.head.clone(),
            tail: Some(Rc::new(append_cell(tail.clone(), v))),
        },
        None => ListCell {
            head: cell.head.clone(),
            tail: Some(Rc::new(ListCell { head: v, tail: None })),
        },
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

/// A `name -> value` pair, carrying the positional index used to resolve
/// `$1..$n` references inside a function body.
#[derive(Debug, Clone)]
pub struct Binding {
    pub name: ShortString,
    pub value: Value,
    pub position: i32,
}

impl Binding {
    pub fn new(name: impl Into<ShortString>, value: Value) -> Self {
        Self { name: name.into(), value, position: 0 }
    }

    pub fn positional(name: impl Into<ShortString>, value: Value, position: i32) -> Self {
        Self { name: name.into(), value, position }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loose_eq_enum_vs_keyword() {
        let enum_val = Value::Enum { ordinal: 3, name: "loop".to_string() };
        let keyword_val = Value::Keyword("loop".to_string());
        assert!(enum_val.loose_eq(&keyword_val));
    }

    #[test]
    fn loose_eq_string_case_insensitive() {
        assert!(Value::string("Loop").loose_eq(&Value::string("loop")));
    }

    #[test]
    fn list_append_builds_chain() {
        let v = Value::Null.append(Value::int(1)).append(Value::int(2)).append(Value::int(3));
        assert_eq!(v.to_display_string(), "1 2 3");
    }

    #[test]
    fn short_string_truncates_overlong_names() {
        let long = "x".repeat(200);
        let s = ShortString::new(long);
        assert_eq!(s.as_str().len(), MAX_SHORT_STRING);
    }
}
