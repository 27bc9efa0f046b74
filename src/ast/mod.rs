//! Parse tree types for MSL scripts.
//!
//! Architecture: `source -> Tokenizer -> Parser -> Node tree -> Linker ->
//! Evaluator`. Node kinds are a tagged enum rather than a class hierarchy
//! (spec.md §9 "Polymorphic nodes" redesign), so the evaluator dispatches
//! with a single `match` instead of per-subclass virtuals, and the parser
//! keys its `wantsToken`/`wantsNode` behavior off `NodeKind` in one table
//! (see `crate::parser::handlers`).

pub mod types;

pub use types::*;
