//! Lexical analysis: source text -> typed token stream.

pub mod lexer;

pub use lexer::{Token, TokenType, Tokenizer};
