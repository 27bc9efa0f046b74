//! Tokenizer for MSL source text.
//!
//! Whitespace-skipping, UTF-8, line/column tracking. Adjacency
//! (`preceded_by_space`) is preserved on every token so the parser can
//! detect `name:name` qualified symbols — two symbol tokens separated by a
//! `:` token with no intervening whitespace (spec.md §4.1).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Symbol,
    String,
    Int,
    Float,
    Bool,
    Operator,
    Bracket,
    Punctuation,
    Processor,
    /// `$n` positional reference.
    Positional,
    Comment,
    Error,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    pub line: u32,
    pub column: u32,
    /// False if this token is immediately adjacent to the previous one
    /// (no whitespace or comment between them).
    pub preceded_by_space: bool,
}

impl Token {
    pub fn end(line: u32, column: u32) -> Self {
        Token { token_type: TokenType::End, value: String::new(), line, column, preceded_by_space: true }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:?}) at {}:{}", self.token_type, self.value, self.line, self.column)
    }
}

const TWO_CHAR_OPERATORS: &[&str] = &["==", "!=", ">=", "<=", "&&", "||"];
const ONE_CHAR_OPERATORS: &str = "+-*/=><!&";
const BRACKETS: &str = "{}()[]";
const PUNCTUATION: &str = ",;:";

pub struct Tokenizer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    /// Lookahead buffer so the parser can peek without re-lexing.
    pushed_back: Vec<Token>,
    saw_space_since_last: bool,
}

impl Tokenizer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            pushed_back: Vec::new(),
            saw_space_since_last: true,
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Skip whitespace and `//` / `/* */` comments (C++-style, per
    /// spec.md §6 "Comments are C++-style").
    fn skip_trivia(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.saw_space_since_last = true;
                    self.advance_char();
                }
                Some('/') if self.peek_char_at(1) == Some('/') => {
                    self.saw_space_since_last = true;
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.advance_char();
                    }
                }
                Some('/') if self.peek_char_at(1) == Some('*') => {
                    self.saw_space_since_last = true;
                    self.advance_char();
                    self.advance_char();
                    while let Some(c) = self.peek_char() {
                        if c == '*' && self.peek_char_at(1) == Some('/') {
                            self.advance_char();
                            self.advance_char();
                            break;
                        }
                        self.advance_char();
                    }
                }
                _ => break,
            }
        }
    }

    pub fn peek(&mut self) -> Token {
        let t = self.next_token();
        self.pushed_back.push(t.clone());
        t
    }

    pub fn unread(&mut self, t: Token) {
        self.pushed_back.push(t);
    }

    pub fn next_token(&mut self) -> Token {
        if let Some(t) = self.pushed_back.pop() {
            return t;
        }

        self.skip_trivia();
        let preceded_by_space = std::mem::replace(&mut self.saw_space_since_last, false);
        let (line, column) = (self.line, self.column);

        let Some(c) = self.peek_char() else {
            return Token { token_type: TokenType::End, value: String::new(), line, column, preceded_by_space };
        };

        // `#` directive line
        if c == '#' {
            let mut value = String::new();
            while let Some(c) = self.peek_char() {
                if c == '\n' {
                    break;
                }
                value.push(c);
                self.advance_char();
            }
            return Token { token_type: TokenType::Processor, value, line, column, preceded_by_space };
        }

        // quoted string
        if c == '"' {
            self.advance_char();
            let mut value = String::new();
            loop {
                match self.peek_char() {
                    None => break,
                    Some('"') => {
                        self.advance_char();
                        break;
                    }
                    Some('\\') => {
                        self.advance_char();
                        if let Some(escaped) = self.advance_char() {
                            value.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => other,
                            });
                        }
                    }
                    Some(other) => {
                        value.push(other);
                        self.advance_char();
                    }
                }
            }
            return Token { token_type: TokenType::String, value, line, column, preceded_by_space };
        }

        // `$n` positional reference
        if c == '$' && self.peek_char_at(1).map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.advance_char();
            let mut value = String::new();
            while let Some(c) = self.peek_char() {
                if c.is_ascii_digit() {
                    value.push(c);
                    self.advance_char();
                } else {
                    break;
                }
            }
            return Token { token_type: TokenType::Positional, value, line, column, preceded_by_space };
        }

        // number
        if c.is_ascii_digit() {
            let mut value = String::new();
            let mut is_float = false;
            while let Some(c) = self.peek_char() {
                if c.is_ascii_digit() {
                    value.push(c);
                    self.advance_char();
                } else if c == '.' && !is_float && self.peek_char_at(1).map(|c| c.is_ascii_digit()).unwrap_or(false) {
                    is_float = true;
                    value.push(c);
                    self.advance_char();
                } else {
                    break;
                }
            }
            let token_type = if is_float { TokenType::Float } else { TokenType::Int };
            return Token { token_type, value, line, column, preceded_by_space };
        }

        // identifier / keyword / bool literal
        if c.is_alphabetic() || c == '_' {
            let mut value = String::new();
            while let Some(c) = self.peek_char() {
                if c.is_alphanumeric() || c == '_' {
                    value.push(c);
                    self.advance_char();
                } else {
                    break;
                }
            }
            let token_type = if value == "true" || value == "false" { TokenType::Bool } else { TokenType::Symbol };
            return Token { token_type, value, line, column, preceded_by_space };
        }

        // two-character operators
        if let Some(next) = self.peek_char_at(1) {
            let pair: String = [c, next].iter().collect();
            if TWO_CHAR_OPERATORS.contains(&pair.as_str()) {
                self.advance_char();
                self.advance_char();
                return Token { token_type: TokenType::Operator, value: pair, line, column, preceded_by_space };
            }
        }

        if ONE_CHAR_OPERATORS.contains(c) {
            self.advance_char();
            return Token { token_type: TokenType::Operator, value: c.to_string(), line, column, preceded_by_space };
        }

        if BRACKETS.contains(c) {
            self.advance_char();
            return Token { token_type: TokenType::Bracket, value: c.to_string(), line, column, preceded_by_space };
        }

        if PUNCTUATION.contains(c) {
            self.advance_char();
            return Token { token_type: TokenType::Punctuation, value: c.to_string(), line, column, preceded_by_space };
        }

        // unrecognized character
        self.advance_char();
        Token { token_type: TokenType::Error, value: c.to_string(), line, column, preceded_by_space }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(src: &str) -> Vec<Token> {
        let mut t = Tokenizer::new(src);
        let mut out = Vec::new();
        loop {
            let tok = t.next_token();
            if tok.token_type == TokenType::End {
                break;
            }
            out.push(tok);
        }
        out
    }

    #[test]
    fn lexes_arithmetic() {
        let toks = lex_all("1 + 2 * 3");
        let types: Vec<_> = toks.iter().map(|t| t.token_type).collect();
        assert_eq!(types, vec![TokenType::Int, TokenType::Operator, TokenType::Int, TokenType::Operator, TokenType::Int]);
    }

    #[test]
    fn detects_adjacent_qualified_name() {
        let toks = lex_all("foo:bar baz");
        assert_eq!(toks[0].value, "foo");
        assert_eq!(toks[1].value, ":");
        assert!(!toks[1].preceded_by_space);
        assert_eq!(toks[2].value, "bar");
        assert!(!toks[2].preceded_by_space);
        assert_eq!(toks[3].value, "baz");
        assert!(toks[3].preceded_by_space);
    }

    #[test]
    fn lexes_directive_line() {
        let toks = lex_all("#sustain 200\nfoo");
        assert_eq!(toks[0].token_type, TokenType::Processor);
        assert_eq!(toks[0].value, "#sustain 200");
        assert_eq!(toks[1].value, "foo");
    }

    #[test]
    fn lexes_positional_reference() {
        let toks = lex_all("$1 + $2");
        assert_eq!(toks[0].token_type, TokenType::Positional);
        assert_eq!(toks[0].value, "1");
    }

    #[test]
    fn skips_comments() {
        let toks = lex_all("1 // comment\n+ 2");
        assert_eq!(toks.len(), 3);
    }

    #[test]
    fn lexes_two_char_operators() {
        let toks = lex_all("a == b != c && d || e");
        let ops: Vec<_> = toks.iter().filter(|t| t.token_type == TokenType::Operator).map(|t| t.value.as_str()).collect();
        assert_eq!(ops, vec!["==", "!=", "&&", "||"]);
    }
}
