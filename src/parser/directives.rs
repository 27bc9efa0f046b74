//! Directive (`#...`) handling.
//!
//! Directives are line-oriented and parsed out of the single `Processor`
//! token the tokenizer hands back for each `#` line (spec.md §4.2
//! "Directives").

use crate::ast::DeclParam;
use crate::parser::errors::ParseError;
use crate::parser::signature::parse_signature;
use crate::token::Token;

#[derive(Debug, Clone, Default)]
pub struct Directives {
    pub name: Option<String>,
    pub arguments: Option<Vec<DeclParam>>,
    pub sustain: bool,
    pub sustain_interval: Option<u64>,
    pub repeat: bool,
    pub repeat_timeout: Option<u64>,
    pub usage: Option<String>,
    pub namespace: Option<String>,
    pub using: Vec<String>,
    pub library: bool,
}

/// Apply one `#...` directive line (without the leading `#`, already
/// split from the rest) onto the accumulator.
pub fn apply_directive(dirs: &mut Directives, token: &Token, errors: &mut Vec<ParseError>) {
    let text = token.value.trim_start_matches('#').trim();
    let (name, rest) = match text.split_once(char::is_whitespace) {
        Some((n, r)) => (n, r.trim()),
        None => (text, ""),
    };

    match name {
        "name" => dirs.name = Some(rest.to_string()),
        "arguments" => match parse_signature(rest) {
            Ok(params) => dirs.arguments = Some(params),
            Err(e) => errors.push(ParseError::at_token(format!("invalid #arguments: {e}"), token)),
        },
        "sustain" => {
            dirs.sustain = true;
            dirs.sustain_interval = rest.parse().ok();
        }
        "repeat" => {
            dirs.repeat = true;
            dirs.repeat_timeout = rest.parse().ok();
        }
        "usage" => dirs.usage = Some(rest.to_string()),
        "namespace" => dirs.namespace = Some(rest.to_string()),
        "using" => dirs.using.push(rest.to_string()),
        "library" => dirs.library = true,
        other => errors.push(ParseError::at_token(format!("unknown directive #{other}"), token)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(text: &str) -> Token {
        Token {
            token_type: crate::token::TokenType::Processor,
            value: text.to_string(),
            line: 1,
            column: 1,
            preceded_by_space: true,
        }
    }

    #[test]
    fn parses_sustain_with_interval() {
        let mut dirs = Directives::default();
        let mut errors = Vec::new();
        apply_directive(&mut dirs, &tok("#sustain 200"), &mut errors);
        assert!(dirs.sustain);
        assert_eq!(dirs.sustain_interval, Some(200));
        assert!(errors.is_empty());
    }

    #[test]
    fn parses_using_namespaces_repeatedly() {
        let mut dirs = Directives::default();
        let mut errors = Vec::new();
        apply_directive(&mut dirs, &tok("#using foo"), &mut errors);
        apply_directive(&mut dirs, &tok("#using bar"), &mut errors);
        assert_eq!(dirs.using, vec!["foo".to_string(), "bar".to_string()]);
    }

    #[test]
    fn unknown_directive_is_an_error() {
        let mut dirs = Directives::default();
        let mut errors = Vec::new();
        apply_directive(&mut dirs, &tok("#bogus"), &mut errors);
        assert_eq!(errors.len(), 1);
    }
}
