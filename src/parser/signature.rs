//! Declaration-signature sub-parser, used for both `#arguments <sig>` and
//! the parenthesized signature after `script name(...)` (spec.md §4.2,
//! §6). `#arguments` is "itself parsed (by a fresh parser instance)" — a
//! fresh `Tokenizer` over just the signature text.

use crate::ast::DeclParam;
use crate::parser::expr::parse_expression;
use crate::parser::errors::ParseError;
use crate::token::{TokenType, Tokenizer};

/// Parses `a, b=expr, c :optional, d` into declaration parameters. A bare
/// `:optional` marker flips a flag that makes every following parameter
/// without a default optional (spec.md §4.3 step 1c/1d, §4.2).
pub fn parse_signature(text: &str) -> Result<Vec<DeclParam>, String> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut t = Tokenizer::new(text);
    let mut errors = Vec::new();
    let params = parse_params(&mut t, &mut errors, |tok| tok.token_type == TokenType::End);
    if !errors.is_empty() {
        return Err(errors.iter().map(|e| e.detail.clone()).collect::<Vec<_>>().join("; "));
    }
    Ok(params)
}

/// Parses an inline `(...)` signature embedded in a larger token stream,
/// e.g. `function dbl(x, y=1)`. Stops (without consuming) at the closing
/// `)`; the caller consumes it.
pub fn parse_params(
    t: &mut Tokenizer,
    errors: &mut Vec<ParseError>,
    stop: impl Fn(&crate::token::Token) -> bool,
) -> Vec<DeclParam> {
    let mut params = Vec::new();
    let mut optional_from_here = false;

    loop {
        let lookahead = t.peek();
        if stop(&lookahead) {
            t.unread(lookahead);
            break;
        }
        t.unread(lookahead);

        let tok = t.next_token();
        if tok.token_type == TokenType::End {
            break;
        }
        if tok.token_type == TokenType::Punctuation && tok.value == ":" {
            let marker = t.next_token();
            if marker.token_type == TokenType::Symbol && marker.value == "optional" {
                optional_from_here = true;
            } else {
                errors.push(ParseError::at_token(format!("unexpected ':{}' in signature", marker.value), &marker));
                break;
            }
        } else if tok.token_type == TokenType::Symbol {
            let name = tok.value.clone();
            let eq = t.peek();
            let default = if eq.token_type == TokenType::Operator && eq.value == "=" {
                let _ = t.next_token();
                parse_expression(t, errors).map(Box::new)
            } else {
                t.unread(eq);
                None
            };
            params.push(DeclParam { name, default, optional: optional_from_here });
        } else if tok.token_type == TokenType::Punctuation && tok.value == "," {
            continue;
        } else {
            errors.push(ParseError::at_token(format!("unexpected token '{}' in signature", tok.value), &tok));
            break;
        }

        let sep = t.peek();
        if sep.token_type == TokenType::Punctuation && sep.value == "," {
            let _ = t.next_token();
            continue;
        }
        break;
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_params() {
        let params = parse_signature("a, b").unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "a");
        assert!(params[0].default.is_none());
    }

    #[test]
    fn default_value_param() {
        let params = parse_signature("a, b=5").unwrap();
        assert!(params[1].default.is_some());
    }

    #[test]
    fn optional_marker_flips_subsequent_params() {
        let params = parse_signature("a, :optional, b, c").unwrap();
        assert!(!params[0].optional);
        assert!(params[1].optional);
        assert!(params[2].optional);
    }

    #[test]
    fn empty_signature() {
        assert!(parse_signature("").unwrap().is_empty());
    }
}
