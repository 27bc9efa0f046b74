//! Expression parsing: literals, symbols (with optional call-argument
//! lists), parenthesized sub-expressions, positional references, unary and
//! binary operators with precedence climbing (spec.md §4.2 "Precedence",
//! "Unary").

use crate::ast::{LiteralKind, Node, NodeKind, Resolution};
use crate::parser::errors::ParseError;
use crate::parser::precedence::precedence_of;
use crate::token::{Token, TokenType, Tokenizer};

pub fn parse_expression(t: &mut Tokenizer, errors: &mut Vec<ParseError>) -> Option<Node> {
    parse_binary(t, errors, 0)
}

fn parse_binary(t: &mut Tokenizer, errors: &mut Vec<ParseError>, min_prec: u8) -> Option<Node> {
    let mut left = parse_unary(t, errors)?;

    loop {
        let tok = t.peek();
        if tok.token_type != TokenType::Operator {
            t.unread(tok);
            break;
        }
        let Some(prec) = precedence_of(&tok.value) else {
            t.unread(tok);
            break;
        };
        if prec < min_prec {
            t.unread(tok);
            break;
        }
        // consume the operator (it was only peeked)
        let op_tok = t.next_token();
        // Higher-precedence operators subsume the right operand first
        // (spec.md §4.2: "if the new is higher, it subsumes the right
        // operand of the existing").
        let right = parse_binary(t, errors, prec + 1)?;
        let mut node = Node::new(NodeKind::Operator { op: op_tok.value.clone(), unary: false }, op_tok);
        node.push(left);
        node.push(right);
        left = node;
    }

    Some(left)
}

fn parse_unary(t: &mut Tokenizer, errors: &mut Vec<ParseError>) -> Option<Node> {
    let tok = t.peek();
    if tok.token_type == TokenType::Operator && matches!(tok.value.as_str(), "!" | "-" | "+") {
        let op_tok = t.next_token();
        let operand = parse_unary(t, errors)?;
        let mut node = Node::new(NodeKind::Operator { op: op_tok.value.clone(), unary: true }, op_tok);
        node.push(operand);
        return Some(node);
    }
    t.unread(tok);
    parse_primary(t, errors)
}

fn parse_primary(t: &mut Tokenizer, errors: &mut Vec<ParseError>) -> Option<Node> {
    let tok = t.next_token();
    match tok.token_type {
        TokenType::Int => match tok.value.parse::<i64>() {
            Ok(v) => Some(Node::new(NodeKind::Literal(LiteralKind::Int(v)), tok)),
            Err(_) => {
                let v: f64 = tok.value.parse().unwrap_or(0.0);
                tracing::debug!(literal = %tok.value, "integer literal overflows i64, falling back to Float");
                Some(Node::new(NodeKind::Literal(LiteralKind::Float(v)), tok))
            }
        },
        TokenType::Float => {
            let v: f64 = tok.value.parse().unwrap_or(0.0);
            Some(Node::new(NodeKind::Literal(LiteralKind::Float(v)), tok))
        }
        TokenType::Bool => {
            let v = tok.value == "true";
            Some(Node::new(NodeKind::Literal(LiteralKind::Bool(v)), tok))
        }
        TokenType::String => {
            let v = tok.value.clone();
            Some(Node::new(NodeKind::Literal(LiteralKind::Str(v)), tok))
        }
        TokenType::Positional => {
            let pos: i32 = tok.value.parse().unwrap_or(0);
            Some(Node::new(NodeKind::Reference { position: pos }, tok))
        }
        TokenType::Symbol => parse_symbol(t, errors, tok),
        TokenType::Bracket if tok.value == "(" => {
            let inner = parse_expression(t, errors)?;
            expect_bracket(t, errors, ")");
            Some(inner)
        }
        _ => {
            errors.push(ParseError::at_token("expected an expression", &tok));
            None
        }
    }
}

/// A symbol token, possibly extended into a `package:name` qualified name
/// (spec.md §4.2 "Qualified names": `:` immediately after a symbol with no
/// intervening whitespace), and possibly followed by a `(` call-argument
/// list.
fn parse_symbol(t: &mut Tokenizer, errors: &mut Vec<ParseError>, first: Token) -> Option<Node> {
    let mut name = first.value.clone();

    let colon = t.peek();
    if colon.token_type == TokenType::Punctuation && colon.value == ":" && !colon.preceded_by_space {
        let _ = t.next_token();
        let qualifier = t.peek();
        if qualifier.token_type == TokenType::Symbol && !qualifier.preceded_by_space {
            let q = t.next_token();
            name = format!("{name}:{}", q.value);
        } else {
            t.unread(colon);
        }
    } else {
        t.unread(colon);
    }

    let mut node = Node::new(NodeKind::Symbol { resolution: Resolution::Unresolved, arguments: Vec::new() }, first);
    // reflect the possibly-qualified name back onto the token value so the
    // linker can resolve against it without re-deriving it.
    node.token.value = name;

    let open = t.peek();
    if open.token_type == TokenType::Bracket && open.value == "(" {
        let _ = t.next_token();
        parse_call_arguments(t, errors, &mut node);
    } else {
        t.unread(open);
    }

    Some(node)
}

/// Parses a comma-separated call-argument list up to the closing `)`.
/// Each argument is either a bare expression (positional) or `name=expr`
/// (keyword), represented as an `Assignment` child — the linker decides
/// which at call-argument compilation time (spec.md §4.3).
fn parse_call_arguments(t: &mut Tokenizer, errors: &mut Vec<ParseError>, sym: &mut Node) {
    let close = t.peek();
    if close.token_type == TokenType::Bracket && close.value == ")" {
        let _ = t.next_token();
        return;
    }
    t.unread(close);

    loop {
        let Some(arg) = parse_call_argument(t, errors) else { break };
        sym.push(arg);

        let sep = t.next_token();
        match (sep.token_type, sep.value.as_str()) {
            (TokenType::Punctuation, ",") => continue,
            (TokenType::Bracket, ")") => break,
            _ => {
                errors.push(ParseError::at_token("expected ',' or ')' in call arguments", &sep));
                break;
            }
        }
    }
}

fn parse_call_argument(t: &mut Tokenizer, errors: &mut Vec<ParseError>) -> Option<Node> {
    // `name=expr` keyword argument: lookahead for Symbol '=' without
    // consuming if it isn't actually a keyword arg.
    let first = t.peek();
    if first.token_type == TokenType::Symbol {
        let name_tok = t.next_token();
        let eq = t.peek();
        if eq.token_type == TokenType::Operator && eq.value == "=" {
            let _ = t.next_token();
            let value = parse_expression(t, errors)?;
            let mut sym = Node::new(
                NodeKind::Symbol { resolution: Resolution::Unresolved, arguments: Vec::new() },
                name_tok.clone(),
            );
            sym.token.value = name_tok.value.clone();
            let mut assign = Node::new(NodeKind::Assignment, eq);
            assign.push(sym);
            assign.push(value);
            return Some(assign);
        }
        t.unread(eq);
        t.unread(name_tok);
    }
    parse_expression(t, errors)
}

fn expect_bracket(t: &mut Tokenizer, errors: &mut Vec<ParseError>, value: &str) {
    let tok = t.next_token();
    if !(tok.token_type == TokenType::Bracket && tok.value == value) {
        errors.push(ParseError::at_token(format!("expected '{value}'"), &tok));
        t.unread(tok);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> (Option<Node>, Vec<ParseError>) {
        let mut t = Tokenizer::new(src);
        let mut errors = Vec::new();
        let node = parse_expression(&mut t, &mut errors);
        (node, errors)
    }

    #[test]
    fn precedence_mul_before_add() {
        let (node, errors) = parse("1 + 2 * 3");
        assert!(errors.is_empty());
        let node = node.unwrap();
        match &node.kind {
            NodeKind::Operator { op, .. } => assert_eq!(op, "+"),
            _ => panic!("expected operator"),
        }
        match &node.children[1].kind {
            NodeKind::Operator { op, .. } => assert_eq!(op, "*"),
            _ => panic!("expected nested multiply"),
        }
    }

    #[test]
    fn unary_minus() {
        let (node, errors) = parse("-5");
        assert!(errors.is_empty());
        match &node.unwrap().kind {
            NodeKind::Operator { op, unary } => {
                assert_eq!(op, "-");
                assert!(unary);
            }
            _ => panic!("expected unary operator"),
        }
    }

    #[test]
    fn qualified_symbol_name() {
        let (node, errors) = parse("ns:foo");
        assert!(errors.is_empty());
        assert_eq!(node.unwrap().token.value, "ns:foo");
    }

    #[test]
    fn call_with_positional_and_keyword_args() {
        let (node, errors) = parse("dbl(5, scale=2)");
        assert!(errors.is_empty());
        let node = node.unwrap();
        assert_eq!(node.children.len(), 2);
        assert!(node.children[0].is_literal());
        assert!(node.children[1].is_assignment());
    }
}
