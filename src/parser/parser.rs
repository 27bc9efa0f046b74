//! Statement-level parsing: directives, declarations, control flow, and
//! the sifting pass that pulls top-level function definitions out of the
//! root block (spec.md §4.2 "Sifting").

use crate::ast::{
    ExecContextTarget, FunctionFlags, LiteralKind, Node, NodeKind, ScopeModifiers, VariableFlags,
    WaitType, WaitUnit,
};
use crate::parser::directives::{apply_directive, Directives};
use crate::parser::errors::ParseError;
use crate::parser::expr::parse_expression;
use crate::parser::signature::parse_params;
use crate::token::{Token, TokenType, Tokenizer};

const SCOPE_MODIFIER_WORDS: &[&str] = &["public", "export", "global", "static", "track", "scope"];

pub struct ParseOutput {
    pub body: Node,
    pub functions: Vec<Node>,
    pub variables: Vec<(String, VariableFlags)>,
    pub directives: Directives,
    pub errors: Vec<ParseError>,
}

pub fn parse(source: &str) -> ParseOutput {
    let mut t = Tokenizer::new(source);
    let mut errors = Vec::new();
    let mut dirs = Directives::default();
    let mut pending_scope = ScopeModifiers::default();

    let root_token = Token { token_type: TokenType::End, value: String::new(), line: 1, column: 1, preceded_by_space: true };
    let mut root = Node::new(NodeKind::Block { bracket: None }, root_token);
    root.children = parse_statements(&mut t, &mut errors, &mut dirs, &mut pending_scope, false);

    let (body, functions, variables) = sift(root);

    ParseOutput { body, functions, variables, directives: dirs, errors }
}

fn parse_statements(
    t: &mut Tokenizer,
    errors: &mut Vec<ParseError>,
    dirs: &mut Directives,
    pending_scope: &mut ScopeModifiers,
    stop_on_brace: bool,
) -> Vec<Node> {
    let mut stmts = Vec::new();
    loop {
        let tok = t.peek();
        match tok.token_type {
            TokenType::End => {
                t.unread(tok);
                break;
            }
            TokenType::Bracket if stop_on_brace && tok.value == "}" => {
                let _ = t.next_token();
                break;
            }
            _ => {
                t.unread(tok);
            }
        }

        if let Some(stmt) = parse_statement(t, errors, dirs, pending_scope) {
            stmts.push(stmt);
        }

        // optional statement separator
        let sep = t.peek();
        if sep.token_type == TokenType::Punctuation && sep.value == ";" {
            let _ = t.next_token();
        } else {
            t.unread(sep);
        }
    }
    stmts
}

fn parse_statement(
    t: &mut Tokenizer,
    errors: &mut Vec<ParseError>,
    dirs: &mut Directives,
    pending_scope: &mut ScopeModifiers,
) -> Option<Node> {
    let tok = t.next_token();

    match tok.token_type {
        TokenType::Processor => {
            apply_directive(dirs, &tok, errors);
            None
        }
        TokenType::Bracket if tok.value == "{" => {
            let mut block = Node::new(NodeKind::Block { bracket: Some('{') }, tok);
            block.children = parse_statements(t, errors, dirs, pending_scope, true);
            Some(block)
        }
        TokenType::Symbol => parse_keyword_or_expr_statement(t, errors, dirs, pending_scope, tok),
        TokenType::End => {
            t.unread(tok);
            None
        }
        _ => {
            t.unread(tok);
            parse_assignment_or_expr(t, errors)
        }
    }
}

fn parse_keyword_or_expr_statement(
    t: &mut Tokenizer,
    errors: &mut Vec<ParseError>,
    dirs: &mut Directives,
    pending_scope: &mut ScopeModifiers,
    tok: Token,
) -> Option<Node> {
    match tok.value.as_str() {
        w if SCOPE_MODIFIER_WORDS.contains(&w) => {
            apply_scope_word(pending_scope, w);
            None
        }
        "function" | "func" | "proc" | "init" => Some(parse_function_def(t, errors, pending_scope, tok)),
        "script" => {
            parse_script_header(t, errors, dirs);
            None
        }
        "var" | "variable" => Some(parse_variable_def(t, errors, pending_scope, tok)),
        "if" => Some(parse_if(t, errors, dirs, pending_scope, tok)),
        "wait" => Some(parse_wait(t, errors, tok)),
        "in" => Some(parse_in(t, errors, dirs, pending_scope, tok)),
        "context" => Some(parse_context(t, errors, tok)),
        "print" | "echo" => Some(parse_echo(t, errors, tok, false)),
        "trace" => Some(parse_echo(t, errors, tok, true)),
        "end" => Some(Node::new(NodeKind::End, tok)),
        "AddResult" => Some(parse_add_result(t, errors, tok)),
        "else" | "case" => {
            errors.push(ParseError::at_token(format!("unexpected '{}'", tok.value), &tok));
            None
        }
        _ => {
            t.unread(tok);
            parse_assignment_or_expr(t, errors)
        }
    }
}

fn apply_scope_word(scope: &mut ScopeModifiers, word: &str) {
    match word {
        "public" => scope.public = true,
        "export" => scope.exported = true,
        "global" => scope.global = true,
        "static" => scope.is_static = true,
        "track" => scope.track = true,
        "scope" => scope.scoped = true,
        _ => unreachable!(),
    }
}

fn take_scope(scope: &mut ScopeModifiers) -> ScopeModifiers {
    std::mem::take(scope)
}

fn parse_assignment_or_expr(t: &mut Tokenizer, errors: &mut Vec<ParseError>) -> Option<Node> {
    let left = parse_expression(t, errors)?;

    let eq = t.peek();
    if eq.token_type == TokenType::Operator && eq.value == "=" && left.is_symbol() {
        let _ = t.next_token();
        let rhs = parse_assignment_or_expr(t, errors)?;
        let mut assign = Node::new(NodeKind::Assignment, eq);
        assign.push(left);
        assign.push(rhs);
        return Some(assign);
    }
    t.unread(eq);
    Some(left)
}

fn parse_function_def(t: &mut Tokenizer, errors: &mut Vec<ParseError>, pending_scope: &mut ScopeModifiers, kw: Token) -> Node {
    let flags = FunctionFlags::from(&take_scope(pending_scope));
    // `init` is both the keyword and the function's name; every other
    // spelling (`function`/`func`/`proc`) requires a following name token.
    let name = if kw.value == "init" {
        "init".to_string()
    } else {
        let name_tok = t.next_token();
        if name_tok.token_type != TokenType::Symbol {
            errors.push(ParseError::at_token("expected function name", &name_tok));
        }
        name_tok.value
    };

    let mut params = Vec::new();
    let open = t.peek();
    if open.token_type == TokenType::Bracket && open.value == "(" {
        let _ = t.next_token();
        params = parse_params(t, errors, |tok| tok.token_type == TokenType::Bracket && tok.value == ")");
        let close = t.next_token();
        if !(close.token_type == TokenType::Bracket && close.value == ")") {
            errors.push(ParseError::at_token("expected ')' after function parameters", &close));
        }
    } else {
        t.unread(open);
    }

    let mut node = Node::new(NodeKind::FunctionDef { name, flags, params }, kw);
    let mut dummy_dirs = Directives::default();
    let body_tok = t.next_token();
    if body_tok.token_type == TokenType::Bracket && body_tok.value == "{" {
        let mut body = Node::new(NodeKind::Block { bracket: Some('{') }, body_tok);
        body.children = parse_statements(t, errors, &mut dummy_dirs, &mut ScopeModifiers::default(), true);
        node.push(body);
    } else {
        errors.push(ParseError::at_token("expected '{' to begin function body", &body_tok));
        t.unread(body_tok);
    }
    node
}

/// `script name(...)`: an in-source alternative to `#name` plus
/// `#arguments`, sharing the same parenthesized-signature sub-parser as a
/// function definition (spec.md §4.2 "Script arguments may be declared
/// either via `#arguments` or via a parenthesized signature after `script
/// name`").
fn parse_script_header(t: &mut Tokenizer, errors: &mut Vec<ParseError>, dirs: &mut Directives) {
    let name_tok = t.next_token();
    if name_tok.token_type != TokenType::Symbol {
        errors.push(ParseError::at_token("expected a name after 'script'", &name_tok));
        return;
    }
    dirs.name = Some(name_tok.value);

    let open = t.peek();
    if open.token_type == TokenType::Bracket && open.value == "(" {
        let _ = t.next_token();
        let params = parse_params(t, errors, |tok| tok.token_type == TokenType::Bracket && tok.value == ")");
        let close = t.next_token();
        if !(close.token_type == TokenType::Bracket && close.value == ")") {
            errors.push(ParseError::at_token("expected ')' after script signature", &close));
        }
        dirs.arguments = Some(params);
    } else {
        t.unread(open);
    }
}

fn parse_variable_def(t: &mut Tokenizer, errors: &mut Vec<ParseError>, pending_scope: &mut ScopeModifiers, kw: Token) -> Node {
    let flags = VariableFlags::from(&take_scope(pending_scope));
    let name_tok = t.next_token();
    if name_tok.token_type != TokenType::Symbol {
        errors.push(ParseError::at_token("expected variable name", &name_tok));
    }
    let mut node = Node::new(NodeKind::VariableDef { name: name_tok.value.clone(), flags }, kw);

    let eq = t.peek();
    if eq.token_type == TokenType::Operator && eq.value == "=" {
        let _ = t.next_token();
        if let Some(init) = parse_expression(t, errors) {
            node.push(init);
        }
    } else {
        t.unread(eq);
    }
    node
}

fn parse_if(
    t: &mut Tokenizer,
    errors: &mut Vec<ParseError>,
    dirs: &mut Directives,
    pending_scope: &mut ScopeModifiers,
    kw: Token,
) -> Node {
    let mut node = Node::new(NodeKind::If, kw);
    if let Some(cond) = parse_expression(t, errors) {
        node.push(cond);
    }
    if let Some(then_branch) = parse_statement(t, errors, dirs, pending_scope) {
        node.push(then_branch);
    }

    let else_tok = t.peek();
    if else_tok.token_type == TokenType::Symbol && else_tok.value == "else" {
        let _ = t.next_token();
        let mut else_node = Node::new(NodeKind::Else, else_tok);
        if let Some(branch) = parse_statement(t, errors, dirs, pending_scope) {
            else_node.push(branch);
        }
        node.push(else_node);
    } else {
        t.unread(else_tok);
    }
    node
}

fn parse_wait(t: &mut Tokenizer, errors: &mut Vec<ParseError>, kw: Token) -> Node {
    let unit_tok = t.next_token();
    let unit = WaitUnit::from_str(&unit_tok.value);
    let wait_type = match unit {
        WaitUnit::Msec => WaitType::Duration,
        WaitUnit::Marker | WaitUnit::Switch => WaitType::Location,
        _ => WaitType::Event,
    };

    let lookahead = t.peek();
    let amount = if matches!(lookahead.token_type, TokenType::Int | TokenType::Float | TokenType::Symbol) {
        parse_expression(t, errors).map(Box::new)
    } else {
        t.unread(lookahead);
        None
    };

    Node::new(NodeKind::Wait { wait_type, unit, amount }, kw)
}

fn parse_in(
    t: &mut Tokenizer,
    errors: &mut Vec<ParseError>,
    dirs: &mut Directives,
    pending_scope: &mut ScopeModifiers,
    kw: Token,
) -> Node {
    let mut node = Node::new(NodeKind::In, kw);
    // scope list: one or more comma-separated expressions/keywords up to the body block
    loop {
        let lookahead = t.peek();
        if lookahead.token_type == TokenType::Bracket && lookahead.value == "{" {
            t.unread(lookahead);
            break;
        }
        if let Some(scope_expr) = parse_expression(t, errors) {
            node.push(scope_expr);
        } else {
            break;
        }
        let sep = t.peek();
        if sep.token_type == TokenType::Punctuation && sep.value == "," {
            let _ = t.next_token();
            continue;
        }
        break;
    }

    if let Some(body) = parse_statement(t, errors, dirs, pending_scope) {
        node.push(body);
    }
    node
}

fn parse_context(t: &mut Tokenizer, errors: &mut Vec<ParseError>, kw: Token) -> Node {
    let target_tok = t.next_token();
    let target = match target_tok.value.as_str() {
        "shell" => ExecContextTarget::Shell,
        "kernel" => ExecContextTarget::Kernel,
        other => {
            errors.push(ParseError::at_token(format!("unknown context '{other}'"), &target_tok));
            ExecContextTarget::Shell
        }
    };
    Node::new(NodeKind::Context { target }, kw)
}

fn parse_echo(t: &mut Tokenizer, errors: &mut Vec<ParseError>, kw: Token, trace: bool) -> Node {
    let mut node = Node::new(NodeKind::Echo { trace }, kw);
    if let Some(arg) = parse_expression(t, errors) {
        node.push(arg);
    }
    node
}

fn parse_add_result(t: &mut Tokenizer, errors: &mut Vec<ParseError>, kw: Token) -> Node {
    let mut node = Node::new(NodeKind::AddResult, kw);
    if let Some(arg) = parse_expression(t, errors) {
        node.push(arg);
    }
    node
}

/// After parsing, top-level function-defs are removed from the root block
/// and packaged separately (duplicates replace earlier definitions).
/// Top-level variables remain in the tree so initializers run in lexical
/// order, but their declarations are also packaged for the compilation
/// unit. Whatever remains becomes the body (spec.md §4.2 "Sifting").
fn sift(mut root: Node) -> (Node, Vec<Node>, Vec<(String, VariableFlags)>) {
    let mut functions: Vec<Node> = Vec::new();
    let mut variables = Vec::new();
    let mut body_children = Vec::new();

    for child in root.children.drain(..) {
        match &child.kind {
            NodeKind::FunctionDef { name, .. } => {
                functions.retain(|f| !matches!(&f.kind, NodeKind::FunctionDef { name: n, .. } if n == name));
                functions.push(child);
            }
            NodeKind::VariableDef { name, flags } => {
                variables.push((name.clone(), flags.clone()));
                body_children.push(child);
            }
            _ => body_children.push(child),
        }
    }

    root.children = body_children;
    (root, functions, variables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sifts_top_level_function() {
        let out = parse("function dbl(x) { x * 2 } dbl(5)");
        assert!(out.errors.is_empty(), "{:?}", out.errors);
        assert_eq!(out.functions.len(), 1);
        assert_eq!(out.body.children.len(), 1);
    }

    #[test]
    fn duplicate_function_defs_replace_earlier() {
        let out = parse("function f() { 1 } function f() { 2 }");
        assert_eq!(out.functions.len(), 1);
    }

    #[test]
    fn top_level_variable_stays_in_body() {
        let out = parse("var x = 1 x");
        assert_eq!(out.variables.len(), 1);
        assert_eq!(out.body.children.len(), 2);
    }

    #[test]
    fn if_else_parses() {
        let out = parse("if true 1 else 2");
        assert!(out.errors.is_empty());
        let if_node = &out.body.children[0];
        assert!(matches!(if_node.kind, NodeKind::If));
        assert_eq!(if_node.children.len(), 3);
    }

    #[test]
    fn wait_subcycle_parses() {
        let out = parse("wait subcycle 2");
        assert!(out.errors.is_empty());
        match &out.body.children[0].kind {
            NodeKind::Wait { unit, .. } => assert_eq!(*unit, WaitUnit::Subcycle),
            _ => panic!("expected wait node"),
        }
    }

    #[test]
    fn sustain_directive_and_function_def() {
        let out = parse("#sustain 200\nfunction OnRelease() { print \"up\" }");
        assert!(out.errors.is_empty(), "{:?}", out.errors);
        assert!(out.directives.sustain);
        assert_eq!(out.directives.sustain_interval, Some(200));
        assert_eq!(out.functions.len(), 1);
    }

    #[test]
    fn scope_modifiers_attach_to_next_function() {
        let out = parse("export function f() { 1 }");
        match &out.functions[0].kind {
            NodeKind::FunctionDef { flags, .. } => assert!(flags.exported),
            _ => panic!(),
        }
    }

    #[test]
    fn literal_kind_survives_parse() {
        let out = parse("3.5");
        match &out.body.children[0].kind {
            NodeKind::Literal(LiteralKind::Float(f)) => assert_eq!(*f, 3.5),
            other => panic!("unexpected {other:?}"),
        }
    }
}
