//! Symbol resolution and call-argument compilation (spec.md §4.3).
//!
//! `Linker::link` walks every function body of a `Compilation` exactly
//! once, resolving each `Symbol` node against the six-step pipeline
//! (local lexical scope, unit scope, environment linkage, dynamic
//! external, `#usage` argument, standard library) and, for call syntax,
//! replacing the symbol's raw argument children with a compiled
//! `Vec<CallArgument>` matched against the target's declared parameters.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::ast::{CallArgument, DeclParam, Node, NodeKind, Resolution, StdlibId};
use crate::compilation::Compilation;
use crate::environment::{Context, Environment, LinkageTarget};
use crate::errors::MslError;
use crate::linker::errors::LinkError;
use crate::linker::scope::{resolve_local, LocalKind, Scope};

/// Per-unit facts gathered once before any node is linked, so the
/// mutable walk over `unit.functions` never needs to borrow `unit`
/// itself for lookups (spec.md §4.3 step 2 "unit scope").
struct LexicalContext {
    package: Option<String>,
    using: Vec<String>,
    usage: Option<String>,
    sibling_functions: HashSet<String>,
    functions_params: HashMap<String, Vec<DeclParam>>,
    static_variables: HashSet<String>,
}

impl LexicalContext {
    fn from_unit(unit: &Compilation) -> Self {
        let mut sibling_functions = HashSet::new();
        let mut functions_params = HashMap::new();
        for f in &unit.functions {
            sibling_functions.insert(f.name.clone());
            functions_params.insert(f.name.clone(), f.params.clone());
        }
        let static_variables = unit.variables.iter().map(|v| v.name.clone()).collect();
        LexicalContext {
            package: unit.package.clone(),
            using: unit.using_namespaces.clone(),
            usage: unit.usage.clone(),
            sibling_functions,
            functions_params,
            static_variables,
        }
    }
}

pub struct Linker;

impl Linker {
    /// Links `unit`'s body and every declared function against `env` and
    /// `ctx`. Errors and warnings accumulate onto `unit`; a unit with any
    /// error is left uninstalled by the caller (spec.md §7).
    pub fn link(unit: &mut Compilation, env: &mut Environment, ctx: &dyn Context) {
        let lex = LexicalContext::from_unit(unit);

        let mut scopes = vec![Scope::from_params(&unit.body.params)];
        Self::link_node(&mut unit.body.body, &mut scopes, &lex, env, ctx, &mut unit.errors, &mut unit.warnings, &mut unit.unresolved, false);

        for func in unit.functions.iter_mut() {
            let mut scopes = vec![Scope::from_params(&func.params)];
            Self::link_node(&mut func.body, &mut scopes, &lex, env, ctx, &mut unit.errors, &mut unit.warnings, &mut unit.unresolved, false);
        }

        unit.unresolved.sort();
        unit.unresolved.dedup();
    }

    #[allow(clippy::too_many_arguments)]
    fn link_node(
        node: &mut Node,
        scopes: &mut Vec<Scope>,
        lex: &LexicalContext,
        env: &mut Environment,
        ctx: &dyn Context,
        errors: &mut Vec<MslError>,
        warnings: &mut Vec<MslError>,
        unresolved: &mut Vec<String>,
        in_scope_list: bool,
    ) {
        match &node.kind {
            NodeKind::Block { .. } => {
                let scope = Self::block_scope(node, errors);
                scopes.push(scope);
                for child in node.children.iter_mut() {
                    Self::link_node(child, scopes, lex, env, ctx, errors, warnings, unresolved, false);
                }
                scopes.pop();
            }
            NodeKind::Symbol { .. } => {
                Self::link_symbol(node, scopes, lex, env, ctx, errors, warnings, unresolved, in_scope_list);
            }
            NodeKind::FunctionDef { .. } => {
                Self::link_nested_function_def(node, scopes, lex, env, ctx, errors, warnings, unresolved);
            }
            NodeKind::VariableDef { .. } => {
                for child in node.children.iter_mut() {
                    Self::link_node(child, scopes, lex, env, ctx, errors, warnings, unresolved, false);
                }
            }
            NodeKind::Assignment => {
                for child in node.children.iter_mut() {
                    Self::link_node(child, scopes, lex, env, ctx, errors, warnings, unresolved, false);
                }
                Self::check_assignment_target(node, env, errors);
            }
            NodeKind::Wait { amount, .. } => {
                if let Some(amount) = amount.as_mut() {
                    Self::link_node(amount, scopes, lex, env, ctx, errors, warnings, unresolved, false);
                }
            }
            NodeKind::In => {
                let last = node.children.len().saturating_sub(1);
                for (i, child) in node.children.iter_mut().enumerate() {
                    Self::link_node(child, scopes, lex, env, ctx, errors, warnings, unresolved, i < last);
                }
            }
            NodeKind::Echo { .. } | NodeKind::AddResult => {
                for child in node.children.iter_mut() {
                    Self::link_node(child, scopes, lex, env, ctx, errors, warnings, unresolved, false);
                }
            }
            NodeKind::Operator { .. } | NodeKind::Else | NodeKind::Case | NodeKind::If => {
                for child in node.children.iter_mut() {
                    Self::link_node(child, scopes, lex, env, ctx, errors, warnings, unresolved, false);
                }
            }
            NodeKind::Context { .. } | NodeKind::End | NodeKind::Literal(_) | NodeKind::Reference { .. } => {}
        }
    }

    /// A direct-children scan of a `Block`'s own `VariableDef`/
    /// `FunctionDef` statements (not nested blocks'), erroring if a name
    /// names both in the same block (spec.md §4.3 "ambiguous local
    /// definition").
    fn block_scope(block: &Node, errors: &mut Vec<MslError>) -> Scope {
        let mut names = HashMap::new();
        for child in &block.children {
            let (name, kind) = match &child.kind {
                NodeKind::VariableDef { name, .. } => (name.clone(), LocalKind::Variable),
                NodeKind::FunctionDef { name, .. } => (name.clone(), LocalKind::Function),
                _ => continue,
            };
            if names.contains_key(&name) {
                errors.push(LinkError::AmbiguousLocalDefinition(name).into());
                continue;
            }
            names.insert(name, kind);
        }
        Scope { names }
    }

    #[allow(clippy::too_many_arguments)]
    fn link_nested_function_def(
        node: &mut Node,
        scopes: &mut Vec<Scope>,
        lex: &LexicalContext,
        env: &mut Environment,
        ctx: &dyn Context,
        errors: &mut Vec<MslError>,
        warnings: &mut Vec<MslError>,
        unresolved: &mut Vec<String>,
    ) {
        let NodeKind::FunctionDef { params, .. } = &node.kind else { return };
        scopes.push(Scope::from_params(params));
        if let Some(body) = node.children.first_mut() {
            Self::link_node(body, scopes, lex, env, ctx, errors, warnings, unresolved, false);
        }
        scopes.pop();
    }

    #[allow(clippy::too_many_arguments)]
    fn link_symbol(
        node: &mut Node,
        scopes: &mut Vec<Scope>,
        lex: &LexicalContext,
        env: &mut Environment,
        ctx: &dyn Context,
        errors: &mut Vec<MslError>,
        warnings: &mut Vec<MslError>,
        unresolved: &mut Vec<String>,
        in_scope_list: bool,
    ) {
        let name = node.token.value.clone();
        let has_call_syntax = !node.children.is_empty();

        let resolution = if in_scope_list && ctx.is_scope_keyword(&name) {
            Resolution::Keyword(name.clone())
        } else {
            Self::resolve_pipeline(&name, scopes, lex, env, ctx, unresolved, warnings)
        };

        let is_function = Self::resolution_is_function(&resolution, env);
        if has_call_syntax && !is_function {
            errors.push(LinkError::CallSyntaxOnNonFunction(name.clone()).into());
        }

        let arguments = if has_call_syntax {
            let raw_args = std::mem::take(&mut node.children);
            let declared = Self::declared_params(&resolution, lex, env);
            let mut compiled = Self::compile_call_arguments(declared, raw_args, errors);
            for arg in compiled.iter_mut() {
                if let Some(value_node) = arg.value_node.as_mut() {
                    Self::link_node(value_node, scopes, lex, env, ctx, errors, warnings, unresolved, false);
                }
            }
            compiled
        } else {
            Vec::new()
        };

        node.kind = NodeKind::Symbol { resolution, arguments };
    }

    /// spec.md §4.3 resolution order, collapsed into six calls: local
    /// lexical scope (folds in the function's own declared params), unit
    /// scope, environment linkage, dynamic external, `#usage` argument,
    /// standard library.
    fn resolve_pipeline(
        name: &str,
        scopes: &[Scope],
        lex: &LexicalContext,
        env: &mut Environment,
        ctx: &dyn Context,
        unresolved: &mut Vec<String>,
        warnings: &mut Vec<MslError>,
    ) -> Resolution {
        if let Some(kind) = resolve_local(name, scopes) {
            return match kind {
                LocalKind::Param(pos) => Resolution::FunctionArgument(pos),
                LocalKind::Variable => Resolution::InnerVariable(name.to_string()),
                LocalKind::Function => Resolution::InnerFunction(name.to_string()),
            };
        }

        if lex.sibling_functions.contains(name) {
            return Resolution::RootFunction(name.to_string());
        }
        if lex.static_variables.contains(name) {
            return Resolution::StaticVariable(name.to_string());
        }

        if let Some(pkg) = &lex.package {
            let qualified = format!("{pkg}:{name}");
            if env.linkage(&qualified).is_some() {
                return Resolution::Linkage(qualified);
            }
        }
        if env.linkage(name).is_some() {
            return Resolution::Linkage(name.to_string());
        }
        for ns in &lex.using {
            let qualified = format!("{ns}:{name}");
            if env.linkage(&qualified).is_some() {
                return Resolution::Linkage(qualified);
            }
        }

        if let Some(ext) = ctx.resolve(name) {
            let interned = env.intern_external(ext).name.clone();
            return Resolution::External(interned);
        }

        if let Some(usage) = &lex.usage {
            if ctx.is_usage_argument(usage, name) {
                return Resolution::UsageArgument(name.to_string());
            }
        }

        if let Some(id) = StdlibId::lookup(name) {
            return Resolution::StandardLibrary(id);
        }

        warnings.push(MslError::new(format!("unresolved symbol '{name}'")));
        unresolved.push(name.to_string());
        Resolution::Unresolved
    }

    /// Mirrors the evaluator's own call-resolution check (`eval.rs`'s
    /// `is_call_resolution`) so link-time and run-time agree on what
    /// counts as callable.
    fn resolution_is_function(resolution: &Resolution, env: &Environment) -> bool {
        match resolution {
            Resolution::RootFunction(_) | Resolution::InnerFunction(_) | Resolution::StandardLibrary(_) => true,
            Resolution::Linkage(q) => env.linkage(q).is_some_and(|lk| lk.is_function),
            Resolution::External(n) => env.external(n).is_some_and(|e| e.is_function),
            _ => false,
        }
    }

    /// The target's declared parameter list, when one is known statically
    /// (a root function in this unit, or a published function linkage).
    /// Nested `InnerFunction`s and externals have none, so their calls
    /// always fall back to positional placement.
    fn declared_params<'a>(resolution: &Resolution, lex: &'a LexicalContext, env: &'a Environment) -> Option<&'a [DeclParam]> {
        match resolution {
            Resolution::RootFunction(name) => lex.functions_params.get(name).map(|v| v.as_slice()),
            Resolution::Linkage(q) => {
                let linkage = env.linkage(q)?;
                let LinkageTarget::Function(fname) = &linkage.target else { return None };
                let owner = env.unit(&linkage.owner_unit_id)?;
                owner.find_function(fname).map(|f| f.params.as_slice())
            }
            _ => None,
        }
    }

    /// Matches raw call-site argument nodes against `params` left to
    /// right (keyword by name first, else next positional, else
    /// declaration default, else `:optional` empty, else a
    /// `MissingArgument` error), and turns any leftovers into sequential
    /// or named "extra" arguments (spec.md §4.3 "Call-argument
    /// compilation"). With no declared params at all, every raw argument
    /// becomes a positional extra.
    fn compile_call_arguments(params: Option<&[DeclParam]>, raw_args: Vec<Node>, errors: &mut Vec<MslError>) -> Vec<CallArgument> {
        let Some(params) = params else {
            return Self::positional_fallback(raw_args);
        };

        let mut keyword: HashMap<String, Node> = HashMap::new();
        let mut positional: VecDeque<Node> = VecDeque::new();
        for raw in raw_args {
            match Self::keyword_arg(raw) {
                Ok((name, value)) => {
                    keyword.insert(name, value);
                }
                Err(node) => positional.push_back(node),
            }
        }

        let mut compiled = Vec::with_capacity(params.len());
        for (i, decl) in params.iter().enumerate() {
            let position = i as i32 + 1;
            if let Some(value) = keyword.remove(&decl.name) {
                compiled.push(CallArgument { name: decl.name.clone(), position, extra: false, optional: decl.optional, value_node: Some(Box::new(value)) });
                continue;
            }
            if let Some(value) = positional.pop_front() {
                compiled.push(CallArgument { name: decl.name.clone(), position, extra: false, optional: decl.optional, value_node: Some(Box::new(value)) });
                continue;
            }
            if let Some(default) = &decl.default {
                compiled.push(CallArgument { name: decl.name.clone(), position, extra: false, optional: decl.optional, value_node: Some(default.clone()) });
                continue;
            }
            if decl.optional {
                compiled.push(CallArgument { name: decl.name.clone(), position, extra: false, optional: true, value_node: None });
                continue;
            }
            errors.push(LinkError::MissingArgument(decl.name.clone()).into());
            compiled.push(CallArgument { name: decl.name.clone(), position, extra: false, optional: false, value_node: None });
        }

        let mut next_position = params.len() as i32 + 1;
        while let Some(extra) = positional.pop_front() {
            compiled.push(CallArgument { name: format!("${next_position}"), position: next_position, extra: true, optional: false, value_node: Some(Box::new(extra)) });
            next_position += 1;
        }
        for (name, value) in keyword {
            compiled.push(CallArgument { name, position: next_position, extra: true, optional: false, value_node: Some(Box::new(value)) });
            next_position += 1;
        }

        compiled
    }

    fn positional_fallback(raw_args: Vec<Node>) -> Vec<CallArgument> {
        let mut compiled = Vec::with_capacity(raw_args.len());
        for (i, raw) in raw_args.into_iter().enumerate() {
            let position = i as i32 + 1;
            let (name, value) = match Self::keyword_arg(raw) {
                Ok((name, value)) => (name, value),
                Err(node) => (format!("${position}"), node),
            };
            compiled.push(CallArgument { name, position, extra: true, optional: false, value_node: Some(Box::new(value)) });
        }
        compiled
    }

    /// Recognizes `name=expr` keyword call arguments, parsed by the
    /// parser as an `Assignment` whose first child is a bare `Symbol`
    /// (`parser/expr.rs`'s `parse_call_argument`).
    fn keyword_arg(node: Node) -> Result<(String, Node), Node> {
        if !node.is_assignment() || node.children.len() != 2 || !node.children[0].is_symbol() {
            return Err(node);
        }
        let Node { mut children, .. } = node;
        let value = children.remove(1);
        let name_node = children.remove(0);
        Ok((name_node.token.value, value))
    }

    /// spec.md §4.3 "Additional checks": an assignment's left-hand side
    /// must resolve to something settable.
    fn check_assignment_target(node: &Node, env: &Environment, errors: &mut Vec<MslError>) {
        let Some(lhs) = node.children.first() else { return };
        let NodeKind::Symbol { resolution, .. } = &lhs.kind else {
            errors.push(LinkError::NotAssignable(lhs.token.value.clone()).into());
            return;
        };
        let assignable = match resolution {
            Resolution::FunctionArgument(_) | Resolution::InnerVariable(_) | Resolution::StaticVariable(_) | Resolution::UsageArgument(_) => true,
            Resolution::Linkage(q) => env.linkage(q).is_some_and(|lk| !lk.is_function),
            Resolution::External(n) => env.external(n).is_some_and(|e| !e.is_function),
            _ => false,
        };
        if !assignable {
            errors.push(LinkError::NotAssignable(lhs.token.value.clone()).into());
        }
    }
}
