//! Local lexical scoping for the linker (spec.md §4.3 step 1: "local
//! lexical scope").
//!
//! One `Scope` per function-parameter level or `Block`, pushed and popped
//! during a single top-down walk of a function body. A function's own
//! declared parameters seed the outermost scope, which also folds in the
//! unit body's own `#arguments` declaration — both use the exact same
//! `LocalKind::Param` seeding, so spec's separate "body declaration block"
//! step never needs code of its own.

use std::collections::HashMap;

use crate::ast::DeclParam;

#[derive(Debug, Clone)]
pub enum LocalKind {
    /// Position into the call frame's bindings.
    Param(i32),
    Variable,
    /// A `function`/`func`/`proc` def found nested inside a block rather
    /// than at the top level. Not stored in `Compilation::functions`, so
    /// calling it resolves but fails at runtime (`node_at` returns `None`
    /// — documented limitation, see DESIGN.md).
    Function,
}

#[derive(Debug, Default)]
pub struct Scope {
    pub names: HashMap<String, LocalKind>,
}

impl Scope {
    pub fn from_params(params: &[DeclParam]) -> Self {
        let mut names = HashMap::new();
        for (i, p) in params.iter().enumerate() {
            names.insert(p.name.clone(), LocalKind::Param(i as i32 + 1));
        }
        Scope { names }
    }
}

/// Resolves `name` against the nearest enclosing scope that declares it,
/// walking from the innermost (last pushed) scope outward.
pub fn resolve_local(name: &str, scopes: &[Scope]) -> Option<LocalKind> {
    scopes.iter().rev().find_map(|s| s.names.get(name).cloned())
}
