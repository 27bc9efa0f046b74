//! Compilation unit, Function, and Variable.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::ast::{DeclParam, FunctionFlags, Node, VariableFlags};
use crate::errors::MslError;
use crate::parser::ParseOutput;
use crate::value::Value;

/// Either defined by a `function`/`func`/`proc`/`init` node, or
/// synthesized from the top-level body of a compilation unit (spec.md §3
/// "Function").
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub flags: FunctionFlags,
    pub params: Vec<DeclParam>,
    pub body: Node,
}

impl Function {
    pub fn synthesized(body: Node, params: Vec<DeclParam>) -> Self {
        Function { name: "body".to_string(), flags: FunctionFlags::default(), params, body }
    }

    pub fn from_def_node(node: Node) -> Option<Self> {
        let crate::ast::NodeKind::FunctionDef { name, flags, params } = node.kind else {
            return None;
        };
        let body = node.children.into_iter().next().unwrap_or_else(|| {
            Node::new(crate::ast::NodeKind::Block { bracket: Some('{') }, node.token.clone())
        });
        Some(Function { name, flags, params, body })
    }
}

/// Per-variable storage. Scoped variables hold one value per integer
/// scope id (spec.md §3 "Variable"); both forms are wrapped in their own
/// mutex per spec.md §5 ("Persistent variable state... wrapped in a
/// per-variable critical section").
#[derive(Debug)]
pub enum VariableStorage {
    Global(Mutex<Value>),
    Scoped(Mutex<HashMap<i32, Value>>),
}

#[derive(Debug)]
pub struct Variable {
    pub name: String,
    pub flags: VariableFlags,
    pub storage: VariableStorage,
}

impl Variable {
    pub fn new(name: String, flags: VariableFlags) -> Self {
        let storage = if flags.scoped {
            VariableStorage::Scoped(Mutex::new(HashMap::new()))
        } else {
            VariableStorage::Global(Mutex::new(Value::Null))
        };
        Variable { name, flags, storage }
    }

    pub fn get(&self, scope: Option<i32>) -> Value {
        match (&self.storage, scope) {
            (VariableStorage::Global(v), _) => v.lock().unwrap().clone(),
            (VariableStorage::Scoped(map), Some(s)) => map.lock().unwrap().get(&s).cloned().unwrap_or(Value::Null),
            (VariableStorage::Scoped(_), None) => Value::Null,
        }
    }

    pub fn set(&self, scope: Option<i32>, value: Value) {
        match (&self.storage, scope) {
            (VariableStorage::Global(v), _) => *v.lock().unwrap() = value,
            (VariableStorage::Scoped(map), Some(s)) => {
                map.lock().unwrap().insert(s, value);
            }
            (VariableStorage::Scoped(_), None) => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub name: String,
}

/// A parsed (and, once `Linker::link` runs, linked) script or scriptlet.
pub struct Compilation {
    pub id: String,
    pub name: Option<String>,
    pub package: Option<String>,
    pub using_namespaces: Vec<String>,
    pub body: Function,
    pub functions: Vec<Function>,
    pub variables: Vec<Variable>,
    pub errors: Vec<MslError>,
    pub warnings: Vec<MslError>,
    pub collisions: Vec<Collision>,
    pub unresolved: Vec<String>,
    pub published: bool,
    pub library: bool,
    pub sustain: bool,
    pub sustain_interval: Option<u64>,
    pub repeat: bool,
    pub repeat_timeout: Option<u64>,
    pub usage: Option<String>,
    /// Whether a console/scriptlet session carries prior declarations
    /// into the next incremental compilation (spec.md §9 "Console/
    /// scriptlet extension"). Not directive-controlled; set by whatever
    /// assembles a scriptlet session.
    pub variable_carryover: bool,
}

impl Compilation {
    /// Builds a unit straight from a parse, with empty link-time state
    /// (errors/warnings from the parse only; the linker fills in
    /// `collisions`/`unresolved` and may add more errors/warnings).
    pub fn from_parse(id: impl Into<String>, parsed: ParseOutput) -> Self {
        let ParseOutput { body, functions, variables, directives, errors } = parsed;

        let body_fn = Function::synthesized(body, directives.arguments.clone().unwrap_or_default());
        let functions = functions.into_iter().filter_map(Function::from_def_node).collect();
        let variables = variables.into_iter().map(|(name, flags)| Variable::new(name, flags)).collect();

        Compilation {
            id: id.into(),
            name: directives.name,
            package: directives.namespace,
            using_namespaces: directives.using,
            body: body_fn,
            functions,
            variables,
            errors: errors.into_iter().map(MslError::from).collect(),
            warnings: Vec::new(),
            collisions: Vec::new(),
            unresolved: Vec::new(),
            published: false,
            library: directives.library,
            sustain: directives.sustain,
            sustain_interval: directives.sustain_interval,
            repeat: directives.repeat,
            repeat_timeout: directives.repeat_timeout,
            usage: directives.usage,
            variable_carryover: false,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Qualified name this unit would publish `local` under, honoring its
    /// `#namespace` (spec.md §4.3 resolution order: `package:name` before
    /// bare `name`).
    pub fn qualify(&self, local: &str) -> String {
        match &self.package {
            Some(pkg) => format!("{pkg}:{local}"),
            None => local.to_string(),
        }
    }

    pub fn find_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn find_variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Carries `prior`'s function/variable declarations (and each
    /// variable's current value) into `self`, structurally moving them
    /// rather than having the console recompile concatenated source text
    /// each line (spec.md §9 "Console/scriptlet extension... structural
    /// moves... rather than true copy"). A name `self` already declares
    /// shadows `prior`'s — the new line wins.
    pub fn carry_over(&mut self, prior: &Compilation) {
        for f in &prior.functions {
            if self.find_function(&f.name).is_none() {
                self.functions.push(Function { name: f.name.clone(), flags: f.flags.clone(), params: f.params.clone(), body: f.body.clone() });
            }
        }
        for v in &prior.variables {
            if self.find_variable(&v.name).is_some() {
                continue;
            }
            let carried = Variable::new(v.name.clone(), v.flags.clone());
            match (&v.storage, &carried.storage) {
                (VariableStorage::Global(old), VariableStorage::Global(new)) => {
                    *new.lock().unwrap() = old.lock().unwrap().clone();
                }
                (VariableStorage::Scoped(old), VariableStorage::Scoped(new)) => {
                    *new.lock().unwrap() = old.lock().unwrap().clone();
                }
                _ => {}
            }
            self.variables.push(carried);
        }
        self.variable_carryover = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_from_parse_with_directives() {
        let parsed = crate::parser::parse("#namespace looper\nfunction f() { 1 }");
        let unit = Compilation::from_parse("unit1", parsed);
        assert_eq!(unit.package.as_deref(), Some("looper"));
        assert_eq!(unit.qualify("f"), "looper:f");
        assert!(!unit.has_errors());
    }

    #[test]
    fn scoped_variable_storage_round_trips() {
        let v = Variable::new("x".to_string(), VariableFlags { scoped: true, ..Default::default() });
        v.set(Some(2), Value::int(42));
        assert_eq!(v.get(Some(2)), Value::int(42));
        assert_eq!(v.get(Some(3)), Value::Null);
    }
}
