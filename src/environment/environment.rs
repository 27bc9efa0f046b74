//! `Environment`: the crate's top-level façade (spec.md §4.6).
//!
//! Owns the registry of installed compilation units, the linkage table,
//! the interned externals table, the conductor, and persisted variable
//! state. Everything else in the crate is reached through this type.

use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::ast::ExecContextTarget;
use crate::compilation::Compilation;
use crate::conductor::{Conductor, Request, RequestOutcome};
use crate::environment::context::Context;
use crate::environment::external::External;
use crate::environment::linkage::{Linkage, LinkageTable};
use crate::environment::state::{State, UnitState, VariableState};
use crate::errors::MslError;
use crate::linker::Linker;

/// Outcome of `Environment::install`. A unit with `errors` non-empty was
/// not installed at all (spec.md §7 "A unit with any errors is not
/// installed").
#[derive(Debug, Clone, Default)]
pub struct InstallResult {
    pub errors: Vec<MslError>,
    pub warnings: Vec<MslError>,
    pub collisions: Vec<crate::compilation::Collision>,
}

pub struct Environment {
    units: IndexMap<String, Arc<Compilation>>,
    /// Replaced units kept alive until no session still addresses them
    /// (spec.md §9 "Console/scriptlet extension": garbage list drained
    /// once no active session references it).
    garbage: Vec<Arc<Compilation>>,
    linkages: LinkageTable,
    externals: IndexMap<String, External>,
    conductor: Conductor,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            units: IndexMap::new(),
            garbage: Vec::new(),
            linkages: LinkageTable::new(),
            externals: IndexMap::new(),
            conductor: Conductor::new(),
        }
    }

    pub fn unit(&self, id: &str) -> Option<&Arc<Compilation>> {
        self.units.get(id)
    }

    pub fn linkage(&self, qualified_name: &str) -> Option<&Linkage> {
        self.linkages.get(qualified_name)
    }

    pub fn external(&self, name: &str) -> Option<&External> {
        self.externals.get(name)
    }

    pub fn intern_external(&mut self, ext: External) -> &External {
        self.externals.entry(ext.name.clone()).or_insert(ext)
    }

    /// Tokenizer → Parser only; no linking, no installation (spec.md
    /// §4.6).
    pub fn compile(&self, id: impl Into<String>, source: &str) -> Compilation {
        let parsed = crate::parser::parse(source);
        Compilation::from_parse(id, parsed)
    }

    /// Links `unit` against the current linkage table and, if it has no
    /// errors, installs it (spec.md §4.6, §7).
    pub fn install(&mut self, ctx: &dyn Context, mut unit: Compilation) -> InstallResult {
        Linker::link(&mut unit, self, ctx);

        if unit.has_errors() {
            return InstallResult { errors: unit.errors.clone(), warnings: unit.warnings.clone(), collisions: Vec::new() };
        }

        self.publish(&mut unit);
        unit.published = true;

        if let Some(old) = self.units.shift_remove(&unit.id) {
            self.garbage.push(old);
        }
        self.drain_garbage();

        let result = InstallResult { errors: Vec::new(), warnings: unit.warnings.clone(), collisions: unit.collisions.clone() };
        self.units.insert(unit.id.clone(), Arc::new(unit));
        result
    }

    /// Publishes every exported function/variable as a `Linkage`, per
    /// name rather than per unit: a colliding name is recorded and left
    /// unpublished, but the rest of the unit's exports still go through
    /// (DESIGN.md "installed but not published").
    fn publish(&mut self, unit: &mut Compilation) {
        for f in &unit.functions {
            if !(f.flags.exported || f.flags.public) {
                continue;
            }
            self.publish_one(unit, f.name.clone(), crate::environment::linkage::LinkageTarget::Function(f.name.clone()), true);
        }
        for v in &unit.variables {
            if !(v.flags.exported || v.flags.public) {
                continue;
            }
            self.publish_one(unit, v.name.clone(), crate::environment::linkage::LinkageTarget::Variable(v.name.clone()), false);
        }
    }

    fn publish_one(&mut self, unit: &mut Compilation, local_name: String, target: crate::environment::linkage::LinkageTarget, is_function: bool) {
        let qualified = unit.qualify(&local_name);
        if let Some(existing) = self.linkages.get(&qualified) {
            if !existing.points_to(&unit.id) {
                unit.collisions.push(crate::compilation::Collision { name: qualified });
                return;
            }
        }
        let linkage = Linkage {
            name: qualified.clone(),
            owner_unit_id: unit.id.clone(),
            target,
            is_function,
            is_sustainable: unit.sustain,
            continuous: unit.repeat,
            exported: true,
        };
        self.linkages.insert(qualified, linkage);
    }

    /// Removes exactly the linkages owned by `id` (Testable Property 4),
    /// and drops the unit itself if nothing in the garbage list still
    /// needs it.
    pub fn uninstall(&mut self, id: &str) {
        self.linkages.retain(|_, lk| !lk.points_to(id));
        if let Some(unit) = self.units.shift_remove(id) {
            self.garbage.push(unit);
        }
        self.drain_garbage();
    }

    /// A unit is only truly dropped once no `Arc` clone (held by a live
    /// session) still references it.
    fn drain_garbage(&mut self) {
        self.garbage.retain(|u| Arc::strong_count(u) > 1);
    }

    pub fn request(&mut self, ctx: &dyn Context, req: Request) -> RequestOutcome {
        let view = self.snapshot();
        self.conductor.request(&view, ctx, req)
    }

    pub fn advance(&mut self, target: ExecContextTarget, ctx: &dyn Context) {
        let view = self.snapshot();
        self.conductor.advance(target, &view, ctx);
    }

    /// Host callback for a scheduled wait elapsing (spec.md §6); see
    /// `Conductor::resume_wait`.
    pub fn resume_wait(&mut self, target: ExecContextTarget, ctx: &dyn Context, session_id: u64) -> Option<RequestOutcome> {
        let view = self.snapshot();
        self.conductor.resume_wait(target, &view, ctx, session_id)
    }

    /// Processes currently tracked by the conductor, for a host to poll
    /// suspended/waiting/transitioning work (spec.md §3 "Process").
    pub fn processes(&self) -> Vec<Arc<Mutex<crate::conductor::Process>>> {
        self.conductor.processes()
    }

    /// A snapshot of finished sessions' results (spec.md §4.5 "Results
    /// list"). Not cleared by reading it; call `prune_results` to drain.
    pub fn results(&self) -> Vec<crate::conductor::SessionResult> {
        self.conductor.results()
    }

    /// Drains and returns every result installed since the last prune
    /// (spec.md §4.5 "Pruned only on explicit request").
    pub fn prune_results(&mut self) -> Vec<crate::conductor::SessionResult> {
        self.conductor.prune_results()
    }

    /// A cheap, read-only view of `self` the conductor/evaluator borrow
    /// while `self.conductor` is itself mutably borrowed. The linkage/unit
    /// tables themselves are shell-mutated only (spec.md §5), so cloning
    /// the `Arc`/`IndexMap` handles is just a refcount bump, not a deep
    /// copy.
    fn snapshot(&self) -> EnvironmentView {
        EnvironmentView { units: self.units.clone(), linkages: self.linkages.clone(), externals: self.externals.clone() }
    }

    pub fn save_state(&self) -> State {
        let mut units = Vec::new();
        for unit in self.units.values() {
            let mut variables = Vec::new();
            for v in &unit.variables {
                match &v.storage {
                    crate::compilation::VariableStorage::Global(cell) => {
                        variables.push(VariableState { name: v.name.clone(), scope_id: None, value: cell.lock().unwrap().clone() });
                    }
                    crate::compilation::VariableStorage::Scoped(map) => {
                        for (scope, value) in map.lock().unwrap().iter() {
                            variables.push(VariableState { name: v.name.clone(), scope_id: Some(*scope), value: value.clone() });
                        }
                    }
                }
            }
            units.push(UnitState { id: unit.id.clone(), variables });
        }
        State { units }
    }

    /// Writes values back into the corresponding units' variables.
    /// Missing or moved variables are tolerated with a `tracing::warn!`
    /// (spec.md §6 "Persisted state").
    pub fn restore_state(&self, state: State) {
        for unit_state in state.units {
            let Some(unit) = self.units.get(&unit_state.id) else {
                tracing::warn!(unit = %unit_state.id, "restore_state: unit no longer installed");
                continue;
            };
            for var_state in unit_state.variables {
                match unit.find_variable(&var_state.name) {
                    Some(var) => var.set(var_state.scope_id, var_state.value),
                    None => tracing::warn!(unit = %unit_state.id, variable = %var_state.name, "restore_state: variable no longer declared"),
                }
            }
        }
    }
}

/// Read-only snapshot of the tables the evaluator's `node_at`/linkage/
/// external lookups need, handed to `Conductor::advance` so it can run
/// sessions without holding `&mut Environment` for the whole call.
pub struct EnvironmentView {
    units: IndexMap<String, Arc<Compilation>>,
    linkages: LinkageTable,
    externals: IndexMap<String, External>,
}

impl EnvironmentView {
    pub fn unit(&self, id: &str) -> Option<&Arc<Compilation>> {
        self.units.get(id)
    }

    pub fn linkage(&self, qualified_name: &str) -> Option<&Linkage> {
        self.linkages.get(qualified_name)
    }

    pub fn external(&self, name: &str) -> Option<&External> {
        self.externals.get(name)
    }
}

/// The three read-only lookups the evaluator needs, shared by `Environment`
/// and the cheap `EnvironmentView` snapshot the conductor drives sessions
/// against, so `evaluator::run`/`advance` don't care which one they hold.
pub trait EnvLookup {
    fn unit(&self, id: &str) -> Option<&Arc<Compilation>>;
    fn linkage(&self, qualified_name: &str) -> Option<&Linkage>;
    fn external(&self, name: &str) -> Option<&External>;
}

impl EnvLookup for Environment {
    fn unit(&self, id: &str) -> Option<&Arc<Compilation>> {
        Environment::unit(self, id)
    }
    fn linkage(&self, qualified_name: &str) -> Option<&Linkage> {
        Environment::linkage(self, qualified_name)
    }
    fn external(&self, name: &str) -> Option<&External> {
        Environment::external(self, name)
    }
}

impl EnvLookup for EnvironmentView {
    fn unit(&self, id: &str) -> Option<&Arc<Compilation>> {
        EnvironmentView::unit(self, id)
    }
    fn linkage(&self, qualified_name: &str) -> Option<&Linkage> {
        EnvironmentView::linkage(self, qualified_name)
    }
    fn external(&self, name: &str) -> Option<&External> {
        EnvironmentView::external(self, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::test_context::NullContext;

    #[test]
    fn compile_without_install_leaves_registry_empty() {
        let env = Environment::new();
        let unit = env.compile("u1", "1 + 1");
        assert!(!unit.has_errors());
        assert!(env.unit("u1").is_none());
    }

    #[test]
    fn install_publishes_exported_function() {
        let mut env = Environment::new();
        let ctx = NullContext::default();
        let unit = env.compile("u1", "#namespace looper\nexport function f() { 1 }");
        let result = env.install(&ctx, unit);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert!(env.linkage("looper:f").is_some());
    }

    #[test]
    fn reinstalling_same_id_does_not_duplicate_linkage() {
        let mut env = Environment::new();
        let ctx = NullContext::default();
        let unit1 = env.compile("u1", "export function f() { 1 }");
        env.install(&ctx, unit1);
        let unit2 = env.compile("u1", "export function f() { 2 }");
        env.install(&ctx, unit2);
        assert_eq!(env.units.len(), 1);
        assert_eq!(env.linkages.len(), 1);
    }

    #[test]
    fn uninstall_removes_exactly_owned_linkages() {
        let mut env = Environment::new();
        let ctx = NullContext::default();
        let unit1 = env.compile("u1", "export function f() { 1 }");
        env.install(&ctx, unit1);
        let unit2 = env.compile("u2", "export function g() { 2 }");
        env.install(&ctx, unit2);
        env.uninstall("u1");
        assert!(env.linkage("f").is_none());
        assert!(env.linkage("g").is_some());
    }

    #[test]
    fn colliding_export_is_recorded_and_not_repointed() {
        let mut env = Environment::new();
        let ctx = NullContext::default();
        let unit1 = env.compile("u1", "export function foo() { 1 }");
        env.install(&ctx, unit1);
        let unit2 = env.compile("u2", "export function foo() { 2 }");
        let result = env.install(&ctx, unit2);
        assert_eq!(result.collisions.len(), 1);
        assert_eq!(env.linkage("foo").unwrap().owner_unit_id, "u1");
    }
}
