//! An in-memory `Context` test double (spec.md §6 Additions), grounded in
//! the teacher's `InMemoryFs` pattern (`fs/in_memory_fs.rs`): a stand-in
//! good enough to exercise the crate's own tests and the CLI's console
//! mode, not a real host integration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::ast::ExecContextTarget;
use crate::environment::{Context, External, Linkage};
use crate::evaluator::WaitState;
use crate::value::Value;

/// Shell-only by default (`context_id` returns `Shell`); `wait` finishes
/// immediately rather than modeling real elapsed time, so `NullContext`
/// cannot itself reproduce E5's kernel-side wait suspension — tests that
/// need that drive `WaitState::finished` by hand after calling `wait`.
pub struct NullContext {
    pub context: ExecContextTarget,
    pub sample_rate: i32,
    pub externals: HashMap<String, Value>,
    pub scope_keywords: Vec<String>,
    pub echoed: Mutex<Vec<String>>,
    pub exported: Mutex<Vec<Linkage>>,
}

impl Default for NullContext {
    fn default() -> Self {
        NullContext {
            context: ExecContextTarget::Shell,
            sample_rate: 44100,
            externals: HashMap::new(),
            scope_keywords: Vec::new(),
            echoed: Mutex::new(Vec::new()),
            exported: Mutex::new(Vec::new()),
        }
    }
}

impl NullContext {
    pub fn with_external(mut self, name: impl Into<String>, value: Value) -> Self {
        self.externals.insert(name.into(), value);
        self
    }

    pub fn kernel(mut self) -> Self {
        self.context = ExecContextTarget::Kernel;
        self
    }
}

impl Context for NullContext {
    fn context_id(&self) -> ExecContextTarget {
        self.context
    }

    fn resolve(&self, name: &str) -> Option<External> {
        self.externals.contains_key(name).then(|| External::variable(name))
    }

    fn query(&self, ext: &External, _scope: Option<i32>) -> Result<Value, String> {
        self.externals.get(&ext.name).cloned().ok_or_else(|| format!("unknown external '{}'", ext.name))
    }

    fn action(&self, ext: &External, args: &[Value], _scope: Option<i32>) -> Result<(Value, Option<String>), String> {
        let v = args.first().cloned().unwrap_or(Value::Null);
        Ok((v, Some(ext.name.clone())))
    }

    fn wait(&self, wait: &mut WaitState) -> bool {
        wait.finished = true;
        true
    }

    fn echo(&self, msg: &str) {
        self.echoed.lock().unwrap().push(msg.to_string());
    }

    fn is_scope_keyword(&self, name: &str) -> bool {
        self.scope_keywords.iter().any(|k| k == name)
    }

    fn is_usage_argument(&self, _usage: &str, _name: &str) -> bool {
        false
    }

    fn sample_rate(&self) -> i32 {
        self.sample_rate
    }

    fn log_root(&self) -> PathBuf {
        PathBuf::from(".")
    }

    fn export(&self, linkage: &Linkage) {
        self.exported.lock().unwrap().push(linkage.clone());
    }
}
