//! Stack frames and the wait state carried inline on them.
//!
//! Frames address a node in a compilation's tree by `(unit id, root,
//! index path)` rather than by pointer. Compilation units are installed
//! once and never structurally mutated afterward (spec.md §5: "installed
//! and mutated only on the shell side"), so an index path is stable for
//! the lifetime of a session and needs no unsafe self-referencing or
//! reference-counted node graph (spec.md §9 "cyclic graphs" design note).

use crate::ast::WaitType as AstWaitType;
use crate::ast::WaitUnit;
use crate::environment::External;
use crate::value::{Binding, Value};

/// Which function's body a frame's `path` is relative to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootRef {
    Body,
    Function(String),
}

/// One step descending from a root function body to the node a frame is
/// currently evaluating. Most nodes keep their operands in `children`;
/// a handful (`Wait.amount`, a compiled `CallArgument.value_node`) hold a
/// single node in a dedicated field instead, hence the extra variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    Child(usize),
    WaitAmount,
    Argument(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAddress {
    pub unit_id: String,
    pub root: RootRef,
    pub path: Vec<PathStep>,
}

impl NodeAddress {
    pub fn root(unit_id: impl Into<String>, root: RootRef) -> Self {
        NodeAddress { unit_id: unit_id.into(), root, path: Vec::new() }
    }

    pub fn step(&self, step: PathStep) -> Self {
        let mut path = self.path.clone();
        path.push(step);
        NodeAddress { unit_id: self.unit_id.clone(), root: self.root.clone(), path }
    }

    pub fn child(&self, index: usize) -> Self {
        self.step(PathStep::Child(index))
    }
}

#[derive(Debug, Clone)]
pub enum CallTarget {
    Function { unit_id: String, name: String },
    External(External),
}

/// spec.md §3 "Wait state".
#[derive(Debug, Clone)]
pub struct WaitState {
    pub wait_type: AstWaitType,
    pub unit: WaitUnit,
    pub value: i64,
    pub active: bool,
    pub finished: bool,
}

impl WaitState {
    pub fn new(wait_type: AstWaitType, unit: WaitUnit, value: i64) -> Self {
        WaitState { wait_type, unit, value, active: false, finished: false }
    }
}

/// spec.md §3 "Stack frame".
#[derive(Debug, Clone)]
pub struct StackFrame {
    pub addr: NodeAddress,
    pub phase: u32,
    pub child_results: Vec<Value>,
    pub child_index: usize,
    /// If true, `child_results` accumulates (operator operand lists);
    /// otherwise each child's result replaces the last.
    pub accumulator: bool,
    pub bindings: Vec<Binding>,
    pub call_target: Option<CallTarget>,
    pub wait: Option<WaitState>,
}

impl StackFrame {
    pub fn new(addr: NodeAddress) -> Self {
        StackFrame {
            addr,
            phase: 0,
            child_results: Vec::new(),
            child_index: 0,
            accumulator: false,
            bindings: Vec::new(),
            call_target: None,
            wait: None,
        }
    }

    pub fn find_binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.name.as_str() == name)
    }

    pub fn find_binding_mut(&mut self, name: &str) -> Option<&mut Binding> {
        self.bindings.iter_mut().find(|b| b.name.as_str() == name)
    }

    pub fn find_positional(&self, position: i32) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.position == position)
    }
}
