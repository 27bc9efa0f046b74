//! `Session`: one running instance of a script (spec.md §3 "Session").

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::ast::ExecContextTarget;
use crate::compilation::Compilation;
use crate::conductor::Process;
use crate::errors::MslError;
use crate::evaluator::frame::{NodeAddress, RootRef, StackFrame};
use crate::value::{Binding, Value};

/// spec.md §9 "Suspended sessions": `sustain: {start, timeout, count, active}`.
#[derive(Debug, Clone)]
pub struct SustainState {
    pub active: bool,
    pub start: Instant,
    pub interval: Duration,
    pub count: u32,
}

/// spec.md §9 "Suspended sessions": `repeat: {start, timeout, active}`.
#[derive(Debug, Clone)]
pub struct RepeatState {
    pub active: bool,
    pub start: Instant,
    pub timeout: Duration,
}

pub struct Session {
    pub id: u64,
    pub unit: Arc<Compilation>,
    pub stack: Vec<StackFrame>,
    pub errors: Vec<MslError>,
    pub result_value: Value,
    /// Explicit `AddResult` accumulations (spec.md §3 "Result... optional
    /// results list").
    pub results: Vec<Value>,
    pub process: Option<Arc<Mutex<Process>>>,
    pub sustain: Option<SustainState>,
    pub repeat: Option<RepeatState>,
    pub transitioning: bool,
    pub finished: bool,
    pub trigger_id: Option<i64>,
    pub name: Option<String>,
    pub current_context: ExecContextTarget,
    /// Pushed/popped by an executing `In <scope-list> <body>` node so
    /// nested variable reads/writes see the ambient scope id.
    pub scope_stack: Vec<i64>,
}

impl Session {
    pub fn new(
        id: u64,
        unit: Arc<Compilation>,
        current_context: ExecContextTarget,
        root: RootRef,
        bindings: Vec<Binding>,
    ) -> Self {
        let addr = NodeAddress::root(unit.id.clone(), root);
        let mut frame = StackFrame::new(addr);
        frame.bindings = bindings;

        Session {
            id,
            unit,
            stack: vec![frame],
            errors: Vec::new(),
            result_value: Value::Null,
            results: Vec::new(),
            process: None,
            sustain: None,
            repeat: None,
            transitioning: false,
            finished: false,
            trigger_id: None,
            name: None,
            current_context,
            scope_stack: Vec::new(),
        }
    }

    pub fn current_scope(&self) -> Option<i32> {
        self.scope_stack.last().map(|s| *s as i32)
    }

    pub fn top(&mut self) -> Option<&mut StackFrame> {
        self.stack.last_mut()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// spec.md §5 "Suspension points": the run loop stops at exactly
    /// these four conditions.
    pub fn is_runnable(&self) -> bool {
        if self.stack.is_empty() || self.has_errors() || self.transitioning {
            return false;
        }
        match self.stack.last().and_then(|f| f.wait.as_ref()) {
            Some(wait) => wait.finished,
            None => true,
        }
    }

    /// Walks `bindings` from the top of the stack down, matching spec.md
    /// §4.4 Symbol semantics ("read a binding — walk frames up").
    pub fn find_binding(&self, name: &str) -> Option<&Binding> {
        self.stack.iter().rev().find_map(|f| f.find_binding(name))
    }

    pub fn find_positional(&self, position: i32) -> Option<&Binding> {
        self.stack.iter().rev().find_map(|f| f.find_positional(position))
    }

    pub fn set_binding(&mut self, name: &str, value: Value) -> bool {
        for frame in self.stack.iter_mut().rev() {
            if let Some(b) = frame.find_binding_mut(name) {
                b.value = value;
                return true;
            }
        }
        false
    }

    pub fn set_binding_by_position(&mut self, position: i32, value: Value) -> bool {
        for frame in self.stack.iter_mut().rev() {
            if let Some(b) = frame.bindings.iter_mut().find(|b| b.position == position) {
                b.value = value;
                return true;
            }
        }
        false
    }
}
