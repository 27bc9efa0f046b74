//! The monitoring-facing half of a session (spec.md §3 "Process").
//!
//! Deliberately holds no back-reference to the `Session` it was created
//! for — see DESIGN.md. `Session` lives in a plain per-context `Vec`
//! (never `Arc`/`Mutex`-wrapped); the strong pointer runs the other way,
//! `Session::process: Option<Arc<Mutex<Process>>>`.

use crate::ast::ExecContextTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    None,
    Running,
    Waiting,
    Suspended,
    Transitioning,
    Error,
    Finished,
}

#[derive(Debug, Clone)]
pub struct Process {
    pub session_id: u64,
    pub state: ProcessState,
    pub context: ExecContextTarget,
    pub name: Option<String>,
    pub trigger_id: Option<i64>,
}

impl Process {
    pub fn new(session_id: u64, context: ExecContextTarget, name: Option<String>, trigger_id: Option<i64>) -> Self {
        Process { session_id, state: ProcessState::Running, context, name, trigger_id }
    }
}
