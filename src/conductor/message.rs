//! Cross-context messages and the external `Request`/`Result` surface
//! (spec.md §3 "Message", §6 "Request processing").

use crate::conductor::process::ProcessState;
use crate::errors::MslError;
use crate::evaluator::Session;
use crate::value::{Binding, Value};

/// What a host asks the conductor to start or release (spec.md §6).
#[derive(Debug, Clone)]
pub struct Request {
    pub linkage: String,
    pub bindings: Vec<Binding>,
    pub arguments: Vec<Value>,
    pub trigger_id: Option<i64>,
    pub scope: Option<i32>,
    pub release: bool,
}

impl Request {
    pub fn new(linkage: impl Into<String>) -> Self {
        Request { linkage: linkage.into(), bindings: Vec::new(), arguments: Vec::new(), trigger_id: None, scope: None, release: false }
    }
}

#[derive(Debug, Clone)]
pub struct SessionResult {
    pub session_id: u64,
    pub state: ProcessState,
    pub value: Value,
    pub errors: Vec<MslError>,
    pub results: Vec<Value>,
}

/// A session crossing the shell/kernel boundary, or a request that
/// matched a session suspended on the other side, queued on the
/// receiving side's `ConductorShared` (spec.md §3 "Message", §4.5
/// "Request processing"). `Session` carries a `Value::List(Rc<..>)`
/// which is not `Send`; the conductor never actually moves one across an
/// OS thread boundary (see DESIGN.md), so that's fine here.
///
/// There is no `Result` variant: unlike the original's separate
/// shell/kernel process lists, this crate's `processes`/`results` both
/// live in one `Arc<Mutex<_>>` shared by both contexts already, so a
/// kernel-finalized result needs no shipping to become visible to the
/// shell (see DESIGN.md "Message::Result dropped").
pub enum Message {
    Transition(Session),
    Request(Request),
}

/// What `Environment::request` hands back to its caller: the work
/// finished synchronously, it's now tracked as a `Process` the host can
/// poll, or the matching suspended session lives on the other context
/// and the request was queued there instead (spec.md §4.5 "matched only
/// on the other side → forward via `MsgRequest`").
pub enum RequestOutcome {
    Pending(u64),
    Immediate(SessionResult),
    Forwarded,
}
