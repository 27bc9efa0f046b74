//! `Conductor`: drives requests and suspended sessions (spec.md §4.5).
//!
//! Kept synchronous and single-threaded inside this crate: the shell and
//! kernel "sides" are two cooperative `Vec<Session>`s advanced by
//! whichever thread the host calls `Environment::advance` from, never
//! literal concurrent OS threads here. `Value::List` uses `Rc`, which is
//! not `Send`; modeling the shell/kernel split this way means a `Session`
//! never actually needs to cross a thread boundary, so that tension never
//! arises (see DESIGN.md).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::ast::ExecContextTarget;
use crate::conductor::message::{Message, Request, RequestOutcome, SessionResult};
use crate::conductor::process::{Process, ProcessState};
use crate::environment::{Context, EnvironmentView, LinkageTarget};
use crate::errors::MslError;
use crate::evaluator::{self, RepeatState, RootRef, Session, StackFrame, SustainState};
use crate::value::{Binding, Value};

fn other_context(target: ExecContextTarget) -> ExecContextTarget {
    match target {
        ExecContextTarget::Shell => ExecContextTarget::Kernel,
        ExecContextTarget::Kernel => ExecContextTarget::Shell,
    }
}

struct ConductorShared {
    next_session_id: u64,
    shell_messages: VecDeque<Message>,
    kernel_messages: VecDeque<Message>,
    processes: Vec<Arc<Mutex<Process>>>,
    /// Append-at-head, pruned only on explicit request (spec.md §4.5
    /// "Results list"). Finalized here regardless of which context did
    /// the finalizing, since both sides already share this one guarded
    /// list (see `Message`'s doc comment on the dropped `Result` variant).
    results: Vec<SessionResult>,
}

pub struct Conductor {
    shared: Arc<Mutex<ConductorShared>>,
    shell_sessions: Vec<Session>,
    kernel_sessions: Vec<Session>,
}

impl Default for Conductor {
    fn default() -> Self {
        Self::new()
    }
}

impl Conductor {
    pub fn new() -> Self {
        Conductor {
            shared: Arc::new(Mutex::new(ConductorShared {
                next_session_id: 1,
                shell_messages: VecDeque::new(),
                kernel_messages: VecDeque::new(),
                processes: Vec::new(),
                results: Vec::new(),
            })),
            shell_sessions: Vec::new(),
            kernel_sessions: Vec::new(),
        }
    }

    pub fn processes(&self) -> Vec<Arc<Mutex<Process>>> {
        self.shared.lock().unwrap().processes.clone()
    }

    /// A snapshot of the results list; pruned only via `prune_results`
    /// (spec.md §4.5 "Results list... Pruned only on explicit request").
    pub fn results(&self) -> Vec<SessionResult> {
        self.shared.lock().unwrap().results.clone()
    }

    pub fn prune_results(&mut self) -> Vec<SessionResult> {
        std::mem::take(&mut self.shared.lock().unwrap().results)
    }

    fn record_result(&self, result: SessionResult) {
        self.shared.lock().unwrap().results.insert(0, result);
    }

    fn sessions_mut(&mut self, target: ExecContextTarget) -> &mut Vec<Session> {
        match target {
            ExecContextTarget::Shell => &mut self.shell_sessions,
            ExecContextTarget::Kernel => &mut self.kernel_sessions,
        }
    }

    fn next_id(&self) -> u64 {
        let mut shared = self.shared.lock().unwrap();
        let id = shared.next_session_id;
        shared.next_session_id += 1;
        id
    }

    fn error_result(detail: impl Into<String>) -> RequestOutcome {
        RequestOutcome::Immediate(SessionResult {
            session_id: 0,
            state: ProcessState::Error,
            value: Value::Null,
            errors: vec![MslError::new(detail)],
            results: Vec::new(),
        })
    }

    /// Dispatches `req` per spec.md §4.5 "Request processing": a trigger
    /// matching a session already suspended here resumes it; a trigger
    /// matching one suspended on the other side is forwarded there
    /// instead of reaching into that side's list directly (spec.md §5
    /// "never touched from the other side" — this crate keeps that
    /// invariant even though both sides share one process, see
    /// `probe_suspended`); anything else starts a new session.
    pub fn request(&mut self, env: &EnvironmentView, ctx: &dyn Context, req: Request) -> RequestOutcome {
        let target = ctx.context_id();

        if let Some(trigger_id) = req.trigger_id {
            if self.sessions_mut(target).iter().any(|s| s.trigger_id == Some(trigger_id)) {
                return self.resume_trigger(env, ctx, target, &req);
            }
            match self.probe_suspended(trigger_id) {
                Some(other) if other != target => {
                    self.forward_request(other, req.clone());
                    return RequestOutcome::Forwarded;
                }
                Some(_) => {
                    tracing::warn!(trigger_id, "process claims a local session that isn't there, treating as orphaned");
                }
                None => {}
            }
            if req.release {
                tracing::warn!(trigger_id, "release request for unknown session, dropping");
                return Self::error_result(format!("no suspended session for trigger {trigger_id}"));
            }
        } else if req.release {
            tracing::warn!("release request without a trigger id, dropping");
            return Self::error_result("release request requires a trigger id");
        }

        self.start_session(env, ctx, target, &req)
    }

    /// Which context (if any) currently tracks a suspended session for
    /// `trigger_id`, consulted via the mutex-guarded process list rather
    /// than either session `Vec` directly (grounded in the original's
    /// `MslConductor::probeSuspended`).
    fn probe_suspended(&self, trigger_id: i64) -> Option<ExecContextTarget> {
        let shared = self.shared.lock().unwrap();
        shared.processes.iter().find_map(|p| {
            let p = p.lock().unwrap();
            (p.trigger_id == Some(trigger_id)).then_some(p.context)
        })
    }

    fn forward_request(&mut self, target: ExecContextTarget, req: Request) {
        let mut shared = self.shared.lock().unwrap();
        match target {
            ExecContextTarget::Shell => shared.shell_messages.push_back(Message::Request(req)),
            ExecContextTarget::Kernel => shared.kernel_messages.push_back(Message::Request(req)),
        }
    }

    /// Dispatches a request whose trigger id matches a session already
    /// suspended in `target`'s list (grounded in the original
    /// `MslConductor::resume`): a release request tears a sustaining
    /// session down; a retrigger while a repeat is armed fires
    /// `OnRepeat`; anything else starts a new session alongside the one
    /// already suspended.
    fn resume_trigger(&mut self, env: &EnvironmentView, ctx: &dyn Context, target: ExecContextTarget, req: &Request) -> RequestOutcome {
        let idx = self.sessions_mut(target).iter().position(|s| s.trigger_id == req.trigger_id).expect("caller verified a match exists");

        if req.release {
            let sustaining = self.sessions_mut(target)[idx].sustain.as_ref().is_some_and(|s| s.active);
            if !sustaining {
                let id = self.sessions_mut(target)[idx].id;
                tracing::warn!(trigger_id = ?req.trigger_id, "release request for a session that isn't sustaining, ignoring");
                return RequestOutcome::Pending(id);
            }
            return self.release(env, ctx, target, req);
        }

        if self.sessions_mut(target)[idx].sustain.as_ref().is_some_and(|s| s.active) {
            tracing::warn!(trigger_id = ?req.trigger_id, "retrigger while still waiting for release, cancelling sustain");
            self.sessions_mut(target)[idx].sustain = None;
        }

        if self.sessions_mut(target)[idx].repeat.as_ref().is_some_and(|r| r.active) {
            let session = self.sessions_mut(target).remove(idx);
            return self.repeat(env, ctx, target, session);
        }

        tracing::debug!(trigger_id = ?req.trigger_id, "concurrent retrigger alongside an existing suspended session");
        self.start_session(env, ctx, target, req)
    }

    /// Creates a brand-new session for `req` and drives it to its next
    /// suspension point synchronously (DESIGN.md "Environment::request
    /// simplified vs MsgRequest routing").
    fn start_session(&mut self, env: &EnvironmentView, ctx: &dyn Context, target: ExecContextTarget, req: &Request) -> RequestOutcome {
        let Some(linkage) = env.linkage(&req.linkage).filter(|lk| lk.is_function) else {
            return Self::error_result(format!("unresolved linkage '{}'", req.linkage));
        };
        let LinkageTarget::Function(fname) = linkage.target.clone() else {
            return Self::error_result(format!("'{}' is not a function", req.linkage));
        };
        let owner = linkage.owner_unit_id.clone();
        let Some(unit) = env.unit(&owner) else {
            return Self::error_result("linked unit is no longer installed");
        };
        let unit = unit.clone();

        let id = self.next_id();
        let mut bindings = req.bindings.clone();
        for (i, arg) in req.arguments.iter().enumerate() {
            let position = i as i32 + 1;
            bindings.push(Binding::positional(format!("${position}"), arg.clone(), position));
        }

        let mut session = Session::new(id, unit.clone(), target, RootRef::Function(fname), bindings);
        session.trigger_id = req.trigger_id;
        session.name = Some(req.linkage.clone());
        if let Some(scope) = req.scope {
            session.scope_stack.push(scope as i64);
        }
        if unit.sustain {
            session.sustain = Some(SustainState { active: true, start: Instant::now(), interval: Duration::from_millis(unit.sustain_interval.unwrap_or(0)), count: 0 });
        }
        if unit.repeat {
            session.repeat = Some(RepeatState { active: true, start: Instant::now(), timeout: Duration::from_millis(unit.repeat_timeout.unwrap_or(0)) });
        }

        evaluator::run(env, ctx, &mut session);
        self.finish_step(target, session)
    }

    /// Finds the session suspended under `req.trigger_id`, invokes its
    /// unit's `OnRelease` function by convention name if one exists, and
    /// finalizes it. Aging (see `age_suspended`) only logs a notification;
    /// an explicit `release=true` request is what actually tears a
    /// sustained/repeating session down (DESIGN.md).
    fn release(&mut self, env: &EnvironmentView, ctx: &dyn Context, target: ExecContextTarget, req: &Request) -> RequestOutcome {
        let sessions = self.sessions_mut(target);
        let Some(idx) = sessions.iter().position(|s| s.trigger_id.is_some() && s.trigger_id == req.trigger_id) else {
            return Self::error_result(format!("no suspended session for trigger {:?}", req.trigger_id));
        };
        let mut session = sessions.remove(idx);
        session.sustain = None;
        session.repeat = None;

        if session.unit.find_function("OnRelease").is_some() {
            let addr = crate::evaluator::NodeAddress::root(session.unit.id.clone(), RootRef::Function("OnRelease".to_string()));
            session.stack = vec![StackFrame::new(addr)];
            session.finished = false;
            session.transitioning = false;
            evaluator::run(env, ctx, &mut session);
        }

        let result = self.to_result(&session, if session.has_errors() { ProcessState::Error } else { ProcessState::Finished });
        self.forget_process(session.id);
        self.record_result(result.clone());
        RequestOutcome::Immediate(result)
    }

    /// Fires `OnRepeat` by convention name (if declared) for a session
    /// whose `#repeat` timer rearmed on a retrigger, then leaves it
    /// suspended — a repeat normally only finalizes on timeout, not on
    /// the retrigger that renewed it (grounded in the original
    /// `MslConductor::repeat`).
    fn repeat(&mut self, env: &EnvironmentView, ctx: &dyn Context, target: ExecContextTarget, mut session: Session) -> RequestOutcome {
        if let Some(repeat) = session.repeat.as_mut() {
            repeat.start = Instant::now();
        }
        if session.unit.find_function("OnRepeat").is_some() {
            let addr = crate::evaluator::NodeAddress::root(session.unit.id.clone(), RootRef::Function("OnRepeat".to_string()));
            session.stack = vec![StackFrame::new(addr)];
            session.finished = false;
            session.transitioning = false;
            evaluator::run(env, ctx, &mut session);
        }
        self.finish_step(target, session)
    }

    fn to_result(&self, session: &Session, state: ProcessState) -> SessionResult {
        SessionResult { session_id: session.id, state, value: session.result_value.clone(), errors: session.errors.clone(), results: session.results.clone() }
    }

    fn track_process(&mut self, session: &Session, state: ProcessState) {
        let mut shared = self.shared.lock().unwrap();
        if let Some(existing) = shared.processes.iter().find(|p| p.lock().unwrap().session_id == session.id) {
            existing.lock().unwrap().state = state;
            return;
        }
        let process = Process { state, ..Process::new(session.id, session.current_context, session.name.clone(), session.trigger_id) };
        shared.processes.push(Arc::new(Mutex::new(process)));
    }

    fn forget_process(&mut self, session_id: u64) {
        self.shared.lock().unwrap().processes.retain(|p| p.lock().unwrap().session_id != session_id);
    }

    fn enqueue_transition(&mut self, mut session: Session) {
        let target = other_context(session.current_context);
        session.transitioning = false;
        session.current_context = target;
        let mut shared = self.shared.lock().unwrap();
        match target {
            ExecContextTarget::Shell => shared.shell_messages.push_back(Message::Transition(session)),
            ExecContextTarget::Kernel => shared.kernel_messages.push_back(Message::Transition(session)),
        }
    }

    /// Applies the session-state action table (spec.md §4.5) after a run
    /// step: errors and a plain finish both finalize; transitioning
    /// hands the session to the other context's queue; an unfinished wait
    /// or an active sustain/repeat keeps it parked in this context.
    fn finish_step(&mut self, target: ExecContextTarget, session: Session) -> RequestOutcome {
        let id = session.id;

        if session.has_errors() {
            let result = self.to_result(&session, ProcessState::Error);
            self.forget_process(id);
            self.record_result(result.clone());
            return RequestOutcome::Immediate(result);
        }

        if session.transitioning {
            self.track_process(&session, ProcessState::Transitioning);
            self.enqueue_transition(session);
            return RequestOutcome::Pending(id);
        }

        if !session.finished {
            self.track_process(&session, ProcessState::Waiting);
            self.sessions_mut(target).push(session);
            return RequestOutcome::Pending(id);
        }

        let suspended = session.sustain.as_ref().is_some_and(|s| s.active) || session.repeat.as_ref().is_some_and(|r| r.active);
        if suspended {
            self.track_process(&session, ProcessState::Suspended);
            self.sessions_mut(target).push(session);
            return RequestOutcome::Pending(id);
        }

        let result = self.to_result(&session, ProcessState::Finished);
        self.forget_process(id);
        self.record_result(result.clone());
        RequestOutcome::Immediate(result)
    }

    /// Called back by the host once a scheduled wait elapses (spec.md §6,
    /// grounded in the original `MslConductor::resume`): flips the named
    /// session's wait finished and resumes it synchronously in-line,
    /// rather than waiting for the next `advance` pass to notice. Returns
    /// `None` if no parked session in `target` has that id.
    pub fn resume_wait(&mut self, target: ExecContextTarget, env: &EnvironmentView, ctx: &dyn Context, session_id: u64) -> Option<RequestOutcome> {
        let sessions = self.sessions_mut(target);
        let idx = sessions.iter().position(|s| s.id == session_id)?;
        let mut session = sessions.remove(idx);
        if let Some(wait) = session.top().and_then(|f| f.wait.as_mut()) {
            wait.finished = true;
        }
        evaluator::run(env, ctx, &mut session);
        Some(self.finish_step(target, session))
    }

    /// One pass over `target`'s world (spec.md §4.5 "advance"): age
    /// suspended sessions, absorb incoming transitions, then advance
    /// every session still live in this context.
    pub fn advance(&mut self, target: ExecContextTarget, env: &EnvironmentView, ctx: &dyn Context) {
        self.age_suspended(target);
        self.consume_messages(target, env, ctx);
        self.advance_active(target, env, ctx);
    }

    /// Elapsed sustain/repeat intervals only emit a notification; they do
    /// not by themselves invoke any script function (spec.md E4: "aging
    /// alone just emits a sustain notification" — a subsequent
    /// `release=true` request is what calls `OnRelease`).
    fn age_suspended(&mut self, target: ExecContextTarget) {
        for session in self.sessions_mut(target).iter_mut() {
            if let Some(sustain) = session.sustain.as_mut() {
                if sustain.active && sustain.start.elapsed() >= sustain.interval {
                    sustain.count += 1;
                    sustain.start = Instant::now();
                    tracing::info!(session_id = session.id, count = sustain.count, "sustain elapsed, notification");
                }
            }
            if let Some(repeat) = session.repeat.as_mut() {
                if repeat.active && repeat.start.elapsed() >= repeat.timeout {
                    repeat.start = Instant::now();
                    tracing::info!(session_id = session.id, "repeat timeout elapsed, notification");
                }
            }
        }
    }

    /// Drains `target`'s inbox: a `Transition` rejoins the session list
    /// directly; a forwarded `Request` is re-dispatched against the local
    /// suspended list the way the original's `doRequest` does, since the
    /// session it was forwarded for should now actually be here (a miss
    /// means it finished or was released out from under the forward, a
    /// race the original also just logs and drops).
    fn consume_messages(&mut self, target: ExecContextTarget, env: &EnvironmentView, ctx: &dyn Context) {
        let mut incoming = {
            let mut shared = self.shared.lock().unwrap();
            match target {
                ExecContextTarget::Shell => std::mem::take(&mut shared.shell_messages),
                ExecContextTarget::Kernel => std::mem::take(&mut shared.kernel_messages),
            }
        };
        while let Some(msg) = incoming.pop_front() {
            match msg {
                Message::Transition(session) => self.sessions_mut(target).push(session),
                Message::Request(req) => {
                    let found = req.trigger_id.is_some_and(|id| self.sessions_mut(target).iter().any(|s| s.trigger_id == Some(id)));
                    if found {
                        self.resume_trigger(env, ctx, target, &req);
                    } else {
                        tracing::warn!(trigger_id = ?req.trigger_id, "forwarded request's suspended session evaporated before arrival");
                    }
                }
            }
        }
    }

    fn advance_active(&mut self, target: ExecContextTarget, env: &EnvironmentView, ctx: &dyn Context) {
        let pending = std::mem::take(self.sessions_mut(target));
        for mut session in pending {
            evaluator::run(env, ctx, &mut session);
            self.finish_step(target, session);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::environment::test_context::NullContext;
    use crate::environment::{Environment, External, Linkage};

    fn install(env: &mut Environment, ctx: &dyn Context, id: &str, source: &str) {
        let unit = env.compile(id, source);
        let result = env.install(ctx, unit);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
    }

    fn process_state(env: &Environment, session_id: u64) -> Option<ProcessState> {
        env.processes().iter().find(|p| p.lock().unwrap().session_id == session_id).map(|p| p.lock().unwrap().state)
    }

    #[test]
    fn e4_sustain_release() {
        let mut env = Environment::new();
        let ctx = NullContext::default();
        install(&mut env, &ctx, "e4", "#sustain 200\nexport function Trigger() { 1 }\nfunction OnRelease() { 2 }");

        let outcome = env.request(&ctx, Request { trigger_id: Some(1), ..Request::new("Trigger") });
        let id = match outcome {
            RequestOutcome::Pending(id) => id,
            RequestOutcome::Immediate(r) => panic!("expected a suspended sustain, got {:?}", r.state),
            RequestOutcome::Forwarded => panic!("no other context to forward to in this test"),
        };
        assert_eq!(process_state(&env, id), Some(ProcessState::Suspended));

        std::thread::sleep(Duration::from_millis(210));
        env.advance(ExecContextTarget::Shell, &ctx);
        assert_eq!(process_state(&env, id), Some(ProcessState::Suspended), "aging alone must not finalize a sustained session");

        let outcome = env.request(&ctx, Request { trigger_id: Some(1), release: true, ..Request::new("Trigger") });
        match outcome {
            RequestOutcome::Immediate(result) => {
                assert_eq!(result.state, ProcessState::Finished);
                assert_eq!(result.value, Value::int(2));
            }
            RequestOutcome::Pending(_) => panic!("release must finalize synchronously"),
            RequestOutcome::Forwarded => panic!("no other context to forward to in this test"),
        }
        assert!(process_state(&env, id).is_none(), "released session must no longer be tracked");
    }

    /// A `Context` whose `wait` genuinely parks rather than completing
    /// inline, so a test can drive the host-callback half of a wait
    /// (`Environment::resume_wait`) separately from scheduling it —
    /// `NullContext::wait` finishes immediately and can't exercise this.
    struct ParkingContext {
        inner: NullContext,
    }

    impl Context for ParkingContext {
        fn context_id(&self) -> ExecContextTarget {
            self.inner.context_id()
        }
        fn resolve(&self, name: &str) -> Option<External> {
            self.inner.resolve(name)
        }
        fn query(&self, ext: &External, scope: Option<i32>) -> Result<Value, String> {
            self.inner.query(ext, scope)
        }
        fn action(&self, ext: &External, args: &[Value], scope: Option<i32>) -> Result<(Value, Option<String>), String> {
            self.inner.action(ext, args, scope)
        }
        fn wait(&self, wait: &mut crate::evaluator::WaitState) -> bool {
            wait.finished = false;
            true
        }
        fn echo(&self, msg: &str) {
            self.inner.echo(msg)
        }
        fn is_scope_keyword(&self, name: &str) -> bool {
            self.inner.is_scope_keyword(name)
        }
        fn is_usage_argument(&self, usage: &str, name: &str) -> bool {
            self.inner.is_usage_argument(usage, name)
        }
        fn sample_rate(&self) -> i32 {
            self.inner.sample_rate()
        }
        fn log_root(&self) -> PathBuf {
            self.inner.log_root()
        }
        fn export(&self, linkage: &Linkage) {
            self.inner.export(linkage)
        }
    }

    #[test]
    fn e5_wait_transition() {
        let mut env = Environment::new();
        let ctx = ParkingContext { inner: NullContext::default() };
        install(&mut env, &ctx, "e5", "export function Trigger() { wait subcycle 2 }");

        let outcome = env.request(&ctx, Request::new("Trigger"));
        let id = match outcome {
            RequestOutcome::Pending(id) => id,
            RequestOutcome::Immediate(r) => panic!("wait must suspend, got {:?}", r.state),
            RequestOutcome::Forwarded => panic!("no other context to forward to in this test"),
        };
        assert_eq!(process_state(&env, id), Some(ProcessState::Transitioning));

        env.advance(ExecContextTarget::Kernel, &ctx);
        assert_eq!(process_state(&env, id), Some(ProcessState::Waiting));

        let result = env.resume_wait(ExecContextTarget::Kernel, &ctx, id).expect("session still parked under this id");
        match result {
            RequestOutcome::Immediate(r) => assert_eq!(r.state, ProcessState::Finished),
            RequestOutcome::Pending(_) => panic!("resume_wait must finalize synchronously once the wait finishes"),
            RequestOutcome::Forwarded => panic!("no other context to forward to in this test"),
        }
        assert!(process_state(&env, id).is_none());
    }
}
