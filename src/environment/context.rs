//! The host-provided `Context` trait (spec.md §6 "External interfaces").
//!
//! Every method is synchronous and takes `&self`: a `Context` is shared
//! (behind `Arc<dyn Context>`) across the shell and kernel contexts, and
//! the kernel side must never block on a lock a realtime caller could
//! starve on, so any host-side mutable state belongs behind the host's
//! own interior mutability, not behind `&mut self` here.

use std::path::PathBuf;

use crate::ast::ExecContextTarget;
use crate::environment::{External, Linkage};
use crate::evaluator::WaitState;
use crate::value::Value;

pub trait Context: Send + Sync {
    fn context_id(&self) -> ExecContextTarget;

    /// One-shot binding of a bare name to a host symbol, consulted by the
    /// linker's external-resolution step and cached on the symbol node
    /// afterward (spec.md §9 "Dynamic resolution").
    fn resolve(&self, name: &str) -> Option<External>;

    fn query(&self, ext: &External, scope: Option<i32>) -> Result<Value, String>;

    /// Returns `(result, event)`; `event` is an optional host-defined tag
    /// describing a side effect worth tracing.
    fn action(&self, ext: &External, args: &[Value], scope: Option<i32>) -> Result<(Value, Option<String>), String>;

    /// Schedules `wait` with the host; returns whether it was accepted.
    /// The host flips `wait.finished` asynchronously once it elapses.
    fn wait(&self, wait: &mut WaitState) -> bool;

    /// Script-visible diagnostic output (`echo`/`print`/`trace`), distinct
    /// from this crate's own `tracing` events.
    fn echo(&self, msg: &str);

    fn is_scope_keyword(&self, name: &str) -> bool;

    fn is_usage_argument(&self, usage: &str, name: &str) -> bool;

    fn sample_rate(&self) -> i32;

    fn log_root(&self) -> PathBuf;

    /// Publishes a callable symbol to the host (e.g. for a GUI binding
    /// list); a no-op is a legitimate implementation.
    fn export(&self, linkage: &Linkage);
}
