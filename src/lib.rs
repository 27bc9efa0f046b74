//! MSL - the Mobius Scripting Language runtime
//!
//! A parser, linker, and resumable evaluator for the scripting layer of a
//! looping-audio workstation: source text becomes a parse tree, the
//! linker resolves every symbol and compiles call arguments against it,
//! and the evaluator walks the tree a step at a time so a script can
//! suspend on a `wait` and resume later without an OS thread of its own.
//! The conductor schedules those suspended sessions across the host's
//! shell and kernel contexts; `Environment` is the façade a host embeds.

pub mod ast;
pub mod compilation;
pub mod conductor;
pub mod environment;
pub mod errors;
pub mod evaluator;
pub mod linker;
pub mod parser;
pub mod token;
pub mod value;

pub use compilation::Compilation;
pub use conductor::{Conductor, Request, RequestOutcome};
pub use environment::{Context, Environment, InstallResult};
pub use errors::MslError;
pub use evaluator::Session;
pub use linker::Linker;
pub use value::Value;
