//! Session scheduling and cross-context messaging (spec.md §4.5).

pub mod conductor;
pub mod message;
pub mod process;

pub use conductor::Conductor;
pub use message::{Message, Request, RequestOutcome, SessionResult};
pub use process::{Process, ProcessState};
