//! Symbol resolution and call-argument compilation (spec.md §4.3).

pub mod errors;
pub mod linker;
pub mod scope;

pub use errors::LinkError;
pub use linker::Linker;
