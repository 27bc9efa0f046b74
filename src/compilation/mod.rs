//! Named container holding a script's body function, declared functions,
//! declared variables, and accumulated diagnostics (spec.md §3
//! "Compilation (unit)").

pub mod types;

pub use types::{Collision, Compilation, Function, Variable, VariableStorage};
