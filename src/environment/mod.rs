//! The host-facing façade: installed units, linkage table, externals,
//! and the conductor (spec.md §4.6).

pub mod context;
pub mod environment;
pub mod external;
pub mod linkage;
pub mod state;

#[cfg(any(test, feature = "test-context"))]
pub mod test_context;

pub use context::Context;
pub use environment::{EnvLookup, Environment, EnvironmentView, InstallResult};
pub use external::External;
pub use linkage::{Linkage, LinkageTable, LinkageTarget};
pub use state::{State, UnitState, VariableState};
