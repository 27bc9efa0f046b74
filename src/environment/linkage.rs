//! Globally visible linkage table entries (spec.md §3 "Linkage").

use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkageTarget {
    Function(String),
    Variable(String),
}

/// An entry in the environment's linkage table. `owner_unit_id` stands in
/// for the "back-pointer to the owning compilation" the spec describes —
/// a name rather than a pointer, so a linkage never keeps a unit alive by
/// itself (spec.md §9 "cyclic graphs" design note); dereferencing goes
/// back through `Environment::units`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linkage {
    pub name: String,
    pub owner_unit_id: String,
    pub target: LinkageTarget,
    pub is_function: bool,
    pub is_sustainable: bool,
    pub continuous: bool,
    pub exported: bool,
}

impl Linkage {
    pub fn points_to(&self, unit_id: &str) -> bool {
        self.owner_unit_id == unit_id
    }
}

pub type LinkageTable = IndexMap<String, Linkage>;
