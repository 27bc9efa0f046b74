//! Persisted state shape for save/restore of persistent variables
//! (spec.md §6 "Persisted state").

use serde::{Deserialize, Serialize};

use crate::value::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableState {
    pub name: String,
    pub scope_id: Option<i32>,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitState {
    pub id: String,
    pub variables: Vec<VariableState>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    pub units: Vec<UnitState>,
}
