//! Dynamically typed scalar values and the pooled object model.
//!
//! This module contains the `Value` type, `Binding` (a named storage slot),
//! and the generic `Pool<T>` used throughout the runtime to avoid realtime
//! allocation (see `crate::value::pool`).

pub mod pool;
pub mod types;

pub use pool::{Pool, Poolable};
pub use types::{Binding, ListCell, ShortString, Value};
