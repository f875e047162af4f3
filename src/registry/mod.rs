//! Durable per-account state: installed validations and per-selector
//! execution records, backed by [`LinkedSet`](crate::linked_set::LinkedSet).

mod entries;
mod manager;

pub use entries::{ExecutionEntry, ValidationEntry};
pub use manager::{MAX_VALIDATION_HOOKS, Registry};
