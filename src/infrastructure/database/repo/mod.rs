//! Typed repository functions over the metadata store (spec §4.1, component
//! C1). Each submodule wraps one entity family; callers drive these through
//! [`super::Database::with_transaction`] when an operation needs atomicity
//! across more than one call, most notably rollup `applyDelta`/`recalculate`
//! and node read-then-write under `FOR UPDATE`.

pub mod access_events;
pub mod backend_mounts;
pub mod datasets;
pub mod journal;
pub mod nodes;
pub mod queue;
pub mod reconciliation;
pub mod rollups;
pub mod snapshots;

mod convert;
pub use convert::*;
