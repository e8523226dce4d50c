//! Core domain models shared by the filestore and timestore subsystems.
//!
//! These are plain value types independent of the sea-orm entity shapes in
//! [`crate::infrastructure::database::entities`]; repository functions
//! translate between the two at the boundary so the rest of the crate never
//! has to think in terms of `ActiveModel`s.

pub mod node;
pub mod rollup;
pub mod journal;
pub mod reconciliation;
pub mod dataset;
pub mod schema;
pub mod manifest;
pub mod partition;
pub mod staging;

pub use dataset::Dataset;
pub use journal::JournalEntry;
pub use manifest::Manifest;
pub use node::{Node, NodeKind, NodeState, ConsistencyState};
pub use partition::{ColumnStatistics, Partition};
pub use reconciliation::{ReconciliationJob, ReconciliationReason, ReconciliationStatus};
pub use rollup::{Rollup, RollupState};
pub use schema::{DatasetSchemaVersion, FieldType, SchemaField};
pub use staging::StagingBatch;
