//! Sea-ORM entity definitions mapping directly onto spec §3/§6's persisted
//! table layout.

pub mod backend_mount;
pub mod node;
pub mod rollup;
pub mod snapshot;
pub mod journal_entry;
pub mod reconciliation_job;
pub mod dataset;
pub mod dataset_schema_version;
pub mod dataset_manifest;
pub mod manifest_partition;
pub mod staging_batch;
pub mod dataset_access_event;
pub mod queued_job;

pub use backend_mount::Entity as BackendMount;
pub use node::Entity as Node;
pub use rollup::Entity as Rollup;
pub use snapshot::Entity as Snapshot;
pub use journal_entry::Entity as JournalEntry;
pub use reconciliation_job::Entity as ReconciliationJob;
pub use dataset::Entity as Dataset;
pub use dataset_schema_version::Entity as DatasetSchemaVersion;
pub use dataset_manifest::Entity as DatasetManifest;
pub use manifest_partition::Entity as ManifestPartition;
pub use staging_batch::Entity as StagingBatch;
pub use dataset_access_event::Entity as DatasetAccessEvent;
pub use queued_job::Entity as QueuedJob;
