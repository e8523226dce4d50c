//! Ingestion processor (spec §4.7, component C7): resolves the target
//! dataset, reconciles schema evolution, stages rows in the crash-safe
//! spool, and flushes to a partition once a flush-policy threshold trips.

use super::flush;
use super::spool::Spool;
use crate::config::StagingConfig;
use crate::domain::manifest::Manifest;
use crate::domain::partition::{FileFormat, Partition};
use crate::domain::schema::{reconcile_fields, SchemaField, SchemaReconciliation};
use crate::domain::staging::{StagingBatch, TimeRange};
use crate::error::{CoreError, CoreResult};
use crate::infrastructure::backend::BackendRegistry;
use crate::infrastructure::database::entities::backend_mount;
use crate::infrastructure::database::{repo, Database};
use crate::infrastructure::events::{Event, EventBus};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// One batch of rows destined for a single partition window (spec §4.7
/// input payload).
pub struct IngestRequest {
    pub dataset_slug: String,
    pub dataset_name: String,
    pub default_storage_target_id: i64,
    pub table_name: String,
    pub schema: Vec<SchemaField>,
    pub partition_key: HashMap<String, serde_json::Value>,
    pub partition_attributes: HashMap<String, serde_json::Value>,
    pub time_range: TimeRange,
    pub rows: Vec<serde_json::Value>,
    pub idempotency_key: Option<String>,
    /// Record `schemaEvolution.requestedBackfill = true` on the manifest
    /// when this ingest appends new schema fields (spec §4.7 step 2).
    pub backfill_on_evolution: bool,
}

/// What an `ingest` call actually did.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub dataset_id: i64,
    pub schema_version_id: i64,
    pub flushed: bool,
    pub partition: Option<Partition>,
    pub manifest: Option<Manifest>,
}

pub struct TimestoreService {
    db: Arc<Database>,
    backends: Arc<BackendRegistry>,
    events: EventBus,
    spool: Arc<Spool>,
    staging_config: StagingConfig,
}

impl TimestoreService {
    pub fn new(
        db: Arc<Database>,
        backends: Arc<BackendRegistry>,
        events: EventBus,
        spool: Arc<Spool>,
        staging_config: StagingConfig,
    ) -> Self {
        Self { db, backends, events, spool, staging_config }
    }

    async fn resolve_backend(&self, mount: &backend_mount::Model) -> CoreResult<crate::infrastructure::backend::Backend> {
        self.backends.resolve(
            mount.id,
            &mount.driver,
            &mount.root_or_bucket,
            mount.prefix.as_deref(),
            mount.endpoint.as_deref(),
            mount.region.as_deref(),
            mount.force_path_style,
        )
    }

    /// Ingest one batch (spec §4.7 algorithm).
    pub async fn ingest(&self, req: IngestRequest) -> CoreResult<IngestOutcome> {
        let slug = req.dataset_slug.clone();
        let name = req.dataset_name.clone();
        let default_storage_target_id = req.default_storage_target_id;
        let table_name = req.table_name.clone();
        let schema = req.schema.clone();
        let partition_key = req.partition_key.clone();
        let partition_attributes = req.partition_attributes.clone();
        let time_range = req.time_range.clone();
        let backfill_on_evolution = req.backfill_on_evolution;

        let (dataset, schema_version_id, evolution_patch) = self
            .db
            .with_transaction(|txn| async move {
                let dataset = match repo::datasets::get_dataset_by_slug(txn, &slug).await? {
                    Some(dataset) => dataset,
                    None => repo::datasets::insert_dataset(txn, &slug, &name, default_storage_target_id).await?,
                };

                let (schema_version_id, evolution_patch) = match repo::datasets::latest_schema_version(txn, dataset.id).await? {
                    None => {
                        let version = repo::datasets::insert_schema_version(txn, dataset.id, 1, &schema).await?;
                        (version.id, None)
                    }
                    Some(existing) => match reconcile_fields(&existing.fields, &schema) {
                        SchemaReconciliation::Unchanged => (existing.id, None),
                        SchemaReconciliation::Additive { added } => {
                            let version =
                                repo::datasets::insert_schema_version(txn, dataset.id, existing.version + 1, &schema)
                                    .await?;
                            let patch = serde_json::json!({
                                "schemaEvolution": {
                                    "addedColumns": added.iter().map(|f| f.name.clone()).collect::<Vec<_>>(),
                                    "requestedBackfill": backfill_on_evolution,
                                }
                            });
                            (version.id, Some(patch))
                        }
                        SchemaReconciliation::Incompatible { reason } => {
                            return Err(CoreError::SchemaIncompatible(reason));
                        }
                    },
                };

                Ok::<_, CoreError>((dataset, schema_version_id, evolution_patch))
            })
            .await?;

        let signature = req
            .idempotency_key
            .clone()
            .unwrap_or_else(|| ingestion_signature(schema_version_id, &partition_key, &time_range, &req.rows));

        if let Some(existing_partition) = self
            .db
            .with_connection(|conn| async move { repo::datasets::find_partition_by_signature(conn, &signature).await })
            .await?
        {
            info!(signature = %existing_partition.ingestion_signature, "ingest replay: signature already flushed");
            let manifest_id = existing_partition.manifest_id;
            let manifest = self
                .db
                .with_connection(|conn| async move { manifest_for_id(conn, manifest_id).await })
                .await?;
            return Ok(IngestOutcome {
                dataset_id: dataset.id,
                schema_version_id,
                flushed: false,
                partition: Some(existing_partition),
                manifest,
            });
        }

        let batch = self.open_or_reuse_batch(dataset.id, &table_name, schema_version_id, &partition_key, &partition_attributes, &time_range, &signature).await?;

        self.spool.append(&batch.spool_key, &req.rows)?;
        let batch = self
            .db
            .with_connection(|conn| async move {
                repo::datasets::record_append(conn, batch.id, req.rows.len() as i64, approx_byte_size(&req.rows)).await
            })
            .await?;

        if !self.should_flush(&batch) {
            return Ok(IngestOutcome {
                dataset_id: dataset.id,
                schema_version_id,
                flushed: false,
                partition: None,
                manifest: None,
            });
        }

        let mount = self
            .db
            .with_connection(|conn| async move { repo::backend_mounts::get_by_id(conn, default_storage_target_id).await })
            .await?;
        let backend = self.resolve_backend(&mount).await?;

        let rows = self.spool.read(&batch.spool_key)?;
        let spool_key = batch.spool_key.clone();
        let batch_id = batch.id;

        self.db
            .with_connection(|conn| async move { repo::datasets::mark_flushing(conn, batch_id).await })
            .await?;

        let (partition, manifest) = self
            .db
            .with_transaction(|txn| async move {
                let result = flush::flush_batch(
                    txn,
                    &backend,
                    &slug,
                    dataset.id,
                    default_storage_target_id,
                    schema_version_id,
                    &schema,
                    FileFormat::Parquet,
                    &partition_key,
                    &partition_attributes,
                    &time_range,
                    &rows,
                    &signature,
                )
                .await?;
                if let Some(patch) = evolution_patch {
                    repo::datasets::merge_manifest_metadata(txn, result.1.id, patch).await?;
                }
                repo::datasets::delete_batch(txn, batch_id).await?;
                Ok::<_, CoreError>(result)
            })
            .await?;

        self.spool.clear(&spool_key)?;
        self.events
            .publish(Event::PartitionCreated { partition_id: partition.id, dataset_id: dataset.id, row_count: partition.row_count })
            .await?;

        Ok(IngestOutcome {
            dataset_id: dataset.id,
            schema_version_id,
            flushed: true,
            partition: Some(partition),
            manifest: Some(manifest),
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn open_or_reuse_batch(
        &self,
        dataset_id: i64,
        table_name: &str,
        schema_version_id: i64,
        partition_key: &HashMap<String, serde_json::Value>,
        partition_attributes: &HashMap<String, serde_json::Value>,
        time_range: &TimeRange,
        signature: &str,
    ) -> CoreResult<StagingBatch> {
        if let Some(existing) = self
            .db
            .with_connection(|conn| async move { repo::datasets::find_open_batch(conn, signature).await })
            .await?
        {
            return Ok(existing);
        }
        let table_name = table_name.to_string();
        let partition_key = partition_key.clone();
        let partition_attributes = partition_attributes.clone();
        let time_range = time_range.clone();
        let signature = signature.to_string();
        let spool_key = format!("{dataset_id}:{signature}");
        self.db
            .with_connection(|conn| async move {
                repo::datasets::insert_staging_batch(
                    conn,
                    dataset_id,
                    &table_name,
                    schema_version_id,
                    &partition_key,
                    &partition_attributes,
                    &time_range,
                    &signature,
                    &spool_key,
                )
                .await
            })
            .await
    }

    fn should_flush(&self, batch: &StagingBatch) -> bool {
        let age = chrono::Utc::now().signed_duration_since(batch.received_at);
        batch.row_count as u64 >= self.staging_config.flush_max_rows
            || batch.byte_count as u64 >= self.staging_config.flush_max_bytes
            || age.to_std().map(|age| age >= self.staging_config.flush_max_age).unwrap_or(false)
    }
}

async fn manifest_for_id<C: sea_orm::ConnectionTrait>(conn: &C, manifest_id: i64) -> CoreResult<Option<Manifest>> {
    repo::datasets::manifest_by_id(conn, manifest_id).await
}

fn approx_byte_size(rows: &[serde_json::Value]) -> i64 {
    rows.iter().map(|r| serde_json::to_vec(r).map(|b| b.len()).unwrap_or(0)).sum::<usize>() as i64
}

/// Stable hash of `(schemaVersionId, partitionKey, timeRange, rows)` (spec
/// §4.7 step 3). Partition key entries are sorted by field name first so
/// the signature doesn't depend on `HashMap` iteration order.
fn ingestion_signature(
    schema_version_id: i64,
    partition_key: &HashMap<String, serde_json::Value>,
    time_range: &TimeRange,
    rows: &[serde_json::Value],
) -> String {
    let mut sorted_key: Vec<(&String, &serde_json::Value)> = partition_key.iter().collect();
    sorted_key.sort_by(|a, b| a.0.cmp(b.0));
    let payload = serde_json::json!({
        "schemaVersionId": schema_version_id,
        "partitionKey": sorted_key,
        "timeRange": { "start": time_range.start, "end": time_range.end },
        "rows": rows,
    });
    let bytes = serde_json::to_vec(&payload).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    format!("sig:{}", hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::FieldType;

    fn field(name: &str, ty: FieldType) -> SchemaField {
        SchemaField { name: name.into(), field_type: ty, nullable: true, description: None }
    }

    #[test]
    fn signature_is_stable_and_order_sensitive() {
        let key: HashMap<String, serde_json::Value> = [("region".to_string(), serde_json::json!("us"))].into();
        let range = TimeRange { start: chrono::Utc::now(), end: chrono::Utc::now() };
        let rows_a = vec![serde_json::json!({"a": 1}), serde_json::json!({"a": 2})];
        let rows_b = vec![serde_json::json!({"a": 2}), serde_json::json!({"a": 1})];
        assert_eq!(ingestion_signature(1, &key, &range, &rows_a), ingestion_signature(1, &key, &range, &rows_a));
        assert_ne!(ingestion_signature(1, &key, &range, &rows_a), ingestion_signature(1, &key, &range, &rows_b));
    }

    #[test]
    fn schema_fields_survive_clone_for_reconciliation() {
        let schema = vec![field("ts", FieldType::Timestamp)];
        assert_eq!(reconcile_fields(&schema, &schema), SchemaReconciliation::Unchanged);
    }
}
