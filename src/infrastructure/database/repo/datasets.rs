//! Dataset, schema version, manifest, partition and staging batch
//! repositories (spec §4.7/§4.8, components C7/C8).

use crate::domain::dataset::{Dataset, DatasetStatus};
use crate::domain::manifest::{Manifest, ManifestStatus, ManifestSummary};
use crate::domain::partition::{FileFormat, Partition};
use crate::domain::schema::{DatasetSchemaVersion, SchemaField};
use crate::domain::staging::{StagingBatch, StagingStatus, TimeRange};
use crate::error::{CoreError, CoreResult};
use crate::infrastructure::database::entities::{
    dataset, dataset_manifest, dataset_schema_version, manifest_partition, staging_batch,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
};
use std::collections::HashMap;
use std::str::FromStr;

fn dataset_from_row(row: dataset::Model) -> CoreResult<Dataset> {
    let metadata: HashMap<String, serde_json::Value> = match row.metadata {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => HashMap::new(),
    };
    Ok(Dataset {
        id: row.id,
        slug: row.slug,
        name: row.name,
        default_storage_target_id: row.default_storage_target_id,
        status: DatasetStatus::from_str(&row.status)
            .map_err(|_| CoreError::InvariantViolation(format!("bad dataset status {}", row.status)))?,
        metadata,
        updated_at: row.updated_at,
    })
}

pub async fn get_dataset_by_slug<C: ConnectionTrait>(conn: &C, slug: &str) -> CoreResult<Option<Dataset>> {
    let row = dataset::Entity::find()
        .filter(dataset::Column::Slug.eq(slug))
        .one(conn)
        .await?;
    row.map(dataset_from_row).transpose()
}

pub async fn insert_dataset<C: ConnectionTrait>(
    conn: &C,
    slug: &str,
    name: &str,
    default_storage_target_id: i64,
) -> CoreResult<Dataset> {
    let active = dataset::ActiveModel {
        id: Default::default(),
        slug: Set(slug.to_string()),
        name: Set(name.to_string()),
        default_storage_target_id: Set(default_storage_target_id),
        status: Set(DatasetStatus::Active.to_string()),
        metadata: Set(serde_json::json!({})),
        updated_at: Set(Utc::now()),
    };
    let row = active.insert(conn).await?;
    dataset_from_row(row)
}

fn schema_version_from_row(row: dataset_schema_version::Model) -> CoreResult<DatasetSchemaVersion> {
    let fields: Vec<SchemaField> = serde_json::from_value(row.fields)
        .map_err(|e| CoreError::InvariantViolation(format!("bad schema fields: {e}")))?;
    Ok(DatasetSchemaVersion {
        id: row.id,
        dataset_id: row.dataset_id,
        version: row.version,
        fields,
        created_at: row.created_at,
    })
}

pub async fn latest_schema_version<C: ConnectionTrait>(
    conn: &C,
    dataset_id: i64,
) -> CoreResult<Option<DatasetSchemaVersion>> {
    let row = dataset_schema_version::Entity::find()
        .filter(dataset_schema_version::Column::DatasetId.eq(dataset_id))
        .order_by_desc(dataset_schema_version::Column::Version)
        .one(conn)
        .await?;
    row.map(schema_version_from_row).transpose()
}

pub async fn insert_schema_version<C: ConnectionTrait>(
    conn: &C,
    dataset_id: i64,
    version: i32,
    fields: &[SchemaField],
) -> CoreResult<DatasetSchemaVersion> {
    let active = dataset_schema_version::ActiveModel {
        id: Default::default(),
        dataset_id: Set(dataset_id),
        version: Set(version),
        fields: Set(serde_json::to_value(fields)
            .map_err(|e| CoreError::InvariantViolation(format!("bad schema fields: {e}")))?),
        created_at: Set(Utc::now()),
    };
    let row = active.insert(conn).await?;
    schema_version_from_row(row)
}

fn manifest_from_row(row: dataset_manifest::Model) -> CoreResult<Manifest> {
    let partition_ids: Vec<i64> = serde_json::from_value(row.partition_ids)
        .map_err(|e| CoreError::InvariantViolation(format!("bad partition id list: {e}")))?;
    let metadata: HashMap<String, serde_json::Value> = match row.metadata {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => HashMap::new(),
    };
    Ok(Manifest {
        id: row.id,
        dataset_id: row.dataset_id,
        shard: row.shard,
        version: row.version,
        status: ManifestStatus::from_str(&row.status)
            .map_err(|_| CoreError::InvariantViolation(format!("bad manifest status {}", row.status)))?,
        schema_version_id: row.schema_version_id,
        partition_ids,
        summary: ManifestSummary {
            row_count: row.row_count,
            byte_size: row.byte_size,
            start_time: row.start_time,
            end_time: row.end_time,
        },
        metadata,
        created_at: row.created_at,
    })
}

pub async fn latest_manifest<C: ConnectionTrait>(
    conn: &C,
    dataset_id: i64,
    shard: chrono::NaiveDate,
) -> CoreResult<Option<Manifest>> {
    let row = dataset_manifest::Entity::find()
        .filter(dataset_manifest::Column::DatasetId.eq(dataset_id))
        .filter(dataset_manifest::Column::Shard.eq(shard))
        .order_by_desc(dataset_manifest::Column::Version)
        .one(conn)
        .await?;
    row.map(manifest_from_row).transpose()
}

pub async fn manifest_by_id<C: ConnectionTrait>(conn: &C, manifest_id: i64) -> CoreResult<Option<Manifest>> {
    let row = dataset_manifest::Entity::find_by_id(manifest_id).one(conn).await?;
    row.map(manifest_from_row).transpose()
}

pub async fn manifests_overlapping<C: ConnectionTrait>(
    conn: &C,
    dataset_id: i64,
) -> CoreResult<Vec<Manifest>> {
    let rows = dataset_manifest::Entity::find()
        .filter(dataset_manifest::Column::DatasetId.eq(dataset_id))
        .filter(dataset_manifest::Column::Status.eq(ManifestStatus::Published.to_string()))
        .all(conn)
        .await?;
    rows.into_iter().map(manifest_from_row).collect()
}

/// Create the one-and-only manifest row for a `(datasetId, shard)` pair
/// (spec §4.7 step 6: absent → "creates a new manifest version"). Callers
/// must first check [`latest_manifest`] and only reach this when that
/// lookup came back empty — every later flush into the same shard instead
/// reuses the existing row through [`set_manifest_partitions`], since a
/// manifest's `id` must stay stable for the life of its shard (spec §8
/// scenario 4).
pub async fn insert_manifest<C: ConnectionTrait>(
    conn: &C,
    dataset_id: i64,
    shard: chrono::NaiveDate,
    schema_version_id: i64,
    partition_ids: &[i64],
    summary: &ManifestSummary,
) -> CoreResult<Manifest> {
    let active = dataset_manifest::ActiveModel {
        id: Default::default(),
        dataset_id: Set(dataset_id),
        shard: Set(shard),
        version: Set(1),
        status: Set(ManifestStatus::Published.to_string()),
        schema_version_id: Set(schema_version_id),
        partition_ids: Set(serde_json::to_value(partition_ids)
            .map_err(|e| CoreError::InvariantViolation(format!("bad partition id list: {e}")))?),
        row_count: Set(summary.row_count),
        byte_size: Set(summary.byte_size),
        start_time: Set(summary.start_time),
        end_time: Set(summary.end_time),
        metadata: Set(serde_json::json!({})),
        created_at: Set(Utc::now()),
    };
    let row = active.insert(conn).await?;
    manifest_from_row(row)
}

fn partition_from_row(row: manifest_partition::Model) -> CoreResult<Partition> {
    let partition_key: HashMap<String, serde_json::Value> = serde_json::from_value(row.partition_key)
        .map_err(|e| CoreError::InvariantViolation(format!("bad partition key: {e}")))?;
    let partition_attributes: HashMap<String, serde_json::Value> =
        serde_json::from_value(row.partition_attributes)
            .map_err(|e| CoreError::InvariantViolation(format!("bad partition attributes: {e}")))?;
    let column_statistics = serde_json::from_value(row.column_statistics)
        .map_err(|e| CoreError::InvariantViolation(format!("bad column statistics: {e}")))?;
    Ok(Partition {
        id: row.id,
        manifest_id: row.manifest_id,
        storage_target_id: row.storage_target_id,
        partition_key,
        partition_attributes,
        file_format: FileFormat::from_str(&row.file_format)
            .map_err(|_| CoreError::InvariantViolation(format!("bad file format {}", row.file_format)))?,
        file_path: row.file_path,
        file_size_bytes: row.file_size_bytes,
        row_count: row.row_count,
        checksum: row.checksum,
        start_time: row.start_time,
        end_time: row.end_time,
        column_statistics,
        ingestion_signature: row.ingestion_signature,
        created_at: row.created_at,
    })
}

/// Find a previously-written partition by its ingestion signature, so a
/// replayed ingest request can be recognised as already-flushed (spec
/// §4.7 step 4).
pub async fn find_partition_by_signature<C: ConnectionTrait>(
    conn: &C,
    ingestion_signature: &str,
) -> CoreResult<Option<Partition>> {
    let row = manifest_partition::Entity::find()
        .filter(manifest_partition::Column::IngestionSignature.eq(ingestion_signature))
        .one(conn)
        .await?;
    row.map(partition_from_row).transpose()
}

pub async fn partitions_for_manifest<C: ConnectionTrait>(
    conn: &C,
    manifest_id: i64,
) -> CoreResult<Vec<Partition>> {
    let rows = manifest_partition::Entity::find()
        .filter(manifest_partition::Column::ManifestId.eq(manifest_id))
        .all(conn)
        .await?;
    rows.into_iter().map(partition_from_row).collect()
}

pub async fn insert_partition<C: ConnectionTrait>(conn: &C, partition: &Partition) -> CoreResult<Partition> {
    let active = manifest_partition::ActiveModel {
        id: Default::default(),
        manifest_id: Set(partition.manifest_id),
        storage_target_id: Set(partition.storage_target_id),
        partition_key: Set(serde_json::to_value(&partition.partition_key)
            .map_err(|e| CoreError::InvariantViolation(format!("bad partition key: {e}")))?),
        partition_attributes: Set(serde_json::to_value(&partition.partition_attributes)
            .map_err(|e| CoreError::InvariantViolation(format!("bad partition attributes: {e}")))?),
        file_format: Set(partition.file_format.to_string()),
        file_path: Set(partition.file_path.clone()),
        file_size_bytes: Set(partition.file_size_bytes),
        row_count: Set(partition.row_count),
        checksum: Set(partition.checksum.clone()),
        start_time: Set(partition.start_time),
        end_time: Set(partition.end_time),
        column_statistics: Set(serde_json::to_value(&partition.column_statistics)
            .map_err(|e| CoreError::InvariantViolation(format!("bad column statistics: {e}")))?),
        ingestion_signature: Set(partition.ingestion_signature.clone()),
        created_at: Set(Utc::now()),
    };
    let row = active.insert(conn).await?;
    partition_from_row(row)
}

/// Append a partition to the shard's one standing manifest row in place
/// (spec §4.7 step 6: "appends a new partition to the existing manifest
/// (additive). Manifests are never rewritten.") — the row's `id` never
/// changes, only its partition list, summary and schema pointer do. Also
/// advances `schema_version_id` to the version that produced this flush, so
/// a schema-evolving ingest into an existing shard (spec §8 scenario 4)
/// updates the manifest in place instead of needing a new one.
pub async fn set_manifest_partitions<C: ConnectionTrait>(
    conn: &C,
    manifest_id: i64,
    schema_version_id: i64,
    partition_ids: &[i64],
    summary: &ManifestSummary,
) -> CoreResult<Manifest> {
    let row = dataset_manifest::Entity::find_by_id(manifest_id)
        .one(conn)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("manifest {manifest_id}")))?;
    let mut active: dataset_manifest::ActiveModel = row.into();
    active.schema_version_id = Set(schema_version_id);
    active.partition_ids = Set(serde_json::to_value(partition_ids)
        .map_err(|e| CoreError::InvariantViolation(format!("bad partition id list: {e}")))?);
    active.row_count = Set(summary.row_count);
    active.byte_size = Set(summary.byte_size);
    active.start_time = Set(summary.start_time);
    active.end_time = Set(summary.end_time);
    let row = active.update(conn).await?;
    manifest_from_row(row)
}

/// Merge keys into a manifest's free-form metadata (spec §4.7 step 2's
/// `schemaEvolution.addedColumns` / `requestedBackfill` bookkeeping).
pub async fn merge_manifest_metadata<C: ConnectionTrait>(
    conn: &C,
    manifest_id: i64,
    patch: serde_json::Value,
) -> CoreResult<Manifest> {
    let row = dataset_manifest::Entity::find_by_id(manifest_id)
        .one(conn)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("manifest {manifest_id}")))?;
    let mut metadata = match row.metadata.clone() {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    if let serde_json::Value::Object(patch_map) = patch {
        for (key, value) in patch_map {
            metadata.insert(key, value);
        }
    }
    let mut active: dataset_manifest::ActiveModel = row.into();
    active.metadata = Set(serde_json::Value::Object(metadata));
    let row = active.update(conn).await?;
    manifest_from_row(row)
}

fn staging_batch_from_row(row: staging_batch::Model) -> CoreResult<StagingBatch> {
    let partition_key: HashMap<String, serde_json::Value> = serde_json::from_value(row.partition_key)
        .map_err(|e| CoreError::InvariantViolation(format!("bad partition key: {e}")))?;
    let partition_attributes: HashMap<String, serde_json::Value> =
        serde_json::from_value(row.partition_attributes)
            .map_err(|e| CoreError::InvariantViolation(format!("bad partition attributes: {e}")))?;
    Ok(StagingBatch {
        id: row.id,
        dataset_id: row.dataset_id,
        table_name: row.table_name,
        schema_version_id: row.schema_version_id,
        partition_key,
        partition_attributes,
        time_range: TimeRange { start: row.time_range_start, end: row.time_range_end },
        ingestion_signature: row.ingestion_signature,
        status: StagingStatus::from_str(&row.status)
            .map_err(|_| CoreError::InvariantViolation(format!("bad staging status {}", row.status)))?,
        row_count: row.row_count,
        byte_count: row.byte_count,
        spool_key: row.spool_key,
        received_at: row.received_at,
    })
}

/// Find the open batch matching this ingestion signature so a re-sent
/// sample reuses the same spool entry instead of opening a duplicate
/// (spec §4.7 flush-trigger / dedup semantics).
pub async fn find_open_batch<C: ConnectionTrait>(
    conn: &C,
    ingestion_signature: &str,
) -> CoreResult<Option<StagingBatch>> {
    let row = staging_batch::Entity::find()
        .filter(staging_batch::Column::IngestionSignature.eq(ingestion_signature))
        .filter(staging_batch::Column::Status.eq(StagingStatus::Open.to_string()))
        .one(conn)
        .await?;
    row.map(staging_batch_from_row).transpose()
}

pub async fn open_batches_for_dataset<C: ConnectionTrait>(
    conn: &C,
    dataset_id: i64,
) -> CoreResult<Vec<StagingBatch>> {
    let rows = staging_batch::Entity::find()
        .filter(staging_batch::Column::DatasetId.eq(dataset_id))
        .filter(staging_batch::Column::Status.eq(StagingStatus::Open.to_string()))
        .all(conn)
        .await?;
    rows.into_iter().map(staging_batch_from_row).collect()
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_staging_batch<C: ConnectionTrait>(
    conn: &C,
    dataset_id: i64,
    table_name: &str,
    schema_version_id: i64,
    partition_key: &HashMap<String, serde_json::Value>,
    partition_attributes: &HashMap<String, serde_json::Value>,
    time_range: &TimeRange,
    ingestion_signature: &str,
    spool_key: &str,
) -> CoreResult<StagingBatch> {
    let active = staging_batch::ActiveModel {
        id: Default::default(),
        dataset_id: Set(dataset_id),
        table_name: Set(table_name.to_string()),
        schema_version_id: Set(schema_version_id),
        partition_key: Set(serde_json::to_value(partition_key)
            .map_err(|e| CoreError::InvariantViolation(format!("bad partition key: {e}")))?),
        partition_attributes: Set(serde_json::to_value(partition_attributes)
            .map_err(|e| CoreError::InvariantViolation(format!("bad partition attributes: {e}")))?),
        time_range_start: Set(time_range.start),
        time_range_end: Set(time_range.end),
        ingestion_signature: Set(ingestion_signature.to_string()),
        status: Set(StagingStatus::Open.to_string()),
        row_count: Set(0),
        byte_count: Set(0),
        spool_key: Set(spool_key.to_string()),
        received_at: Set(Utc::now()),
    };
    let row = active.insert(conn).await?;
    staging_batch_from_row(row)
}

pub async fn record_append<C: ConnectionTrait>(
    conn: &C,
    id: i64,
    row_delta: i64,
    byte_delta: i64,
) -> CoreResult<StagingBatch> {
    let row = staging_batch::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("staging batch {id}")))?;
    let mut active: staging_batch::ActiveModel = row.clone().into();
    active.row_count = Set(row.row_count + row_delta);
    active.byte_count = Set(row.byte_count + byte_delta);
    let row = active.update(conn).await?;
    staging_batch_from_row(row)
}

pub async fn mark_flushing<C: ConnectionTrait>(conn: &C, id: i64) -> CoreResult<StagingBatch> {
    let row = staging_batch::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("staging batch {id}")))?;
    let mut active: staging_batch::ActiveModel = row.into();
    active.status = Set(StagingStatus::Flushing.to_string());
    let row = active.update(conn).await?;
    staging_batch_from_row(row)
}

pub async fn delete_batch<C: ConnectionTrait>(conn: &C, id: i64) -> CoreResult<()> {
    staging_batch::Entity::delete_by_id(id).exec(conn).await?;
    Ok(())
}
