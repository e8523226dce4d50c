//! Partition allocation and write (spec §4.7 step 6): turns a staging
//! batch's accumulated rows into an immutable partition file plus the
//! manifest update that publishes it, in a single metadata-store
//! transaction.

use super::statistics;
use crate::domain::manifest::Manifest;
use crate::domain::partition::{FileFormat, Partition};
use crate::domain::schema::{FieldType, SchemaField};
use crate::domain::staging::TimeRange;
use crate::error::{CoreError, CoreResult};
use crate::infrastructure::backend::Backend;
use crate::infrastructure::database::repo;
use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::ArrowWriter;
use sea_orm::ConnectionTrait;
use std::collections::HashMap;
use std::sync::Arc;

/// Writes the partition file and the manifest update for one flushed
/// staging batch. Returns the new partition and the manifest it now
/// belongs to.
#[allow(clippy::too_many_arguments)]
pub async fn flush_batch<C: ConnectionTrait>(
    conn: &C,
    backend: &Backend,
    dataset_slug: &str,
    dataset_id: i64,
    storage_target_id: i64,
    schema_version_id: i64,
    schema: &[SchemaField],
    file_format: FileFormat,
    partition_key: &HashMap<String, serde_json::Value>,
    partition_attributes: &HashMap<String, serde_json::Value>,
    time_range: &TimeRange,
    rows: &[serde_json::Value],
    ingestion_signature: &str,
) -> CoreResult<(Partition, Manifest)> {
    let shard = time_range.start.date_naive();
    let file_name = format!("{}.{}", uuid::Uuid::new_v4(), file_format);
    let file_path = format!("{dataset_slug}/{shard}/{file_name}");

    let bytes = match file_format {
        FileFormat::Parquet => {
            let (arrow_schema, batch) = build_record_batch(schema, rows)?;
            encode_parquet(arrow_schema, &batch)?
        }
        FileFormat::Duckdb | FileFormat::Clickhouse => {
            return Err(CoreError::StorageWriteFailed(format!(
                "file format {file_format} is not supported by this build"
            )));
        }
    };
    let stat = backend.write(&file_path, bytes.into()).await?;
    let column_statistics = statistics::compute(schema, rows);

    let existing = repo::datasets::latest_manifest(conn, dataset_id, shard).await?;
    let base_partition_ids = existing.as_ref().map(|m| m.partition_ids.clone()).unwrap_or_default();
    let base_summary = existing.as_ref().map(|m| m.summary.clone()).unwrap_or_default();

    // One manifest row per (datasetId, shard) for the life of the shard (spec
    // §4.7 step 6, §8 scenario 4): only the first flush into a shard creates
    // it, every later flush reuses its id and just appends a partition.
    let manifest = match existing {
        Some(manifest) => manifest,
        None => {
            repo::datasets::insert_manifest(conn, dataset_id, shard, schema_version_id, &base_partition_ids, &base_summary)
                .await?
        }
    };

    let partition = Partition {
        id: 0,
        manifest_id: manifest.id,
        storage_target_id,
        partition_key: partition_key.clone(),
        partition_attributes: partition_attributes.clone(),
        file_format,
        file_path,
        file_size_bytes: stat.size as i64,
        row_count: rows.len() as i64,
        checksum: stat.checksum,
        start_time: time_range.start,
        end_time: time_range.end,
        column_statistics,
        ingestion_signature: ingestion_signature.to_string(),
        created_at: Utc::now(),
    };
    let inserted = repo::datasets::insert_partition(conn, &partition).await?;

    let mut partition_ids = base_partition_ids;
    partition_ids.push(inserted.id);
    let mut summary = base_summary;
    summary.row_count += inserted.row_count;
    summary.byte_size += inserted.file_size_bytes;
    summary.start_time = Some(match summary.start_time {
        Some(start) => start.min(inserted.start_time),
        None => inserted.start_time,
    });
    summary.end_time = Some(match summary.end_time {
        Some(end) => end.max(inserted.end_time),
        None => inserted.end_time,
    });

    let manifest =
        repo::datasets::set_manifest_partitions(conn, manifest.id, schema_version_id, &partition_ids, &summary).await?;
    Ok((inserted, manifest))
}

fn arrow_type(field_type: FieldType) -> DataType {
    match field_type {
        FieldType::Timestamp => DataType::Timestamp(TimeUnit::Millisecond, None),
        FieldType::Double => DataType::Float64,
        FieldType::Integer => DataType::Int64,
        FieldType::String => DataType::Utf8,
        FieldType::Boolean => DataType::Boolean,
    }
}

fn timestamp_millis(value: &serde_json::Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    value.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok()).map(|dt| dt.timestamp_millis())
}

fn build_record_batch(schema: &[SchemaField], rows: &[serde_json::Value]) -> CoreResult<(Arc<ArrowSchema>, RecordBatch)> {
    let arrow_fields: Vec<Field> =
        schema.iter().map(|f| Field::new(&f.name, arrow_type(f.field_type), f.nullable)).collect();
    let arrow_schema = Arc::new(ArrowSchema::new(arrow_fields));

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.len());
    for field in schema {
        let values: Vec<Option<&serde_json::Value>> = rows.iter().map(|r| r.get(&field.name)).collect();
        let array: ArrayRef = match field.field_type {
            FieldType::Double => {
                Arc::new(Float64Array::from(values.iter().map(|v| v.and_then(|v| v.as_f64())).collect::<Vec<_>>()))
            }
            FieldType::Integer => {
                Arc::new(Int64Array::from(values.iter().map(|v| v.and_then(|v| v.as_i64())).collect::<Vec<_>>()))
            }
            FieldType::Boolean => {
                Arc::new(BooleanArray::from(values.iter().map(|v| v.and_then(|v| v.as_bool())).collect::<Vec<_>>()))
            }
            FieldType::String => Arc::new(StringArray::from(
                values.iter().map(|v| v.and_then(|v| v.as_str())).collect::<Vec<_>>(),
            )),
            FieldType::Timestamp => Arc::new(TimestampMillisecondArray::from(
                values.iter().map(|v| v.and_then(timestamp_millis)).collect::<Vec<_>>(),
            )),
        };
        columns.push(array);
    }
    let batch = RecordBatch::try_new(arrow_schema.clone(), columns)
        .map_err(|e| CoreError::StorageWriteFailed(format!("build record batch: {e}")))?;
    Ok((arrow_schema, batch))
}

fn encode_parquet(schema: Arc<ArrowSchema>, batch: &RecordBatch) -> CoreResult<Vec<u8>> {
    let mut buffer = Vec::new();
    {
        let mut writer = ArrowWriter::try_new(&mut buffer, schema, None)
            .map_err(|e| CoreError::StorageWriteFailed(format!("parquet writer: {e}")))?;
        writer.write(batch).map_err(|e| CoreError::StorageWriteFailed(format!("parquet write: {e}")))?;
        writer.close().map_err(|e| CoreError::StorageWriteFailed(format!("parquet close: {e}")))?;
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::FieldType;

    #[test]
    fn record_batch_matches_schema_width() {
        let schema = vec![
            SchemaField { name: "ts".into(), field_type: FieldType::Timestamp, nullable: false, description: None },
            SchemaField { name: "temp".into(), field_type: FieldType::Double, nullable: true, description: None },
        ];
        let rows = vec![serde_json::json!({"ts": 1_700_000_000_000i64, "temp": 21.5})];
        let (_, batch) = build_record_batch(&schema, &rows).unwrap();
        assert_eq!(batch.num_columns(), 2);
        assert_eq!(batch.num_rows(), 1);
    }

    #[test]
    fn parquet_encode_produces_nonempty_bytes() {
        let schema = vec![SchemaField { name: "temp".into(), field_type: FieldType::Double, nullable: true, description: None }];
        let rows = vec![serde_json::json!({"temp": 1.0}), serde_json::json!({"temp": 2.0})];
        let (arrow_schema, batch) = build_record_batch(&schema, &rows).unwrap();
        let bytes = encode_parquet(arrow_schema, &batch).unwrap();
        assert!(!bytes.is_empty());
    }
}
