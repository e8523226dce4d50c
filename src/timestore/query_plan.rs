//! Partition index & query planner (spec §4.8, component C8): turns a time
//! range plus column/filter request into an ordered list of partitions an
//! external executor should read. The planner never reads partition data
//! itself — it only prunes using manifest/partition metadata and the column
//! statistics recorded at flush time (see [`super::statistics`]).

use super::statistics;
use crate::domain::partition::Partition;
use crate::domain::schema::SchemaField;
use crate::error::{CoreError, CoreResult};
use crate::infrastructure::database::{repo, Database};
use chrono::{DateTime, Utc};
use sea_orm::ConnectionTrait;
use std::sync::Arc;

/// A predicate on a single column, used to prune partitions by statistics.
#[derive(Debug, Clone)]
pub enum Predicate {
    Eq(serde_json::Value),
    Ge(serde_json::Value),
    Le(serde_json::Value),
}

#[derive(Debug, Clone)]
pub struct Filter {
    pub column: String,
    pub predicate: Predicate,
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub dataset_slug: String,
    pub time_range_start: DateTime<Utc>,
    pub time_range_end: DateTime<Utc>,
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
}

/// One partition an executor should read, plus the storage location to
/// read it from.
#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub partition: Partition,
    pub storage_target_id: i64,
    pub location: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub entries: Vec<PlanEntry>,
    pub partitions_considered: i64,
    pub partitions_pruned: i64,
}

pub struct QueryPlanner {
    db: Arc<Database>,
}

impl QueryPlanner {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn plan(&self, req: QueryRequest) -> CoreResult<QueryPlan> {
        let slug = req.dataset_slug.clone();
        let columns = req.columns.clone();
        let filters = req.filters.clone();
        let start = req.time_range_start;
        let end = req.time_range_end;

        let plan = self
            .db
            .with_connection(|conn| async move { build_plan(conn, &slug, start, end, &columns, &filters).await })
            .await?;

        let dataset = self
            .db
            .with_connection(|conn| {
                let slug = req.dataset_slug.clone();
                async move { repo::datasets::get_dataset_by_slug(conn, &slug).await }
            })
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("dataset {}", req.dataset_slug)))?;

        self.db
            .with_connection(|conn| async move {
                repo::access_events::record(
                    conn,
                    dataset.id,
                    "query_plan",
                    plan.partitions_considered,
                    plan.partitions_pruned,
                    None,
                )
                .await
            })
            .await?;

        Ok(plan)
    }
}

async fn build_plan<C: ConnectionTrait>(
    conn: &C,
    dataset_slug: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    columns: &[String],
    filters: &[Filter],
) -> CoreResult<QueryPlan> {
    let dataset = repo::datasets::get_dataset_by_slug(conn, dataset_slug)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("dataset {dataset_slug}")))?;

    let schema_version = repo::datasets::latest_schema_version(conn, dataset.id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("no schema version for dataset {dataset_slug}")))?;
    validate_columns(&schema_version.fields, columns)?;

    let manifests = repo::datasets::manifests_overlapping(conn, dataset.id).await?;

    let mut considered = 0i64;
    let mut pruned = 0i64;
    let mut entries = Vec::new();

    for manifest in manifests {
        let shard_start = manifest.shard.and_hms_opt(0, 0, 0).expect("midnight is always valid").and_utc();
        let shard_end = shard_start + chrono::Duration::days(1);
        if shard_end <= start || shard_start >= end {
            continue;
        }

        let partitions = repo::datasets::partitions_for_manifest(conn, manifest.id).await?;
        for partition in partitions {
            if !partition.intersects(start, end) {
                continue;
            }
            considered += 1;

            if filters.iter().any(|f| is_excluded(&partition, f)) {
                pruned += 1;
                continue;
            }

            entries.push(PlanEntry {
                storage_target_id: partition.storage_target_id,
                location: partition.file_path.clone(),
                columns: columns.to_vec(),
                partition,
            });
        }
    }

    entries.sort_by(|a, b| a.partition.start_time.cmp(&b.partition.start_time).then(a.partition.id.cmp(&b.partition.id)));

    Ok(QueryPlan { entries, partitions_considered: considered, partitions_pruned: pruned })
}

fn validate_columns(fields: &[SchemaField], columns: &[String]) -> CoreResult<()> {
    for column in columns {
        if !fields.iter().any(|f| &f.name == column) {
            return Err(CoreError::InvariantViolation(format!("unknown column `{column}` requested")));
        }
    }
    Ok(())
}

fn is_excluded(partition: &Partition, filter: &Filter) -> bool {
    let Some(stats) = partition.column_statistics.get(&filter.column) else {
        return false;
    };
    let statistically_excluded = match &filter.predicate {
        Predicate::Eq(value) => stats.excludes_eq(value),
        Predicate::Ge(value) => stats.excludes_ge(value),
        Predicate::Le(value) => stats.excludes_le(value),
    };
    if statistically_excluded {
        return true;
    }
    if let (Predicate::Eq(value), Some(bits)) = (&filter.predicate, &stats.bloom_filter) {
        return !statistics::bloom_might_contain(bits, value);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::partition::{ColumnStatistics, FileFormat};
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn partition_with_stats(start: DateTime<Utc>, end: DateTime<Utc>, min: f64, max: f64) -> Partition {
        let mut column_statistics = HashMap::new();
        column_statistics.insert(
            "temp".to_string(),
            ColumnStatistics {
                min: Some(serde_json::json!(min)),
                max: Some(serde_json::json!(max)),
                null_count: 0,
                row_count: 10,
                bloom_filter: None,
                histogram: None,
            },
        );
        Partition {
            id: 1,
            manifest_id: 1,
            storage_target_id: 1,
            partition_key: HashMap::new(),
            partition_attributes: HashMap::new(),
            file_format: FileFormat::Parquet,
            file_path: "ds/2026-01-01/p.parquet".into(),
            file_size_bytes: 100,
            row_count: 10,
            checksum: "sha256:abc".into(),
            start_time: start,
            end_time: end,
            column_statistics,
            ingestion_signature: "sig".into(),
            created_at: start,
        }
    }

    #[test]
    fn filter_outside_min_max_is_excluded() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap();
        let partition = partition_with_stats(start, end, 10.0, 20.0);
        let filter = Filter { column: "temp".into(), predicate: Predicate::Ge(serde_json::json!(25.0)) };
        assert!(is_excluded(&partition, &filter));
    }

    #[test]
    fn filter_inside_min_max_is_not_excluded() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap();
        let partition = partition_with_stats(start, end, 10.0, 20.0);
        let filter = Filter { column: "temp".into(), predicate: Predicate::Ge(serde_json::json!(15.0)) };
        assert!(!is_excluded(&partition, &filter));
    }

    #[test]
    fn unknown_column_fails_validation() {
        let fields = vec![SchemaField {
            name: "ts".into(),
            field_type: crate::domain::schema::FieldType::Timestamp,
            nullable: false,
            description: None,
        }];
        assert!(validate_columns(&fields, &["missing".to_string()]).is_err());
    }
}
