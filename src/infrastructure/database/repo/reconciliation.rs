//! Reconciliation job repository (spec §4.5, component C5).

use crate::domain::reconciliation::{ReconciliationJob, ReconciliationReason, ReconciliationStatus};
use crate::error::{CoreError, CoreResult};
use crate::infrastructure::database::entities::reconciliation_job;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use std::str::FromStr;

fn from_row(row: reconciliation_job::Model) -> CoreResult<ReconciliationJob> {
    Ok(ReconciliationJob {
        id: row.id,
        job_key: row.job_key,
        backend_mount_id: row.backend_mount_id,
        node_id: row.node_id,
        path: row.path,
        status: ReconciliationStatus::from_str(&row.status)
            .map_err(|_| CoreError::InvariantViolation(format!("bad job status {}", row.status)))?,
        attempt: row.attempt,
        reason: ReconciliationReason::from_str(&row.reason)
            .map_err(|_| CoreError::InvariantViolation(format!("bad job reason {}", row.reason)))?,
        detect_children: row.detect_children,
        error: row.error,
        result: row.result,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

/// Find any non-terminal job already coalesced under `job_key` (spec §4.5 —
/// a duplicate drift/audit trigger against the same subtree is absorbed by
/// the job already queued or running).
pub async fn find_active_by_key<C: ConnectionTrait>(
    conn: &C,
    job_key: &str,
) -> CoreResult<Option<ReconciliationJob>> {
    let rows = reconciliation_job::Entity::find()
        .filter(reconciliation_job::Column::JobKey.eq(job_key))
        .order_by_desc(reconciliation_job::Column::Id)
        .all(conn)
        .await?;
    for row in rows {
        let job = from_row(row)?;
        if job.status.is_active() {
            return Ok(Some(job));
        }
    }
    Ok(None)
}

pub async fn get_by_id<C: ConnectionTrait>(conn: &C, id: i64) -> CoreResult<Option<ReconciliationJob>> {
    reconciliation_job::Entity::find_by_id(id).one(conn).await?.map(from_row).transpose()
}

pub async fn insert<C: ConnectionTrait>(
    conn: &C,
    backend_mount_id: i64,
    node_id: Option<i64>,
    path: &str,
    reason: ReconciliationReason,
    detect_children: bool,
) -> CoreResult<ReconciliationJob> {
    let now = Utc::now();
    let active = reconciliation_job::ActiveModel {
        id: Default::default(),
        job_key: Set(ReconciliationJob::job_key(backend_mount_id, path)),
        backend_mount_id: Set(backend_mount_id),
        node_id: Set(node_id),
        path: Set(path.to_string()),
        status: Set(ReconciliationStatus::Queued.to_string()),
        attempt: Set(0),
        reason: Set(reason.to_string()),
        detect_children: Set(detect_children),
        error: Set(None),
        result: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };
    let row = active.insert(conn).await?;
    from_row(row)
}

pub async fn update_status<C: ConnectionTrait>(
    conn: &C,
    id: i64,
    status: ReconciliationStatus,
    error: Option<serde_json::Value>,
    result: Option<serde_json::Value>,
) -> CoreResult<ReconciliationJob> {
    let row = reconciliation_job::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("reconciliation job {id}")))?;
    let mut active: reconciliation_job::ActiveModel = row.clone().into();
    active.status = Set(status.to_string());
    active.updated_at = Set(Utc::now());
    if status == ReconciliationStatus::Running {
        active.attempt = Set(row.attempt + 1);
    }
    if let Some(error) = error {
        active.error = Set(Some(error));
    }
    if let Some(result) = result {
        active.result = Set(Some(result));
    }
    let row = active.update(conn).await?;
    from_row(row)
}
