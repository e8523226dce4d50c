//! Persistent queue job repository (spec §4.9, component C9).

use crate::error::{CoreError, CoreResult};
use crate::infrastructure::database::entities::queued_job;
use crate::infrastructure::queue::{QueueJob, QueueStatus};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use std::str::FromStr;

fn from_row(row: queued_job::Model) -> CoreResult<QueueJob> {
    Ok(QueueJob {
        id: row.id,
        queue_name: row.queue_name,
        job_key: row.job_key,
        payload: row.payload,
        status: QueueStatus::from_str(&row.status)
            .map_err(|_| CoreError::InvariantViolation(format!("bad queue status {}", row.status)))?,
        attempt: row.attempt,
        error: row.error,
        result: row.result,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

/// Find a still-waiting job coalesced under `job_key`, if any (spec §4.9:
/// "jobs with the same jobId are coalesced while still queued").
pub async fn find_waiting_by_key<C: ConnectionTrait>(
    conn: &C,
    queue_name: &str,
    job_key: &str,
) -> CoreResult<Option<QueueJob>> {
    let row = queued_job::Entity::find()
        .filter(queued_job::Column::QueueName.eq(queue_name))
        .filter(queued_job::Column::JobKey.eq(job_key))
        .filter(queued_job::Column::Status.eq(QueueStatus::Waiting.to_string()))
        .one(conn)
        .await?;
    row.map(from_row).transpose()
}

pub async fn insert<C: ConnectionTrait>(
    conn: &C,
    queue_name: &str,
    job_key: Option<&str>,
    payload: serde_json::Value,
) -> CoreResult<QueueJob> {
    let now = Utc::now();
    let active = queued_job::ActiveModel {
        id: Default::default(),
        queue_name: Set(queue_name.to_string()),
        job_key: Set(job_key.map(|s| s.to_string())),
        payload: Set(payload),
        status: Set(QueueStatus::Waiting.to_string()),
        attempt: Set(0),
        error: Set(None),
        result: Set(None),
        run_after: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };
    let row = active.insert(conn).await?;
    from_row(row)
}

/// Atomically claim the oldest waiting job for `queue_name`, marking it
/// `active`. Returns `None` if the queue is empty.
pub async fn claim_next<C: ConnectionTrait>(conn: &C, queue_name: &str) -> CoreResult<Option<QueueJob>> {
    let row = queued_job::Entity::find()
        .filter(queued_job::Column::QueueName.eq(queue_name))
        .filter(queued_job::Column::Status.eq(QueueStatus::Waiting.to_string()))
        .order_by_asc(queued_job::Column::Id)
        .limit(1)
        .one(conn)
        .await?;
    let Some(row) = row else { return Ok(None) };
    let next_attempt = row.attempt + 1;
    let mut active: queued_job::ActiveModel = row.into();
    active.status = Set(QueueStatus::Active.to_string());
    active.attempt = Set(next_attempt);
    active.updated_at = Set(Utc::now());
    let row = active.update(conn).await?;
    Ok(Some(from_row(row)?))
}

pub async fn complete<C: ConnectionTrait>(
    conn: &C,
    id: i64,
    result: serde_json::Value,
) -> CoreResult<QueueJob> {
    finish(conn, id, QueueStatus::Completed, None, Some(result)).await
}

pub async fn fail<C: ConnectionTrait>(conn: &C, id: i64, error: serde_json::Value) -> CoreResult<QueueJob> {
    finish(conn, id, QueueStatus::Failed, Some(error), None).await
}

async fn finish<C: ConnectionTrait>(
    conn: &C,
    id: i64,
    status: QueueStatus,
    error: Option<serde_json::Value>,
    result: Option<serde_json::Value>,
) -> CoreResult<QueueJob> {
    let row = queued_job::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("queued job {id}")))?;
    let mut active: queued_job::ActiveModel = row.into();
    active.status = Set(status.to_string());
    active.error = Set(error);
    active.result = Set(result);
    active.updated_at = Set(Utc::now());
    let row = active.update(conn).await?;
    from_row(row)
}

/// Depth metrics grouped by status (spec §4.9).
pub async fn count_by_status<C: ConnectionTrait>(conn: &C, queue_name: &str, status: QueueStatus) -> CoreResult<u64> {
    let count = queued_job::Entity::find()
        .filter(queued_job::Column::QueueName.eq(queue_name))
        .filter(queued_job::Column::Status.eq(status.to_string()))
        .count(conn)
        .await?;
    Ok(count)
}
