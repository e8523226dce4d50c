//! Rollup repository (spec §4.4, component C4).

use crate::domain::rollup::{Rollup, RollupState};
use crate::error::{CoreError, CoreResult};
use crate::infrastructure::database::entities::rollup;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ConnectionTrait, EntityTrait, LockType, QuerySelect};
use std::str::FromStr;

fn from_row(row: rollup::Model) -> CoreResult<Rollup> {
    Ok(Rollup {
        node_id: row.node_id,
        size_bytes: row.size_bytes,
        file_count: row.file_count,
        directory_count: row.directory_count,
        child_count: row.child_count,
        state: RollupState::from_str(&row.state)
            .map_err(|_| CoreError::InvariantViolation(format!("bad rollup state {}", row.state)))?,
        last_calculated_at: row.last_calculated_at,
    })
}

pub async fn get<C: ConnectionTrait>(conn: &C, node_id: i64, for_update: bool) -> CoreResult<Option<Rollup>> {
    let mut query = rollup::Entity::find_by_id(node_id);
    if for_update {
        query = query.lock(LockType::Update);
    }
    query.one(conn).await?.map(from_row).transpose()
}

/// Create the zero-valued rollup row for a freshly-created directory node
/// if one does not already exist (spec §4.4 `ensure`).
pub async fn ensure<C: ConnectionTrait>(conn: &C, node_id: i64) -> CoreResult<Rollup> {
    if let Some(existing) = get(conn, node_id, false).await? {
        return Ok(existing);
    }
    let active = rollup::ActiveModel {
        node_id: Set(node_id),
        size_bytes: Set(0),
        file_count: Set(0),
        directory_count: Set(0),
        child_count: Set(0),
        state: Set(RollupState::Pending.to_string()),
        version: Set(1),
        last_calculated_at: Set(None),
    };
    let row = active.insert(conn).await?;
    from_row(row)
}

/// Apply an additive delta to an already-locked rollup row (spec §4.4
/// `applyDelta`). Callers must have read this row with `for_update = true`
/// in the same transaction.
pub async fn apply_delta<C: ConnectionTrait>(
    conn: &C,
    node_id: i64,
    increment: &crate::domain::rollup::RollupIncrement,
) -> CoreResult<Rollup> {
    let row = rollup::Entity::find_by_id(node_id)
        .one(conn)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("rollup {node_id}")))?;
    let now = Utc::now();
    let mut active: rollup::ActiveModel = row.clone().into();
    active.size_bytes = Set(row.size_bytes + increment.size_bytes_delta);
    active.file_count = Set(row.file_count + increment.file_count_delta);
    active.directory_count = Set(row.directory_count + increment.directory_count_delta);
    active.child_count = Set(row.child_count + increment.child_count_delta);
    if increment.mark_pending {
        active.state = Set(RollupState::Pending.to_string());
    }
    active.version = Set(row.version + 1);
    active.last_calculated_at = Set(Some(now));
    let row = active.update(conn).await?;
    from_row(row)
}

pub async fn set_state<C: ConnectionTrait>(conn: &C, node_id: i64, state: RollupState) -> CoreResult<Rollup> {
    let row = rollup::Entity::find_by_id(node_id)
        .one(conn)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("rollup {node_id}")))?;
    let mut active: rollup::ActiveModel = row.into();
    active.state = Set(state.to_string());
    let row = active.update(conn).await?;
    from_row(row)
}

/// Overwrite a rollup with freshly recomputed totals (spec §4.4
/// `recalculate`, used by the background rollup worker to correct drift).
pub async fn recalculate<C: ConnectionTrait>(
    conn: &C,
    node_id: i64,
    size_bytes: i64,
    file_count: i64,
    directory_count: i64,
    child_count: i64,
) -> CoreResult<Rollup> {
    let row = rollup::Entity::find_by_id(node_id)
        .one(conn)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("rollup {node_id}")))?;
    let mut active: rollup::ActiveModel = row.clone().into();
    active.size_bytes = Set(size_bytes);
    active.file_count = Set(file_count);
    active.directory_count = Set(directory_count);
    active.child_count = Set(child_count);
    active.state = Set(RollupState::UpToDate.to_string());
    active.version = Set(row.version + 1);
    active.last_calculated_at = Set(Some(Utc::now()));
    let row = active.update(conn).await?;
    from_row(row)
}
