//! Journal repository (spec §4.1/§4.3, component C3 idempotency support).

use crate::domain::journal::JournalEntry;
use crate::error::CoreResult;
use crate::infrastructure::database::entities::journal_entry;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};

fn from_row(row: journal_entry::Model) -> JournalEntry {
    JournalEntry {
        id: row.id,
        node_id: row.node_id,
        command_kind: row.command_kind,
        payload: row.payload,
        result: row.result,
        idempotency_key: row.idempotency_key,
        created_at: row.created_at,
    }
}

/// Look up a previously-committed entry by idempotency key so a retried
/// request can replay its result instead of re-applying (spec §4.3).
pub async fn find_by_idempotency_key<C: ConnectionTrait>(
    conn: &C,
    key: &str,
) -> CoreResult<Option<JournalEntry>> {
    let row = journal_entry::Entity::find()
        .filter(journal_entry::Column::IdempotencyKey.eq(key))
        .one(conn)
        .await?;
    Ok(row.map(from_row))
}

pub async fn append<C: ConnectionTrait>(
    conn: &C,
    node_id: Option<i64>,
    command_kind: &str,
    payload: serde_json::Value,
    result: serde_json::Value,
    idempotency_key: Option<String>,
) -> CoreResult<JournalEntry> {
    let active = journal_entry::ActiveModel {
        id: Default::default(),
        node_id: Set(node_id),
        command_kind: Set(command_kind.to_string()),
        payload: Set(payload),
        result: Set(result),
        idempotency_key: Set(idempotency_key),
        created_at: Set(Utc::now()),
    };
    let row = active.insert(conn).await?;
    Ok(from_row(row))
}
