//! Snapshot repository (spec §4.5, component C5): a durable record of each
//! backend observation made during reconciliation, independent of whatever
//! outcome it produced for the node itself.

use crate::error::CoreResult;
use crate::infrastructure::database::entities::snapshot;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ConnectionTrait};

pub async fn insert<C: ConnectionTrait>(
    conn: &C,
    node_id: i64,
    observed_size_bytes: Option<i64>,
    observed_checksum: Option<String>,
    observed_state: &str,
    matched: bool,
) -> CoreResult<()> {
    let active = snapshot::ActiveModel {
        id: Default::default(),
        node_id: Set(node_id),
        observed_size_bytes: Set(observed_size_bytes),
        observed_checksum: Set(observed_checksum),
        observed_state: Set(observed_state.to_string()),
        matched: Set(matched),
        taken_at: Set(Utc::now()),
    };
    active.insert(conn).await?;
    Ok(())
}
