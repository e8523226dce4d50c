//! Dataset access event repository (spec §4.8, component C8): an audit
//! trail of every query plan issued against a dataset.

use crate::error::CoreResult;
use crate::infrastructure::database::entities::dataset_access_event;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ConnectionTrait};

pub async fn record<C: ConnectionTrait>(
    conn: &C,
    dataset_id: i64,
    kind: &str,
    partitions_considered: i64,
    partitions_pruned: i64,
    rows_returned: Option<i64>,
) -> CoreResult<()> {
    let active = dataset_access_event::ActiveModel {
        id: Default::default(),
        dataset_id: Set(dataset_id),
        kind: Set(kind.to_string()),
        partitions_considered: Set(partitions_considered),
        partitions_pruned: Set(partitions_pruned),
        rows_returned: Set(rows_returned),
        occurred_at: Set(Utc::now()),
    };
    active.insert(conn).await?;
    Ok(())
}
