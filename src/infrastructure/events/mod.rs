//! Event bus (spec §4.6, component C6): decoupled notification of every
//! state transition the filestore and timestore subsystems produce. Runs in
//! one of two modes per [`crate::config::EventsConfig`] — `inline`, an
//! in-process `tokio::sync::broadcast` channel, or `redis`, a pub/sub
//! broker shared across process instances.

use crate::config::EventsConfig;
use crate::error::CoreResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

/// Every notification the core can emit (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    NodeCreated { node_id: i64, backend_mount_id: i64, path: String },
    NodeUploaded { node_id: i64, size_bytes: i64, checksum: String },
    NodeMoved { node_id: i64, from_path: String, to_path: String },
    NodeCopied { source_node_id: i64, new_node_id: i64, path: String },
    NodeDeleted { node_id: i64, path: String },
    NodeReconciled { node_id: i64, matched: bool },
    NodeMissing { node_id: i64, path: String },

    ReconciliationJobQueued { job_id: i64, job_key: String },
    ReconciliationJobStarted { job_id: i64 },
    ReconciliationJobCompleted { job_id: i64, nodes_scanned: i64, nodes_drifted: i64 },
    ReconciliationJobFailed { job_id: i64, error: String },
    ReconciliationJobCancelled { job_id: i64 },

    DriftDetected { node_id: i64, path: String, detail: String },

    PartitionCreated { partition_id: i64, dataset_id: i64, row_count: i64 },
    PartitionDeleted { partition_id: i64, dataset_id: i64 },

    DatasetExportCompleted { dataset_id: i64, rows_returned: i64 },
}

/// Envelope wrapping an [`Event`] with the metadata every consumer needs
/// regardless of transport (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: uuid::Uuid,
    pub occurred_at: DateTime<Utc>,
    pub event: Event,
}

impl EventEnvelope {
    fn new(event: Event) -> Self {
        Self { id: uuid::Uuid::new_v4(), occurred_at: Utc::now(), event }
    }
}

enum Transport {
    Inline(broadcast::Sender<EventEnvelope>),
    Redis { client: redis::Client, channel: String, local: broadcast::Sender<EventEnvelope> },
}

/// The process-wide event bus. Cheaply `Clone`-able; publishers and
/// subscribers share the same underlying transport.
#[derive(Clone)]
pub struct EventBus {
    transport: std::sync::Arc<Transport>,
}

impl EventBus {
    pub fn from_config(config: &EventsConfig) -> Self {
        match config {
            EventsConfig::Inline => Self::inline(1024),
            EventsConfig::Redis { url, channel } => match redis::Client::open(url.as_str()) {
                Ok(client) => {
                    let (local, _) = broadcast::channel(1024);
                    Self { transport: std::sync::Arc::new(Transport::Redis { client, channel: channel.clone(), local }) }
                }
                Err(e) => {
                    warn!(error = %e, "failed to build redis client, falling back to inline event bus");
                    Self::inline(1024)
                }
            },
        }
    }

    pub fn inline(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { transport: std::sync::Arc::new(Transport::Inline(sender)) }
    }

    /// Publish an event. Delivery is best-effort: a lagging or absent
    /// subscriber never blocks or fails the originating operation.
    pub async fn publish(&self, event: Event) -> CoreResult<()> {
        let envelope = EventEnvelope::new(event);
        match self.transport.as_ref() {
            Transport::Inline(sender) => {
                let _ = sender.send(envelope);
            }
            Transport::Redis { client, channel, local } => {
                let _ = local.send(envelope.clone());
                let payload = serde_json::to_string(&envelope)
                    .map_err(|e| crate::error::CoreError::InvariantViolation(format!("event encode: {e}")))?;
                if let Ok(mut conn) = client.get_multiplexed_async_connection().await {
                    use redis::AsyncCommands;
                    if let Err(e) = conn.publish::<_, _, ()>(channel, payload).await {
                        warn!(error = %e, "failed to publish event to redis");
                    }
                }
            }
        }
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        match self.transport.as_ref() {
            Transport::Inline(sender) => sender.subscribe(),
            Transport::Redis { local, .. } => local.subscribe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inline_bus_delivers_to_subscriber() {
        let bus = EventBus::inline(16);
        let mut rx = bus.subscribe();
        bus.publish(Event::NodeCreated { node_id: 1, backend_mount_id: 1, path: "a".into() })
            .await
            .unwrap();
        let envelope = rx.recv().await.unwrap();
        assert!(matches!(envelope.event, Event::NodeCreated { node_id: 1, .. }));
    }
}
