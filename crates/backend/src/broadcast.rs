//! Broadcast boundary.
//!
//! Lifecycle announcements are fire-and-forget: no acknowledgment, no
//! retry. A failing sink is the orchestrator's concern and is only ever
//! logged. Announced records never carry the `responses` payload; the
//! orchestrator strips it to bound the payload size, and the full list
//! stays available through the store.

use async_trait::async_trait;
use dragnet_core::SearchRecord;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
  #[error("broadcast sink unavailable: {0}")]
  Unavailable(String),
}

/// One search lifecycle announcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "search", rename_all = "lowercase")]
pub enum SearchEvent {
  Created(SearchRecord),
  Updated(SearchRecord),
  Deleted(SearchRecord),
}

impl SearchEvent {
  pub fn record(&self) -> &SearchRecord {
    match self {
      Self::Created(record) | Self::Updated(record) | Self::Deleted(record) => record,
    }
  }
}

/// Where lifecycle announcements go.
#[async_trait]
pub trait BroadcastSink: Send + Sync + 'static {
  async fn announce_created(&self, record: &SearchRecord) -> Result<(), BroadcastError>;
  async fn announce_updated(&self, record: &SearchRecord) -> Result<(), BroadcastError>;
  async fn announce_deleted(&self, record: &SearchRecord) -> Result<(), BroadcastError>;
}

/// In-process fan-out over a tokio broadcast channel.
///
/// Subscribers that fall behind lose the oldest events; with no subscriber
/// at all the event is dropped on the floor. Both are acceptable for a
/// progress feed whose definitive state lives in the store.
#[derive(Debug, Clone)]
pub struct ChannelSink {
  tx: broadcast::Sender<SearchEvent>,
}

impl ChannelSink {
  pub fn new(capacity: usize) -> Self {
    let (tx, _rx) = broadcast::channel(capacity);
    Self { tx }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<SearchEvent> {
    self.tx.subscribe()
  }

  fn publish(&self, event: SearchEvent) {
    if self.tx.send(event).is_err() {
      trace!("No broadcast subscribers, event dropped");
    }
  }
}

impl Default for ChannelSink {
  fn default() -> Self {
    Self::new(512)
  }
}

#[async_trait]
impl BroadcastSink for ChannelSink {
  async fn announce_created(&self, record: &SearchRecord) -> Result<(), BroadcastError> {
    self.publish(SearchEvent::Created(record.clone()));
    Ok(())
  }

  async fn announce_updated(&self, record: &SearchRecord) -> Result<(), BroadcastError> {
    self.publish(SearchEvent::Updated(record.clone()));
    Ok(())
  }

  async fn announce_deleted(&self, record: &SearchRecord) -> Result<(), BroadcastError> {
    self.publish(SearchEvent::Deleted(record.clone()));
    Ok(())
  }
}
