//! Search engine boundary.
//!
//! The engine is the external collaborator that actually discovers results;
//! the orchestrator only drives it. Its two notification paths (state
//! advanced, response received) are delivered over one per-search event
//! channel, consumed by the search's run task.

use async_trait::async_trait;
use dragnet_core::{SearchId, SearchOptions, SearchResponse, SearchScope, SearchState};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  #[error("engine fault: {0}")]
  Fault(String),
}

/// Everything the engine needs to run one search.
#[derive(Debug, Clone)]
pub struct EngineRequest {
  pub id: SearchId,
  pub text: String,
  pub scope: SearchScope,
  /// Opaque wire token generated by the orchestrator.
  pub token: Uuid,
  pub options: SearchOptions,
}

/// Progress notification for one in-flight search.
#[derive(Debug, Clone)]
pub enum EngineEvent {
  /// The engine's own lifecycle advanced.
  State(SearchState),
  /// One peer answered. May arrive at unbounded rate, from any task.
  Response(SearchResponse),
}

/// The engine's final snapshot, reported when its task settles.
#[derive(Debug, Clone)]
pub struct EngineSummary {
  pub state: SearchState,
  pub response_count: u64,
  pub file_count: u64,
  pub locked_file_count: u64,
}

/// An opaque search engine.
#[async_trait]
pub trait SearchEngine: Send + Sync + 'static {
  /// Drive one search. The returned future is the completion handle: it
  /// resolves when the engine decides the search is done, faults on an
  /// engine-side error, and settles cooperatively some time after `cancel`
  /// fires. Cancellation is a request to stop producing, not preemption.
  ///
  /// Progress flows through `events`. The engine may drop the sender early;
  /// that only ends the progress stream, not the search.
  async fn issue(
    &self,
    request: EngineRequest,
    events: mpsc::Sender<EngineEvent>,
    cancel: CancellationToken,
  ) -> Result<EngineSummary, EngineError>;
}
