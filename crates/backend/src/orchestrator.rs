//! Search lifecycle orchestration.
//!
//! One [`SearchOrchestrator`] coordinates any number of concurrent
//! searches. Each `start` spawns an independent run task that owns the
//! search's `SearchRecord` and is the only writer to it: engine progress
//! arrives on a per-search mpsc channel and is applied by that single
//! consumer, so no lock guards the record.
//!
//! # Update policy
//!
//! - State transitions are rare and must be visible promptly: they persist
//!   and broadcast immediately.
//! - Response events are unbounded: the counters are always updated in
//!   memory and every raw response is accumulated, but persistence and
//!   broadcast of the counters go through a per-search [`Debouncer`], so a
//!   burst collapses to the leading update plus at most one per interval.
//! - Finalization happens exactly once, whatever way the engine settles.
//!   The debouncer is disposed without flushing (the definitive finalize
//!   supersedes any staged update), the registry entry is released, and the
//!   final record is persisted with its full response list and broadcast
//!   without it.
//!
//! Finalize failures are logged and contained: there is no caller left to
//! surface them to, so the last persisted snapshot simply remains the
//! record's final observable state. Operator-invoked maintenance (`prune`,
//! `delete`) surfaces store errors instead.

use std::sync::Arc;

use chrono::Utc;
use dragnet_core::{
  ConfigError, OrchestratorConfig, SearchFilter, SearchId, SearchOptions, SearchRecord, SearchResponse, SearchScope,
  SearchState,
};
use dragnet_db::{SearchStore, StoreError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
  broadcast::BroadcastSink,
  debounce::{DebounceError, Debouncer},
  engine::{EngineError, EngineEvent, EngineRequest, EngineSummary, SearchEngine},
  registry::{CancellationRegistry, RegistryGuard},
};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
  #[error("invalid request: {0}")]
  Validation(String),
  #[error("search {0} already exists")]
  Duplicate(SearchId),
  #[error("search {0} is still running")]
  StillRunning(SearchId),
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error(transparent)]
  Debounce(#[from] DebounceError),
  #[error(transparent)]
  Store(#[from] StoreError),
}

// ============================================================================
// SearchOrchestrator
// ============================================================================

/// Owns the lifecycle of every search: registration, progress propagation,
/// cancellation, exactly-once finalization, and pruning of old records.
pub struct SearchOrchestrator {
  engine: Arc<dyn SearchEngine>,
  store: Arc<dyn SearchStore>,
  sink: Arc<dyn BroadcastSink>,
  registry: Arc<CancellationRegistry>,
  config: OrchestratorConfig,
}

impl SearchOrchestrator {
  /// Validates the config up front so per-search debouncer construction
  /// cannot fail later.
  pub fn new(
    engine: Arc<dyn SearchEngine>,
    store: Arc<dyn SearchStore>,
    sink: Arc<dyn BroadcastSink>,
    config: OrchestratorConfig,
  ) -> Result<Self, OrchestratorError> {
    config.validate()?;
    Ok(Self {
      engine,
      store,
      sink,
      registry: Arc::new(CancellationRegistry::new()),
      config,
    })
  }

  /// Start a search and return its initial record.
  ///
  /// The record is persisted and announced as created before this returns;
  /// all further progress is observed through the broadcast and query
  /// interfaces, not the return value. Duplicate ids are rejected, both
  /// against in-flight searches and against stored records.
  pub async fn start(
    &self,
    id: SearchId,
    search_text: impl Into<String>,
    scope: SearchScope,
    options: SearchOptions,
  ) -> Result<SearchRecord, OrchestratorError> {
    let cancel = CancellationToken::new();
    if !self.registry.insert(id.clone(), cancel.clone()) {
      return Err(OrchestratorError::Duplicate(id));
    }
    // From here the entry is released by the guard on every path, run task
    // included once it takes ownership
    let guard = RegistryGuard::new(Arc::clone(&self.registry), id.clone());

    // One debouncer per search; searches never contend with each other
    let debouncer = Debouncer::new(self.config.debounce_interval(), self.config.debounce_concurrency)?;

    let token = Uuid::new_v4();
    let record = SearchRecord::new(id, search_text, token, scope);

    if let Err(e) = self.store.create(&record).await {
      return Err(match e {
        StoreError::Duplicate(id) => OrchestratorError::Duplicate(id),
        other => OrchestratorError::Store(other),
      });
    }

    if let Err(e) = self.sink.announce_created(&record.without_responses()).await {
      warn!(search_id = %record.id, error = %e, "Created broadcast failed");
    }

    let ctx = RunContext {
      engine: Arc::clone(&self.engine),
      store: Arc::clone(&self.store),
      sink: Arc::clone(&self.sink),
      event_buffer: self.config.event_buffer,
    };
    tokio::spawn(run_search(ctx, record.clone(), options, debouncer, cancel, guard));

    info!(search_id = %record.id, token = %token, "Search started");
    Ok(record)
  }

  /// Request cooperative cancellation. Returns `true` iff `id` is currently
  /// in flight; unknown and already-finished searches return `false`. The
  /// run task still finalizes the record once the engine observes the
  /// signal.
  pub fn cancel(&self, id: &SearchId) -> bool {
    self.registry.cancel(id)
  }

  /// Signal every in-flight search, for coordinated shutdown. Returns how
  /// many were signalled.
  pub fn cancel_all(&self) -> usize {
    self.registry.cancel_all()
  }

  /// Whether `id` has a live (cancellable) run.
  pub fn is_active(&self, id: &SearchId) -> bool {
    self.registry.contains(id)
  }

  pub fn active_count(&self) -> usize {
    self.registry.len()
  }

  /// Remove a finished search and announce the deletion. In-flight searches
  /// are refused; cancel first.
  pub async fn delete(&self, id: &SearchId) -> Result<SearchRecord, OrchestratorError> {
    if self.registry.contains(id) {
      return Err(OrchestratorError::StillRunning(id.clone()));
    }

    let record = self.store.delete(id).await?;
    if let Err(e) = self.sink.announce_deleted(&record.without_responses()).await {
      warn!(search_id = %id, error = %e, "Deletion broadcast failed");
    }
    debug!(search_id = %id, "Search deleted");
    Ok(record)
  }

  /// Delete every terminal search that ended more than `age_minutes` ago,
  /// through the same path as explicit deletion, so each removal is
  /// announced. Running searches are never eligible, however old their
  /// `started_at`. Returns the number deleted. Store errors surface to the
  /// caller; this is operator-invoked maintenance, unlike per-search
  /// finalization.
  pub async fn prune(&self, age_minutes: i64) -> Result<usize, OrchestratorError> {
    let cutoff = Utc::now() - chrono::Duration::minutes(age_minutes);
    let filter = SearchFilter {
      terminal: Some(true),
      ended_before: Some(cutoff),
      ..Default::default()
    };
    let expired = self.store.query(&filter, false).await?;

    let mut deleted = 0usize;
    for record in expired {
      match self.delete(&record.id).await {
        Ok(_) => deleted += 1,
        // Raced another deleter; gone is the outcome we wanted
        Err(OrchestratorError::Store(StoreError::NotFound(_))) => {}
        Err(e) => return Err(e),
      }
    }

    info!(deleted, cutoff = %cutoff, "Pruned expired searches");
    Ok(deleted)
  }

  /// Records matching `filter`, which must carry at least one criterion;
  /// use [`SearchOrchestrator::list`] to read everything. The heavy
  /// `responses` field is omitted unless opted in.
  pub async fn find(
    &self,
    filter: &SearchFilter,
    include_responses: bool,
  ) -> Result<Vec<SearchRecord>, OrchestratorError> {
    if filter.is_empty() {
      return Err(OrchestratorError::Validation(
        "search filter must contain at least one criterion".into(),
      ));
    }
    Ok(self.store.query(filter, include_responses).await?)
  }

  pub async fn list(&self, include_responses: bool) -> Result<Vec<SearchRecord>, OrchestratorError> {
    Ok(self.store.query(&SearchFilter::default(), include_responses).await?)
  }

  pub async fn get(&self, id: &SearchId, include_responses: bool) -> Result<Option<SearchRecord>, OrchestratorError> {
    Ok(self.store.get(id, include_responses).await?)
  }
}

// ============================================================================
// Per-search run task
// ============================================================================

struct RunContext {
  engine: Arc<dyn SearchEngine>,
  store: Arc<dyn SearchStore>,
  sink: Arc<dyn BroadcastSink>,
  event_buffer: usize,
}

/// Drives one search to settlement and finalizes it exactly once.
async fn run_search(
  ctx: RunContext,
  mut record: SearchRecord,
  options: SearchOptions,
  debouncer: Debouncer,
  cancel: CancellationToken,
  guard: RegistryGuard,
) {
  let (events_tx, mut events_rx) = mpsc::channel(ctx.event_buffer);
  let request = EngineRequest {
    id: record.id.clone(),
    text: record.search_text.clone(),
    scope: record.scope.clone(),
    token: record.token,
    options,
  };

  let engine = Arc::clone(&ctx.engine);
  let engine_fut = async move { engine.issue(request, events_tx, cancel).await };
  tokio::pin!(engine_fut);

  let mut responses: Vec<SearchResponse> = Vec::new();

  // Single consumer: this task owns the record, so engine events can never
  // interleave into shared mutable state
  let settled = loop {
    tokio::select! {
      outcome = &mut engine_fut => break outcome,

      event = events_rx.recv() => match event {
        Some(event) => apply_event(&ctx, &mut record, &mut responses, &debouncer, event).await,
        // Engine dropped its sender; nothing is left to consume
        None => break engine_fut.await,
      }
    }
  };

  // The engine future can win the select while events sit in the channel;
  // fold them in so the final counters match the last delivered response
  while let Ok(event) = events_rx.try_recv() {
    apply_event(&ctx, &mut record, &mut responses, &debouncer, event).await;
  }

  // A staged progress update is abandoned on purpose; the definitive
  // finalize below supersedes it
  debouncer.dispose(false).await;

  // The registry entry must be gone before finalize can fail, so a settled
  // search is never left cancellable
  drop(guard);

  finalize(&ctx, &mut record, responses, settled).await;
}

async fn apply_event(
  ctx: &RunContext,
  record: &mut SearchRecord,
  responses: &mut Vec<SearchResponse>,
  debouncer: &Debouncer,
  event: EngineEvent,
) {
  match event {
    EngineEvent::State(next) => {
      if record.advance_state(next) {
        debug!(search_id = %record.id, state = %record.state, "Engine state advanced");
        // State transitions are rare and must be visible promptly; they
        // bypass the debouncer
        persist_and_announce(ctx, &record.without_responses()).await;
      } else {
        warn!(
          search_id = %record.id,
          current = %record.state,
          reported = %next,
          "Ignoring backwards state transition"
        );
      }
    }
    EngineEvent::Response(response) => {
      // Counters are always current in memory, and the raw response is
      // accumulated outside the debouncer so a dropped broadcast never
      // loses a result
      record.record_response(&response);
      responses.push(response);

      let store = Arc::clone(&ctx.store);
      let sink = Arc::clone(&ctx.sink);
      let snapshot = record.without_responses();
      debouncer.invoke(async move {
        if let Err(e) = store.update(&snapshot).await {
          warn!(search_id = %snapshot.id, error = %e, "Progress persist failed");
        }
        if let Err(e) = sink.announce_updated(&snapshot).await {
          warn!(search_id = %snapshot.id, error = %e, "Progress broadcast failed");
        }
      });
    }
  }
}

async fn persist_and_announce(ctx: &RunContext, snapshot: &SearchRecord) {
  if let Err(e) = ctx.store.update(snapshot).await {
    warn!(search_id = %snapshot.id, error = %e, "State persist failed");
  }
  if let Err(e) = ctx.sink.announce_updated(snapshot).await {
    warn!(search_id = %snapshot.id, error = %e, "State broadcast failed");
  }
}

/// Exactly-once finalization. Persist and broadcast are best-effort: a
/// failure is logged, never retried, and never escapes this task.
async fn finalize(
  ctx: &RunContext,
  record: &mut SearchRecord,
  responses: Vec<SearchResponse>,
  settled: Result<EngineSummary, EngineError>,
) {
  match settled {
    Ok(summary) => {
      record.merge_counters(summary.response_count, summary.file_count, summary.locked_file_count);
      record.advance_state(summary.state);
      if !record.state.is_terminal() {
        record.advance_state(SearchState::Completed);
      }
    }
    Err(e) => {
      warn!(search_id = %record.id, error = %e, "Engine task faulted");
      record.advance_state(SearchState::Errored);
    }
  }

  record.ended_at = Some(Utc::now());
  record.responses = responses;

  if let Err(e) = ctx.store.update(record).await {
    error!(search_id = %record.id, error = %e, "Finalize persist failed");
  }
  // The final announcement never carries the response payload
  if let Err(e) = ctx.sink.announce_updated(&record.without_responses()).await {
    error!(search_id = %record.id, error = %e, "Finalize broadcast failed");
  }

  info!(
    search_id = %record.id,
    state = %record.state,
    responses = record.response_count,
    files = record.file_count,
    "Search finalized"
  );
}
