//! Test helpers for orchestrator end-to-end tests.
//!
//! Provides a scripted engine, a collecting broadcast sink, a store whose
//! writes can be made to fail, and a harness that wires the three into a
//! `SearchOrchestrator` with a debounce interval long enough that only
//! leading-edge updates fire during a test.

use std::{
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use dragnet_core::{
  FoundFile, OrchestratorConfig, SearchFilter, SearchId, SearchRecord, SearchResponse, SearchState,
};
use dragnet_db::{MemoryStore, Result as StoreResult, SearchStore};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
  broadcast::{BroadcastError, BroadcastSink, SearchEvent},
  engine::{EngineError, EngineEvent, EngineRequest, EngineSummary, SearchEngine},
  orchestrator::SearchOrchestrator,
};

// ============================================================================
// Scripted engine
// ============================================================================

/// One step of a scripted engine run.
#[derive(Clone)]
pub enum EngineStep {
  State(SearchState),
  Response(SearchResponse),
  Wait(Duration),
}

/// How a scripted engine settles once its steps are exhausted.
#[derive(Clone)]
pub enum EngineOutcome {
  Complete,
  Fault(String),
  HangUntilCancelled,
}

/// Engine that replays a fixed script, observing cancellation between
/// steps and reporting its running counts in the final summary.
pub struct ScriptedEngine {
  steps: Vec<EngineStep>,
  outcome: EngineOutcome,
}

impl ScriptedEngine {
  pub fn new(steps: Vec<EngineStep>, outcome: EngineOutcome) -> Self {
    Self { steps, outcome }
  }

  /// An engine that produces nothing and only settles when cancelled.
  pub fn hanging() -> Self {
    Self::new(Vec::new(), EngineOutcome::HangUntilCancelled)
  }
}

#[async_trait]
impl SearchEngine for ScriptedEngine {
  async fn issue(
    &self,
    _request: EngineRequest,
    events: mpsc::Sender<EngineEvent>,
    cancel: CancellationToken,
  ) -> Result<EngineSummary, EngineError> {
    let mut response_count = 0u64;
    let mut file_count = 0u64;
    let mut locked_file_count = 0u64;

    let cancelled = |response_count, file_count, locked_file_count| EngineSummary {
      state: SearchState::Cancelled,
      response_count,
      file_count,
      locked_file_count,
    };

    for step in self.steps.clone() {
      if cancel.is_cancelled() {
        return Ok(cancelled(response_count, file_count, locked_file_count));
      }
      match step {
        EngineStep::State(state) => {
          let _ = events.send(EngineEvent::State(state)).await;
        }
        EngineStep::Response(response) => {
          response_count += 1;
          file_count += response.file_count();
          locked_file_count += u64::from(response.locked_file_count);
          let _ = events.send(EngineEvent::Response(response)).await;
        }
        EngineStep::Wait(duration) => {
          tokio::select! {
            _ = cancel.cancelled() => return Ok(cancelled(response_count, file_count, locked_file_count)),
            _ = tokio::time::sleep(duration) => {}
          }
        }
      }
    }

    match &self.outcome {
      EngineOutcome::Complete => Ok(EngineSummary {
        state: SearchState::Completed,
        response_count,
        file_count,
        locked_file_count,
      }),
      EngineOutcome::Fault(message) => Err(EngineError::Fault(message.clone())),
      EngineOutcome::HangUntilCancelled => {
        cancel.cancelled().await;
        Ok(cancelled(response_count, file_count, locked_file_count))
      }
    }
  }
}

// ============================================================================
// Collecting sink
// ============================================================================

/// Sink that records every announcement for later assertions.
#[derive(Debug, Default)]
pub struct CollectingSink {
  events: Mutex<Vec<SearchEvent>>,
}

impl CollectingSink {
  pub fn events(&self) -> Vec<SearchEvent> {
    self.events.lock().unwrap().clone()
  }

  pub fn created_count(&self) -> usize {
    self
      .events()
      .iter()
      .filter(|e| matches!(e, SearchEvent::Created(_)))
      .count()
  }

  pub fn updated(&self) -> Vec<SearchRecord> {
    self
      .events()
      .into_iter()
      .filter_map(|e| match e {
        SearchEvent::Updated(record) => Some(record),
        _ => None,
      })
      .collect()
  }

  pub fn deleted_ids(&self) -> Vec<String> {
    self
      .events()
      .into_iter()
      .filter_map(|e| match e {
        SearchEvent::Deleted(record) => Some(record.id.as_str().to_string()),
        _ => None,
      })
      .collect()
  }

  fn push(&self, event: SearchEvent) {
    self.events.lock().unwrap().push(event);
  }
}

#[async_trait]
impl BroadcastSink for CollectingSink {
  async fn announce_created(&self, record: &SearchRecord) -> Result<(), BroadcastError> {
    self.push(SearchEvent::Created(record.clone()));
    Ok(())
  }

  async fn announce_updated(&self, record: &SearchRecord) -> Result<(), BroadcastError> {
    self.push(SearchEvent::Updated(record.clone()));
    Ok(())
  }

  async fn announce_deleted(&self, record: &SearchRecord) -> Result<(), BroadcastError> {
    self.push(SearchEvent::Deleted(record.clone()));
    Ok(())
  }
}

// ============================================================================
// Flaky store
// ============================================================================

/// Store wrapper whose `update` calls can be made to fail, for exercising
/// the best-effort finalize path.
#[derive(Debug, Default)]
pub struct FlakyStore {
  inner: MemoryStore,
  fail_updates: AtomicBool,
}

impl FlakyStore {
  pub fn fail_updates(&self, fail: bool) {
    self.fail_updates.store(fail, Ordering::SeqCst);
  }
}

#[async_trait]
impl SearchStore for FlakyStore {
  async fn create(&self, record: &SearchRecord) -> StoreResult<()> {
    self.inner.create(record).await
  }

  async fn update(&self, record: &SearchRecord) -> StoreResult<()> {
    if self.fail_updates.load(Ordering::SeqCst) {
      return Err(dragnet_db::StoreError::Unavailable("update refused by test".into()));
    }
    self.inner.update(record).await
  }

  async fn delete(&self, id: &SearchId) -> StoreResult<SearchRecord> {
    self.inner.delete(id).await
  }

  async fn get(&self, id: &SearchId, include_responses: bool) -> StoreResult<Option<SearchRecord>> {
    self.inner.get(id, include_responses).await
  }

  async fn query(&self, filter: &SearchFilter, include_responses: bool) -> StoreResult<Vec<SearchRecord>> {
    self.inner.query(filter, include_responses).await
  }
}

// ============================================================================
// Harness
// ============================================================================

pub struct TestHarness {
  pub orchestrator: SearchOrchestrator,
  pub store: Arc<MemoryStore>,
  pub sink: Arc<CollectingSink>,
}

/// Debounce interval long enough that only leading-edge updates fire
/// within a test; everything else is deterministic.
pub fn test_config() -> OrchestratorConfig {
  OrchestratorConfig {
    debounce_ms: 60_000,
    ..Default::default()
  }
}

pub fn harness(engine: ScriptedEngine) -> TestHarness {
  let store = Arc::new(MemoryStore::new());
  let sink = Arc::new(CollectingSink::default());
  let orchestrator = SearchOrchestrator::new(
    Arc::new(engine),
    Arc::clone(&store) as Arc<dyn SearchStore>,
    Arc::clone(&sink) as Arc<dyn BroadcastSink>,
    test_config(),
  )
  .expect("valid test config");
  TestHarness {
    orchestrator,
    store,
    sink,
  }
}

pub fn flaky_harness(engine: ScriptedEngine) -> (SearchOrchestrator, Arc<FlakyStore>, Arc<CollectingSink>) {
  let store = Arc::new(FlakyStore::default());
  let sink = Arc::new(CollectingSink::default());
  let orchestrator = SearchOrchestrator::new(
    Arc::new(engine),
    Arc::clone(&store) as Arc<dyn SearchStore>,
    Arc::clone(&sink) as Arc<dyn BroadcastSink>,
    test_config(),
  )
  .expect("valid test config");
  (orchestrator, store, sink)
}

// ============================================================================
// Waiting
// ============================================================================

/// Poll the store until the record has `ended_at` set, returning it with
/// responses included. `None` on timeout.
pub async fn wait_for_terminal(store: &dyn SearchStore, id: &SearchId, timeout: Duration) -> Option<SearchRecord> {
  let deadline = tokio::time::Instant::now() + timeout;
  loop {
    if let Ok(Some(record)) = store.get(id, true).await
      && record.ended_at.is_some()
    {
      return Some(record);
    }
    if tokio::time::Instant::now() >= deadline {
      return None;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
}

/// Poll until `condition` holds or the timeout elapses.
pub async fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
  let deadline = tokio::time::Instant::now() + timeout;
  while !condition() {
    if tokio::time::Instant::now() >= deadline {
      return false;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  true
}

// ============================================================================
// Fixtures
// ============================================================================

/// A response from `peer` with `files` files and `locked` locked files.
pub fn response(peer: &str, files: u64, locked: u32) -> SearchResponse {
  SearchResponse {
    peer: peer.to_string(),
    files: (0..files)
      .map(|i| FoundFile {
        name: format!("{peer}/track-{i}.flac"),
        size: 1024 * (i + 1),
      })
      .collect(),
    locked_file_count: locked,
    queue_length: 0,
  }
}
