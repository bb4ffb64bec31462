//! Persistence boundary for search records.
//!
//! The orchestrator writes one record per call and never asks for
//! cross-record transactional guarantees; any store that can upsert, delete,
//! and scan records satisfies [`SearchStore`]. Durable snapshots are allowed
//! to lag the in-memory record by up to one debounce interval for
//! response-driven updates; state-driven updates and finalization are
//! written through immediately by the caller.
//!
//! [`MemoryStore`] is the in-process reference implementation, used by the
//! test suites and suitable as a default for embedders that do not need
//! durability.

mod memory;

use async_trait::async_trait;
use dragnet_core::{SearchFilter, SearchId, SearchRecord};
use thiserror::Error;

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("search {0} already exists")]
  Duplicate(SearchId),
  #[error("search {0} not found")]
  NotFound(SearchId),
  #[error("store unavailable: {0}")]
  Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Durable snapshots of search records.
///
/// `include_responses` controls the heavy `responses` field on reads:
/// `false` (the common case) returns records with the field stripped.
#[async_trait]
pub trait SearchStore: Send + Sync + 'static {
  /// Insert a new record. Fails with [`StoreError::Duplicate`] when the id
  /// is already present.
  async fn create(&self, record: &SearchRecord) -> Result<()>;

  /// Replace the stored record wholesale.
  async fn update(&self, record: &SearchRecord) -> Result<()>;

  /// Remove a record, returning it so the caller can broadcast the
  /// deletion.
  async fn delete(&self, id: &SearchId) -> Result<SearchRecord>;

  async fn get(&self, id: &SearchId, include_responses: bool) -> Result<Option<SearchRecord>>;

  /// All records matching the filter. An empty filter matches everything.
  async fn query(&self, filter: &SearchFilter, include_responses: bool) -> Result<Vec<SearchRecord>>;
}
