//! In-memory search store.

use async_trait::async_trait;
use dashmap::DashMap;
use dragnet_core::{SearchFilter, SearchId, SearchRecord};
use tracing::trace;

use crate::{Result, SearchStore, StoreError};

/// Lock-free in-process store over a `DashMap`.
///
/// Reads return clones, so callers never observe a record mid-update.
#[derive(Debug, Default)]
pub struct MemoryStore {
  records: DashMap<SearchId, SearchRecord>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }
}

fn thin(record: &SearchRecord, include_responses: bool) -> SearchRecord {
  if include_responses {
    record.clone()
  } else {
    record.without_responses()
  }
}

#[async_trait]
impl SearchStore for MemoryStore {
  async fn create(&self, record: &SearchRecord) -> Result<()> {
    match self.records.entry(record.id.clone()) {
      dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::Duplicate(record.id.clone())),
      dashmap::mapref::entry::Entry::Vacant(vacant) => {
        trace!(search_id = %record.id, "Record created");
        vacant.insert(record.clone());
        Ok(())
      }
    }
  }

  async fn update(&self, record: &SearchRecord) -> Result<()> {
    match self.records.get_mut(&record.id) {
      Some(mut existing) => {
        *existing = record.clone();
        Ok(())
      }
      None => Err(StoreError::NotFound(record.id.clone())),
    }
  }

  async fn delete(&self, id: &SearchId) -> Result<SearchRecord> {
    self
      .records
      .remove(id)
      .map(|(_, record)| record)
      .ok_or_else(|| StoreError::NotFound(id.clone()))
  }

  async fn get(&self, id: &SearchId, include_responses: bool) -> Result<Option<SearchRecord>> {
    Ok(self.records.get(id).map(|r| thin(r.value(), include_responses)))
  }

  async fn query(&self, filter: &SearchFilter, include_responses: bool) -> Result<Vec<SearchRecord>> {
    Ok(
      self
        .records
        .iter()
        .filter(|entry| filter.matches(entry.value()))
        .map(|entry| thin(entry.value(), include_responses))
        .collect(),
    )
  }
}
