//! Cancellation registry.
//!
//! Maps a search id to the cancellation signal of its in-flight run. An
//! entry lives exactly as long as the run task that registered it: the task
//! holds a [`RegistryGuard`] whose drop removes the entry on every exit
//! path: settlement, fault, cancellation, even a panic during finalize.
//! Absence of an entry means "not cancellable": never started, already
//! finished, or unknown.

use std::sync::Arc;

use dashmap::DashMap;
use dragnet_core::SearchId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Lock-free id → cancellation handle table, shared across searches.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
  entries: DashMap<SearchId, CancellationToken>,
}

impl CancellationRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a token under `id`. Returns `false` and leaves the existing
  /// entry untouched when the id already has a live entry; at most one
  /// entry per id can exist at any time.
  pub(crate) fn insert(&self, id: SearchId, token: CancellationToken) -> bool {
    match self.entries.entry(id) {
      dashmap::mapref::entry::Entry::Occupied(_) => false,
      dashmap::mapref::entry::Entry::Vacant(vacant) => {
        vacant.insert(token);
        true
      }
    }
  }

  /// Signal the search's token. Returns `true` iff a live entry existed.
  /// The entry stays in place; the run task removes it when it settles.
  pub fn cancel(&self, id: &SearchId) -> bool {
    match self.entries.get(id) {
      Some(entry) => {
        entry.value().cancel();
        debug!(search_id = %id, "Cancellation requested");
        true
      }
      None => false,
    }
  }

  /// Signal every live entry. Returns how many were signalled.
  pub fn cancel_all(&self) -> usize {
    let mut signalled = 0;
    for entry in self.entries.iter() {
      entry.value().cancel();
      signalled += 1;
    }
    if signalled > 0 {
      debug!(count = signalled, "Cancellation requested for all live searches");
    }
    signalled
  }

  pub fn contains(&self, id: &SearchId) -> bool {
    self.entries.contains_key(id)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  fn remove(&self, id: &SearchId) {
    self.entries.remove(id);
  }
}

/// Removes a registry entry when dropped.
///
/// Held by the run task so the entry's lifetime is tied to the task's,
/// regardless of whether finalization succeeds.
pub(crate) struct RegistryGuard {
  registry: Arc<CancellationRegistry>,
  id: SearchId,
}

impl RegistryGuard {
  pub(crate) fn new(registry: Arc<CancellationRegistry>, id: SearchId) -> Self {
    Self { registry, id }
  }
}

impl Drop for RegistryGuard {
  fn drop(&mut self) {
    self.registry.remove(&self.id);
    trace!(search_id = %self.id, "Registry entry released");
  }
}
