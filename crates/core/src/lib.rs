//! Core domain types for dragnet.
//!
//! These types represent one search's observable state and are independent
//! of persistence, transport, and engine concerns. The backend crate owns
//! the behavior; everything here is plain data plus the small invariants
//! the data itself can enforce (forward-only state, monotonic counters).

mod config;
mod search;

pub use config::{ConfigError, OrchestratorConfig};
pub use search::{
  FoundFile, SearchFilter, SearchId, SearchOptions, SearchRecord, SearchResponse, SearchScope, SearchState,
};
