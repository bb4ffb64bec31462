//! Search domain types.
//!
//! A [`SearchRecord`] is the mutable aggregate for one search: identity and
//! request fields are frozen at creation, `state` only moves forward, the
//! counters only grow, and `responses` is populated exactly once when the
//! search finalizes. The record that travels over the broadcast channel is
//! always the [`SearchRecord::without_responses`] form; the full response
//! list is only available from the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Identity
// ============================================================================

/// Unique identifier for a search, supplied by the caller.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchId(pub String);

impl SearchId {
  /// Mint a fresh id for callers without a natural key.
  pub fn generate() -> Self {
    Self(Uuid::new_v4().to_string())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for SearchId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<String> for SearchId {
  fn from(s: String) -> Self {
    Self(s)
  }
}

impl From<&str> for SearchId {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}

// ============================================================================
// State machine
// ============================================================================

/// Lifecycle state of a search.
///
/// Transitions only move forward: `Requested → InProgress → {Completed,
/// Cancelled, Errored}`. The three terminal states are siblings; any of them
/// can be entered from any non-terminal state, and none has a successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
  Requested,
  InProgress,
  Completed,
  Cancelled,
  Errored,
}

impl SearchState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Completed | Self::Cancelled | Self::Errored)
  }

  /// Forward-only ordering rank. Terminal states share a rank so that no
  /// terminal state can replace another.
  fn rank(&self) -> u8 {
    match self {
      Self::Requested => 0,
      Self::InProgress => 1,
      Self::Completed | Self::Cancelled | Self::Errored => 2,
    }
  }

  /// Whether a transition from `self` to `next` is legal.
  pub fn can_advance_to(&self, next: SearchState) -> bool {
    next.rank() > self.rank()
  }
}

impl std::fmt::Display for SearchState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Self::Requested => "requested",
      Self::InProgress => "in_progress",
      Self::Completed => "completed",
      Self::Cancelled => "cancelled",
      Self::Errored => "errored",
    };
    write!(f, "{s}")
  }
}

// ============================================================================
// Request fields
// ============================================================================

/// Where the engine should look for results. Opaque to the orchestrator,
/// forwarded to the engine as-is.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
  /// The whole network.
  #[default]
  Network,
  /// A single peer's shared files.
  Peer(String),
  /// Everyone present in a named room.
  Room(String),
}

/// Engine-facing knobs. The orchestrator forwards these without inspecting
/// them; what the engine honors is the engine's business.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
  /// Stop after this many responses.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub response_limit: Option<u64>,
  /// Stop after this many files.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub file_limit: Option<u64>,
  /// Give up after this many seconds without the engine settling.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout_secs: Option<u64>,
}

// ============================================================================
// Responses
// ============================================================================

/// A single file discovered by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundFile {
  pub name: String,
  pub size: u64,
}

/// One peer's answer to a search: the files it offers plus how many more it
/// holds behind locks and how long its queue is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
  pub peer: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub files: Vec<FoundFile>,
  pub locked_file_count: u32,
  pub queue_length: u32,
}

impl SearchResponse {
  pub fn file_count(&self) -> u64 {
    self.files.len() as u64
  }
}

// ============================================================================
// The record
// ============================================================================

/// The mutable aggregate for one search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRecord {
  /// Primary key, immutable after creation.
  pub id: SearchId,
  /// The text handed to the engine, immutable.
  pub search_text: String,
  /// Opaque engine token generated at start, immutable.
  pub token: Uuid,
  /// Where the engine looked, immutable.
  pub scope: SearchScope,

  pub state: SearchState,

  pub started_at: DateTime<Utc>,
  /// Set exactly once, at finalization.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub ended_at: Option<DateTime<Utc>>,

  /// Number of responses received so far. Monotonically non-decreasing.
  pub response_count: u64,
  /// Number of files across all responses. Monotonically non-decreasing.
  pub file_count: u64,
  /// Number of locked files across all responses. Monotonically non-decreasing.
  pub locked_file_count: u64,

  /// The raw responses. Empty until finalization, populated exactly once,
  /// and stripped from every broadcast payload.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub responses: Vec<SearchResponse>,
}

impl SearchRecord {
  /// Fresh record in the `Requested` state, started now.
  pub fn new(id: SearchId, search_text: impl Into<String>, token: Uuid, scope: SearchScope) -> Self {
    Self {
      id,
      search_text: search_text.into(),
      token,
      scope,
      state: SearchState::Requested,
      started_at: Utc::now(),
      ended_at: None,
      response_count: 0,
      file_count: 0,
      locked_file_count: 0,
      responses: Vec::new(),
    }
  }

  /// Advance the state if the transition is legal. Returns whether the
  /// transition was applied; an illegal transition leaves the record
  /// untouched.
  pub fn advance_state(&mut self, next: SearchState) -> bool {
    if self.state.can_advance_to(next) {
      self.state = next;
      true
    } else {
      false
    }
  }

  /// Fold one response into the counters. The raw response itself is
  /// accumulated elsewhere; the record only mirrors the totals.
  pub fn record_response(&mut self, response: &SearchResponse) {
    self.response_count += 1;
    self.file_count += response.file_count();
    self.locked_file_count += u64::from(response.locked_file_count);
  }

  /// Merge the engine's final snapshot: forward-only on state, max on
  /// counters so they never move backwards.
  pub fn merge_counters(&mut self, response_count: u64, file_count: u64, locked_file_count: u64) {
    self.response_count = self.response_count.max(response_count);
    self.file_count = self.file_count.max(file_count);
    self.locked_file_count = self.locked_file_count.max(locked_file_count);
  }

  /// Clone with the heavy `responses` field emptied. Every broadcast payload
  /// goes through this.
  pub fn without_responses(&self) -> Self {
    Self {
      responses: Vec::new(),
      ..self.clone()
    }
  }
}

// ============================================================================
// Query filter
// ============================================================================

/// Conjunctive match predicate for store queries. All present criteria must
/// hold for a record to match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilter {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub state: Option<SearchState>,
  /// Match only ended (`true`) or only running (`false`) searches.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub terminal: Option<bool>,
  /// Match only searches that ended strictly before this instant. Records
  /// without `ended_at` never match.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub ended_before: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub text_contains: Option<String>,
}

impl SearchFilter {
  pub fn is_empty(&self) -> bool {
    self.state.is_none() && self.terminal.is_none() && self.ended_before.is_none() && self.text_contains.is_none()
  }

  pub fn matches(&self, record: &SearchRecord) -> bool {
    if let Some(state) = self.state
      && record.state != state
    {
      return false;
    }
    if let Some(terminal) = self.terminal
      && record.ended_at.is_some() != terminal
    {
      return false;
    }
    if let Some(cutoff) = self.ended_before {
      match record.ended_at {
        Some(ended) if ended < cutoff => {}
        _ => return false,
      }
    }
    if let Some(ref needle) = self.text_contains
      && !record.search_text.contains(needle.as_str())
    {
      return false;
    }
    true
  }
}
