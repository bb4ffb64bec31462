//! Search lifecycle orchestration.
//!
//! This crate owns the concurrency-coordination half of dragnet: the
//! [`Debouncer`] that bounds how often response-driven progress is persisted
//! and broadcast, and the [`SearchOrchestrator`] that drives each search
//! from registration through cancellation to exactly-once finalization.
//!
//! # Architecture
//!
//! - Each search runs as one spawned task that owns its `SearchRecord`.
//!   Engine progress arrives on a per-search mpsc channel, so mutations are
//!   applied by a single consumer and never interleave.
//! - The external collaborators are trait objects: [`SearchEngine`]
//!   discovers results, `SearchStore` (from `dragnet-db`) holds durable
//!   snapshots, and [`BroadcastSink`] fans announcements out to consumers.
//! - Cancellation is cooperative: [`CancellationRegistry`] maps a live
//!   search id to its `CancellationToken`, and the entry is removed on every
//!   exit path of the run task.

mod broadcast;
mod debounce;
mod engine;
mod orchestrator;
mod registry;


pub use broadcast::{BroadcastError, BroadcastSink, ChannelSink, SearchEvent};
pub use debounce::{DebounceError, Debouncer};
pub use engine::{EngineError, EngineEvent, EngineRequest, EngineSummary, SearchEngine};
pub use orchestrator::{OrchestratorError, SearchOrchestrator};
pub use registry::CancellationRegistry;
