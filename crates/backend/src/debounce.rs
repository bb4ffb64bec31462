//! Leading-edge debouncer for async actions.
//!
//! Guarantees a minimum interval between executions of a supplied action,
//! keeping only the most recently staged action between timer ticks.
//!
//! # Design
//!
//! - The first `invoke` executes its action immediately (leading edge) and
//!   arms a repeating ticker whose first tick fires one interval later.
//! - Every later `invoke` replaces the staged action; the displaced action
//!   is dropped unexecuted.
//! - Each tick takes the staged action only after claiming an execution
//!   slot. A busy slot skips the tick: the action stays staged, nothing is
//!   re-queued, and the ticker never waits on the slot.
//! - Actions run in their own task, so a panicking action cannot take the
//!   ticker down with it. The slot permit is owned by that task and is
//!   released when it ends, unwinding included.
//!
//! A zero interval is a configuration error. `concurrency = None` removes
//! the slot gate entirely; `Some(0)` is rejected.

use std::{
  sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use futures::future::BoxFuture;
use tokio::{
  sync::Semaphore,
  time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::trace;

type StagedAction = BoxFuture<'static, ()>;

#[derive(Debug, thiserror::Error)]
pub enum DebounceError {
  #[error("debounce interval must be greater than zero")]
  ZeroInterval,
  #[error("concurrency limit must be greater than zero (use None for unlimited)")]
  ZeroConcurrency,
}

/// Rate limiter for a single stream of actions.
///
/// Must be used from within a tokio runtime; executions and the ticker are
/// spawned tasks. Dropping the debouncer stops the ticker; any staged
/// action is discarded unless [`Debouncer::dispose`] flushed it first.
pub struct Debouncer {
  shared: Arc<Shared>,
  interval: Duration,
  cancel: CancellationToken,
  primed: AtomicBool,
  disposed: AtomicBool,
}

struct Shared {
  /// Single staged-action slot. Mutex-guarded so a concurrent `invoke` and
  /// a timer tick cannot tear the swap.
  staged: Mutex<Option<StagedAction>>,
  slots: Option<Arc<Semaphore>>,
}

impl Shared {
  fn staged_slot(&self) -> std::sync::MutexGuard<'_, Option<StagedAction>> {
    self.staged.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Run `action` now if a slot is free, otherwise stage it for the next
  /// tick that finds one.
  fn execute_or_stage(&self, action: StagedAction) {
    match &self.slots {
      Some(semaphore) => match semaphore.clone().try_acquire_owned() {
        Ok(permit) => {
          tokio::spawn(async move {
            action.await;
            drop(permit);
          });
        }
        Err(_) => {
          trace!("All execution slots busy, staging leading action");
          *self.staged_slot() = Some(action);
        }
      },
      None => {
        tokio::spawn(action);
      }
    }
  }

  /// Tick handler: claim a slot first, then take the staged action, so a
  /// busy tick leaves the staged action untouched.
  fn run_staged(&self) {
    if self.staged_slot().is_none() {
      return;
    }

    let permit = match &self.slots {
      Some(semaphore) => match semaphore.clone().try_acquire_owned() {
        Ok(permit) => Some(permit),
        Err(_) => {
          trace!("Tick skipped, previous execution still running");
          return;
        }
      },
      None => None,
    };

    // The slot may have been drained by dispose between the check and here
    if let Some(action) = self.staged_slot().take() {
      tokio::spawn(async move {
        action.await;
        drop(permit);
      });
    }
  }
}

impl Debouncer {
  pub fn new(interval: Duration, concurrency: Option<usize>) -> Result<Self, DebounceError> {
    if interval.is_zero() {
      return Err(DebounceError::ZeroInterval);
    }
    if concurrency == Some(0) {
      return Err(DebounceError::ZeroConcurrency);
    }

    Ok(Self {
      shared: Arc::new(Shared {
        staged: Mutex::new(None),
        slots: concurrency.map(|n| Arc::new(Semaphore::new(n))),
      }),
      interval,
      cancel: CancellationToken::new(),
      primed: AtomicBool::new(false),
      disposed: AtomicBool::new(false),
    })
  }

  /// Request an execution of `action`.
  ///
  /// The first call runs its action right away and arms the ticker. Later
  /// calls stage the action for the next tick, displacing whatever was
  /// staged before. After `dispose` the action is dropped.
  pub fn invoke<F>(&self, action: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    if self.disposed.load(Ordering::SeqCst) {
      trace!("Debouncer disposed, dropping invocation");
      return;
    }

    let action: StagedAction = Box::pin(action);

    if !self.primed.swap(true, Ordering::SeqCst) {
      self.shared.execute_or_stage(action);
      self.spawn_ticker();
    } else {
      *self.shared.staged_slot() = Some(action);
      // A dispose racing the store above must not leave a staged action
      // behind a stopped ticker
      if self.disposed.load(Ordering::SeqCst) {
        self.shared.staged_slot().take();
      }
    }
  }

  /// Stop the ticker. With `flush`, the currently staged action (if any)
  /// runs inline exactly once, ungated; without it the action is dropped.
  /// Idempotent: only the first call observes a staged action.
  pub async fn dispose(&self, flush: bool) {
    if self.disposed.swap(true, Ordering::SeqCst) {
      return;
    }
    self.cancel.cancel();

    let staged = self.shared.staged_slot().take();
    match staged {
      Some(action) if flush => action.await,
      Some(_) => trace!("Staged action discarded on dispose"),
      None => {}
    }
  }

  fn spawn_ticker(&self) {
    let shared = Arc::clone(&self.shared);
    let cancel = self.cancel.clone();
    let period = self.interval;

    tokio::spawn(async move {
      // First tick fires one full interval after the leading execution
      let mut ticker = time::interval_at(time::Instant::now() + period, period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

      loop {
        tokio::select! {
          biased;

          _ = cancel.cancelled() => break,

          _ = ticker.tick() => shared.run_staged(),
        }
      }
    });
  }
}

impl Drop for Debouncer {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}
