//! Lifetime tracking for event handlers.
//!
//! Handlers never block the host. Work that must finish before an event
//! counts as handled is registered with [`ExtendableEvent::wait_until`];
//! work nobody waits for goes to [`Background`], which the host drains
//! before it stops.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinSet;

/// An event whose handler can extend its lifetime with pending work.
pub struct ExtendableEvent {
  kind: &'static str,
  pending: JoinSet<Result<()>>,
}

impl ExtendableEvent {
  pub fn new(kind: &'static str) -> Self {
    Self {
      kind,
      pending: JoinSet::new(),
    }
  }

  pub fn kind(&self) -> &'static str {
    self.kind
  }

  /// Keep the event alive until `work` completes. Must be called from
  /// within a tokio runtime.
  pub fn wait_until<F>(&mut self, work: F)
  where
    F: Future<Output = Result<()>> + Send + 'static,
  {
    self.pending.spawn(work);
  }

  /// Number of registered tasks that have not been collected yet.
  pub fn pending(&self) -> usize {
    self.pending.len()
  }

  /// Wait for all registered work. Every task runs to completion; the
  /// first failure is returned.
  pub async fn settle(mut self) -> Result<()> {
    let mut first_error = None;

    while let Some(joined) = self.pending.join_next().await {
      let outcome = joined
        .map_err(|e| eyre!("{} handler task failed: {}", self.kind, e))
        .and_then(|result| result);

      if let Err(e) = outcome {
        first_error.get_or_insert(e);
      }
    }

    match first_error {
      Some(e) => Err(e),
      None => Ok(()),
    }
  }
}

/// Fire-and-forget tasks spawned by handlers.
#[derive(Clone, Default)]
pub struct Background {
  tasks: Arc<Mutex<JoinSet<()>>>,
  /// Tasks spawned and not yet finished, including ones a drain is awaiting
  running: Arc<AtomicUsize>,
}

/// Decrements the running count when a task ends, even by panic or abort.
struct Running(Arc<AtomicUsize>);

impl Drop for Running {
  fn drop(&mut self) {
    self.0.fetch_sub(1, Ordering::SeqCst);
  }
}

impl Background {
  /// Start `task` without waiting for it.
  pub fn spawn<F>(&self, task: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    self.running.fetch_add(1, Ordering::SeqCst);
    let running = Running(Arc::clone(&self.running));

    let mut tasks = self.lock();
    // Reap finished tasks so the set does not grow without bound
    while tasks.try_join_next().is_some() {}
    tasks.spawn(async move {
      let _running = running;
      task.await;
    });
  }

  /// Number of tasks that have not finished yet.
  pub fn len(&self) -> usize {
    self.running.load(Ordering::SeqCst)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Wait until every spawned task, including ones spawned meanwhile, is done.
  pub async fn drain(&self) {
    loop {
      let mut tasks = std::mem::take(&mut *self.lock());
      if tasks.is_empty() {
        return;
      }
      while tasks.join_next().await.is_some() {}
    }
  }

  fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
    // A panic while holding the lock cannot leave the set inconsistent
    self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
  }
}
