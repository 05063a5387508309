//! Debounced whole-collection saves
//!
//! Every [`WriteScheduler::schedule`] call replaces the pending snapshot and
//! restarts the quiet-period timer. When the timer fires, the latest snapshot
//! is persisted. At most one write is pending at any time; a new request
//! supersedes the old one instead of queueing behind it.
//!
//! A process killed inside the quiet window loses only the changes made
//! since the last completed write.

use crate::models::Note;
use crate::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Destination of debounced snapshots
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Durably store the full collection
    async fn persist(&self, notes: Vec<Note>) -> Result<()>;
}

struct Pending {
    snapshot: Option<Vec<Note>>,
    timer: Option<JoinHandle<()>>,
    // bumped by every schedule/cancel/flush; a timer only fires for its own
    generation: u64,
}

/// Debounce scheduler
pub struct WriteScheduler {
    sink: Arc<dyn SnapshotSink>,
    quiet_period: Duration,
    pending: Arc<Mutex<Pending>>,
}

impl WriteScheduler {
    /// Create scheduler. Must be used from within a tokio runtime.
    pub fn new(sink: Arc<dyn SnapshotSink>, quiet_period: Duration) -> Self {
        Self {
            sink,
            quiet_period,
            pending: Arc::new(Mutex::new(Pending {
                snapshot: None,
                timer: None,
                generation: 0,
            })),
        }
    }

    /// Quiet period
    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Request a save of `snapshot` after the quiet period
    pub fn schedule(&self, snapshot: Vec<Note>) {
        let mut pending = self.pending.lock();
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        pending.snapshot = Some(snapshot);
        pending.generation += 1;
        let generation = pending.generation;

        let sink = Arc::clone(&self.sink);
        let shared = Arc::clone(&self.pending);
        let quiet_period = self.quiet_period;
        pending.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            let snapshot = {
                let mut pending = shared.lock();
                if pending.generation != generation {
                    return;
                }
                pending.timer = None;
                pending.snapshot.take()
            };
            if let Some(notes) = snapshot {
                let count = notes.len();
                match sink.persist(notes).await {
                    Ok(()) => tracing::debug!("Debounced save wrote {} notes", count),
                    Err(e) => tracing::error!("Debounced save failed: {}", e),
                }
            }
        }));
    }

    /// A snapshot is waiting for its timer
    pub fn has_pending(&self) -> bool {
        self.pending.lock().snapshot.is_some()
    }

    /// Drop the pending snapshot without writing it
    pub fn cancel(&self) {
        let mut pending = self.pending.lock();
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        pending.generation += 1;
        pending.snapshot = None;
    }

    /// Write the pending snapshot now (shutdown path). No-op when nothing is
    /// pending.
    pub async fn flush(&self) -> Result<()> {
        let snapshot = {
            let mut pending = self.pending.lock();
            if let Some(timer) = pending.timer.take() {
                timer.abort();
            }
            pending.generation += 1;
            pending.snapshot.take()
        };
        match snapshot {
            Some(notes) => self.sink.persist(notes).await,
            None => Ok(()),
        }
    }
}

impl Drop for WriteScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.pending.lock().timer.take() {
            timer.abort();
        }
    }
}
