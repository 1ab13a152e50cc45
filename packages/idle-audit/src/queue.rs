//! AuditQueue - single-flight, idle-time audit scheduler
//!
//! Rule engines are not reentrant: a second run must not start before the
//! first one settles. The queue serializes every audit behind one drain task
//! and only picks up new work while the host reports idle budget.
//!
//! - FIFO across subjects
//! - At most one pending entry per subject (queued or executing)
//! - A failing or panicking audit settles only its own ticket

use crate::error::{AuditError, Result};
use crate::idle::IdleScheduler;
use crate::subject::SubjectId;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

/// Deferred audit
type AuditTask = Box<dyn FnOnce() -> BoxFuture<'static, Settlement> + Send>;

/// Result of an executed task, delivered once its entry is gone
struct Settlement {
    succeeded: bool,
    settle: Box<dyn FnOnce() + Send>,
}

struct PendingAudit {
    key: SubjectId,
    /// Taken by the drain loop when the entry starts executing
    task: Option<AuditTask>,
}

/// Counters exposed for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Idle slices granted to the drain loop
    pub slices: u64,
    /// Entries that settled successfully (including stale subjects)
    pub completed: u64,
    /// Entries whose producer failed or panicked
    pub failed: u64,
    /// Requests coalesced into an already pending entry
    pub coalesced: u64,
    /// Entries dropped unrun because the idle scheduler failed
    pub abandoned: u64,
}

#[derive(Default)]
struct QueueState {
    running: bool,
    pending: VecDeque<PendingAudit>,
    keys: HashSet<SubjectId>,
    stats: QueueStats,
}

struct QueueShared {
    state: Mutex<QueueState>,
    scheduler: Arc<dyn IdleScheduler>,
}

/// Idle-time audit queue, shared by every auditor that talks to one engine
pub struct AuditQueue {
    shared: Arc<QueueShared>,
    handle: Handle,
}

impl AuditQueue {
    /// Create a queue on the current tokio runtime
    ///
    /// # Errors
    /// Returns `InvalidState` when called outside a runtime context.
    pub fn new(scheduler: Arc<dyn IdleScheduler>) -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| {
            AuditError::InvalidState(format!("AuditQueue requires a tokio runtime: {}", e))
        })?;
        Ok(Self::with_handle(handle, scheduler))
    }

    /// Create a queue that spawns its drain cycles on `handle`
    pub fn with_handle(handle: Handle, scheduler: Arc<dyn IdleScheduler>) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                state: Mutex::new(QueueState::default()),
                scheduler,
            }),
            handle,
        }
    }

    /// Schedule `produce` for `key`
    ///
    /// Returns `None` when an entry for `key` is already queued or running;
    /// that entry's ticket stays the only settlement for the subject.
    /// `produce` yields `Ok(None)` when the subject went stale before its turn.
    pub fn run<T, F, Fut>(&self, key: SubjectId, produce: F) -> Option<AuditTicket<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let task: AuditTask = Box::new(move || {
            async move {
                let outcome = AssertUnwindSafe(async move { produce().await })
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(AuditError::engine("audit task panicked")));
                if let Err(e) = &outcome {
                    debug!(subject = %key, error = %e, "Audit task failed");
                }
                Settlement {
                    succeeded: outcome.is_ok(),
                    settle: Box::new(move || {
                        // The caller may have dropped its ticket
                        let _ = tx.send(outcome);
                    }),
                }
            }
            .boxed()
        });

        let start_drain = {
            let mut state = self.shared.state.lock();
            if state.keys.contains(&key) {
                state.stats.coalesced += 1;
                debug!(subject = %key, "Audit already scheduled, coalescing");
                return None;
            }

            state.keys.insert(key);
            state.pending.push_back(PendingAudit {
                key,
                task: Some(task),
            });
            trace!(subject = %key, pending = state.pending.len(), "Audit queued");

            let idle = !state.running;
            state.running = true;
            idle
        };

        if start_drain {
            debug!("Starting drain cycle");
            self.handle.spawn(drain(self.shared.clone()));
        }

        Some(AuditTicket { rx })
    }

    /// Runtime the drain cycles are spawned on
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// True while a drain cycle is scheduled or executing
    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    pub fn is_pending(&self, key: SubjectId) -> bool {
        self.shared.state.lock().keys.contains(&key)
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.state.lock().stats
    }
}

impl std::fmt::Debug for AuditQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("AuditQueue")
            .field("running", &state.running)
            .field("pending", &state.pending.len())
            .field("stats", &state.stats)
            .finish()
    }
}

/// Drain loop: one idle slice at a time, one audit at a time
async fn drain(shared: Arc<QueueShared>) {
    loop {
        let deadline = match AssertUnwindSafe(shared.scheduler.next_slice())
            .catch_unwind()
            .await
        {
            Ok(deadline) => deadline,
            Err(_) => {
                abandon_pending(&shared);
                return;
            }
        };
        shared.state.lock().stats.slices += 1;

        let mut drained = 0usize;
        loop {
            let task = {
                let mut state = shared.state.lock();
                match state.pending.front_mut() {
                    Some(entry) => entry.task.take(),
                    None => {
                        state.running = false;
                        return;
                    }
                }
            };

            let settlement = match task {
                Some(task) => Some(task().await),
                None => None,
            };

            let emptied = {
                // Removal happens only after the task ran
                let mut state = shared.state.lock();
                if let Some(entry) = state.pending.pop_front() {
                    state.keys.remove(&entry.key);
                }
                match &settlement {
                    Some(s) if !s.succeeded => state.stats.failed += 1,
                    _ => state.stats.completed += 1,
                }
                drained += 1;

                let emptied = state.pending.is_empty();
                if emptied {
                    state.running = false;
                }
                emptied
            };

            // Tickets resolve with their key already free
            if let Some(settlement) = settlement {
                (settlement.settle)();
            }

            if emptied {
                debug!(drained, "Audit queue drained");
                return;
            }
            if deadline.is_exhausted() {
                break;
            }
        }

        trace!(drained, "Idle slice exhausted, requesting another");
    }
}

/// Drop every pending entry after a scheduler panic
///
/// Dropping an entry drops its ticket's sender, so the ticket settles as
/// `Abandoned`. The queue is idle afterwards and the next `run` starts a
/// fresh drain.
fn abandon_pending(shared: &QueueShared) {
    let abandoned = {
        let mut state = shared.state.lock();
        state.running = false;
        state.keys.clear();
        let abandoned = std::mem::take(&mut state.pending);
        state.stats.abandoned += abandoned.len() as u64;
        abandoned
    };

    warn!(
        abandoned = abandoned.len(),
        "Idle scheduler panicked, abandoning pending audits"
    );
    drop(abandoned);
}

/// Settles once the queued audit ran
///
/// Resolves to the producer's result, or `Abandoned` if the queue went away
/// before the entry was drained.
#[derive(Debug)]
pub struct AuditTicket<T> {
    rx: oneshot::Receiver<Result<Option<T>>>,
}

impl<T> Future for AuditTicket<T> {
    type Output = Result<Option<T>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(AuditError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}
