//! Ordered, single-consumer queue for cross-domain side effects.
//!
//! State machine: `Idle -> Draining -> Idle`. The first enqueue from `Idle`
//! spawns the drain loop; later enqueues are picked up by the running loop.
//! The `draining` flag lives under the same lock as the deque, so the loop
//! can never exit while an operation is waiting.
//!
//! Operations run strictly one at a time, in enqueue order. A failed
//! operation is retried per [`RetryPolicy`], then recorded as a
//! [`DeadLetter`]; the loop always moves on.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use fieldhouse_core::{Clock, QueuedOperation, SyncOperation, SyncOperationId};
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::Instrument;

use crate::error::panic_message;

mod retry;

pub use retry::{DeadLetter, RetryPolicy};

// ---------------------------------------------------------------------------
// SyncExecutor trait
// ---------------------------------------------------------------------------

/// Executes dequeued operations.
#[async_trait]
pub trait SyncExecutor: Send + Sync + 'static {
    async fn execute(&self, operation: &SyncOperation) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Public state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Idle,
    Draining,
}

/// Counters since the queue was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Retry attempts made (not counting first attempts).
    pub retried: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

// ---------------------------------------------------------------------------
// SyncQueue
// ---------------------------------------------------------------------------

struct Inner {
    pending: VecDeque<QueuedOperation>,
    draining: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    executor: Weak<dyn SyncExecutor>,
    retry: RetryPolicy,
    dead_letters: Mutex<VecDeque<DeadLetter>>,
    dead_letter_capacity: usize,
    counters: Counters,
    idle: Notify,
    clock: Arc<dyn Clock>,
}

/// FIFO work queue. Cheap to clone; clones share the same queue.
#[derive(Clone)]
pub struct SyncQueue {
    shared: Arc<Shared>,
}

impl SyncQueue {
    /// Creates an idle queue.
    ///
    /// The executor is held weakly so an executor that owns its queue does
    /// not keep itself alive. Operations dequeued after the executor is
    /// dropped are discarded.
    pub fn new(
        executor: Weak<dyn SyncExecutor>,
        retry: RetryPolicy,
        dead_letter_capacity: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    pending: VecDeque::new(),
                    draining: false,
                }),
                executor,
                retry,
                dead_letters: Mutex::new(VecDeque::new()),
                dead_letter_capacity,
                counters: Counters::default(),
                idle: Notify::new(),
                clock,
            }),
        }
    }

    /// Appends `operation` and makes sure a drain loop is running.
    ///
    /// Must be called from within a tokio runtime for the operation to be
    /// processed; outside one it stays queued until the next enqueue that is.
    pub fn enqueue(&self, operation: SyncOperation) -> SyncOperationId {
        let queued = QueuedOperation::new(operation, self.shared.clock.now());
        let id = queued.id;
        let kind = queued.operation.kind();

        // The drain flag is only claimed when a runtime can take the drain.
        let runtime = tokio::runtime::Handle::try_current().ok();
        let start_drain = {
            let mut inner = self.shared.inner.lock();
            inner.pending.push_back(queued);
            let claim = runtime.is_some() && !inner.draining;
            if claim {
                inner.draining = true;
            }
            claim
        };
        self.shared.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(operation_id = %id, kind, "sync operation enqueued");

        match runtime {
            Some(runtime) if start_drain => {
                runtime.spawn(drain(Arc::clone(&self.shared)));
            }
            Some(_) => {}
            None => {
                tracing::warn!(operation_id = %id, "no async runtime; operation left queued");
            }
        }
        id
    }

    #[must_use]
    pub fn state(&self) -> QueueState {
        if self.shared.inner.lock().draining {
            QueueState::Draining
        } else {
            QueueState::Idle
        }
    }

    /// Operations waiting to run (excluding the one in flight).
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.inner.lock().pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let c = &self.shared.counters;
        QueueStats {
            enqueued: c.enqueued.load(Ordering::Relaxed),
            succeeded: c.succeeded.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            retried: c.retried.load(Ordering::Relaxed),
        }
    }

    /// Permanently failed operations, oldest first.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.shared.dead_letters.lock().iter().cloned().collect()
    }

    /// Resolves once the queue is idle.
    pub async fn wait_idle(&self) {
        loop {
            let mut notified = std::pin::pin!(self.shared.idle.notified());
            notified.as_mut().enable();
            if !self.shared.inner.lock().draining {
                return;
            }
            notified.await;
        }
    }
}

async fn drain(shared: Arc<Shared>) {
    tracing::debug!("sync queue draining");
    loop {
        let next = {
            let mut inner = shared.inner.lock();
            match inner.pending.pop_front() {
                Some(op) => op,
                None => {
                    inner.draining = false;
                    break;
                }
            }
        };
        shared.process(next).await;
    }
    shared.idle.notify_waiters();
    tracing::debug!("sync queue idle");
}

impl Shared {
    async fn process(&self, queued: QueuedOperation) {
        let span = tracing::info_span!(
            "sync_operation",
            operation_id = %queued.id,
            kind = queued.operation.kind(),
            attempts = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );
        self.run_with_retry(queued).instrument(span).await;
    }

    async fn run_with_retry(&self, queued: QueuedOperation) {
        let Some(executor) = self.executor.upgrade() else {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::Span::current().record("outcome", "discarded");
            tracing::warn!("executor dropped; discarding sync operation");
            return;
        };

        let max_attempts = self.retry.effective_attempts();
        let mut attempt = 1;
        loop {
            let result = AssertUnwindSafe(executor.execute(&queued.operation))
                .catch_unwind()
                .await;
            let error = match result {
                Ok(Ok(())) => {
                    self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                    tracing::Span::current().record("attempts", attempt);
                    tracing::Span::current().record("outcome", "ok");
                    tracing::info!(attempts = attempt, outcome = "ok", "sync operation complete");
                    return;
                }
                Ok(Err(err)) => format!("{err:#}"),
                Err(panic) => format!("executor panicked: {}", panic_message(panic.as_ref())),
            };

            if attempt >= max_attempts {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::Span::current().record("attempts", attempt);
                tracing::Span::current().record("outcome", "dead_letter");
                tracing::warn!(attempts = attempt, error = %error, "sync operation failed");
                self.dead_letter(queued, error, attempt);
                return;
            }

            let delay = self.retry.delay(attempt);
            self.counters.retried.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "sync operation failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn dead_letter(&self, operation: QueuedOperation, error: String, attempts: u32) {
        if self.dead_letter_capacity == 0 {
            return;
        }
        let mut letters = self.dead_letters.lock();
        letters.push_back(DeadLetter {
            operation,
            error,
            attempts,
            failed_at: self.clock.now(),
        });
        while letters.len() > self.dead_letter_capacity {
            letters.pop_front();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
