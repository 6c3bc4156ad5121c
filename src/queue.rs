//! # Cross-Thread Queue Module
//!
//! The only synchronized path into the dispatcher: a mutex-guarded,
//! swap-on-drain FIFO of pending actions.
//!
//! ## Contract
//!
//! - [`ActionQueue::enqueue`] is callable from any thread, returns
//!   immediately, never executes the action inline, and holds the lock only
//!   long enough to append.
//! - [`ActionQueue::drain`] is called once per tick by the single consumer
//!   thread. It swaps the pending buffer for an empty one under the lock,
//!   then executes the claimed batch outside the lock in submission order.
//!   Enqueues racing with a drain land in the fresh buffer and run next
//!   tick: nothing is lost, duplicated, or run early.
//! - Each action runs under panic isolation; one failing action is reported
//!   once to the error hook and never prevents the rest of the batch.
//!
//! ## Back-pressure
//!
//! None. The pending buffer grows without bound under sustained submission;
//! the practical bound is the per-tick time budget, not this queue.

use crate::coroutine::Coroutine;
use crate::error::{panic_to_error, DispatchError, ErrorHook};
use crate::ids::ActionId;
use crate::scheduler::MicroScheduler;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, trace};

/// Scheduler phase a coroutine is registered into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Resumed during the update tick, after the queue drain.
    Update,
    /// Resumed by the end-of-frame tick.
    EndOfFrame,
}

/// What a draining action sees: mutable access to the phase schedulers and
/// the error hook, so queued closures can register coroutines on the
/// consumer thread.
pub struct TickContext<'a> {
    pub(crate) update: &'a mut MicroScheduler,
    /// `None` in idle mode, where a single scheduler serves both phases.
    pub(crate) end_of_frame: Option<&'a mut MicroScheduler>,
    pub(crate) hook: &'a ErrorHook,
}

impl<'a> TickContext<'a> {
    /// Build a context for one tick. `end_of_frame` is `None` for drivers
    /// where a single scheduler serves both phases.
    #[must_use]
    pub fn new(
        update: &'a mut MicroScheduler,
        end_of_frame: Option<&'a mut MicroScheduler>,
        hook: &'a ErrorHook,
    ) -> Self {
        Self {
            update,
            end_of_frame,
            hook,
        }
    }

    /// Register a coroutine into the given phase, eager-starting it now.
    pub fn start_coroutine(&mut self, phase: Phase, task: Box<dyn Coroutine>) {
        let scheduler = match (phase, self.end_of_frame.as_deref_mut()) {
            (Phase::EndOfFrame, Some(scheduler)) => scheduler,
            _ => &mut *self.update,
        };
        scheduler.add(task, self.hook);
    }

    /// The configured failure handler.
    #[must_use]
    pub fn error_hook(&self) -> &ErrorHook {
        self.hook
    }
}

/// A queued unit of work, executed once on the consumer thread.
pub type Action = Box<dyn FnOnce(&mut TickContext<'_>) + Send + 'static>;

struct PendingAction {
    id: ActionId,
    submitted_at: Instant,
    run: Action,
}

/// Metrics for an action queue.
#[derive(Debug, Default)]
pub struct QueueMetrics {
    /// Total actions accepted
    pub enqueued: AtomicU64,
    /// Total actions executed (including failed ones)
    pub executed: AtomicU64,
    /// Total actions that panicked during execution
    pub failed: AtomicU64,
    /// Actions currently waiting for the next drain
    pub pending: AtomicUsize,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy for reporting.
    pub fn snapshot(&self) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Relaxed),
        }
    }
}

/// Serializable point-in-time queue counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueueMetricsSnapshot {
    pub enqueued: u64,
    pub executed: u64,
    pub failed: u64,
    pub pending: usize,
}

struct QueueInner {
    pending: Vec<PendingAction>,
    closed: bool,
}

/// Lock-protected FIFO accepting submissions from any thread, drained once
/// per tick by the designated consumer.
pub struct ActionQueue {
    inner: Mutex<QueueInner>,
    metrics: Arc<QueueMetrics>,
}

impl ActionQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                pending: Vec::new(),
                closed: false,
            }),
            metrics: Arc::new(QueueMetrics::new()),
        }
    }

    /// Append an action; callable from any thread, never blocks on
    /// execution, never runs the action inline.
    pub fn enqueue(&self, action: Action) -> Result<ActionId, DispatchError> {
        let id = ActionId::new();
        {
            let mut inner = self.lock();
            if inner.closed {
                return Err(DispatchError::ShuttingDown);
            }
            inner.pending.push(PendingAction {
                id,
                submitted_at: Instant::now(),
                run: action,
            });
        }
        self.metrics.enqueued.fetch_add(1, Ordering::Relaxed);
        self.metrics.pending.fetch_add(1, Ordering::Relaxed);
        trace!(action_id = %id, "action enqueued");
        Ok(id)
    }

    /// Claim the pending batch and execute it in submission order.
    ///
    /// Must be called only from the consumer thread; the dispatcher layer
    /// enforces that. Returns the number of actions executed.
    pub fn drain(&self, ctx: &mut TickContext<'_>, hook: &ErrorHook) -> usize {
        // Swap the pending list for a fresh one so enqueues during
        // execution defer to the next drain.
        let batch = {
            let mut inner = self.lock();
            std::mem::take(&mut inner.pending)
        };
        if batch.is_empty() {
            return 0;
        }

        let count = batch.len();
        self.metrics.pending.fetch_sub(count, Ordering::Relaxed);

        for action in batch {
            let queued_for = action.submitted_at.elapsed();
            let id = action.id;
            let run = action.run;
            self.metrics.executed.fetch_add(1, Ordering::Relaxed);

            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| run(ctx))) {
                self.metrics.failed.fetch_add(1, Ordering::Relaxed);
                hook.report(&panic_to_error(payload).context(format!("action {id}")));
            }

            trace!(
                action_id = %id,
                queued_ms = queued_for.as_millis() as u64,
                "action executed"
            );
        }

        debug!(count, "queue drained");
        count
    }

    /// Stop accepting submissions; called on quit and teardown.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    /// Whether the queue still accepts submissions.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.lock().closed
    }

    /// Shared handle to this queue's counters.
    #[must_use]
    pub fn metrics(&self) -> &Arc<QueueMetrics> {
        &self.metrics
    }

    // The lock only ever guards plain list state and no user code runs
    // under it, so a poisoned mutex is still structurally sound.
    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::new()
    }
}
