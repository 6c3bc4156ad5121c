//! # Micro-Scheduler Module
//!
//! Runs a large number of cooperative coroutines per tick without paying
//! for one native thread or stackful coroutine per task.
//!
//! ## Overview
//!
//! The scheduler is an indexed slot registry. Each slot holds at most one
//! active [`TaskChain`]: a coroutine plus the stack of suspended parents it
//! was nested under. [`MicroScheduler::run`] resumes every occupied slot
//! exactly once per tick, in slot order.
//!
//! ## Flattening
//!
//! A coroutine that yields [`Suspend::Nested`] pushes itself onto the
//! chain's continuation stack and the child is driven inline, in the same
//! slot, until something yields [`Suspend::NextTick`]. Any nesting depth
//! therefore occupies exactly one slot. Entering a child and popping a
//! finished child are suspension bookkeeping, not ticks: they are driven
//! inline within the current logical step.
//!
//! ## Slot reuse
//!
//! Freed slots go on a free list and are reused by later registrations, so
//! resume order equals insertion order only until the first removal. This
//! reordering is a deliberate, documented property of the design.
//!
//! ## Threading
//!
//! No internal locking. All methods take `&mut self`, which statically
//! confines a scheduler to one thread; cross-thread producers must submit
//! through the [`ActionQueue`](crate::queue::ActionQueue) instead.

use crate::coroutine::{Coroutine, Step, Suspend};
use crate::error::{panic_to_error, DispatchError, ErrorHook};
use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// A coroutine plus its stack of suspended parents, occupying one slot.
///
/// Appears in the public API only when a task is handed to a fallback
/// handler through [`DeferredTask`]; the chain can then be driven to
/// completion by external machinery via its [`Coroutine`] impl.
pub struct TaskChain {
    current: Option<Box<dyn Coroutine>>,
    parents: Vec<Box<dyn Coroutine>>,
}

/// Outcome of driving a chain through one logical step.
enum ChainStep {
    /// Parked on a `NextTick` yield; resume next tick.
    Parked,
    /// The whole chain ran to completion.
    Done,
    /// The innermost coroutine yielded a deferred suspension request.
    Deferred(Box<dyn Any + Send>),
    /// The innermost coroutine failed or panicked.
    Failed(anyhow::Error),
}

impl TaskChain {
    fn new(task: Box<dyn Coroutine>) -> Self {
        Self {
            current: Some(task),
            parents: Vec::new(),
        }
    }

    /// Number of suspended parents collapsed into this chain's slot.
    pub fn depth(&self) -> usize {
        self.parents.len()
    }

    /// Drive one logical step: resume the innermost coroutine, entering
    /// nested children and popping finished ones inline until the chain
    /// parks, completes, defers, or fails.
    fn advance(&mut self) -> ChainStep {
        loop {
            let Some(current) = self.current.as_mut() else {
                // Chain was already consumed by a previous Done/Failed.
                return ChainStep::Done;
            };

            let resumed = catch_unwind(AssertUnwindSafe(|| current.resume()));
            match resumed {
                Err(payload) => {
                    self.current = None;
                    self.parents.clear();
                    return ChainStep::Failed(panic_to_error(payload));
                }
                Ok(Err(err)) => {
                    self.current = None;
                    self.parents.clear();
                    return ChainStep::Failed(err);
                }
                Ok(Ok(Step::Complete)) => match self.parents.pop() {
                    Some(parent) => {
                        self.current = Some(parent);
                    }
                    None => {
                        self.current = None;
                        return ChainStep::Done;
                    }
                },
                Ok(Ok(Step::Yielded(Suspend::NextTick))) => return ChainStep::Parked,
                Ok(Ok(Step::Yielded(Suspend::Nested(child)))) => {
                    // Collapse the nesting into this slot: the parent waits
                    // on the continuation stack while the child is driven
                    // inline.
                    let parent = self
                        .current
                        .replace(child)
                        .unwrap_or_else(|| unreachable_parent());
                    self.parents.push(parent);
                }
                Ok(Ok(Step::Yielded(Suspend::Defer(request)))) => {
                    return ChainStep::Deferred(request)
                }
            }
        }
    }
}

// `current` is always Some while advance() loops, so the replace() above
// cannot yield None; an empty chain stands in rather than a panic path.
fn unreachable_parent() -> Box<dyn Coroutine> {
    crate::coroutine::steps(std::iter::empty::<Suspend>())
}

impl Coroutine for TaskChain {
    fn resume(&mut self) -> anyhow::Result<Step> {
        match self.advance() {
            ChainStep::Parked => Ok(Step::Yielded(Suspend::NextTick)),
            ChainStep::Done => Ok(Step::Complete),
            ChainStep::Deferred(request) => Ok(Step::Yielded(Suspend::Defer(request))),
            ChainStep::Failed(err) => Err(err),
        }
    }
}

/// A task that yielded [`Suspend::Defer`], handed off to the fallback
/// handler together with its opaque request.
pub struct DeferredTask {
    /// The suspension request the scheduler could not interpret.
    pub request: Box<dyn Any + Send>,
    /// The full flattened chain; resuming it continues past the deferred
    /// yield once the external wait is satisfied.
    pub task: TaskChain,
}

/// Handler for suspension kinds this scheduler does not drive.
pub type FallbackHandler = Box<dyn FnMut(DeferredTask) + Send>;

/// Metrics for a micro-scheduler.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    /// Total coroutines registered (including those finishing at eager start)
    pub started: AtomicU64,
    /// Total logical steps driven across all slots
    pub resumed: AtomicU64,
    /// Total chains that ran to completion
    pub completed: AtomicU64,
    /// Total chains discarded after an error or panic
    pub failed: AtomicU64,
    /// Total chains handed to the fallback handler (or rejected)
    pub deferred: AtomicU64,
    /// Currently occupied slots
    pub active: AtomicUsize,
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy for reporting.
    pub fn snapshot(&self) -> SchedulerMetricsSnapshot {
        SchedulerMetricsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            resumed: self.resumed.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
        }
    }
}

/// Serializable point-in-time scheduler counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SchedulerMetricsSnapshot {
    pub started: u64,
    pub resumed: u64,
    pub completed: u64,
    pub failed: u64,
    pub deferred: u64,
    pub active: usize,
}

/// Indexed registry of suspended coroutines, resumed once per tick.
pub struct MicroScheduler {
    slots: Vec<Option<TaskChain>>,
    free: Vec<usize>,
    fallback: Option<FallbackHandler>,
    metrics: Arc<SchedulerMetrics>,
}

impl MicroScheduler {
    /// Create a scheduler with the default initial slot capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(16)
    }

    /// Create a scheduler with room for `initial_slots` tasks before the
    /// first regrowth.
    #[must_use]
    pub fn with_capacity(initial_slots: usize) -> Self {
        Self {
            slots: Vec::with_capacity(initial_slots.max(1)),
            free: Vec::new(),
            fallback: None,
            metrics: Arc::new(SchedulerMetrics::new()),
        }
    }

    /// Install the handler for deferred suspension requests.
    ///
    /// Without one, a task yielding [`Suspend::Defer`] is rejected through
    /// the error hook and discarded.
    pub fn set_fallback(&mut self, handler: FallbackHandler) {
        self.fallback = Some(handler);
    }

    /// Register a coroutine and advance it by one step immediately
    /// (eager-start semantics).
    ///
    /// Returns the occupied slot index, or `None` when the task completed,
    /// failed, or deferred during its first step and never took a slot.
    /// The index stays valid until the task finishes or fails.
    pub fn add(&mut self, task: Box<dyn Coroutine>, hook: &ErrorHook) -> Option<usize> {
        self.metrics.started.fetch_add(1, Ordering::Relaxed);
        self.metrics.resumed.fetch_add(1, Ordering::Relaxed);

        let mut chain = TaskChain::new(task);
        match chain.advance() {
            ChainStep::Parked => {
                let idx = self.occupy(chain);
                trace!(slot = idx, "coroutine parked at eager start");
                Some(idx)
            }
            ChainStep::Done => {
                self.metrics.completed.fetch_add(1, Ordering::Relaxed);
                None
            }
            ChainStep::Failed(err) => {
                self.metrics.failed.fetch_add(1, Ordering::Relaxed);
                hook.report(&err);
                None
            }
            ChainStep::Deferred(request) => {
                self.hand_off(chain, request, hook);
                None
            }
        }
    }

    /// Resume every occupied slot once, in slot order.
    ///
    /// Finished chains free their slot; failed chains are reported once to
    /// the hook, freed, and never retried.
    pub fn run(&mut self, hook: &ErrorHook) {
        for idx in 0..self.slots.len() {
            let outcome = match self.slots[idx].as_mut() {
                Some(chain) => {
                    self.metrics.resumed.fetch_add(1, Ordering::Relaxed);
                    chain.advance()
                }
                None => continue,
            };

            match outcome {
                ChainStep::Parked => {}
                ChainStep::Done => {
                    self.metrics.completed.fetch_add(1, Ordering::Relaxed);
                    self.release(idx);
                }
                ChainStep::Failed(err) => {
                    self.metrics.failed.fetch_add(1, Ordering::Relaxed);
                    hook.report(&err);
                    self.release(idx);
                }
                ChainStep::Deferred(request) => {
                    if let Some(chain) = self.slots[idx].take() {
                        self.free.push(idx);
                        self.metrics.active.fetch_sub(1, Ordering::Relaxed);
                        self.hand_off(chain, request, hook);
                    }
                }
            }
        }
    }

    /// Number of currently occupied slots.
    #[must_use]
    pub fn active(&self) -> usize {
        self.metrics.active.load(Ordering::Relaxed)
    }

    /// Current slot capacity. Grows by doubling, never shrinks.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Shared handle to this scheduler's counters.
    #[must_use]
    pub fn metrics(&self) -> &Arc<SchedulerMetrics> {
        &self.metrics
    }

    fn occupy(&mut self, chain: TaskChain) -> usize {
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(chain);
                idx
            }
            None => {
                if self.slots.len() == self.slots.capacity() {
                    // Capacity doubles when exceeded; it never shrinks.
                    let grow = self.slots.capacity().max(1);
                    self.slots.reserve_exact(grow);
                    debug!(capacity = self.slots.capacity(), "scheduler slots grown");
                }
                self.slots.push(Some(chain));
                self.slots.len() - 1
            }
        };
        self.metrics.active.fetch_add(1, Ordering::Relaxed);
        idx
    }

    fn release(&mut self, idx: usize) {
        self.slots[idx] = None;
        self.free.push(idx);
        self.metrics.active.fetch_sub(1, Ordering::Relaxed);
    }

    fn hand_off(
        &mut self,
        chain: TaskChain,
        request: Box<dyn Any + Send>,
        hook: &ErrorHook,
    ) {
        self.metrics.deferred.fetch_add(1, Ordering::Relaxed);
        match self.fallback.as_mut() {
            Some(fallback) => {
                debug!(depth = chain.depth(), "handing deferred task to fallback");
                fallback(DeferredTask {
                    request,
                    task: chain,
                });
            }
            None => {
                hook.report(&anyhow::Error::new(DispatchError::UnsupportedSuspend));
            }
        }
    }
}

impl Default for MicroScheduler {
    fn default() -> Self {
        Self::new()
    }
}
