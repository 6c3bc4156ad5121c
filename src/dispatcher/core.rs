//! Dispatcher core - the main loop object, its submission handle, and the
//! per-tick drive order.

use super::events::LifecycleEvents;
use super::{LifecycleStream, SubscriptionId};
use crate::config::DispatcherConfig;
use crate::coroutine::Coroutine;
use crate::error::{DispatchError, ErrorHook};
use crate::ids::{ActionId, LoopId};
use crate::queue::{ActionQueue, Phase, QueueMetricsSnapshot, TickContext};
use crate::scheduler::{FallbackHandler, MicroScheduler, SchedulerMetricsSnapshot};
use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{error, info};

/// Lifecycle state of a dispatcher instance.
///
/// Replaces the classic global "is quitting" flag: every creation and
/// submission path consults this enum on the owning instance instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    /// Bound or bindable; accepts submissions and drives ticks.
    Active,
    /// The host signaled shutdown. Ticks still run so queued work can
    /// finish draining, but new submissions are rejected and no new
    /// instance will be bound.
    Quitting,
    /// Released or culled; inert. Ticks and submissions both fail.
    Destroyed,
}

const STATE_ACTIVE: u8 = 0;
const STATE_QUITTING: u8 = 1;
const STATE_DESTROYED: u8 = 2;

/// State shared between the owning [`MainLoop`] and its [`Dispatcher`]
/// handles.
pub(crate) struct Shared {
    id: LoopId,
    owner: ThreadId,
    queue: ActionQueue,
    hook: ArcSwap<ErrorHook>,
    state: AtomicU8,
}

impl Shared {
    pub(crate) fn new(owner: ThreadId) -> Self {
        Self {
            id: LoopId::new(),
            owner,
            queue: ActionQueue::new(),
            hook: ArcSwap::new(Arc::new(ErrorHook::default())),
            state: AtomicU8::new(STATE_ACTIVE),
        }
    }

    pub(crate) fn id(&self) -> LoopId {
        self.id
    }

    pub(crate) fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    pub(crate) fn hook(&self) -> Arc<ErrorHook> {
        self.hook.load_full()
    }

    pub(crate) fn set_hook(&self, hook: ErrorHook) {
        self.hook.store(Arc::new(hook));
    }

    pub(crate) fn state(&self) -> LifecycleState {
        match self.state.load(Ordering::Acquire) {
            STATE_QUITTING => LifecycleState::Quitting,
            STATE_DESTROYED => LifecycleState::Destroyed,
            _ => LifecycleState::Active,
        }
    }

    pub(crate) fn set_state(&self, state: LifecycleState) {
        let raw = match state {
            LifecycleState::Active => STATE_ACTIVE,
            LifecycleState::Quitting => STATE_QUITTING,
            LifecycleState::Destroyed => STATE_DESTROYED,
        };
        self.state.store(raw, Ordering::Release);
    }

    pub(crate) fn ensure_owner(&self) -> Result<(), DispatchError> {
        let actual = thread::current().id();
        if actual == self.owner {
            return Ok(());
        }
        error!(
            loop_id = %self.id,
            expected = ?self.owner,
            actual = ?actual,
            "tick entry point called off the owner thread"
        );
        Err(DispatchError::WrongThread {
            expected: self.owner,
            actual,
        })
    }
}

/// Cloneable, thread-safe submission handle to a [`MainLoop`] (or an
/// [`IdlePump`](crate::idle::IdlePump)).
///
/// All submission is fire-and-forget: the call appends to the cross-thread
/// queue and returns immediately; the work runs on the consumer thread
/// during its next tick, exactly once, in submission order.
#[derive(Clone)]
pub struct Dispatcher {
    pub(crate) shared: Arc<Shared>,
}

impl Dispatcher {
    /// Identifier of the loop this handle submits to.
    #[must_use]
    pub fn id(&self) -> LoopId {
        self.shared.id()
    }

    /// Current lifecycle state of the loop.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.shared.state()
    }

    /// Whether the calling thread is the loop's designated consumer.
    #[must_use]
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.shared.owner
    }

    /// Submit an action to run once on the consumer thread next tick.
    pub fn submit(
        &self,
        action: impl FnOnce() + Send + 'static,
    ) -> Result<ActionId, DispatchError> {
        self.submit_with(move |_ctx| action())
    }

    /// Submit an action that needs the tick context (for example to
    /// register coroutines from within the drained closure).
    pub fn submit_with(
        &self,
        action: impl FnOnce(&mut TickContext<'_>) + Send + 'static,
    ) -> Result<ActionId, DispatchError> {
        if self.shared.state() != LifecycleState::Active {
            return Err(DispatchError::ShuttingDown);
        }
        self.shared.queue().enqueue(Box::new(action))
    }

    /// Register a coroutine into the given phase scheduler.
    ///
    /// Routed through the cross-thread queue: the coroutine eager-starts on
    /// the consumer thread during the next drain.
    pub fn submit_coroutine(
        &self,
        phase: Phase,
        task: Box<dyn Coroutine>,
    ) -> Result<ActionId, DispatchError> {
        self.submit_with(move |ctx| ctx.start_coroutine(phase, task))
    }

    /// Point-in-time queue counters.
    #[must_use]
    pub fn queue_metrics(&self) -> QueueMetricsSnapshot {
        self.shared.queue().metrics().snapshot()
    }

    /// Mark the loop destroyed and stop accepting submissions. Used by the
    /// binding layer when culling duplicates.
    pub(crate) fn retire(&self) {
        self.shared.set_state(LifecycleState::Destroyed);
        self.shared.queue().close();
        info!(loop_id = %self.id(), "dispatcher retired");
    }
}

/// Serializable point-in-time view of one loop's counters.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchStats {
    pub loop_id: LoopId,
    pub frame: u64,
    pub state: LifecycleState,
    pub queue: QueueMetricsSnapshot,
    pub update: SchedulerMetricsSnapshot,
    pub end_of_frame: SchedulerMetricsSnapshot,
}

/// The frame-driven dispatcher: owns the queue, both phase schedulers, and
/// the lifecycle event streams.
///
/// Construct it on the thread that will drive ticks; that thread becomes
/// the owner and every tick entry point verifies it. There is no implicit
/// lazy singleton: the host's startup sequence owns this object and passes
/// [`Dispatcher`] handles to producers (optionally through a
/// [`Binding`](super::Binding)).
pub struct MainLoop {
    shared: Arc<Shared>,
    update_scheduler: MicroScheduler,
    end_of_frame_scheduler: MicroScheduler,
    events: LifecycleEvents,
    frame: u64,
}

impl MainLoop {
    /// Create a loop with default configuration, owned by the current
    /// thread.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    /// Create a loop with explicit configuration, owned by the current
    /// thread.
    #[must_use]
    pub fn with_config(config: DispatcherConfig) -> Self {
        let shared = Arc::new(Shared::new(thread::current().id()));
        info!(loop_id = %shared.id(), "main loop created");
        Self {
            shared,
            update_scheduler: MicroScheduler::with_capacity(config.initial_slots),
            end_of_frame_scheduler: MicroScheduler::with_capacity(config.initial_slots),
            events: LifecycleEvents::new(),
            frame: 0,
        }
    }

    /// Identifier of this loop.
    #[must_use]
    pub fn id(&self) -> LoopId {
        self.shared.id()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.shared.state()
    }

    /// Frames ticked so far.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// A cloneable cross-thread submission handle.
    #[must_use]
    pub fn handle(&self) -> Dispatcher {
        Dispatcher {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Replace the failure handler. Takes effect from the next tick.
    pub fn set_error_hook(&self, hook: ErrorHook) {
        self.shared.set_hook(hook);
    }

    /// Install a fallback handler for deferred suspensions on one phase
    /// scheduler.
    pub fn set_fallback(&mut self, phase: Phase, handler: FallbackHandler) {
        match phase {
            Phase::Update => self.update_scheduler.set_fallback(handler),
            Phase::EndOfFrame => self.end_of_frame_scheduler.set_fallback(handler),
        }
    }

    /// Drive the update tick: publish the update event, drain the queue,
    /// run the update-phase scheduler.
    pub fn update(&mut self) -> Result<(), DispatchError> {
        self.ensure_tickable()?;
        self.frame += 1;
        let hook = self.shared.hook();

        self.events.publish_update(self.frame, &hook);

        let mut ctx = TickContext {
            update: &mut self.update_scheduler,
            end_of_frame: Some(&mut self.end_of_frame_scheduler),
            hook: &hook,
        };
        self.shared.queue().drain(&mut ctx, &hook);

        self.update_scheduler.run(&hook);
        Ok(())
    }

    /// Publish the late-update event for the current frame.
    pub fn late_update(&mut self) -> Result<(), DispatchError> {
        self.ensure_tickable()?;
        let hook = self.shared.hook();
        self.events.publish_late_update(self.frame, &hook);
        Ok(())
    }

    /// Run the end-of-frame scheduler.
    pub fn end_of_frame(&mut self) -> Result<(), DispatchError> {
        self.ensure_tickable()?;
        let hook = self.shared.hook();
        self.end_of_frame_scheduler.run(&hook);
        Ok(())
    }

    /// Register a coroutine directly from the owner thread, eager-starting
    /// it now. Cross-thread producers use
    /// [`Dispatcher::submit_coroutine`] instead.
    pub fn start_coroutine(
        &mut self,
        phase: Phase,
        task: Box<dyn Coroutine>,
    ) -> Result<(), DispatchError> {
        self.ensure_tickable()?;
        let hook = self.shared.hook();
        match phase {
            Phase::Update => self.update_scheduler.add(task, &hook),
            Phase::EndOfFrame => self.end_of_frame_scheduler.add(task, &hook),
        };
        Ok(())
    }

    /// Publish a focus change to subscribers.
    pub fn notify_focus(&mut self, focused: bool) -> Result<(), DispatchError> {
        self.ensure_tickable()?;
        let hook = self.shared.hook();
        self.events.publish_focus(focused, &hook);
        Ok(())
    }

    /// Publish a pause change to subscribers.
    pub fn notify_pause(&mut self, paused: bool) -> Result<(), DispatchError> {
        self.ensure_tickable()?;
        let hook = self.shared.hook();
        self.events.publish_pause(paused, &hook);
        Ok(())
    }

    /// Signal host shutdown: publish the quit event, stop accepting
    /// submissions, and move to [`LifecycleState::Quitting`]. Ticks keep
    /// working so already-queued work can drain.
    ///
    /// The loop holds no back-reference to registries; a host using a
    /// [`Binding`](super::Binding) must also call
    /// [`Binding::notify_quit`](super::Binding::notify_quit), or the
    /// registry can still promote a spare after this point.
    pub fn notify_quit(&mut self) -> Result<(), DispatchError> {
        self.shared.ensure_owner()?;
        if self.shared.state() != LifecycleState::Active {
            return Ok(());
        }
        let hook = self.shared.hook();
        self.events.publish_quit(&hook);
        self.shared.set_state(LifecycleState::Quitting);
        self.shared.queue().close();
        info!(loop_id = %self.id(), "main loop quitting");
        Ok(())
    }

    /// Tear the loop down. Pending actions and parked coroutines are
    /// dropped; outstanding [`Dispatcher`] handles keep failing with
    /// [`DispatchError::ShuttingDown`]. Dropping the loop without calling
    /// this has the same effect.
    pub fn destroy(self) {
        drop(self);
    }

    /// Subscribe to the update stream; the callback receives the frame
    /// number. The stream is created on first subscription.
    pub fn on_update(&mut self, callback: impl FnMut(u64) + Send + 'static) -> SubscriptionId {
        self.events.subscribe_update(callback)
    }

    /// Subscribe to the late-update stream.
    pub fn on_late_update(
        &mut self,
        callback: impl FnMut(u64) + Send + 'static,
    ) -> SubscriptionId {
        self.events.subscribe_late_update(callback)
    }

    /// Subscribe to focus changes.
    pub fn on_focus(&mut self, callback: impl FnMut(bool) + Send + 'static) -> SubscriptionId {
        self.events.subscribe_focus(callback)
    }

    /// Subscribe to pause changes.
    pub fn on_pause(&mut self, callback: impl FnMut(bool) + Send + 'static) -> SubscriptionId {
        self.events.subscribe_pause(callback)
    }

    /// Subscribe to the quit signal.
    pub fn on_quit(&mut self, callback: impl FnMut(()) + Send + 'static) -> SubscriptionId {
        self.events.subscribe_quit(callback)
    }

    /// Remove a subscription from the named stream.
    pub fn unsubscribe(&mut self, stream: LifecycleStream, id: SubscriptionId) -> bool {
        self.events.unsubscribe(stream, id)
    }

    /// Point-in-time counters across the queue and both schedulers.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            loop_id: self.id(),
            frame: self.frame,
            state: self.state(),
            queue: self.shared.queue().metrics().snapshot(),
            update: self.update_scheduler.metrics().snapshot(),
            end_of_frame: self.end_of_frame_scheduler.metrics().snapshot(),
        }
    }

    fn ensure_tickable(&self) -> Result<(), DispatchError> {
        self.shared.ensure_owner()?;
        if self.shared.state() == LifecycleState::Destroyed {
            return Err(DispatchError::ShuttingDown);
        }
        Ok(())
    }
}

impl Default for MainLoop {
    fn default() -> Self {
        Self::new()
    }
}

// Without this, a loop that is dropped mid-setup (or leaked out of a panic)
// leaves its queue open and outstanding handles feed a buffer nothing will
// ever drain.
impl Drop for MainLoop {
    fn drop(&mut self) {
        if self.shared.state() != LifecycleState::Destroyed {
            self.shared.set_state(LifecycleState::Destroyed);
            self.shared.queue().close();
            info!(loop_id = %self.shared.id(), "main loop destroyed");
        }
    }
}
