//! # Idle Pump Module
//!
//! Alternate driver for hosts without a frame loop: the same cross-thread
//! queue and micro-scheduler, ticked opportunistically from idle time
//! instead of once per frame.
//!
//! ## Differences from [`MainLoop`](crate::dispatcher::MainLoop)
//!
//! - One scheduler serves both phases; a coroutine registered for
//!   [`Phase::EndOfFrame`](crate::queue::Phase::EndOfFrame) runs on the
//!   same idle tick as everything else.
//! - No lifecycle event streams. Idle hosts have no frame, focus, or pause
//!   notions to publish.
//!
//! Queue ordering, eager start, nesting flattening, and panic isolation are
//! otherwise identical; producers use the same [`Dispatcher`] handle type
//! and cannot tell which driver is on the other end.

use crate::config::DispatcherConfig;
use crate::coroutine::Coroutine;
use crate::dispatcher::{Dispatcher, LifecycleState};
use crate::error::{DispatchError, ErrorHook};
use crate::ids::LoopId;
use crate::queue::TickContext;
use crate::scheduler::{FallbackHandler, MicroScheduler};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Idle-time dispatcher driver.
///
/// Owned by the thread that constructed it; [`IdlePump::pump`] verifies the
/// caller the same way the frame-driven loop does.
pub struct IdlePump {
    shared: Arc<crate::dispatcher::Shared>,
    scheduler: MicroScheduler,
    interval: Duration,
}

impl IdlePump {
    /// Create a pump with default configuration, owned by the current
    /// thread.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    /// Create a pump with explicit configuration, owned by the current
    /// thread.
    #[must_use]
    pub fn with_config(config: DispatcherConfig) -> Self {
        let shared = Arc::new(crate::dispatcher::Shared::new(thread::current().id()));
        info!(loop_id = %shared.id(), "idle pump created");
        Self {
            shared,
            scheduler: MicroScheduler::with_capacity(config.initial_slots),
            interval: config.idle_interval,
        }
    }

    /// Identifier of this pump.
    #[must_use]
    pub fn id(&self) -> LoopId {
        self.shared.id()
    }

    /// A cloneable cross-thread submission handle.
    #[must_use]
    pub fn handle(&self) -> Dispatcher {
        Dispatcher {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Replace the failure handler.
    pub fn set_error_hook(&self, hook: ErrorHook) {
        self.shared.set_hook(hook);
    }

    /// Install a fallback handler for deferred suspensions.
    pub fn set_fallback(&mut self, handler: FallbackHandler) {
        self.scheduler.set_fallback(handler);
    }

    /// Register a coroutine directly from the owner thread, eager-starting
    /// it now.
    pub fn start_coroutine(&mut self, task: Box<dyn Coroutine>) -> Result<(), DispatchError> {
        self.ensure_tickable()?;
        let hook = self.shared.hook();
        self.scheduler.add(task, &hook);
        Ok(())
    }

    /// Drive one idle tick: drain the queue, then resume every parked
    /// coroutine once. Returns the number of actions drained.
    pub fn pump(&mut self) -> Result<usize, DispatchError> {
        self.ensure_tickable()?;
        let hook = self.shared.hook();

        let mut ctx = TickContext {
            update: &mut self.scheduler,
            end_of_frame: None,
            hook: &hook,
        };
        let drained = self.shared.queue().drain(&mut ctx, &hook);

        self.scheduler.run(&hook);
        Ok(drained)
    }

    /// Tick repeatedly until `deadline`, sleeping the configured idle
    /// interval between empty ticks. Returns the total actions drained.
    pub fn drive_until(&mut self, deadline: Instant) -> Result<usize, DispatchError> {
        let mut total = 0;
        while Instant::now() < deadline {
            let drained = self.pump()?;
            total += drained;
            if drained == 0 && self.scheduler.active() == 0 {
                let remaining = deadline.saturating_duration_since(Instant::now());
                thread::sleep(self.interval.min(remaining));
            }
        }
        debug!(loop_id = %self.id(), total, "idle drive finished");
        Ok(total)
    }

    /// Number of coroutines currently parked in the scheduler.
    #[must_use]
    pub fn active(&self) -> usize {
        self.scheduler.active()
    }

    /// Tear the pump down. Pending actions and parked coroutines are
    /// dropped; outstanding handles keep failing with
    /// [`DispatchError::ShuttingDown`]. Dropping the pump without calling
    /// this has the same effect.
    pub fn shutdown(self) {
        drop(self);
    }

    fn ensure_tickable(&self) -> Result<(), DispatchError> {
        self.shared.ensure_owner()?;
        if self.shared.state() == LifecycleState::Destroyed {
            return Err(DispatchError::ShuttingDown);
        }
        Ok(())
    }
}

impl Default for IdlePump {
    fn default() -> Self {
        Self::new()
    }
}

// Same teardown guarantee as the frame-driven loop: a dropped pump must not
// leave its queue accepting work nothing will drain.
impl Drop for IdlePump {
    fn drop(&mut self) {
        if self.shared.state() != LifecycleState::Destroyed {
            self.shared.set_state(LifecycleState::Destroyed);
            self.shared.queue().close();
            info!(loop_id = %self.shared.id(), "idle pump shut down");
        }
    }
}
