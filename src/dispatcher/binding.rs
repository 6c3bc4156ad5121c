//! Binding registry: tracks which loop is the process's designated
//! dispatcher and applies the configured duplicate-culling policy.
//!
//! There is no implicit global singleton. A host that wants exactly one
//! dispatcher creates a [`Binding`] at startup and registers every loop it
//! constructs; the binding decides which instance survives according to the
//! [`CullingMode`] and hands out the bound handle via [`Binding::current`].

use super::core::{Dispatcher, LifecycleState, MainLoop};
use crate::config::CullingMode;
use crate::error::DispatchError;
use crate::ids::LoopId;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// What [`Binding::initialize`] decided about the registered loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// The loop became (or already was) the bound instance.
    Bound,
    /// A different loop is already bound; this one was kept as a spare.
    KeptDuplicate,
    /// A different loop is already bound; this one was retired.
    CulledSelf,
    /// A different loop is already bound; every unbound duplicate,
    /// this one included, was retired. Carries the retired count.
    CulledDuplicates(usize),
}

struct BindingInner {
    bound: Option<Dispatcher>,
    spares: Vec<Dispatcher>,
    quitting: bool,
}

/// Process-level registry of dispatcher instances.
pub struct Binding {
    inner: Mutex<BindingInner>,
}

impl Binding {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BindingInner {
                bound: None,
                spares: Vec::new(),
                quitting: false,
            }),
        }
    }

    /// Register a loop and apply the culling policy.
    ///
    /// The first live loop registered becomes the bound instance.
    /// Registering the already-bound loop again is a no-op returning
    /// [`InitOutcome::Bound`]. For later loops the policy decides:
    /// [`CullingMode::Disabled`] keeps the newcomer as a spare,
    /// [`CullingMode::SelfOnly`] retires the newcomer, and
    /// [`CullingMode::All`] retires every unbound duplicate (the newcomer
    /// included), leaving only the bound instance.
    ///
    /// Fails with [`DispatchError::ShuttingDown`] once quit has been
    /// signaled; no new instance is ever bound during shutdown.
    pub fn initialize(
        &self,
        main_loop: &MainLoop,
        mode: CullingMode,
    ) -> Result<InitOutcome, DispatchError> {
        let mut inner = self.lock();
        if inner.quitting {
            return Err(DispatchError::ShuttingDown);
        }
        prune(&mut inner);

        let handle = main_loop.handle();
        let id = handle.id();

        let inner = &mut *inner;
        match &inner.bound {
            None => {
                info!(loop_id = %id, "dispatcher bound");
                inner.bound = Some(handle);
                Ok(InitOutcome::Bound)
            }
            Some(bound) if bound.id() == id => Ok(InitOutcome::Bound),
            Some(bound) => match mode {
                CullingMode::Disabled => {
                    inner.spares.push(handle);
                    Ok(InitOutcome::KeptDuplicate)
                }
                CullingMode::SelfOnly => {
                    warn!(
                        loop_id = %id,
                        bound_id = %bound.id(),
                        "duplicate dispatcher retired"
                    );
                    handle.retire();
                    Ok(InitOutcome::CulledSelf)
                }
                CullingMode::All => {
                    handle.retire();
                    let mut culled = 1;
                    for spare in inner.spares.drain(..) {
                        spare.retire();
                        culled += 1;
                    }
                    warn!(
                        loop_id = %id,
                        bound_id = %bound.id(),
                        culled,
                        "unbound duplicates retired"
                    );
                    Ok(InitOutcome::CulledDuplicates(culled))
                }
            },
        }
    }

    /// Handle to the bound instance, if any.
    ///
    /// If the bound loop has been destroyed, the first live spare (in
    /// registration order) is promoted. Returns `None` during shutdown.
    #[must_use]
    pub fn current(&self) -> Option<Dispatcher> {
        let mut inner = self.lock();
        if inner.quitting {
            return None;
        }
        prune(&mut inner);
        if inner.bound.is_none() && !inner.spares.is_empty() {
            let promoted = inner.spares.remove(0);
            info!(loop_id = %promoted.id(), "spare dispatcher promoted");
            inner.bound = Some(promoted);
        }
        inner.bound.clone()
    }

    /// Drop the registry's handle to a destroyed loop. Call after
    /// [`MainLoop::destroy`] so a spare can be promoted.
    pub fn release(&self, id: LoopId) {
        let mut inner = self.lock();
        if inner.bound.as_ref().is_some_and(|b| b.id() == id) {
            inner.bound = None;
        }
        inner.spares.retain(|s| s.id() != id);
    }

    /// Mark the registry as shutting down: [`Binding::initialize`] fails
    /// and [`Binding::current`] returns `None` from here on.
    ///
    /// Counterpart of [`MainLoop::notify_quit`]; neither side informs the
    /// other, so a host shutdown sequence calls both.
    pub fn notify_quit(&self) {
        self.lock().quitting = true;
    }

    // Registration state only; no user code runs under the lock.
    fn lock(&self) -> MutexGuard<'_, BindingInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Binding {
    fn default() -> Self {
        Self::new()
    }
}

fn prune(inner: &mut BindingInner) {
    if inner
        .bound
        .as_ref()
        .is_some_and(|b| b.state() == LifecycleState::Destroyed)
    {
        inner.bound = None;
    }
    inner
        .spares
        .retain(|s| s.state() != LifecycleState::Destroyed);
}
