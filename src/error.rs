use std::any::Any;
use std::fmt;
use std::thread::ThreadId;

/// Dispatch API error
///
/// Returned by submission and tick entry points when the call itself is
/// invalid. Failures *inside* dispatched work never surface here; they are
/// routed to the [`ErrorHook`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// A tick entry point was called from a thread other than the one that
    /// constructed the dispatcher.
    ///
    /// There is no safe recovery path: work cannot be deferred to a
    /// designated thread that was never designated. Treat this as a
    /// configuration error in the host's startup sequence.
    WrongThread {
        /// Thread that constructed the dispatcher
        expected: ThreadId,
        /// Thread that made the call
        actual: ThreadId,
    },
    /// The dispatcher has quit or been destroyed; no further work is
    /// accepted and no new instance will be bound.
    ShuttingDown,
    /// A coroutine yielded a suspension request this scheduler does not
    /// drive, and no fallback handler is installed.
    UnsupportedSuspend,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::WrongThread { expected, actual } => {
                write!(
                    f,
                    "dispatch called from thread {actual:?} but the loop is owned by \
                    thread {expected:?}; ticks and direct scheduling must run on the \
                    owner thread (submit through a Dispatcher handle instead)"
                )
            }
            DispatchError::ShuttingDown => {
                write!(
                    f,
                    "dispatcher is shutting down; submissions are rejected and no \
                    new instance will be bound"
                )
            }
            DispatchError::UnsupportedSuspend => {
                write!(
                    f,
                    "coroutine yielded a deferred suspension request but no fallback \
                    handler is installed; install one with set_fallback or yield \
                    Suspend::NextTick"
                )
            }
        }
    }
}

impl std::error::Error for DispatchError {}

/// The process-wide (per dispatcher) failure handler.
///
/// Receives every failure from dispatched work exactly once: a panicking or
/// erroring action, a failed coroutine resume, or a panicking lifecycle
/// subscriber. The hook must not panic; it runs on the consumer thread in
/// the middle of a tick.
pub struct ErrorHook {
    f: Box<dyn Fn(&anyhow::Error) + Send + Sync>,
}

impl ErrorHook {
    pub fn new(f: impl Fn(&anyhow::Error) + Send + Sync + 'static) -> Self {
        Self { f: Box::new(f) }
    }

    /// Deliver one failure to the handler.
    pub fn report(&self, err: &anyhow::Error) {
        (self.f)(err);
    }
}

impl fmt::Debug for ErrorHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorHook")
    }
}

/// Default hook: log the failure and continue. Never aborts the process.
impl Default for ErrorHook {
    fn default() -> Self {
        Self::new(|err| {
            tracing::error!(error = %err, "dispatched work failed");
        })
    }
}

/// Convert a caught panic payload into an error the hook can report.
pub(crate) fn panic_to_error(payload: Box<dyn Any + Send>) -> anyhow::Error {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        anyhow::anyhow!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        anyhow::anyhow!("panicked: {msg}")
    } else {
        anyhow::anyhow!("panicked with a non-string payload")
    }
}
