//! # Coroutine Module
//!
//! The resumable-task abstraction driven by the micro-scheduler.
//!
//! A [`Coroutine`] is a unit of work advanced one discrete step at a time.
//! Each resume either completes, fails, or yields a [`Suspend`] request:
//!
//! - [`Suspend::NextTick`] parks the task until the next scheduler tick.
//!   This is the cheap, flattenable kind the micro-scheduler is built for.
//! - [`Suspend::Nested`] names a child coroutine that must run to
//!   completion before the parent resumes. The scheduler collapses any
//!   nesting depth into a single registry slot.
//! - [`Suspend::Defer`] carries an opaque request for a wait primitive this
//!   scheduler does not drive (timers, I/O readiness, host-specific waits).
//!   Deferred tasks are handed to a configurable fallback handler, or
//!   rejected through the error hook if none is installed.
//!
//! Failures use `anyhow::Error` so task bodies can use `?` freely.

use std::any::Any;

/// Suspension request yielded by a resumed coroutine.
pub enum Suspend {
    /// Park in the current slot and resume on the next tick.
    NextTick,
    /// Run the given child coroutine to completion, in the same slot,
    /// before resuming this one.
    Nested(Box<dyn Coroutine>),
    /// A wait kind outside this scheduler's scope. The payload is opaque to
    /// the scheduler and interpreted by the installed fallback handler.
    Defer(Box<dyn Any + Send>),
}

impl std::fmt::Debug for Suspend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Suspend::NextTick => write!(f, "NextTick"),
            Suspend::Nested(_) => write!(f, "Nested(..)"),
            Suspend::Defer(_) => write!(f, "Defer(..)"),
        }
    }
}

/// Outcome of one successful resume.
#[derive(Debug)]
pub enum Step {
    /// The coroutine suspended and wants to be resumed again.
    Yielded(Suspend),
    /// The coroutine finished; it will never be resumed again.
    Complete,
}

/// A resumable, step-producing unit of work.
///
/// Implementations must be cheap to resume: one step per tick, no blocking.
/// A coroutine that returns `Err` (or panics) is reported once to the error
/// hook and discarded; it is never retried.
pub trait Coroutine: Send {
    /// Advance by exactly one step.
    fn resume(&mut self) -> anyhow::Result<Step>;
}

struct StepFn<F> {
    f: F,
}

impl<F> Coroutine for StepFn<F>
where
    F: FnMut() -> anyhow::Result<Step> + Send,
{
    fn resume(&mut self) -> anyhow::Result<Step> {
        (self.f)()
    }
}

/// Build a coroutine from a closure invoked once per resume.
///
/// The closure owns whatever state the task needs; yielding and completing
/// are expressed through the returned [`Step`].
pub fn from_fn<F>(f: F) -> Box<dyn Coroutine>
where
    F: FnMut() -> anyhow::Result<Step> + Send + 'static,
{
    Box::new(StepFn { f })
}

struct StepIter<I> {
    iter: I,
}

impl<I> Coroutine for StepIter<I>
where
    I: Iterator<Item = Suspend> + Send,
{
    fn resume(&mut self) -> anyhow::Result<Step> {
        match self.iter.next() {
            Some(suspend) => Ok(Step::Yielded(suspend)),
            None => Ok(Step::Complete),
        }
    }
}

/// Build a coroutine from a sequence of suspension requests.
///
/// Each resume yields the next request; the coroutine completes when the
/// sequence is exhausted. Mostly useful for tests and simple delays.
pub fn steps<I>(iter: I) -> Box<dyn Coroutine>
where
    I: IntoIterator<Item = Suspend>,
    I::IntoIter: Send + 'static,
{
    Box::new(StepIter {
        iter: iter.into_iter(),
    })
}
