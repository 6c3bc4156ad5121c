//! Lifecycle event streams: lazily created, multi-subscriber, with
//! per-subscriber panic isolation.

use crate::error::{panic_to_error, ErrorHook};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::trace;

/// Handle identifying one subscription on one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Names one lifecycle stream for unsubscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStream {
    Update,
    LateUpdate,
    Focus,
    Pause,
    Quit,
}

/// A multi-subscriber event stream.
///
/// Publishing happens on the consumer thread during a tick. Each subscriber
/// runs under `catch_unwind`; a panicking subscriber is reported to the
/// error hook and never aborts the tick or starves later subscribers. The
/// panicking subscriber stays subscribed, so a persistently failing
/// callback is reported once per publish.
pub struct Signal<T> {
    next: u64,
    subscribers: Vec<(SubscriptionId, Box<dyn FnMut(T) + Send>)>,
}

impl<T: Clone> Signal<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: 0,
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, callback: impl FnMut(T) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next);
        self.next += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove a subscription; returns whether it existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver `value` to every subscriber in subscription order.
    pub fn publish(&mut self, value: T, hook: &ErrorHook) {
        for (id, callback) in &mut self.subscribers {
            let value = value.clone();
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(value))) {
                hook.report(&panic_to_error(payload).context(format!("lifecycle subscriber {id:?}")));
            }
        }
    }
}

impl<T: Clone> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The five lifecycle streams, each created on first subscription and
/// shared by all subscribers for the lifetime of the loop.
pub(crate) struct LifecycleEvents {
    update: Option<Signal<u64>>,
    late_update: Option<Signal<u64>>,
    focus: Option<Signal<bool>>,
    pause: Option<Signal<bool>>,
    quit: Option<Signal<()>>,
}

impl LifecycleEvents {
    pub(crate) fn new() -> Self {
        Self {
            update: None,
            late_update: None,
            focus: None,
            pause: None,
            quit: None,
        }
    }

    pub(crate) fn subscribe_update(
        &mut self,
        callback: impl FnMut(u64) + Send + 'static,
    ) -> SubscriptionId {
        lazy(&mut self.update, LifecycleStream::Update).subscribe(callback)
    }

    pub(crate) fn subscribe_late_update(
        &mut self,
        callback: impl FnMut(u64) + Send + 'static,
    ) -> SubscriptionId {
        lazy(&mut self.late_update, LifecycleStream::LateUpdate).subscribe(callback)
    }

    pub(crate) fn subscribe_focus(
        &mut self,
        callback: impl FnMut(bool) + Send + 'static,
    ) -> SubscriptionId {
        lazy(&mut self.focus, LifecycleStream::Focus).subscribe(callback)
    }

    pub(crate) fn subscribe_pause(
        &mut self,
        callback: impl FnMut(bool) + Send + 'static,
    ) -> SubscriptionId {
        lazy(&mut self.pause, LifecycleStream::Pause).subscribe(callback)
    }

    pub(crate) fn subscribe_quit(
        &mut self,
        callback: impl FnMut(()) + Send + 'static,
    ) -> SubscriptionId {
        lazy(&mut self.quit, LifecycleStream::Quit).subscribe(callback)
    }

    pub(crate) fn unsubscribe(&mut self, stream: LifecycleStream, id: SubscriptionId) -> bool {
        match stream {
            LifecycleStream::Update => self.update.as_mut().is_some_and(|s| s.unsubscribe(id)),
            LifecycleStream::LateUpdate => {
                self.late_update.as_mut().is_some_and(|s| s.unsubscribe(id))
            }
            LifecycleStream::Focus => self.focus.as_mut().is_some_and(|s| s.unsubscribe(id)),
            LifecycleStream::Pause => self.pause.as_mut().is_some_and(|s| s.unsubscribe(id)),
            LifecycleStream::Quit => self.quit.as_mut().is_some_and(|s| s.unsubscribe(id)),
        }
    }

    pub(crate) fn publish_update(&mut self, frame: u64, hook: &ErrorHook) {
        if let Some(signal) = &mut self.update {
            signal.publish(frame, hook);
        }
    }

    pub(crate) fn publish_late_update(&mut self, frame: u64, hook: &ErrorHook) {
        if let Some(signal) = &mut self.late_update {
            signal.publish(frame, hook);
        }
    }

    pub(crate) fn publish_focus(&mut self, focused: bool, hook: &ErrorHook) {
        if let Some(signal) = &mut self.focus {
            signal.publish(focused, hook);
        }
    }

    pub(crate) fn publish_pause(&mut self, paused: bool, hook: &ErrorHook) {
        if let Some(signal) = &mut self.pause {
            signal.publish(paused, hook);
        }
    }

    pub(crate) fn publish_quit(&mut self, hook: &ErrorHook) {
        if let Some(signal) = &mut self.quit {
            signal.publish((), hook);
        }
    }
}

fn lazy<T: Clone>(slot: &mut Option<Signal<T>>, stream: LifecycleStream) -> &mut Signal<T> {
    if slot.is_none() {
        trace!(?stream, "lifecycle stream created");
    }
    slot.get_or_insert_with(Signal::new)
}
