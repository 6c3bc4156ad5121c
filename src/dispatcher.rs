//! # Dispatcher Module
//!
//! The process-wide owner of the cross-thread queue and the phase
//! schedulers, plus the lifecycle machinery around it.
//!
//! ## Overview
//!
//! A [`MainLoop`] is constructed explicitly by the host's startup sequence
//! on the thread that will drive ticks; that thread becomes the owner and
//! every tick entry point is checked against it. Producers get a cloneable
//! [`Dispatcher`] handle for fire-and-forget submission from any thread.
//!
//! Per update tick, in strict order:
//!
//! 1. publish the `update` lifecycle event (per-subscriber panic isolation),
//! 2. drain the cross-thread queue fully,
//! 3. run the update-phase micro-scheduler.
//!
//! `late_update` publishes its event stream, and `end_of_frame` runs the
//! end-of-frame scheduler.
//!
//! ## Binding
//!
//! [`Binding`] stands in for host-scene singleton discovery: the first
//! initialized loop is bound, later ones are duplicates handled by the
//! configured [`CullingMode`](crate::config::CullingMode), and a surviving
//! spare is promoted when the bound loop is released. Once the binding has
//! seen a quit signal, nothing is bound or promoted.

mod binding;
mod core;
mod events;

pub use binding::{Binding, InitOutcome};
pub use core::{DispatchStats, Dispatcher, LifecycleState, MainLoop};
pub(crate) use core::Shared;
pub use events::{LifecycleStream, Signal, SubscriptionId};
