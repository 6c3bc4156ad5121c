//! # Mainspring
//!
//! **Mainspring** is a cross-thread main-loop dispatcher and cooperative
//! micro-coroutine scheduler: a single consumer thread drives ticks, and any
//! number of producer threads hand it work through a lock-guarded queue.
//!
//! ## Overview
//!
//! Hosts with a designated "main" thread (frame loops, UI toolkits, embedded
//! control loops) need two things from a dispatch layer: a safe way for
//! background threads to marshal closures onto the main thread, and a cheap
//! way to keep thousands of small multi-tick tasks alive without a native
//! thread each. Mainspring provides both behind one handle type, plus the
//! lifecycle machinery (explicit states, duplicate culling, event streams)
//! that real hosts end up needing around them.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - **[`queue`]** - The mutex-guarded, swap-on-drain FIFO of pending actions
//! - **[`coroutine`]** - The resumable-task trait and its suspension vocabulary
//! - **[`scheduler`]** - The slot-registry micro-scheduler with nesting flattening
//! - **[`dispatcher`]** - The frame-driven [`MainLoop`], its [`Dispatcher`]
//!   handles, lifecycle event streams, and the [`Binding`] registry
//! - **[`idle`]** - The [`IdlePump`] driver for hosts without a frame loop
//! - **[`config`]** - Environment-driven configuration
//! - **[`error`]** - The dispatch error type and the replaceable error hook
//! - **[`ids`]** - ULID-backed action and loop identifiers
//!
//! ### Tick Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Producer as Producer Thread
//!     participant Queue as ActionQueue
//!     participant Loop as MainLoop (owner thread)
//!     participant Sched as MicroScheduler
//!
//!     Producer->>Queue: submit(action)
//!     Note over Queue: appended under lock,<br/>returns immediately
//!     Loop->>Loop: update()
//!     Loop->>Loop: publish update event
//!     Loop->>Queue: drain()
//!     Note over Queue: batch swapped out,<br/>executed in order
//!     Queue->>Sched: start_coroutine (eager start)
//!     Loop->>Sched: run()
//!     Note over Sched: each slot resumed once,<br/>nesting flattened inline
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use mainspring::{MainLoop, Phase, Suspend};
//!
//! let mut main_loop = MainLoop::new();
//! let dispatcher = main_loop.handle();
//!
//! // From any thread: marshal a closure onto the owner thread.
//! dispatcher.submit(|| println!("runs during the next update tick")).expect("loop is active");
//!
//! // A two-tick coroutine: yields once, then completes.
//! let task = mainspring::coroutine::steps([Suspend::NextTick]);
//! main_loop.start_coroutine(Phase::Update, task).expect("owner thread");
//!
//! main_loop.update().expect("owner thread");
//! main_loop.late_update().expect("owner thread");
//! main_loop.end_of_frame().expect("owner thread");
//! ```
//!
//! ## Threading Model
//!
//! The thread that constructs a [`MainLoop`] or [`IdlePump`] becomes its
//! owner; every tick entry point verifies the caller and fails with
//! [`DispatchError::WrongThread`] otherwise. [`Dispatcher`] handles are the
//! cross-thread surface: `Clone + Send + Sync`, fire-and-forget, exactly-once
//! execution in submission order.

pub mod config;
pub mod coroutine;
pub mod dispatcher;
pub mod error;
pub mod idle;
pub mod ids;
pub mod queue;
pub mod scheduler;

pub use config::{CullingMode, DispatcherConfig};
pub use coroutine::{Coroutine, Step, Suspend};
pub use dispatcher::{
    Binding, DispatchStats, Dispatcher, InitOutcome, LifecycleState, LifecycleStream, MainLoop,
    SubscriptionId,
};
pub use error::{DispatchError, ErrorHook};
pub use idle::IdlePump;
pub use ids::{ActionId, LoopId};
pub use queue::{Action, ActionQueue, Phase, TickContext};
pub use scheduler::{DeferredTask, FallbackHandler, MicroScheduler};
