//! # Runtime Configuration Module
//!
//! Environment variable-based configuration for dispatcher behavior,
//! loaded once at startup.
//!
//! ## Environment Variables
//!
//! ### `MAINSPRING_INITIAL_SLOTS`
//!
//! Initial scheduler slot capacity (default: `16`). Capacity doubles when
//! exceeded and never shrinks, so size this to your steady-state number of
//! live coroutines to avoid early regrowth.
//!
//! ### `MAINSPRING_CULLING_MODE`
//!
//! Duplicate-instance culling policy applied by [`Binding::initialize`]
//! (`disabled` / `self` / `all`, default: `self`). Only meaningful before
//! the first initialization; changing it afterwards has no effect on an
//! already-bound loop.
//!
//! ### `MAINSPRING_IDLE_INTERVAL_MS`
//!
//! Pump interval for [`IdlePump::drive_until`] in milliseconds
//! (default: `16`, roughly one frame at 60 Hz).
//!
//! Unparseable values fall back to the defaults rather than failing startup.
//!
//! [`Binding::initialize`]: crate::dispatcher::Binding::initialize
//! [`IdlePump::drive_until`]: crate::idle::IdlePump::drive_until

use std::env;
use std::time::Duration;

/// Duplicate-instance culling policy.
///
/// Evaluated when an initialization pass discovers an already-bound
/// dispatcher instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullingMode {
    /// Keep every instance; later ones are recorded as unbound spares.
    Disabled,
    /// The newly initializing duplicate retires itself.
    SelfOnly,
    /// Retire every unbound duplicate in one pass, keeping only the bound
    /// instance.
    All,
}

impl CullingMode {
    /// Parse a culling mode from its configuration string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "disabled" => Some(Self::Disabled),
            "self" => Some(Self::SelfOnly),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

impl Default for CullingMode {
    fn default() -> Self {
        Self::SelfOnly
    }
}

/// Dispatcher configuration loaded from environment variables.
///
/// Load this at startup with [`DispatcherConfig::from_env()`], or build one
/// directly for tests and embedded hosts.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// Initial scheduler slot capacity (default: 16)
    pub initial_slots: usize,
    /// Duplicate-instance culling policy (default: `SelfOnly`)
    pub culling: CullingMode,
    /// Pump interval for idle-mode driving (default: 16 ms)
    pub idle_interval: Duration,
}

impl DispatcherConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let initial_slots = env::var("MAINSPRING_INITIAL_SLOTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(16);

        let culling = env::var("MAINSPRING_CULLING_MODE")
            .ok()
            .and_then(|s| CullingMode::from_str(&s))
            .unwrap_or_default();

        let idle_interval_ms = env::var("MAINSPRING_IDLE_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(16);

        Self {
            initial_slots,
            culling,
            idle_interval: Duration::from_millis(idle_interval_ms),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            initial_slots: 16,
            culling: CullingMode::default(),
            idle_interval: Duration::from_millis(16),
        }
    }
}
