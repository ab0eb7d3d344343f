//! Apply gate: whether detected drift is written back or only observed.
//!
//! The gate is toggled only by explicit operator commands. A cycle reads it
//! once with [`ControlGate::is_enabled`] and passes the value down as a plain
//! parameter, so toggles never affect a cycle already in flight.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct ControlGate {
    apply_enabled: AtomicBool,
}

impl ControlGate {
    pub fn new(apply_enabled: bool) -> Self {
        Self {
            apply_enabled: AtomicBool::new(apply_enabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.apply_enabled.load(Ordering::SeqCst)
    }

    /// Enable applying; returns the previous state.
    pub fn enable(&self) -> bool {
        self.apply_enabled.swap(true, Ordering::SeqCst)
    }

    /// Switch to observe-only; returns the previous state.
    pub fn disable(&self) -> bool {
        self.apply_enabled.swap(false, Ordering::SeqCst)
    }
}
