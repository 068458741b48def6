//! Cached on/off state of the valve.
//!
//! Shared between host reads (any task) and the MQTT dispatch task, so it
//! lives in atomics. The version counter lets callers tell a real transition
//! from a repeated report of the same value.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

pub struct DeviceState {
    on: AtomicBool,
    version: AtomicU32,
}

impl DeviceState {
    pub fn new(initial: bool) -> Self {
        Self {
            on: AtomicBool::new(initial),
            version: AtomicU32::new(0),
        }
    }

    pub fn get(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }

    /// Store a new value. Returns `true` (and bumps the version) if it changed.
    pub fn set(&self, value: bool) -> bool {
        let old = self.on.swap(value, Ordering::SeqCst);
        if old != value {
            self.version.fetch_add(1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// Number of transitions since startup.
    pub fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = DeviceState::default();
        assert!(!state.get());
        assert_eq!(state.version(), 0);
    }

    #[test]
    fn test_set_reports_transitions() {
        let state = DeviceState::new(false);

        assert!(state.set(true));
        assert!(state.get());
        assert_eq!(state.version(), 1);

        // Same value is not a transition
        assert!(!state.set(true));
        assert_eq!(state.version(), 1);

        assert!(state.set(false));
        assert!(!state.get());
        assert_eq!(state.version(), 2);
    }
}
