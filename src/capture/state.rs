//! Acquisition state shared between the controller and the capture worker.

use parking_lot::{Mutex, MutexGuard};

/// Guard returned by [`AcquisitionState::lock_driver`]. Dropping it leaves
/// the driver critical section.
pub type DriverGuard<'a> = MutexGuard<'a, ()>;

/// The "is acquiring" flag and the driver critical section.
///
/// The two are guarded by independent locks. The worker holds the driver
/// lock for one frame cycle and may read the flag while holding it; the
/// controller never holds the driver lock while waiting for the worker.
#[derive(Debug, Default)]
pub struct AcquisitionState {
    active: Mutex<bool>,
    driver: Mutex<()>,
}

impl AcquisitionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        *self.active.lock()
    }

    pub fn set_active(&self, state: bool) {
        *self.active.lock() = state;
    }

    /// Clear the flag, returning whether it was set.
    pub fn deactivate(&self) -> bool {
        std::mem::replace(&mut *self.active.lock(), false)
    }

    /// Loop-top check for the worker: whether it should run another cycle.
    ///
    /// When `wanted` is false the flag is cleared under the same lock that
    /// reads it, so a controller never sees the flag set for a worker that
    /// has already decided to exit.
    pub fn keep_running(&self, wanted: bool) -> bool {
        let mut active = self.active.lock();
        if !wanted {
            *active = false;
        }
        *active
    }

    /// Enter the driver critical section.
    pub fn lock_driver(&self) -> DriverGuard<'_> {
        self.driver.lock()
    }

    /// Whether some thread is inside the driver critical section.
    pub fn is_driver_busy(&self) -> bool {
        self.driver.is_locked()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn flag_starts_inactive() {
        let state = AcquisitionState::new();
        assert!(!state.is_active());
        state.set_active(true);
        assert!(state.is_active());
        assert!(state.deactivate());
        assert!(!state.deactivate());
    }

    #[test]
    fn declining_another_cycle_clears_flag() {
        let state = AcquisitionState::new();
        assert!(!state.keep_running(true));

        state.set_active(true);
        assert!(state.keep_running(true));
        assert!(state.is_active());

        assert!(!state.keep_running(false));
        assert!(!state.is_active());
    }

    #[test]
    fn driver_guard_releases_on_drop() {
        let state = AcquisitionState::new();
        {
            let _guard = state.lock_driver();
            assert!(state.is_driver_busy());
        }
        assert!(!state.is_driver_busy());
    }

    #[test]
    fn flag_is_readable_while_driver_is_held() {
        let state = Arc::new(AcquisitionState::new());
        let _guard = state.lock_driver();

        let other = Arc::clone(&state);
        let seen = thread::spawn(move || {
            other.set_active(true);
            other.is_active()
        })
        .join()
        .unwrap();

        assert!(seen);
        assert!(state.is_driver_busy());
    }
}
