use crate::types::{ControllerState, Freshness, HeadsetState, StateReport};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct HeadsetSlot {
    state: HeadsetState,
    dirty: bool,
}

#[derive(Debug, Default)]
struct ControllerSlot {
    left: ControllerState,
    right: ControllerState,
    dirty: bool,
}

/// The latest device state exposed to the runtime.
///
/// Headset and controllers sit behind independent locks so the head and
/// hand pipelines never wait on each other. Each sub-state carries a dirty
/// flag: producers set it, [`DeviceState::poll`] reports and clears it. Only
/// the newest value is ever kept.
#[derive(Debug, Default)]
pub struct DeviceState {
    headset: Mutex<HeadsetSlot>,
    controllers: Mutex<ControllerSlot>,
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_headset_state(&self, state: HeadsetState) {
        let mut slot = lock(&self.headset);
        slot.state = state;
        slot.dirty = true;
    }

    pub fn update_controller_state(&self, left: ControllerState, right: ControllerState) {
        let mut slot = lock(&self.controllers);
        slot.left = left;
        slot.right = right;
        slot.dirty = true;
    }

    /// Take every sub-state updated since the last poll and clear its flag.
    ///
    /// Each flag is cleared under the same lock that copies its value, so an
    /// update racing with a poll is either reported now or on the next poll,
    /// never lost.
    pub fn poll(&self) -> StateReport {
        let headset = {
            let mut slot = lock(&self.headset);
            std::mem::take(&mut slot.dirty).then_some(slot.state)
        };
        let controllers = {
            let mut slot = lock(&self.controllers);
            std::mem::take(&mut slot.dirty).then_some((slot.left, slot.right))
        };
        StateReport { headset, controllers }
    }

    /// Which sub-states are waiting to be reported.
    pub fn freshness(&self) -> Freshness {
        let mut flags = Freshness::empty();
        flags.set(Freshness::HEADSET, lock(&self.headset).dirty);
        flags.set(Freshness::CONTROLLER, lock(&self.controllers).dirty);
        flags
    }

    /// Copy of the current values, without touching the dirty flags.
    pub fn snapshot(&self) -> (HeadsetState, ControllerState, ControllerState) {
        let headset = lock(&self.headset).state;
        let slot = lock(&self.controllers);
        (headset, slot.left, slot.right)
    }
}

/// The guarded values are plain data, valid even if a writer panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Position;

    fn headset(value: f32) -> HeadsetState {
        HeadsetState {
            position: Position::new(value, value, value),
            pitch: value,
            yaw: value,
        }
    }

    #[test]
    fn test_poll_without_updates_is_empty() {
        let state = DeviceState::new();
        let report = state.poll();
        assert_eq!(report.freshness(), Freshness::empty());
        assert!(report.headset.is_none());
        assert!(report.controllers.is_none());
    }

    #[test]
    fn test_poll_clears_flags() {
        let state = DeviceState::new();
        state.update_headset_state(headset(1.0));
        assert_eq!(state.freshness(), Freshness::HEADSET);

        let report = state.poll();
        assert_eq!(report.freshness(), Freshness::HEADSET);
        assert_eq!(report.headset, Some(headset(1.0)));
        assert_eq!(state.poll().freshness(), Freshness::empty());
    }

    #[test]
    fn test_only_latest_value_is_reported() {
        let state = DeviceState::new();
        state.update_headset_state(headset(1.0));
        state.update_headset_state(headset(2.0));
        state.update_controller_state(ControllerState::default(), ControllerState::default());

        let report = state.poll();
        assert_eq!(report.freshness(), Freshness::HEADSET | Freshness::CONTROLLER);
        assert_eq!(report.headset, Some(headset(2.0)));
    }

    #[test]
    fn test_controller_flag_survives_headset_poll() {
        let state = DeviceState::new();
        state.update_controller_state(ControllerState::default(), ControllerState::default());
        let _ = state.poll();
        state.update_headset_state(headset(3.0));
        let report = state.poll();
        assert_eq!(report.freshness(), Freshness::HEADSET);
    }

    #[test]
    fn test_snapshot_keeps_flags() {
        let state = DeviceState::new();
        state.update_headset_state(headset(4.0));
        let (h, _, _) = state.snapshot();
        assert_eq!(h, headset(4.0));
        assert_eq!(state.freshness(), Freshness::HEADSET);
    }
}
