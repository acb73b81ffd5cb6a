use serde_json::json;

use super::{
    str_field, CallbackSlot, CapabilityHandler, DeviceHandle, EventLimiter, HandledResult, Request,
};
use crate::protocol::{value_map, Cause};

pub const SET_LOCK_STATE: &str = "setLockState";

/// Reported lock state. `Jammed` is reported whenever the callback fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Unlocked,
    Jammed,
}

impl LockState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockState::Locked => "LOCKED",
            LockState::Unlocked => "UNLOCKED",
            LockState::Jammed => "JAMMED",
        }
    }
}

type LockCallback = dyn FnMut(&str, &mut bool) -> bool + Send;

pub struct LockController {
    device: DeviceHandle,
    lock_state: CallbackSlot<LockCallback>,
    limiter: EventLimiter,
}

impl LockController {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.state_limiter();
        Self {
            device,
            lock_state: CallbackSlot::new(),
            limiter,
        }
    }

    /// Callback gets `true` for "lock" and `false` for "unlock"
    pub fn on_lock_state<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut bool) -> bool + Send + 'static,
    {
        self.lock_state.set(Box::new(callback));
    }

    pub fn send_lock_state_event(&self, state: LockState, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            None,
            SET_LOCK_STATE,
            cause,
            value_map(json!({ "state": state.as_str() })),
        )
    }
}

impl CapabilityHandler for LockController {
    fn capability(&self) -> &'static str {
        "LockController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        if request.action != SET_LOCK_STATE {
            return HandledResult::not_handled();
        }

        let mut locked = str_field(request.value, "state") == "lock";
        let Some(success) = self.lock_state.call(|cb| cb(request.device_id, &mut locked)) else {
            return HandledResult::not_handled();
        };

        let state = match (success, locked) {
            (false, _) => LockState::Jammed,
            (true, true) => LockState::Locked,
            (true, false) => LockState::Unlocked,
        };
        HandledResult::handled(success, value_map(json!({ "state": state.as_str() })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::testing::{request, Harness};

    #[test]
    fn test_lock_and_unlock() {
        let harness = Harness::connected("dev-1");
        let controller = LockController::new(harness.handle.clone());
        controller.on_lock_state(|_, _| true);

        let lock = value_map(json!({"state": "lock"}));
        let result = controller.try_handle(&request(SET_LOCK_STATE, "", &lock));
        assert_eq!(result.value["state"], "LOCKED");

        let unlock = value_map(json!({"state": "unlock"}));
        let result = controller.try_handle(&request(SET_LOCK_STATE, "", &unlock));
        assert_eq!(result.value["state"], "UNLOCKED");
    }

    #[test]
    fn test_failure_reports_jammed() {
        let harness = Harness::connected("dev-1");
        let controller = LockController::new(harness.handle.clone());
        controller.on_lock_state(|_, _| false);

        let lock = value_map(json!({"state": "lock"}));
        let result = controller.try_handle(&request(SET_LOCK_STATE, "", &lock));
        assert!(result.handled);
        assert!(!result.success);
        assert_eq!(result.value["state"], "JAMMED");
    }
}
