use serde_json::json;

use super::{
    str_field, CallbackSlot, CapabilityHandler, DeviceHandle, EventLimiter, HandledResult, Request,
};
use crate::protocol::{value_map, Cause};

/// Garage doors reuse the mode action with the modes `"Open"` and `"Close"`
pub const SET_DOOR_MODE: &str = "setMode";

type DoorCallback = dyn FnMut(&str, &mut bool) -> bool + Send;

/// Garage door. Claims every `setMode` request, so it must not share a
/// device with a [`super::ModeController`] listed after it.
pub struct DoorController {
    device: DeviceHandle,
    door_state: CallbackSlot<DoorCallback>,
    limiter: EventLimiter,
}

fn door_mode(closed: bool) -> &'static str {
    if closed {
        "Close"
    } else {
        "Open"
    }
}

impl DoorController {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.state_limiter();
        Self {
            device,
            door_state: CallbackSlot::new(),
            limiter,
        }
    }

    /// Callback gets `true` for "Close"
    pub fn on_door_state<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut bool) -> bool + Send + 'static,
    {
        self.door_state.set(Box::new(callback));
    }

    pub fn send_door_state_event(&self, closed: bool, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            None,
            SET_DOOR_MODE,
            cause,
            value_map(json!({ "mode": door_mode(closed) })),
        )
    }
}

impl CapabilityHandler for DoorController {
    fn capability(&self) -> &'static str {
        "DoorController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        if request.action != SET_DOOR_MODE {
            return HandledResult::not_handled();
        }
        let mut closed = str_field(request.value, "mode") == "Close";
        self.door_state
            .call(|cb| cb(request.device_id, &mut closed))
            .map(|success| {
                HandledResult::handled(success, value_map(json!({ "mode": door_mode(closed) })))
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::testing::{request, Harness};

    #[test]
    fn test_door_mode() {
        let mut harness = Harness::connected("garage-1");
        let controller = DoorController::new(harness.handle.clone());
        controller.on_door_state(|_, closed| *closed);

        let value = value_map(json!({"mode": "Close"}));
        let result = controller.try_handle(&request(SET_DOOR_MODE, "", &value));
        assert!(result.success);
        assert_eq!(result.value["mode"], "Close");

        let value = value_map(json!({"mode": "anything"}));
        let result = controller.try_handle(&request(SET_DOOR_MODE, "", &value));
        assert!(!result.success);
        assert_eq!(result.value["mode"], "Open");

        assert!(controller.send_door_state_event(false, Cause::default()));
        assert_eq!(harness.sent()[0].envelope.payload.value["mode"], "Open");
    }
}
