use serde_json::json;

use super::{
    on_off, str_field, CapabilityHandler, DeviceHandle, EventLimiter, HandledResult,
    InstanceCallbacks, Request, DEFAULT_INSTANCE,
};
use crate::protocol::{value_map, Cause};

pub const SET_TOGGLE_STATE: &str = "setToggleState";

type ToggleCallback = dyn FnMut(&str, &str, &mut bool) -> bool + Send;

/// On/off toggles (`setToggleState`). A device typically carries several,
/// one per instance.
pub struct ToggleController {
    device: DeviceHandle,
    toggles: InstanceCallbacks<ToggleCallback>,
    limiter: EventLimiter,
}

impl ToggleController {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.state_limiter();
        Self {
            device,
            toggles: InstanceCallbacks::new(),
            limiter,
        }
    }

    pub fn on_toggle_state<F>(&self, mut callback: F)
    where
        F: FnMut(&str, &mut bool) -> bool + Send + 'static,
    {
        self.toggles.set(
            DEFAULT_INSTANCE,
            Box::new(move |device_id, _, state| callback(device_id, state)),
        );
    }

    pub fn on_instance_toggle_state<F>(&self, instance: &str, callback: F)
    where
        F: FnMut(&str, &str, &mut bool) -> bool + Send + 'static,
    {
        self.toggles.set(instance, Box::new(callback));
    }

    pub fn send_toggle_state_event(&self, instance: Option<&str>, state: bool, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            instance,
            SET_TOGGLE_STATE,
            cause,
            value_map(json!({ "state": on_off(state) })),
        )
    }
}

impl CapabilityHandler for ToggleController {
    fn capability(&self) -> &'static str {
        "ToggleController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        if request.action != SET_TOGGLE_STATE {
            return HandledResult::not_handled();
        }

        let mut state = str_field(request.value, "state") == "On";
        self.toggles
            .call(request.instance, |cb| {
                cb(request.device_id, request.instance, &mut state)
            })
            .map(|success| {
                HandledResult::handled(success, value_map(json!({ "state": on_off(state) })))
            })
            .unwrap_or_default()
    }
}
