//! On/off switching via `setPowerState`.

use serde_json::json;

use super::{
    on_off, str_field, CallbackSlot, CapabilityHandler, DeviceHandle, EventLimiter,
    HandledResult, Request,
};
use crate::protocol::{value_map, Cause};

pub const SET_POWER_STATE: &str = "setPowerState";

type PowerStateCallback = dyn FnMut(&str, &mut bool) -> bool + Send;

pub struct PowerStateController {
    device: DeviceHandle,
    power_state: CallbackSlot<PowerStateCallback>,
    limiter: EventLimiter,
}

impl PowerStateController {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.state_limiter();
        Self {
            device,
            power_state: CallbackSlot::new(),
            limiter,
        }
    }

    /// Registers the callback for `setPowerState`. It gets the device id and
    /// the requested state, which it may overwrite with the actual state.
    pub fn on_power_state<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut bool) -> bool + Send + 'static,
    {
        self.power_state.set(Box::new(callback));
    }

    pub fn send_power_state_event(&self, state: bool, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            None,
            SET_POWER_STATE,
            cause,
            value_map(json!({ "state": on_off(state) })),
        )
    }
}

impl CapabilityHandler for PowerStateController {
    fn capability(&self) -> &'static str {
        "PowerStateController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        if request.action != SET_POWER_STATE {
            return HandledResult::not_handled();
        }

        let mut state = str_field(request.value, "state") == "On";
        match self.power_state.call(|cb| cb(request.device_id, &mut state)) {
            Some(success) => {
                HandledResult::handled(success, value_map(json!({ "state": on_off(state) })))
            }
            None => HandledResult::not_handled(),
        }
    }
}
