use serde_json::json;

use super::{
    bool_field, CallbackSlot, CapabilityHandler, DeviceHandle, EventLimiter, HandledResult, Request,
};
use crate::protocol::{value_map, Cause, ValueMap};

pub const SET_START_STOP: &str = "setStartStop";
pub const SET_PAUSE_UNPAUSE: &str = "setPauseUnpause";

type StartStopCallback = dyn FnMut(&str, &mut bool) -> bool + Send;

/// Start/stop and pause/unpause of a running program, e.g. a vacuum
/// cleaner. Both events share one limiter.
pub struct StartStopController {
    device: DeviceHandle,
    start_stop: CallbackSlot<StartStopCallback>,
    pause_unpause: CallbackSlot<StartStopCallback>,
    limiter: EventLimiter,
}

impl StartStopController {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.state_limiter();
        Self {
            device,
            start_stop: CallbackSlot::new(),
            pause_unpause: CallbackSlot::new(),
            limiter,
        }
    }

    pub fn on_start_stop<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut bool) -> bool + Send + 'static,
    {
        self.start_stop.set(Box::new(callback));
    }

    pub fn on_pause_unpause<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut bool) -> bool + Send + 'static,
    {
        self.pause_unpause.set(Box::new(callback));
    }

    pub fn send_start_stop_event(&self, start: bool, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            None,
            SET_START_STOP,
            cause,
            value_map(json!({ "start": start })),
        )
    }

    pub fn send_pause_unpause_event(&self, pause: bool, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            None,
            SET_PAUSE_UNPAUSE,
            cause,
            value_map(json!({ "pause": pause })),
        )
    }
}

impl CapabilityHandler for StartStopController {
    fn capability(&self) -> &'static str {
        "StartStopController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        let (slot, key) = match request.action {
            SET_START_STOP => (&self.start_stop, "start"),
            SET_PAUSE_UNPAUSE => (&self.pause_unpause, "pause"),
            _ => return HandledResult::not_handled(),
        };

        let mut flag = bool_field(request.value, key);
        slot.call(|cb| cb(request.device_id, &mut flag))
            .map(|success| {
                let mut value = ValueMap::new();
                value.insert(key.to_string(), json!(flag));
                HandledResult::handled(success, value)
            })
            .unwrap_or_default()
    }
}
