use serde_json::json;

use super::{
    bool_field, CallbackSlot, CapabilityHandler, DeviceHandle, EventLimiter, HandledResult, Request,
};
use crate::protocol::{value_map, Cause};

pub const SET_MUTE: &str = "setMute";

type MuteCallback = dyn FnMut(&str, &mut bool) -> bool + Send;

pub struct MuteController {
    device: DeviceHandle,
    mute: CallbackSlot<MuteCallback>,
    limiter: EventLimiter,
}

impl MuteController {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.state_limiter();
        Self {
            device,
            mute: CallbackSlot::new(),
            limiter,
        }
    }

    pub fn on_mute<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut bool) -> bool + Send + 'static,
    {
        self.mute.set(Box::new(callback));
    }

    pub fn send_mute_event(&self, mute: bool, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            None,
            SET_MUTE,
            cause,
            value_map(json!({ "mute": mute })),
        )
    }
}

impl CapabilityHandler for MuteController {
    fn capability(&self) -> &'static str {
        "MuteController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        if request.action != SET_MUTE {
            return HandledResult::not_handled();
        }
        let mut mute = bool_field(request.value, "mute");
        self.mute
            .call(|cb| cb(request.device_id, &mut mute))
            .map(|success| HandledResult::handled(success, value_map(json!({ "mute": mute }))))
            .unwrap_or_default()
    }
}
