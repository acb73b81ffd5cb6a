use serde_json::json;

use super::{
    str_field, CallbackSlot, CapabilityHandler, DeviceHandle, EventLimiter, HandledResult, Request,
};
use crate::protocol::{value_map, Cause};

pub const MEDIA_CONTROL: &str = "mediaControl";

type MediaCallback = dyn FnMut(&str, &mut String) -> bool + Send;

/// Playback commands like `"Play"`, `"Pause"` or `"FastForward"`.
pub struct MediaController {
    device: DeviceHandle,
    media_control: CallbackSlot<MediaCallback>,
    limiter: EventLimiter,
}

impl MediaController {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.state_limiter();
        Self {
            device,
            media_control: CallbackSlot::new(),
            limiter,
        }
    }

    pub fn on_media_control<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut String) -> bool + Send + 'static,
    {
        self.media_control.set(Box::new(callback));
    }

    pub fn send_media_control_event(&self, control: &str, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            None,
            MEDIA_CONTROL,
            cause,
            value_map(json!({ "control": control })),
        )
    }
}

impl CapabilityHandler for MediaController {
    fn capability(&self) -> &'static str {
        "MediaController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        if request.action != MEDIA_CONTROL {
            return HandledResult::not_handled();
        }
        let mut control = str_field(request.value, "control").to_string();
        self.media_control
            .call(|cb| cb(request.device_id, &mut control))
            .map(|success| {
                HandledResult::handled(success, value_map(json!({ "control": control })))
            })
            .unwrap_or_default()
    }
}
