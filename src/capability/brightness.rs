use serde_json::json;

use super::{
    int_field, CallbackSlot, CapabilityHandler, DeviceHandle, EventLimiter, HandledResult, Request,
};
use crate::protocol::{value_map, Cause};

pub const SET_BRIGHTNESS: &str = "setBrightness";
pub const ADJUST_BRIGHTNESS: &str = "adjustBrightness";

type BrightnessCallback = dyn FnMut(&str, &mut i64) -> bool + Send;

/// Absolute (`setBrightness`) and relative (`adjustBrightness`) dimming.
///
/// The adjust callback receives the delta and is expected to write back the
/// resulting absolute brightness.
pub struct BrightnessController {
    device: DeviceHandle,
    brightness: CallbackSlot<BrightnessCallback>,
    adjust_brightness: CallbackSlot<BrightnessCallback>,
    limiter: EventLimiter,
}

impl BrightnessController {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.state_limiter();
        Self {
            device,
            brightness: CallbackSlot::new(),
            adjust_brightness: CallbackSlot::new(),
            limiter,
        }
    }

    pub fn on_brightness<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut i64) -> bool + Send + 'static,
    {
        self.brightness.set(Box::new(callback));
    }

    pub fn on_adjust_brightness<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut i64) -> bool + Send + 'static,
    {
        self.adjust_brightness.set(Box::new(callback));
    }

    pub fn send_brightness_event(&self, brightness: i64, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            None,
            SET_BRIGHTNESS,
            cause,
            value_map(json!({ "brightness": brightness })),
        )
    }
}

impl CapabilityHandler for BrightnessController {
    fn capability(&self) -> &'static str {
        "BrightnessController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        let (slot, key) = match request.action {
            SET_BRIGHTNESS => (&self.brightness, "brightness"),
            ADJUST_BRIGHTNESS => (&self.adjust_brightness, "brightnessDelta"),
            _ => return HandledResult::not_handled(),
        };

        let mut brightness = int_field(request.value, key);
        slot.call(|cb| cb(request.device_id, &mut brightness))
            .map(|success| {
                HandledResult::handled(success, value_map(json!({ "brightness": brightness })))
            })
            .unwrap_or_default()
    }
}
