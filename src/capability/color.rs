use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{CallbackSlot, CapabilityHandler, DeviceHandle, EventLimiter, HandledResult, Request};
use crate::protocol::{value_map, Cause};

pub const SET_COLOR: &str = "setColor";

/// RGB color as carried in `value.color`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    fn from_value(value: Option<&Value>) -> Self {
        value
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

type ColorCallback = dyn FnMut(&str, &mut Color) -> bool + Send;

pub struct ColorController {
    device: DeviceHandle,
    color: CallbackSlot<ColorCallback>,
    limiter: EventLimiter,
}

impl ColorController {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.state_limiter();
        Self {
            device,
            color: CallbackSlot::new(),
            limiter,
        }
    }

    pub fn on_color<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut Color) -> bool + Send + 'static,
    {
        self.color.set(Box::new(callback));
    }

    pub fn send_color_event(&self, color: Color, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            None,
            SET_COLOR,
            cause,
            value_map(json!({ "color": color })),
        )
    }
}

impl CapabilityHandler for ColorController {
    fn capability(&self) -> &'static str {
        "ColorController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        if request.action != SET_COLOR {
            return HandledResult::not_handled();
        }

        let mut color = Color::from_value(request.value.get("color"));
        self.color
            .call(|cb| cb(request.device_id, &mut color))
            .map(|success| HandledResult::handled(success, value_map(json!({ "color": color }))))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::testing::{request, Harness};

    #[test]
    fn test_set_color() {
        let harness = Harness::connected("dev-1");
        let controller = ColorController::new(harness.handle.clone());
        controller.on_color(|_, color| {
            color.b = 0;
            true
        });

        let value = value_map(json!({"color": {"r": 255, "g": 128, "b": 64}}));
        let result = controller.try_handle(&request(SET_COLOR, "", &value));
        assert_eq!(result.value["color"], json!({"r": 255, "g": 128, "b": 0}));
    }

    #[test]
    fn test_send_color_event() {
        let mut harness = Harness::connected("dev-1");
        let controller = ColorController::new(harness.handle.clone());
        assert!(controller.send_color_event(Color { r: 1, g: 2, b: 3 }, Cause::default()));
        let sent = harness.sent();
        assert_eq!(sent[0].envelope.payload.value["color"], json!({"r": 1, "g": 2, "b": 3}));
    }
}
