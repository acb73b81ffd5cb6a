//! White-spectrum color temperature.
//!
//! `increaseColorTemperature` and `decreaseColorTemperature` carry no value.
//! Their callbacks receive `+1` / `-1` and write back the new absolute
//! temperature in kelvin, which is what the response reports.

use serde_json::json;

use super::{
    int_field, CallbackSlot, CapabilityHandler, DeviceHandle, EventLimiter, HandledResult, Request,
};
use crate::protocol::{value_map, Cause};

pub const SET_COLOR_TEMPERATURE: &str = "setColorTemperature";
pub const INCREASE_COLOR_TEMPERATURE: &str = "increaseColorTemperature";
pub const DECREASE_COLOR_TEMPERATURE: &str = "decreaseColorTemperature";

type ColorTemperatureCallback = dyn FnMut(&str, &mut i64) -> bool + Send;

pub struct ColorTemperatureController {
    device: DeviceHandle,
    color_temperature: CallbackSlot<ColorTemperatureCallback>,
    increase: CallbackSlot<ColorTemperatureCallback>,
    decrease: CallbackSlot<ColorTemperatureCallback>,
    limiter: EventLimiter,
}

impl ColorTemperatureController {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.state_limiter();
        Self {
            device,
            color_temperature: CallbackSlot::new(),
            increase: CallbackSlot::new(),
            decrease: CallbackSlot::new(),
            limiter,
        }
    }

    pub fn on_color_temperature<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut i64) -> bool + Send + 'static,
    {
        self.color_temperature.set(Box::new(callback));
    }

    pub fn on_increase_color_temperature<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut i64) -> bool + Send + 'static,
    {
        self.increase.set(Box::new(callback));
    }

    pub fn on_decrease_color_temperature<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut i64) -> bool + Send + 'static,
    {
        self.decrease.set(Box::new(callback));
    }

    pub fn send_color_temperature_event(&self, color_temperature: i64, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            None,
            SET_COLOR_TEMPERATURE,
            cause,
            value_map(json!({ "colorTemperature": color_temperature })),
        )
    }
}

impl CapabilityHandler for ColorTemperatureController {
    fn capability(&self) -> &'static str {
        "ColorTemperatureController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        let (slot, mut color_temperature) = match request.action {
            SET_COLOR_TEMPERATURE => (
                &self.color_temperature,
                int_field(request.value, "colorTemperature"),
            ),
            INCREASE_COLOR_TEMPERATURE => (&self.increase, 1),
            DECREASE_COLOR_TEMPERATURE => (&self.decrease, -1),
            _ => return HandledResult::not_handled(),
        };

        slot.call(|cb| cb(request.device_id, &mut color_temperature))
            .map(|success| {
                HandledResult::handled(
                    success,
                    value_map(json!({ "colorTemperature": color_temperature })),
                )
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::testing::{request, Harness};
    use crate::protocol::ValueMap;

    #[test]
    fn test_increase_and_decrease_sentinels() {
        let harness = Harness::connected("dev-1");
        let controller = ColorTemperatureController::new(harness.handle.clone());
        controller.on_increase_color_temperature(|_, step| {
            assert_eq!(*step, 1);
            *step = 4000;
            true
        });
        controller.on_decrease_color_temperature(|_, step| {
            assert_eq!(*step, -1);
            *step = 2200;
            true
        });

        let empty = ValueMap::new();
        let up = controller.try_handle(&request(INCREASE_COLOR_TEMPERATURE, "", &empty));
        assert_eq!(up.value["colorTemperature"], 4000);
        let down = controller.try_handle(&request(DECREASE_COLOR_TEMPERATURE, "", &empty));
        assert_eq!(down.value["colorTemperature"], 2200);
    }

    #[test]
    fn test_set_color_temperature() {
        let harness = Harness::connected("dev-1");
        let controller = ColorTemperatureController::new(harness.handle.clone());
        controller.on_color_temperature(|_, _| true);
        let value = value_map(json!({"colorTemperature": 2700}));
        let result = controller.try_handle(&request(SET_COLOR_TEMPERATURE, "", &value));
        assert!(result.success);
        assert_eq!(result.value["colorTemperature"], 2700);
    }
}
