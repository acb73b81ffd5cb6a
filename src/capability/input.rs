use serde_json::json;

use super::{
    str_field, CallbackSlot, CapabilityHandler, DeviceHandle, EventLimiter, HandledResult, Request,
};
use crate::protocol::{value_map, Cause};

pub const SELECT_INPUT: &str = "selectInput";

type InputCallback = dyn FnMut(&str, &mut String) -> bool + Send;

/// Input source selection such as `"HDMI1"`.
pub struct InputController {
    device: DeviceHandle,
    select_input: CallbackSlot<InputCallback>,
    limiter: EventLimiter,
}

impl InputController {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.state_limiter();
        Self {
            device,
            select_input: CallbackSlot::new(),
            limiter,
        }
    }

    pub fn on_select_input<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut String) -> bool + Send + 'static,
    {
        self.select_input.set(Box::new(callback));
    }

    pub fn send_select_input_event(&self, input: &str, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            None,
            SELECT_INPUT,
            cause,
            value_map(json!({ "input": input })),
        )
    }
}

impl CapabilityHandler for InputController {
    fn capability(&self) -> &'static str {
        "InputController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        if request.action != SELECT_INPUT {
            return HandledResult::not_handled();
        }
        let mut input = str_field(request.value, "input").to_string();
        self.select_input
            .call(|cb| cb(request.device_id, &mut input))
            .map(|success| HandledResult::handled(success, value_map(json!({ "input": input }))))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::testing::{request, Harness};

    #[test]
    fn test_select_input() {
        let mut harness = Harness::connected("tv-1");
        let controller = InputController::new(harness.handle.clone());
        controller.on_select_input(|_, input| input.starts_with("HDMI"));

        let value = value_map(json!({"input": "HDMI2"}));
        let result = controller.try_handle(&request(SELECT_INPUT, "", &value));
        assert!(result.success);
        assert_eq!(result.value["input"], "HDMI2");

        assert!(controller.send_select_input_event("AUX", Cause::default()));
        assert_eq!(harness.sent()[0].envelope.payload.value["input"], "AUX");
    }
}
