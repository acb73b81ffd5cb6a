use serde_json::json;

use super::{
    int_field, CallbackSlot, CapabilityHandler, DeviceHandle, EventLimiter, HandledResult, Request,
};
use crate::protocol::{value_map, Cause};

pub const SET_PERCENTAGE: &str = "setPercentage";
pub const ADJUST_PERCENTAGE: &str = "adjustPercentage";

type PercentageCallback = dyn FnMut(&str, &mut i64) -> bool + Send;

/// Generic 0..100 value, e.g. fan speed. Both actions carry `percentage`;
/// for `adjustPercentage` it is the delta.
pub struct PercentageController {
    device: DeviceHandle,
    percentage: CallbackSlot<PercentageCallback>,
    adjust_percentage: CallbackSlot<PercentageCallback>,
    limiter: EventLimiter,
}

impl PercentageController {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.state_limiter();
        Self {
            device,
            percentage: CallbackSlot::new(),
            adjust_percentage: CallbackSlot::new(),
            limiter,
        }
    }

    pub fn on_set_percentage<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut i64) -> bool + Send + 'static,
    {
        self.percentage.set(Box::new(callback));
    }

    pub fn on_adjust_percentage<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut i64) -> bool + Send + 'static,
    {
        self.adjust_percentage.set(Box::new(callback));
    }

    pub fn send_set_percentage_event(&self, percentage: i64, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            None,
            SET_PERCENTAGE,
            cause,
            value_map(json!({ "percentage": percentage })),
        )
    }
}

impl CapabilityHandler for PercentageController {
    fn capability(&self) -> &'static str {
        "PercentageController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        let slot = match request.action {
            SET_PERCENTAGE => &self.percentage,
            ADJUST_PERCENTAGE => &self.adjust_percentage,
            _ => return HandledResult::not_handled(),
        };

        let mut percentage = int_field(request.value, "percentage");
        slot.call(|cb| cb(request.device_id, &mut percentage))
            .map(|success| {
                HandledResult::handled(success, value_map(json!({ "percentage": percentage })))
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::testing::{request, Harness};

    #[test]
    fn test_adjust_percentage_reports_result() {
        let mut harness = Harness::connected("fan-1");
        let controller = PercentageController::new(harness.handle.clone());
        let mut current = 40;
        controller.on_adjust_percentage(move |_, delta| {
            current = (current + *delta).clamp(0, 100);
            *delta = current;
            true
        });

        let value = value_map(json!({"percentage": 75}));
        let result = controller.try_handle(&request(ADJUST_PERCENTAGE, "", &value));
        assert_eq!(result.value["percentage"], 100);
        assert!(!controller.try_handle(&request(SET_PERCENTAGE, "", &value)).handled);

        assert!(controller.send_set_percentage_event(100, Cause::default()));
        assert_eq!(harness.sent()[0].envelope.payload.action, SET_PERCENTAGE);
    }
}
