use serde_json::json;

use super::{
    int_field, CallbackSlot, CapabilityHandler, DeviceHandle, EventLimiter, HandledResult, Request,
};
use crate::protocol::{value_map, Cause};

pub const SET_POWER_LEVEL: &str = "setPowerLevel";
pub const ADJUST_POWER_LEVEL: &str = "adjustPowerLevel";

type PowerLevelCallback = dyn FnMut(&str, &mut i64) -> bool + Send;

/// Absolute and relative power level. Both responses report `powerLevel`.
pub struct PowerLevelController {
    device: DeviceHandle,
    power_level: CallbackSlot<PowerLevelCallback>,
    adjust_power_level: CallbackSlot<PowerLevelCallback>,
    limiter: EventLimiter,
}

impl PowerLevelController {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.state_limiter();
        Self {
            device,
            power_level: CallbackSlot::new(),
            adjust_power_level: CallbackSlot::new(),
            limiter,
        }
    }

    pub fn on_power_level<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut i64) -> bool + Send + 'static,
    {
        self.power_level.set(Box::new(callback));
    }

    /// Callback gets `powerLevelDelta` and writes back the new level
    pub fn on_adjust_power_level<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut i64) -> bool + Send + 'static,
    {
        self.adjust_power_level.set(Box::new(callback));
    }

    pub fn send_power_level_event(&self, power_level: i64, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            None,
            SET_POWER_LEVEL,
            cause,
            value_map(json!({ "powerLevel": power_level })),
        )
    }
}

impl CapabilityHandler for PowerLevelController {
    fn capability(&self) -> &'static str {
        "PowerLevelController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        let (slot, key) = match request.action {
            SET_POWER_LEVEL => (&self.power_level, "powerLevel"),
            ADJUST_POWER_LEVEL => (&self.adjust_power_level, "powerLevelDelta"),
            _ => return HandledResult::not_handled(),
        };

        let mut level = int_field(request.value, key);
        slot.call(|cb| cb(request.device_id, &mut level))
            .map(|success| {
                HandledResult::handled(success, value_map(json!({ "powerLevel": level })))
            })
            .unwrap_or_default()
    }
}
