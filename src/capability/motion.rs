use serde_json::json;

use super::{CapabilityHandler, DeviceHandle, EventLimiter, HandledResult, Request};
use crate::protocol::{value_map, Cause};

pub const MOTION: &str = "motion";

pub struct MotionSensor {
    device: DeviceHandle,
    limiter: EventLimiter,
}

impl MotionSensor {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.state_limiter();
        Self { device, limiter }
    }

    pub fn send_motion_event(&self, detected: bool, cause: Cause) -> bool {
        let state = if detected { "detected" } else { "notDetected" };
        self.device.emit(
            &self.limiter,
            None,
            MOTION,
            cause,
            value_map(json!({ "state": state })),
        )
    }
}

impl CapabilityHandler for MotionSensor {
    fn capability(&self) -> &'static str {
        "MotionSensor"
    }

    fn try_handle(&self, _request: &Request<'_>) -> HandledResult {
        HandledResult::not_handled()
    }
}
