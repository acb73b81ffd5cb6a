use serde_json::json;

use super::{CapabilityHandler, DeviceHandle, EventLimiter, HandledResult, Request};
use crate::protocol::{value_map, Cause};

pub const SET_CONTACT_STATE: &str = "setContactState";

/// Door/window contact. Event only.
pub struct ContactSensor {
    device: DeviceHandle,
    limiter: EventLimiter,
}

impl ContactSensor {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.state_limiter();
        Self { device, limiter }
    }

    pub fn send_contact_event(&self, closed: bool, cause: Cause) -> bool {
        let state = if closed { "closed" } else { "open" };
        self.device.emit(
            &self.limiter,
            None,
            SET_CONTACT_STATE,
            cause,
            value_map(json!({ "state": state })),
        )
    }
}

impl CapabilityHandler for ContactSensor {
    fn capability(&self) -> &'static str {
        "ContactSensor"
    }

    fn try_handle(&self, _request: &Request<'_>) -> HandledResult {
        HandledResult::not_handled()
    }
}
