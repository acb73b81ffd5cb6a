use serde_json::json;

use super::{CapabilityHandler, DeviceHandle, EventLimiter, HandledResult, Request};
use crate::protocol::{value_map, Cause};

pub const PUSH_NOTIFICATION: &str = "pushNotification";

/// Sends a text alert to the user's phone. Limited like sensor values.
pub struct PushNotification {
    device: DeviceHandle,
    limiter: EventLimiter,
}

impl PushNotification {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.sensor_limiter();
        Self { device, limiter }
    }

    pub fn send_push_notification(&self, notification: &str) -> bool {
        self.device.emit(
            &self.limiter,
            None,
            PUSH_NOTIFICATION,
            Cause::alert(),
            value_map(json!({ "alert": notification })),
        )
    }
}

impl CapabilityHandler for PushNotification {
    fn capability(&self) -> &'static str {
        "PushNotification"
    }

    fn try_handle(&self, _request: &Request<'_>) -> HandledResult {
        HandledResult::not_handled()
    }
}
