use serde_json::json;

use super::{CapabilityHandler, DeviceHandle, EventLimiter, HandledResult, Request};
use crate::protocol::{value_map, Cause};

pub const DOORBELL_PRESS: &str = "DoorbellPress";

pub struct Doorbell {
    device: DeviceHandle,
    limiter: EventLimiter,
}

impl Doorbell {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.state_limiter();
        Self { device, limiter }
    }

    pub fn send_doorbell_event(&self, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            None,
            DOORBELL_PRESS,
            cause,
            value_map(json!({ "state": "pressed" })),
        )
    }
}

impl CapabilityHandler for Doorbell {
    fn capability(&self) -> &'static str {
        "Doorbell"
    }

    fn try_handle(&self, _request: &Request<'_>) -> HandledResult {
        HandledResult::not_handled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::testing::{request, Harness};
    use crate::protocol::ValueMap;
    use crate::transport::ConnectionState;

    #[test]
    fn test_doorbell_press_is_rate_limited() {
        let mut harness = Harness::connected("bell-1");
        let doorbell = Doorbell::new(harness.handle.clone());

        assert!(doorbell.send_doorbell_event(Cause::physical_interaction()));
        assert!(!doorbell.send_doorbell_event(Cause::physical_interaction()));

        let sent = harness.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].envelope.payload.action, DOORBELL_PRESS);
        assert_eq!(sent[0].envelope.payload.device_id, "bell-1");
        assert_eq!(sent[0].envelope.payload.value["state"], "pressed");
    }

    #[test]
    fn test_doorbell_ignores_requests() {
        let harness = Harness::connected("bell-1");
        let doorbell = Doorbell::new(harness.handle.clone());
        let value = ValueMap::new();
        assert!(!doorbell.try_handle(&request(DOORBELL_PRESS, "", &value)).handled);
    }

    #[test]
    fn test_doorbell_press_dropped_while_disconnected() {
        let mut harness = Harness::connected("bell-1");
        harness.status.send_replace(ConnectionState::Disconnected);
        let doorbell = Doorbell::new(harness.handle.clone());

        assert!(!doorbell.send_doorbell_event(Cause::physical_interaction()));
        assert!(harness.sent().is_empty());
    }
}
