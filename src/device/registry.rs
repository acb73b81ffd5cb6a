//! Device registry and request router.

use std::sync::{Arc, Weak};

use tracing::{debug, info, warn};

use super::module::MODULE_DEVICE_ID;
use super::Device;
use crate::capability::Request;
use crate::protocol::Envelope;

/// Registered devices, held weakly: dropping the last application handle
/// of a device removes it from routing.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<Weak<Device>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `device` unless that very instance is already registered
    pub fn register(&mut self, device: &Arc<Device>) -> bool {
        if self.iter().any(|known| Arc::ptr_eq(&known, device)) {
            debug!("Device {} already registered", device.id());
            return false;
        }
        if self.find(device.id()).is_some() {
            warn!(
                "Another device with id {} is registered, requests go to the first one",
                device.id()
            );
        }
        info!(
            "Registered device {} ({}) with {:?}",
            device.id(),
            device.product_type(),
            device.capabilities()
        );
        self.devices.push(Arc::downgrade(device));
        true
    }

    pub fn unregister(&mut self, device: &Arc<Device>) -> bool {
        let before = self.devices.len();
        self.devices
            .retain(|known| !std::ptr::eq(known.as_ptr(), Arc::as_ptr(device)));
        let removed = self.devices.len() != before;
        if removed {
            info!("Unregistered device {}", device.id());
        }
        removed
    }

    /// Drops entries whose device is gone
    pub fn prune(&mut self) -> usize {
        let before = self.devices.len();
        self.devices.retain(|known| known.strong_count() > 0);
        let pruned = before - self.devices.len();
        if pruned > 0 {
            debug!("Pruned {} dropped devices", pruned);
        }
        pruned
    }

    pub fn iter(&self) -> impl Iterator<Item = Arc<Device>> + '_ {
        self.devices.iter().filter_map(Weak::upgrade)
    }

    pub fn find(&self, device_id: &str) -> Option<Arc<Device>> {
        self.iter().find(|device| device.id() == device_id)
    }

    /// IDs of all live devices, without the module pseudo-device
    pub fn device_ids(&self) -> Vec<String> {
        self.iter()
            .map(|device| device.id().to_string())
            .filter(|id| id != MODULE_DEVICE_ID)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Answers a request. Always produces exactly one response, the
    /// default "not handled" one if no device or handler claims it.
    pub fn route(&self, request: &Envelope) -> Envelope {
        let mut response = Envelope::response_to(request);
        let payload = &request.payload;
        let target = if payload.is_module_scope() {
            MODULE_DEVICE_ID
        } else {
            payload.device_id.as_str()
        };

        let Some(device) = self.find(target) else {
            warn!("Request {} for unknown device {}", payload.action, target);
            return response;
        };

        match device.handle_request(&Request::from_envelope(request)) {
            Some(result) => {
                response.payload.success = Some(result.success);
                response.payload.message = Some(if result.success {
                    "OK".to_string()
                } else {
                    format!("Device failed to handle \"{}\"", payload.action)
                });
                response.payload.value = result.value;
            }
            None => debug!("No handler of {} took {}", target, payload.action),
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::testing::Harness;
    use crate::capability::{EventLimits, PowerStateController};
    use crate::protocol::{value_map, MessageType};
    use serde_json::json;

    fn switch(harness: &Harness, id: &str) -> (Arc<Device>, Arc<PowerStateController>) {
        let events = harness_events(harness);
        let mut builder = Device::builder(id, "SWITCH", events, EventLimits::default());
        let power = builder.add(PowerStateController::new);
        (builder.build(), power)
    }

    fn harness_events(harness: &Harness) -> crate::queue::EventSender {
        crate::queue::EventSender::new(harness.outbound.sender(), harness.status.subscribe())
    }

    fn power_request(device_id: &str) -> Envelope {
        let mut request = Envelope::request(device_id, "setPowerState")
            .with_value(value_map(json!({"state": "On"})));
        request.payload.client_id = Some("android-app".to_string());
        request
    }

    #[test]
    fn test_route_to_handler() {
        let harness = Harness::connected("unused");
        let mut registry = DeviceRegistry::new();
        let (device, power) = switch(&harness, "dev-1");
        power.on_power_state(|_, _| true);
        assert!(registry.register(&device));

        let request = power_request("dev-1");
        let response = registry.route(&request);
        assert_eq!(response.kind(), MessageType::Response);
        assert_eq!(response.payload.reply_token, request.payload.reply_token);
        assert_eq!(response.payload.client_id.as_deref(), Some("android-app"));
        assert_eq!(response.payload.success, Some(true));
        assert_eq!(response.payload.message.as_deref(), Some("OK"));
        assert_eq!(response.payload.value["state"], "On");
    }

    #[test]
    fn test_callback_failure_message() {
        let harness = Harness::connected("unused");
        let mut registry = DeviceRegistry::new();
        let (device, power) = switch(&harness, "dev-1");
        power.on_power_state(|_, _| false);
        registry.register(&device);

        let response = registry.route(&power_request("dev-1"));
        assert_eq!(response.payload.success, Some(false));
        assert_eq!(
            response.payload.message.as_deref(),
            Some("Device failed to handle \"setPowerState\"")
        );
    }

    #[test]
    fn test_unknown_device_gets_default_failure() {
        let registry = DeviceRegistry::new();
        let response = registry.route(&power_request("nobody"));
        assert_eq!(response.payload.success, Some(false));
        assert_eq!(
            response.payload.message.as_deref(),
            Some("Device did not handle \"setPowerState\"")
        );
        assert!(response.payload.value.is_empty());
    }

    #[test]
    fn test_dropped_device_is_deregistered() {
        let harness = Harness::connected("unused");
        let mut registry = DeviceRegistry::new();
        let (device, power) = switch(&harness, "dev-1");
        power.on_power_state(|_, _| true);
        registry.register(&device);
        assert_eq!(registry.device_ids(), vec!["dev-1"]);

        drop(power);
        drop(device);
        assert!(registry.is_empty());
        assert_eq!(registry.prune(), 1);
        assert_eq!(registry.route(&power_request("dev-1")).payload.success, Some(false));
    }

    #[test]
    fn test_register_and_unregister_by_identity() {
        let harness = Harness::connected("unused");
        let mut registry = DeviceRegistry::new();
        let (first, _) = switch(&harness, "dev-1");
        let (twin, _) = switch(&harness, "dev-1");

        assert!(registry.register(&first));
        assert!(!registry.register(&first));
        assert!(!registry.unregister(&twin));
        assert!(registry.unregister(&first));
        assert!(registry.is_empty());
    }
}
