use serde_json::json;

use super::{
    str_field, CapabilityHandler, DeviceHandle, EventLimiter, HandledResult, InstanceCallbacks,
    Request, DEFAULT_INSTANCE,
};
use crate::protocol::{value_map, Cause};

pub const SET_MODE: &str = "setMode";

type ModeCallback = dyn FnMut(&str, &str, &mut String) -> bool + Send;

/// Named modes (`setMode`), for the default instance and named instances.
pub struct ModeController {
    device: DeviceHandle,
    modes: InstanceCallbacks<ModeCallback>,
    limiter: EventLimiter,
}

impl ModeController {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.state_limiter();
        Self {
            device,
            modes: InstanceCallbacks::new(),
            limiter,
        }
    }

    pub fn on_mode<F>(&self, mut callback: F)
    where
        F: FnMut(&str, &mut String) -> bool + Send + 'static,
    {
        self.modes.set(
            DEFAULT_INSTANCE,
            Box::new(move |device_id, _, mode| callback(device_id, mode)),
        );
    }

    pub fn on_instance_mode<F>(&self, instance: &str, callback: F)
    where
        F: FnMut(&str, &str, &mut String) -> bool + Send + 'static,
    {
        self.modes.set(instance, Box::new(callback));
    }

    pub fn send_mode_event(&self, instance: Option<&str>, mode: &str, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            instance,
            SET_MODE,
            cause,
            value_map(json!({ "mode": mode })),
        )
    }
}

impl CapabilityHandler for ModeController {
    fn capability(&self) -> &'static str {
        "ModeController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        if request.action != SET_MODE {
            return HandledResult::not_handled();
        }

        let mut mode = str_field(request.value, "mode").to_string();
        self.modes
            .call(request.instance, |cb| {
                cb(request.device_id, request.instance, &mut mode)
            })
            .map(|success| HandledResult::handled(success, value_map(json!({ "mode": mode }))))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::testing::{request, Harness};

    #[test]
    fn test_default_and_instance_modes() {
        let harness = Harness::connected("dev-1");
        let controller = ModeController::new(harness.handle.clone());
        controller.on_mode(|_, mode| *mode == "Eco");
        controller.on_instance_mode("washer.mode", |_, _, mode| {
            *mode = mode.to_uppercase();
            true
        });

        let eco = value_map(json!({"mode": "Eco"}));
        let result = controller.try_handle(&request(SET_MODE, "", &eco));
        assert!(result.success);
        assert_eq!(result.value["mode"], "Eco");

        let result = controller.try_handle(&request(SET_MODE, "washer.mode", &eco));
        assert_eq!(result.value["mode"], "ECO");

        assert!(!controller.try_handle(&request(SET_MODE, "dryer.mode", &eco)).handled);
    }
}
