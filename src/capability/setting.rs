use serde_json::Value;

use super::{str_field, CallbackSlot, CapabilityHandler, DeviceHandle, HandledResult, Request};
use crate::protocol::{SettingValue, ValueMap};

pub const SET_SETTING: &str = "setSetting";

type SettingCallback = dyn FnMut(&str, &str, &mut SettingValue) -> bool + Send;
pub(crate) type SettingSlot = CallbackSlot<SettingCallback>;

/// Device specific settings (`setSetting`) with typed values.
pub struct SettingController {
    setting: SettingSlot,
}

impl SettingController {
    /// Settings emit no events, the device handle is not kept
    pub fn new(_device: DeviceHandle) -> Self {
        Self {
            setting: CallbackSlot::new(),
        }
    }

    /// Callback gets the device id, the setting id and its value
    pub fn on_setting<F>(&self, callback: F)
    where
        F: FnMut(&str, &str, &mut SettingValue) -> bool + Send + 'static,
    {
        self.setting.set(Box::new(callback));
    }
}

/// Shared with the module command handler, which answers `setSetting` for
/// module scoped requests.
pub(crate) fn handle_setting(slot: &SettingSlot, request: &Request<'_>) -> HandledResult {
    let id = str_field(request.value, "id").to_string();
    let mut value = SettingValue::from_json(request.value.get("value").unwrap_or(&Value::Null));

    slot.call(|cb| cb(request.device_id, &id, &mut value))
        .map(|success| {
            let mut response = ValueMap::new();
            response.insert("id".to_string(), Value::String(id.clone()));
            response.insert("value".to_string(), value.to_json());
            HandledResult::handled(success, response)
        })
        .unwrap_or_default()
}

impl CapabilityHandler for SettingController {
    fn capability(&self) -> &'static str {
        "SettingController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        if request.action != SET_SETTING {
            return HandledResult::not_handled();
        }
        handle_setting(&self.setting, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::testing::{request, Harness};
    use crate::protocol::value_map;
    use serde_json::json;

    #[test]
    fn test_typed_setting_values() {
        let harness = Harness::connected("dev-1");
        let controller = SettingController::new(harness.handle.clone());
        controller.on_setting(|_, id, value| match id {
            "tilt" => {
                if let SettingValue::Int(tilt) = *value {
                    *value = SettingValue::Int(tilt.clamp(0, 90));
                    true
                } else {
                    false
                }
            }
            "eco" => matches!(value, SettingValue::Bool(_)),
            _ => false,
        });

        let tilt = value_map(json!({"id": "tilt", "value": 120}));
        let result = controller.try_handle(&request(SET_SETTING, "", &tilt));
        assert!(result.success);
        assert_eq!(result.value["value"], 90);

        let eco = value_map(json!({"id": "eco", "value": true}));
        assert!(controller.try_handle(&request(SET_SETTING, "", &eco)).success);

        let unknown = value_map(json!({"id": "color", "value": [1, 2]}));
        let result = controller.try_handle(&request(SET_SETTING, "", &unknown));
        assert!(!result.success);
        assert_eq!(result.value["value"], "[1,2]");
    }
}
