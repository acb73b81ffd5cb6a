use serde_json::json;

use super::{str_field, CallbackSlot, CapabilityHandler, DeviceHandle, HandledResult, Request};
use crate::protocol::value_map;

pub const SEND_KEYSTROKE: &str = "SendKeystroke";

type KeystrokeCallback = dyn FnMut(&str, &mut String) -> bool + Send;

/// Remote control keys (`"UP"`, `"SELECT"`, `"INFO"`, ...). Request only.
pub struct KeypadController {
    keystroke: CallbackSlot<KeystrokeCallback>,
}

impl KeypadController {
    pub fn new(_device: DeviceHandle) -> Self {
        Self {
            keystroke: CallbackSlot::new(),
        }
    }

    pub fn on_keystroke<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut String) -> bool + Send + 'static,
    {
        self.keystroke.set(Box::new(callback));
    }
}

impl CapabilityHandler for KeypadController {
    fn capability(&self) -> &'static str {
        "KeypadController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        if request.action != SEND_KEYSTROKE {
            return HandledResult::not_handled();
        }
        let mut keystroke = str_field(request.value, "keystroke").to_string();
        self.keystroke
            .call(|cb| cb(request.device_id, &mut keystroke))
            .map(|success| {
                HandledResult::handled(success, value_map(json!({ "keystroke": keystroke })))
            })
            .unwrap_or_default()
    }
}
