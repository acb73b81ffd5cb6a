use serde_json::json;

use super::{str_field, CallbackSlot, CapabilityHandler, DeviceHandle, HandledResult, Request};
use crate::protocol::value_map;

pub const SET_SMART_BUTTON_STATE: &str = "setSmartButtonState";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmartButtonPress {
    Single,
    Double,
    Long,
}

impl SmartButtonPress {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmartButtonPress::Single => "singlePress",
            SmartButtonPress::Double => "doublePress",
            SmartButtonPress::Long => "longPress",
        }
    }

    pub fn parse(state: &str) -> Option<Self> {
        match state {
            "singlePress" => Some(SmartButtonPress::Single),
            "doublePress" => Some(SmartButtonPress::Double),
            "longPress" => Some(SmartButtonPress::Long),
            _ => None,
        }
    }
}

type ButtonPressCallback = dyn FnMut(&str, SmartButtonPress) -> bool + Send;

/// Presses of a virtual button in the app, forwarded to the device.
/// Unknown press types are not handled.
pub struct SmartButtonStateController {
    button_press: CallbackSlot<ButtonPressCallback>,
}

impl SmartButtonStateController {
    pub fn new(_device: DeviceHandle) -> Self {
        Self {
            button_press: CallbackSlot::new(),
        }
    }

    pub fn on_button_press<F>(&self, callback: F)
    where
        F: FnMut(&str, SmartButtonPress) -> bool + Send + 'static,
    {
        self.button_press.set(Box::new(callback));
    }
}

impl CapabilityHandler for SmartButtonStateController {
    fn capability(&self) -> &'static str {
        "SmartButtonStateController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        if request.action != SET_SMART_BUTTON_STATE {
            return HandledResult::not_handled();
        }
        let Some(press) = SmartButtonPress::parse(str_field(request.value, "state")) else {
            return HandledResult::not_handled();
        };
        self.button_press
            .call(|cb| cb(request.device_id, press))
            .map(|success| {
                HandledResult::handled(success, value_map(json!({ "state": press.as_str() })))
            })
            .unwrap_or_default()
    }
}
