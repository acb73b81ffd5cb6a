//! Blinds, curtains and other things that open by a percentage.
//!
//! Requests may carry an `openDirection` (e.g. `"UP"`, `"LEFT"`) for devices
//! that open in more than one direction. Directional and plain requests go
//! to separate callbacks; a request whose matching callback is missing is
//! left to the next handler.

use serde_json::{json, Value};

use super::{
    int_field, str_field, CallbackSlot, CapabilityHandler, DeviceHandle, EventLimiter,
    HandledResult, Request,
};
use crate::protocol::{value_map, Cause};

pub const SET_OPEN_CLOSE: &str = "setOpenClose";
pub const ADJUST_OPEN_CLOSE: &str = "adjustOpenClose";

type OpenCloseCallback = dyn FnMut(&str, &mut i64) -> bool + Send;
type DirectionCallback = dyn FnMut(&str, &str, &mut i64) -> bool + Send;

pub struct OpenCloseController {
    device: DeviceHandle,
    open_close: CallbackSlot<OpenCloseCallback>,
    direction_open_close: CallbackSlot<DirectionCallback>,
    adjust_open_close: CallbackSlot<OpenCloseCallback>,
    adjust_direction_open_close: CallbackSlot<DirectionCallback>,
    limiter: EventLimiter,
}

impl OpenCloseController {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.state_limiter();
        Self {
            device,
            open_close: CallbackSlot::new(),
            direction_open_close: CallbackSlot::new(),
            adjust_open_close: CallbackSlot::new(),
            adjust_direction_open_close: CallbackSlot::new(),
            limiter,
        }
    }

    pub fn on_open_close<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut i64) -> bool + Send + 'static,
    {
        self.open_close.set(Box::new(callback));
    }

    pub fn on_direction_open_close<F>(&self, callback: F)
    where
        F: FnMut(&str, &str, &mut i64) -> bool + Send + 'static,
    {
        self.direction_open_close.set(Box::new(callback));
    }

    /// Callback gets `openRelativePercent` and writes back the new
    /// absolute percentage
    pub fn on_adjust_open_close<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut i64) -> bool + Send + 'static,
    {
        self.adjust_open_close.set(Box::new(callback));
    }

    pub fn on_adjust_direction_open_close<F>(&self, callback: F)
    where
        F: FnMut(&str, &str, &mut i64) -> bool + Send + 'static,
    {
        self.adjust_direction_open_close.set(Box::new(callback));
    }

    pub fn send_open_close_event(&self, open_percent: i64, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            None,
            SET_OPEN_CLOSE,
            cause,
            value_map(json!({ "openPercent": open_percent })),
        )
    }

    pub fn send_direction_open_close_event(
        &self,
        direction: &str,
        open_percent: i64,
        cause: Cause,
    ) -> bool {
        self.device.emit(
            &self.limiter,
            None,
            SET_OPEN_CLOSE,
            cause,
            value_map(json!({ "openDirection": direction, "openPercent": open_percent })),
        )
    }

    fn dispatch(
        request: &Request<'_>,
        percent_key: &str,
        plain: &CallbackSlot<OpenCloseCallback>,
        directional: &CallbackSlot<DirectionCallback>,
    ) -> HandledResult {
        let mut percent = int_field(request.value, percent_key);
        let has_direction = request
            .value
            .get("openDirection")
            .is_some_and(|direction| !direction.is_null());

        if has_direction {
            let direction = str_field(request.value, "openDirection");
            directional
                .call(|cb| cb(request.device_id, direction, &mut percent))
                .map(|success| {
                    HandledResult::handled(
                        success,
                        value_map(json!({ "openDirection": direction, "openPercent": percent })),
                    )
                })
                .unwrap_or_default()
        } else {
            plain
                .call(|cb| cb(request.device_id, &mut percent))
                .map(|success| {
                    HandledResult::handled(success, value_map(json!({ "openPercent": percent })))
                })
                .unwrap_or_default()
        }
    }
}

impl CapabilityHandler for OpenCloseController {
    fn capability(&self) -> &'static str {
        "OpenCloseController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        match request.action {
            SET_OPEN_CLOSE => Self::dispatch(
                request,
                "openPercent",
                &self.open_close,
                &self.direction_open_close,
            ),
            ADJUST_OPEN_CLOSE => Self::dispatch(
                request,
                "openRelativePercent",
                &self.adjust_open_close,
                &self.adjust_direction_open_close,
            ),
            _ => HandledResult::not_handled(),
        }
    }
}
