//! Generic range values (`setRangeValue`, `adjustRangeValue`).
//!
//! The default instance works with integers, named instances with floats.
//! Requests for an instance without a registered callback are not handled.

use serde_json::json;

use super::{
    float_field, int_field, CallbackSlot, CapabilityHandler, DeviceHandle, EventLimiter,
    HandledResult, InstanceCallbacks, Request,
};
use crate::protocol::{value_map, Cause};

pub const SET_RANGE_VALUE: &str = "setRangeValue";
pub const ADJUST_RANGE_VALUE: &str = "adjustRangeValue";

type RangeCallback = dyn FnMut(&str, &mut i64) -> bool + Send;
type InstanceRangeCallback = dyn FnMut(&str, &str, &mut f64) -> bool + Send;

pub struct RangeController {
    device: DeviceHandle,
    range_value: CallbackSlot<RangeCallback>,
    adjust_range_value: CallbackSlot<RangeCallback>,
    instance_range_value: InstanceCallbacks<InstanceRangeCallback>,
    instance_adjust_range_value: InstanceCallbacks<InstanceRangeCallback>,
    limiter: EventLimiter,
}

impl RangeController {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.state_limiter();
        Self {
            device,
            range_value: CallbackSlot::new(),
            adjust_range_value: CallbackSlot::new(),
            instance_range_value: InstanceCallbacks::new(),
            instance_adjust_range_value: InstanceCallbacks::new(),
            limiter,
        }
    }

    pub fn on_range_value<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut i64) -> bool + Send + 'static,
    {
        self.range_value.set(Box::new(callback));
    }

    pub fn on_adjust_range_value<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut i64) -> bool + Send + 'static,
    {
        self.adjust_range_value.set(Box::new(callback));
    }

    pub fn on_instance_range_value<F>(&self, instance: &str, callback: F)
    where
        F: FnMut(&str, &str, &mut f64) -> bool + Send + 'static,
    {
        self.instance_range_value.set(instance, Box::new(callback));
    }

    pub fn on_instance_adjust_range_value<F>(&self, instance: &str, callback: F)
    where
        F: FnMut(&str, &str, &mut f64) -> bool + Send + 'static,
    {
        self.instance_adjust_range_value
            .set(instance, Box::new(callback));
    }

    /// `instance` of `None` reports the default instance
    pub fn send_range_value_event(&self, instance: Option<&str>, range_value: f64, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            instance,
            SET_RANGE_VALUE,
            cause,
            value_map(json!({ "rangeValue": range_value })),
        )
    }

    fn handle_default(&self, request: &Request<'_>, slot: &CallbackSlot<RangeCallback>, key: &str) -> HandledResult {
        let mut range_value = int_field(request.value, key);
        slot.call(|cb| cb(request.device_id, &mut range_value))
            .map(|success| {
                HandledResult::handled(success, value_map(json!({ "rangeValue": range_value })))
            })
            .unwrap_or_default()
    }

    fn handle_instance(
        &self,
        request: &Request<'_>,
        callbacks: &InstanceCallbacks<InstanceRangeCallback>,
        key: &str,
    ) -> HandledResult {
        let mut range_value = float_field(request.value, key);
        callbacks
            .call(request.instance, |cb| {
                cb(request.device_id, request.instance, &mut range_value)
            })
            .map(|success| {
                HandledResult::handled(success, value_map(json!({ "rangeValue": range_value })))
            })
            .unwrap_or_default()
    }
}

impl CapabilityHandler for RangeController {
    fn capability(&self) -> &'static str {
        "RangeController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        let default_instance = request.instance.is_empty();
        match request.action {
            SET_RANGE_VALUE if default_instance => {
                self.handle_default(request, &self.range_value, "rangeValue")
            }
            SET_RANGE_VALUE => {
                self.handle_instance(request, &self.instance_range_value, "rangeValue")
            }
            ADJUST_RANGE_VALUE if default_instance => {
                self.handle_default(request, &self.adjust_range_value, "rangeValueDelta")
            }
            ADJUST_RANGE_VALUE => self.handle_instance(
                request,
                &self.instance_adjust_range_value,
                "rangeValueDelta",
            ),
            _ => HandledResult::not_handled(),
        }
    }
}
