use serde_json::json;

use super::{
    bool_field, int_field, CallbackSlot, CapabilityHandler, DeviceHandle, EventLimiter,
    HandledResult, Request,
};
use crate::protocol::{value_map, Cause};

pub const SET_VOLUME: &str = "setVolume";
pub const ADJUST_VOLUME: &str = "adjustVolume";

type VolumeCallback = dyn FnMut(&str, &mut i64) -> bool + Send;
type AdjustVolumeCallback = dyn FnMut(&str, &mut i64, bool) -> bool + Send;

/// Absolute and relative volume.
///
/// `adjustVolume` carries a `volumeDefault` flag: when set, the delta is a
/// default step chosen by the voice assistant rather than a user value.
pub struct VolumeController {
    device: DeviceHandle,
    volume: CallbackSlot<VolumeCallback>,
    adjust_volume: CallbackSlot<AdjustVolumeCallback>,
    limiter: EventLimiter,
}

impl VolumeController {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.state_limiter();
        Self {
            device,
            volume: CallbackSlot::new(),
            adjust_volume: CallbackSlot::new(),
            limiter,
        }
    }

    pub fn on_volume<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut i64) -> bool + Send + 'static,
    {
        self.volume.set(Box::new(callback));
    }

    pub fn on_adjust_volume<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut i64, bool) -> bool + Send + 'static,
    {
        self.adjust_volume.set(Box::new(callback));
    }

    pub fn send_volume_event(&self, volume: i64, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            None,
            SET_VOLUME,
            cause,
            value_map(json!({ "volume": volume })),
        )
    }
}

impl CapabilityHandler for VolumeController {
    fn capability(&self) -> &'static str {
        "VolumeController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        let mut volume = int_field(request.value, "volume");
        let success = match request.action {
            SET_VOLUME => self.volume.call(|cb| cb(request.device_id, &mut volume)),
            ADJUST_VOLUME => {
                let volume_default = bool_field(request.value, "volumeDefault");
                self.adjust_volume
                    .call(|cb| cb(request.device_id, &mut volume, volume_default))
            }
            _ => None,
        };

        match success {
            Some(success) => HandledResult::handled(success, value_map(json!({ "volume": volume }))),
            None => HandledResult::not_handled(),
        }
    }
}
