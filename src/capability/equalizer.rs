//! Equalizer bands (`setBands`, `adjustBands`, `resetBands`).
//!
//! A request may address several bands. Each band is passed to the callback
//! on its own and reported in a `bands` array in request order. The
//! response's overall success is that of the last band.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{
    int_field, int_field_or, str_field, CallbackSlot, CapabilityHandler, DeviceHandle,
    EventLimiter, HandledResult, Request,
};
use crate::protocol::{value_map, Cause, ValueMap};

pub const SET_BANDS: &str = "setBands";
pub const ADJUST_BANDS: &str = "adjustBands";
pub const RESET_BANDS: &str = "resetBands";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EqualizerBand {
    pub name: String,
    pub level: i64,
}

/// One element of the `bands` array. Fields are read leniently so a
/// malformed element does not affect its neighbours.
#[derive(Debug)]
struct BandRequest<'a> {
    name: &'a str,
    level: i64,
    level_delta: i64,
    level_direction: &'a str,
}

impl<'a> BandRequest<'a> {
    fn read(band: &'a ValueMap) -> Self {
        Self {
            name: str_field(band, "name"),
            level: int_field(band, "level"),
            level_delta: int_field_or(band, "levelDelta", 1),
            level_direction: str_field(band, "levelDirection"),
        }
    }
}

type BandsCallback = dyn FnMut(&str, &str, &mut i64) -> bool + Send;

pub struct EqualizerController {
    device: DeviceHandle,
    set_bands: CallbackSlot<BandsCallback>,
    adjust_bands: CallbackSlot<BandsCallback>,
    reset_bands: CallbackSlot<BandsCallback>,
    limiter: EventLimiter,
}

impl EqualizerController {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.state_limiter();
        Self {
            device,
            set_bands: CallbackSlot::new(),
            adjust_bands: CallbackSlot::new(),
            reset_bands: CallbackSlot::new(),
            limiter,
        }
    }

    /// Callback gets the device id, the band name and the level
    pub fn on_set_bands<F>(&self, callback: F)
    where
        F: FnMut(&str, &str, &mut i64) -> bool + Send + 'static,
    {
        self.set_bands.set(Box::new(callback));
    }

    /// Callback gets the signed level delta and writes back the new level
    pub fn on_adjust_bands<F>(&self, callback: F)
    where
        F: FnMut(&str, &str, &mut i64) -> bool + Send + 'static,
    {
        self.adjust_bands.set(Box::new(callback));
    }

    pub fn on_reset_bands<F>(&self, callback: F)
    where
        F: FnMut(&str, &str, &mut i64) -> bool + Send + 'static,
    {
        self.reset_bands.set(Box::new(callback));
    }

    pub fn send_bands_event(&self, band: &str, level: i64, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            None,
            SET_BANDS,
            cause,
            value_map(json!({ "bands": [{ "name": band, "value": level }] })),
        )
    }

    fn handle_bands(
        &self,
        request: &Request<'_>,
        slot: &CallbackSlot<BandsCallback>,
        start_level: impl Fn(&BandRequest<'_>) -> i64,
    ) -> HandledResult {
        let empty = ValueMap::new();
        let bands: Vec<BandRequest<'_>> = request
            .value
            .get("bands")
            .and_then(Value::as_array)
            .map(|bands| {
                bands
                    .iter()
                    .map(|band| BandRequest::read(band.as_object().unwrap_or(&empty)))
                    .collect()
            })
            .unwrap_or_default();

        let handled = slot.call(|cb| {
            let mut success = false;
            let mut reported = Vec::with_capacity(bands.len());
            for band in &bands {
                let mut level = start_level(band);
                success = cb(request.device_id, band.name, &mut level);
                reported.push(EqualizerBand {
                    name: band.name.to_string(),
                    level,
                });
            }
            (success, reported)
        });

        match handled {
            Some((success, reported)) => {
                let mut value = ValueMap::new();
                value.insert("bands".to_string(), json!(reported));
                HandledResult::handled(success, value)
            }
            None => HandledResult::not_handled(),
        }
    }
}

impl CapabilityHandler for EqualizerController {
    fn capability(&self) -> &'static str {
        "EqualizerController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        match request.action {
            SET_BANDS => self.handle_bands(request, &self.set_bands, |band| band.level),
            ADJUST_BANDS => self.handle_bands(request, &self.adjust_bands, |band| {
                if band.level_direction == "DOWN" {
                    -band.level_delta
                } else {
                    band.level_delta
                }
            }),
            RESET_BANDS => self.handle_bands(request, &self.reset_bands, |_| 0),
            _ => HandledResult::not_handled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::testing::{request, Harness};

    #[test]
    fn test_bands_reported_in_order() {
        let harness = Harness::connected("dev-1");
        let controller = EqualizerController::new(harness.handle.clone());
        controller.on_set_bands(|_, _, level| {
            *level = (*level).min(10);
            true
        });

        let value = value_map(json!({"bands": [
            {"name": "BASS", "level": 3},
            {"name": "TREBLE", "level": 12}
        ]}));
        let result = controller.try_handle(&request(SET_BANDS, "", &value));
        assert!(result.success);
        assert_eq!(
            result.value["bands"],
            json!([{"name": "BASS", "level": 3}, {"name": "TREBLE", "level": 10}])
        );
    }

    #[test]
    fn test_success_is_taken_from_last_band() {
        let harness = Harness::connected("dev-1");
        let controller = EqualizerController::new(harness.handle.clone());
        controller.on_set_bands(|_, band, _| band != "BASS");

        // BASS fails, MIDRANGE succeeds: reported as success
        let value = value_map(json!({"bands": [
            {"name": "BASS", "level": 1},
            {"name": "MIDRANGE", "level": 2}
        ]}));
        assert!(controller.try_handle(&request(SET_BANDS, "", &value)).success);

        // and the other way round it is reported as failure
        let value = value_map(json!({"bands": [
            {"name": "MIDRANGE", "level": 2},
            {"name": "BASS", "level": 1}
        ]}));
        assert!(!controller.try_handle(&request(SET_BANDS, "", &value)).success);
    }

    #[test]
    fn test_adjust_direction_and_default_delta() {
        let harness = Harness::connected("dev-1");
        let controller = EqualizerController::new(harness.handle.clone());
        controller.on_adjust_bands(|_, _, _| true);

        let value = value_map(json!({"bands": [
            {"name": "BASS", "levelDelta": 3, "levelDirection": "DOWN"},
            {"name": "TREBLE", "levelDirection": "UP"}
        ]}));
        let result = controller.try_handle(&request(ADJUST_BANDS, "", &value));
        assert_eq!(
            result.value["bands"],
            json!([{"name": "BASS", "level": -3}, {"name": "TREBLE", "level": 1}])
        );
    }

    #[test]
    fn test_malformed_band_does_not_drop_the_others() {
        let harness = Harness::connected("dev-1");
        let controller = EqualizerController::new(harness.handle.clone());
        controller.on_set_bands(|_, _, _| true);

        let value = value_map(json!({"bands": [
            {"name": "BASS", "level": 3},
            {"name": "TREBLE", "level": 2.5},
            {"name": "MIDRANGE", "level": "loud"},
            "garbage"
        ]}));
        let result = controller.try_handle(&request(SET_BANDS, "", &value));
        assert!(result.handled);
        assert!(result.success);
        assert_eq!(
            result.value["bands"],
            json!([
                {"name": "BASS", "level": 3},
                {"name": "TREBLE", "level": 2},
                {"name": "MIDRANGE", "level": 0},
                {"name": "", "level": 0}
            ])
        );
    }

    #[test]
    fn test_reset_uses_zero_level() {
        let harness = Harness::connected("dev-1");
        let controller = EqualizerController::new(harness.handle.clone());
        controller.on_reset_bands(|_, _, level| {
            assert_eq!(*level, 0);
            true
        });
        let value = value_map(json!({"bands": [{"name": "BASS", "level": 7}]}));
        let result = controller.try_handle(&request(RESET_BANDS, "", &value));
        assert_eq!(result.value["bands"], json!([{"name": "BASS", "level": 0}]));
    }
}
