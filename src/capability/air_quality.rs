use serde_json::json;

use super::{CapabilityHandler, DeviceHandle, EventLimiter, HandledResult, Request};
use crate::protocol::{value_map, Cause};

pub const AIR_QUALITY: &str = "airQuality";

/// Particulate matter concentrations in µg/m³
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AirQuality {
    pub pm1: i64,
    pub pm2_5: i64,
    pub pm10: i64,
}

pub struct AirQualitySensor {
    device: DeviceHandle,
    limiter: EventLimiter,
}

impl AirQualitySensor {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.sensor_limiter();
        Self { device, limiter }
    }

    pub fn send_air_quality_event(&self, reading: AirQuality, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            None,
            AIR_QUALITY,
            cause,
            value_map(json!({
                "pm1": reading.pm1,
                "pm2_5": reading.pm2_5,
                "pm10": reading.pm10,
            })),
        )
    }
}

impl CapabilityHandler for AirQualitySensor {
    fn capability(&self) -> &'static str {
        "AirQualitySensor"
    }

    fn try_handle(&self, _request: &Request<'_>) -> HandledResult {
        HandledResult::not_handled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::testing::Harness;

    #[test]
    fn test_air_quality_report() {
        let mut harness = Harness::connected("dev-1");
        let sensor = AirQualitySensor::new(harness.handle.clone());
        let reading = AirQuality {
            pm1: 3,
            pm2_5: 12,
            pm10: 20,
        };
        assert!(sensor.send_air_quality_event(reading, Cause::periodic_poll()));

        let sent = harness.sent();
        let value = &sent[0].envelope.payload.value;
        assert_eq!(value["pm1"], 3);
        assert_eq!(value["pm2_5"], 12);
        assert_eq!(value["pm10"], 20);
    }
}
