//! Periodic temperature and humidity reports.

use serde_json::json;

use super::thermostat::round_to;
use super::{CapabilityHandler, DeviceHandle, EventLimiter, HandledResult, Request};
use crate::protocol::{value_map, Cause};

pub const CURRENT_TEMPERATURE: &str = "currentTemperature";

/// Reports are limited with the sensor value limit (one per minute by
/// default), not the state limit.
pub struct TemperatureSensor {
    device: DeviceHandle,
    limiter: EventLimiter,
}

impl TemperatureSensor {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.sensor_limiter();
        Self { device, limiter }
    }

    /// Temperature is rounded to 0.1, humidity to 0.01
    pub fn send_temperature_event(&self, temperature: f64, humidity: f64, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            None,
            CURRENT_TEMPERATURE,
            cause,
            value_map(json!({
                "humidity": round_to(humidity, 100.0),
                "temperature": round_to(temperature, 10.0),
            })),
        )
    }
}

impl CapabilityHandler for TemperatureSensor {
    fn capability(&self) -> &'static str {
        "TemperatureSensor"
    }

    fn try_handle(&self, _request: &Request<'_>) -> HandledResult {
        HandledResult::not_handled()
    }
}
