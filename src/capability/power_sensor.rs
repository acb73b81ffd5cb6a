//! Electrical power reports with energy accounting between reports.

use std::sync::Mutex;

use chrono::Utc;
use serde_json::json;

use super::{lock_or_recover, CapabilityHandler, DeviceHandle, EventLimiter, HandledResult, Request};
use crate::protocol::{value_map, Cause};

pub const POWER_USAGE: &str = "powerUsage";

/// Reported for optional fields the meter does not measure
const NOT_MEASURED: f64 = -1.0;

/// One meter reading. `power` defaults to `voltage * current`; with an
/// `apparent_power` the power factor is derived from it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PowerReading {
    pub voltage: f64,
    pub current: f64,
    pub power: Option<f64>,
    pub apparent_power: Option<f64>,
    pub reactive_power: Option<f64>,
    pub factor: Option<f64>,
}

impl PowerReading {
    pub fn new(voltage: f64, current: f64) -> Self {
        Self {
            voltage,
            current,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LastReport {
    timestamp: i64,
    power: f64,
}

pub struct PowerSensor {
    device: DeviceHandle,
    limiter: EventLimiter,
    last_report: Mutex<Option<LastReport>>,
}

impl PowerSensor {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.sensor_limiter();
        Self {
            device,
            limiter,
            last_report: Mutex::new(None),
        }
    }

    /// `wattHours` covers the time since the previous report, assuming the
    /// previous power held the whole time.
    pub fn send_power_sensor_event(&self, reading: PowerReading, cause: Cause) -> bool {
        self.send_power_sensor_event_at(reading, Utc::now().timestamp(), cause)
    }

    fn send_power_sensor_event_at(&self, reading: PowerReading, now: i64, cause: Cause) -> bool {
        let mut last_report = lock_or_recover(&self.last_report);

        let power = reading.power.unwrap_or(reading.voltage * reading.current);
        let factor = match reading.apparent_power {
            Some(apparent) if apparent != 0.0 => power / apparent,
            _ => reading.factor.unwrap_or(NOT_MEASURED),
        };
        let (start_time, watt_hours) = match *last_report {
            Some(last) => (
                last.timestamp,
                (now - last.timestamp).max(0) as f64 * last.power / 3600.0,
            ),
            None => (0, 0.0),
        };

        let sent = self.device.emit(
            &self.limiter,
            None,
            POWER_USAGE,
            cause,
            value_map(json!({
                "startTime": start_time,
                "voltage": reading.voltage,
                "current": reading.current,
                "power": power,
                "apparentPower": reading.apparent_power.unwrap_or(NOT_MEASURED),
                "reactivePower": reading.reactive_power.unwrap_or(NOT_MEASURED),
                "factor": factor,
                "wattHours": watt_hours,
            })),
        );
        if sent {
            *last_report = Some(LastReport {
                timestamp: now,
                power,
            });
        }
        sent
    }
}

impl CapabilityHandler for PowerSensor {
    fn capability(&self) -> &'static str {
        "PowerSensor"
    }

    fn try_handle(&self, _request: &Request<'_>) -> HandledResult {
        HandledResult::not_handled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::testing::Harness;
    use crate::capability::EventLimits;
    use std::time::Duration;

    fn unlimited() -> EventLimits {
        EventLimits {
            state: Duration::ZERO,
            sensor_value: Duration::ZERO,
        }
    }

    #[test]
    fn test_energy_since_last_report() {
        let mut harness = Harness::with_limits("meter-1", unlimited());
        let sensor = PowerSensor::new(harness.handle.clone());

        assert!(sensor.send_power_sensor_event_at(PowerReading::new(230.0, 2.0), 1_000, Cause::periodic_poll()));
        assert!(sensor.send_power_sensor_event_at(PowerReading::new(230.0, 1.0), 4_600, Cause::periodic_poll()));

        let sent = harness.sent();
        let first = &sent[0].envelope.payload.value;
        assert_eq!(first["startTime"], 0);
        assert_eq!(first["power"], 460.0);
        assert_eq!(first["wattHours"], 0.0);
        assert_eq!(first["factor"], -1.0);

        let second = &sent[1].envelope.payload.value;
        assert_eq!(second["startTime"], 1_000);
        assert_eq!(second["power"], 230.0);
        assert_eq!(second["wattHours"], 460.0);
    }

    #[test]
    fn test_factor_from_apparent_power() {
        let mut harness = Harness::connected("meter-1");
        let sensor = PowerSensor::new(harness.handle.clone());
        let reading = PowerReading {
            power: Some(80.0),
            apparent_power: Some(100.0),
            ..PowerReading::new(230.0, 0.5)
        };
        assert!(sensor.send_power_sensor_event(reading, Cause::periodic_poll()));
        assert!(!sensor.send_power_sensor_event(reading, Cause::periodic_poll()));

        let sent = harness.sent();
        assert_eq!(sent.len(), 1);
        let value = &sent[0].envelope.payload.value;
        assert_eq!(value["factor"], 0.8);
        assert_eq!(value["reactivePower"], -1.0);
    }

    #[test]
    fn test_suppressed_report_keeps_window() {
        let mut harness = Harness::connected("meter-1");
        let sensor = PowerSensor::new(harness.handle.clone());
        assert!(sensor.send_power_sensor_event_at(PowerReading::new(10.0, 1.0), 100, Cause::periodic_poll()));
        assert!(!sensor.send_power_sensor_event_at(PowerReading::new(10.0, 1.0), 200, Cause::periodic_poll()));

        let last = (*lock_or_recover(&sensor.last_report)).map(|last| last.timestamp);
        assert_eq!(last, Some(100));
        assert_eq!(harness.sent().len(), 1);
    }
}
