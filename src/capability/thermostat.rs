use serde_json::json;

use super::{
    float_field, str_field, CallbackSlot, CapabilityHandler, DeviceHandle, EventLimiter,
    HandledResult, Request,
};
use crate::protocol::{value_map, Cause};

pub const TARGET_TEMPERATURE: &str = "targetTemperature";
pub const ADJUST_TARGET_TEMPERATURE: &str = "adjustTargetTemperature";
pub const SET_THERMOSTAT_MODE: &str = "setThermostatMode";

type TemperatureCallback = dyn FnMut(&str, &mut f64) -> bool + Send;
type ThermostatModeCallback = dyn FnMut(&str, &mut String) -> bool + Send;

/// Target temperature and operating mode of a thermostat.
///
/// Target temperature and mode events are limited independently.
pub struct ThermostatController {
    device: DeviceHandle,
    target_temperature: CallbackSlot<TemperatureCallback>,
    adjust_target_temperature: CallbackSlot<TemperatureCallback>,
    thermostat_mode: CallbackSlot<ThermostatModeCallback>,
    temperature_limiter: EventLimiter,
    mode_limiter: EventLimiter,
}

impl ThermostatController {
    pub fn new(device: DeviceHandle) -> Self {
        let temperature_limiter = device.state_limiter();
        let mode_limiter = device.state_limiter();
        Self {
            device,
            target_temperature: CallbackSlot::new(),
            adjust_target_temperature: CallbackSlot::new(),
            thermostat_mode: CallbackSlot::new(),
            temperature_limiter,
            mode_limiter,
        }
    }

    pub fn on_target_temperature<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut f64) -> bool + Send + 'static,
    {
        self.target_temperature.set(Box::new(callback));
    }

    pub fn on_adjust_target_temperature<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut f64) -> bool + Send + 'static,
    {
        self.adjust_target_temperature.set(Box::new(callback));
    }

    pub fn on_thermostat_mode<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut String) -> bool + Send + 'static,
    {
        self.thermostat_mode.set(Box::new(callback));
    }

    pub fn send_target_temperature_event(&self, temperature: f64, cause: Cause) -> bool {
        self.device.emit(
            &self.temperature_limiter,
            None,
            TARGET_TEMPERATURE,
            cause,
            value_map(json!({ "temperature": round_to(temperature, 10.0) })),
        )
    }

    pub fn send_thermostat_mode_event(&self, thermostat_mode: &str, cause: Cause) -> bool {
        self.device.emit(
            &self.mode_limiter,
            None,
            SET_THERMOSTAT_MODE,
            cause,
            value_map(json!({ "thermostatMode": thermostat_mode })),
        )
    }

    fn handle_temperature(
        &self,
        request: &Request<'_>,
        slot: &CallbackSlot<TemperatureCallback>,
        mut temperature: f64,
    ) -> HandledResult {
        slot.call(|cb| cb(request.device_id, &mut temperature))
            .map(|success| {
                HandledResult::handled(success, value_map(json!({ "temperature": temperature })))
            })
            .unwrap_or_default()
    }
}

/// Rounds to `1 / factor` steps
pub(crate) fn round_to(value: f64, factor: f64) -> f64 {
    (value * factor).round() / factor
}

impl CapabilityHandler for ThermostatController {
    fn capability(&self) -> &'static str {
        "ThermostatController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        match request.action {
            TARGET_TEMPERATURE => {
                // a request without temperature counts as 1 degree
                let temperature = if request.value.contains_key("temperature") {
                    float_field(request.value, "temperature")
                } else {
                    1.0
                };
                self.handle_temperature(request, &self.target_temperature, temperature)
            }
            ADJUST_TARGET_TEMPERATURE => self.handle_temperature(
                request,
                &self.adjust_target_temperature,
                float_field(request.value, "temperature"),
            ),
            SET_THERMOSTAT_MODE => {
                let mut mode = str_field(request.value, "thermostatMode").to_string();
                self.thermostat_mode
                    .call(|cb| cb(request.device_id, &mut mode))
                    .map(|success| {
                        HandledResult::handled(success, value_map(json!({ "thermostatMode": mode })))
                    })
                    .unwrap_or_default()
            }
            _ => HandledResult::not_handled(),
        }
    }
}
