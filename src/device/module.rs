//! Commands addressed to the module itself rather than to a device.
//!
//! Requests with `scope == "module"` are routed to a fixed pseudo-device
//! whose only capability is the [`ModuleCommandHandler`]. The handler
//! covers firmware update notifications, module settings and health
//! reports; downloading firmware or collecting health data is up to the
//! application callbacks.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::Device;
use crate::capability::setting::{handle_setting, SettingSlot};
use crate::capability::{
    bool_field, str_field, CallbackSlot, CapabilityHandler, DeviceHandle, EventLimits,
    HandledResult, Request,
};
use crate::protocol::{value_map, SettingValue};
use crate::queue::EventSender;

/// Device id of the module pseudo-device
pub const MODULE_DEVICE_ID: &str = "module";

pub const OTA_UPDATE_AVAILABLE: &str = "otaUpdateAvailable";
pub const SET_SETTING: &str = "setSetting";
pub const REPORT_HEALTH: &str = "reportHealth";

/// Firmware update announced by the server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OtaUpdate {
    pub url: String,
    pub major: i64,
    pub minor: i64,
    pub patch: i64,
    pub force_update: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Version {
    major: i64,
    minor: i64,
    patch: i64,
}

impl OtaUpdate {
    fn from_request(request: &Request<'_>) -> Self {
        let version: Version = request
            .value
            .get("version")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        Self {
            url: str_field(request.value, "url").to_string(),
            major: version.major,
            minor: version.minor,
            patch: version.patch,
            force_update: bool_field(request.value, "forceUpdate"),
        }
    }

    pub fn version(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }
}

type OtaCallback = dyn FnMut(&OtaUpdate) -> bool + Send;
type HealthCallback = dyn FnMut(&mut String) -> bool + Send;

pub struct ModuleCommandHandler {
    ota_update: CallbackSlot<OtaCallback>,
    setting: SettingSlot,
    report_health: CallbackSlot<HealthCallback>,
}

impl ModuleCommandHandler {
    pub fn new(_device: DeviceHandle) -> Self {
        Self {
            ota_update: CallbackSlot::new(),
            setting: CallbackSlot::new(),
            report_health: CallbackSlot::new(),
        }
    }

    pub fn on_ota_update<F>(&self, callback: F)
    where
        F: FnMut(&OtaUpdate) -> bool + Send + 'static,
    {
        self.ota_update.set(Box::new(callback));
    }

    /// Module settings. The device id passed to the callback is
    /// [`MODULE_DEVICE_ID`].
    pub fn on_set_setting<F>(&self, callback: F)
    where
        F: FnMut(&str, &str, &mut SettingValue) -> bool + Send + 'static,
    {
        self.setting.set(Box::new(callback));
    }

    /// Callback fills in the health report sent back to the server
    pub fn on_report_health<F>(&self, callback: F)
    where
        F: FnMut(&mut String) -> bool + Send + 'static,
    {
        self.report_health.set(Box::new(callback));
    }
}

impl CapabilityHandler for ModuleCommandHandler {
    fn capability(&self) -> &'static str {
        "ModuleCommandHandler"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        match request.action {
            OTA_UPDATE_AVAILABLE => {
                let update = OtaUpdate::from_request(request);
                info!(
                    "Firmware update {} available at {} (forced: {})",
                    update.version(),
                    update.url,
                    update.force_update
                );
                self.ota_update
                    .call(|cb| cb(&update))
                    .map(|success| HandledResult::handled(success, Default::default()))
                    .unwrap_or_default()
            }
            SET_SETTING => {
                let request = Request {
                    device_id: MODULE_DEVICE_ID,
                    ..*request
                };
                handle_setting(&self.setting, &request)
            }
            REPORT_HEALTH => {
                let mut report = String::new();
                self.report_health
                    .call(|cb| cb(&mut report))
                    .map(|success| {
                        HandledResult::handled(success, value_map(json!({ "report": report })))
                    })
                    .unwrap_or_default()
            }
            _ => HandledResult::not_handled(),
        }
    }
}

/// Builds the module pseudo-device and returns it with its handler
pub fn module_device(
    events: EventSender,
    limits: EventLimits,
) -> (Arc<Device>, Arc<ModuleCommandHandler>) {
    let mut builder = Device::builder(MODULE_DEVICE_ID, "MODULE", events, limits);
    let handler = builder.add(ModuleCommandHandler::new);
    (builder.build(), handler)
}
