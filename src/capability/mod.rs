//! Capability handlers and the plumbing they share.
//!
//! A device is a list of capability handlers. Each handler answers a fixed
//! set of request actions through application callbacks (`on_*`) and emits
//! rate-limited events (`send_*_event`). Handlers are composed at runtime:
//! the router only sees `Arc<dyn CapabilityHandler>` and asks each one in
//! order whether it handles a request.
//!
//! Callbacks receive the request value by mutable reference. Whatever they
//! write back is what the response reports.

pub mod limiter;

pub mod air_quality;
pub mod brightness;
pub mod channel;
pub mod color;
pub mod color_temperature;
pub mod contact;
pub mod door;
pub mod doorbell;
pub mod equalizer;
pub mod input;
pub mod keypad;
pub mod lock;
pub mod media;
pub mod mode;
pub mod motion;
pub mod mute;
pub mod open_close;
pub mod percentage;
pub mod power_level;
pub mod power_sensor;
pub mod power_state;
pub mod push_notification;
pub mod range;
pub mod setting;
pub mod smart_button;
pub mod start_stop;
pub mod temperature;
pub mod thermostat;
pub mod toggle;
pub mod volume;

pub use air_quality::{AirQuality, AirQualitySensor};
pub use brightness::BrightnessController;
pub use channel::ChannelController;
pub use color::{Color, ColorController};
pub use color_temperature::ColorTemperatureController;
pub use contact::ContactSensor;
pub use door::DoorController;
pub use doorbell::Doorbell;
pub use equalizer::{EqualizerBand, EqualizerController};
pub use input::InputController;
pub use keypad::KeypadController;
pub use limiter::{EventLimiter, EventLimits, EVENT_LIMIT_SENSOR_VALUE, EVENT_LIMIT_STATE};
pub use lock::{LockController, LockState};
pub use media::MediaController;
pub use mode::ModeController;
pub use motion::MotionSensor;
pub use mute::MuteController;
pub use open_close::OpenCloseController;
pub use percentage::PercentageController;
pub use power_level::PowerLevelController;
pub use power_sensor::{PowerReading, PowerSensor};
pub use power_state::PowerStateController;
pub use push_notification::PushNotification;
pub use range::RangeController;
pub use setting::SettingController;
pub use smart_button::{SmartButtonPress, SmartButtonStateController};
pub use start_stop::StartStopController;
pub use temperature::TemperatureSensor;
pub use thermostat::ThermostatController;
pub use toggle::ToggleController;
pub use volume::VolumeController;

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::debug;

use crate::protocol::{Cause, Envelope, ValueMap};
use crate::queue::EventSender;

/// Instance key of the default instance
pub const DEFAULT_INSTANCE: &str = "";

/// Inbound request as seen by a handler.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub device_id: &'a str,
    pub action: &'a str,
    /// `""` when the request addresses the default instance
    pub instance: &'a str,
    pub value: &'a ValueMap,
}

impl<'a> Request<'a> {
    pub fn from_envelope(envelope: &'a Envelope) -> Self {
        Self {
            device_id: &envelope.payload.device_id,
            action: &envelope.payload.action,
            instance: envelope.payload.instance(),
            value: &envelope.payload.value,
        }
    }
}

/// Outcome of [`CapabilityHandler::try_handle`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandledResult {
    /// The handler claimed the request; routing stops here
    pub handled: bool,
    /// Return value of the application callback
    pub success: bool,
    /// Response value
    pub value: ValueMap,
}

impl HandledResult {
    pub fn not_handled() -> Self {
        Self::default()
    }

    pub fn handled(success: bool, value: ValueMap) -> Self {
        Self {
            handled: true,
            success,
            value,
        }
    }
}

/// Downcasting support for handlers stored as trait objects.
pub trait AsAny {
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A capability a device can be composed of.
pub trait CapabilityHandler: AsAny + Send + Sync + 'static {
    /// Stable capability name for logs and queries
    fn capability(&self) -> &'static str;

    /// Handles `request` if its action belongs to this capability
    fn try_handle(&self, request: &Request<'_>) -> HandledResult;
}

/// What a handler knows about the device it belongs to.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    device_id: Arc<str>,
    events: EventSender,
    limits: EventLimits,
}

impl DeviceHandle {
    pub fn new(device_id: &str, events: EventSender, limits: EventLimits) -> Self {
        Self {
            device_id: Arc::from(device_id),
            events,
            limits,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn limits(&self) -> EventLimits {
        self.limits
    }

    pub fn state_limiter(&self) -> EventLimiter {
        EventLimiter::new(self.limits.state)
    }

    pub fn sensor_limiter(&self) -> EventLimiter {
        EventLimiter::new(self.limits.sensor_value)
    }

    pub fn is_connected(&self) -> bool {
        self.events.is_connected()
    }

    /// Rate-limits, builds and queues an event. Returns `false` when the
    /// limiter rejects it or the engine is not connected.
    pub fn emit(
        &self,
        limiter: &EventLimiter,
        instance: Option<&str>,
        action: &str,
        cause: Cause,
        value: ValueMap,
    ) -> bool {
        if !limiter.try_consume(instance) {
            debug!(
                "Event {} of {} suppressed by rate limiter",
                action, self.device_id
            );
            return false;
        }

        let event = Envelope::event(&self.device_id, action, cause)
            .with_instance(instance.unwrap_or_default())
            .with_value(value);
        self.events.send_event(event)
    }
}

/// Recovers the guard of a poisoned lock. Callback panics must not take
/// the whole device down.
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single registered callback, replaced by each new registration.
pub(crate) struct CallbackSlot<F: ?Sized> {
    callback: Mutex<Option<Box<F>>>,
}

impl<F: ?Sized> CallbackSlot<F> {
    pub(crate) fn new() -> Self {
        Self {
            callback: Mutex::new(None),
        }
    }

    pub(crate) fn set(&self, callback: Box<F>) {
        *lock_or_recover(&self.callback) = Some(callback);
    }

    /// Runs `f` with the registered callback, `None` if there is none
    pub(crate) fn call<R>(&self, f: impl FnOnce(&mut F) -> R) -> Option<R> {
        let mut callback = lock_or_recover(&self.callback);
        callback.as_deref_mut().map(f)
    }
}

/// Callbacks keyed by instance name, [`DEFAULT_INSTANCE`] for the default.
pub(crate) struct InstanceCallbacks<F: ?Sized> {
    callbacks: Mutex<HashMap<String, Box<F>>>,
}

impl<F: ?Sized> InstanceCallbacks<F> {
    pub(crate) fn new() -> Self {
        Self {
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn set(&self, instance: &str, callback: Box<F>) {
        lock_or_recover(&self.callbacks).insert(instance.to_string(), callback);
    }

    pub(crate) fn call<R>(&self, instance: &str, f: impl FnOnce(&mut F) -> R) -> Option<R> {
        let mut callbacks = lock_or_recover(&self.callbacks);
        callbacks.get_mut(instance).map(|callback| f(callback.as_mut()))
    }
}

// Field accessors with the lenient defaults of the wire format: missing or
// mistyped fields read as zero, false or "".

pub(crate) fn int_field(value: &ValueMap, key: &str) -> i64 {
    match value.get(key) {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or_default(),
        _ => 0,
    }
}

pub(crate) fn int_field_or(value: &ValueMap, key: &str, default: i64) -> i64 {
    if value.contains_key(key) {
        int_field(value, key)
    } else {
        default
    }
}

pub(crate) fn float_field(value: &ValueMap, key: &str) -> f64 {
    value.get(key).and_then(Value::as_f64).unwrap_or_default()
}

pub(crate) fn str_field<'a>(value: &'a ValueMap, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

pub(crate) fn bool_field(value: &ValueMap, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or_default()
}

/// `"On"` / `"Off"` wire representation
pub(crate) fn on_off(state: bool) -> &'static str {
    if state {
        "On"
    } else {
        "Off"
    }
}
