//! TV channel selection by name, by number, or by skipping.

use serde_json::{json, Value};

use super::{
    int_field, str_field, CallbackSlot, CapabilityHandler, DeviceHandle, EventLimiter,
    HandledResult, Request,
};
use crate::protocol::{value_map, Cause, ValueMap};

pub const CHANGE_CHANNEL: &str = "changeChannel";
pub const SKIP_CHANNELS: &str = "skipChannels";

type ChannelNameCallback = dyn FnMut(&str, &mut String) -> bool + Send;
type ChannelNumberCallback = dyn FnMut(&str, i64, &mut String) -> bool + Send;

/// All callbacks report the resulting channel name through the `String`.
pub struct ChannelController {
    device: DeviceHandle,
    change_channel: CallbackSlot<ChannelNameCallback>,
    change_channel_number: CallbackSlot<ChannelNumberCallback>,
    skip_channels: CallbackSlot<ChannelNumberCallback>,
    limiter: EventLimiter,
}

impl ChannelController {
    pub fn new(device: DeviceHandle) -> Self {
        let limiter = device.state_limiter();
        Self {
            device,
            change_channel: CallbackSlot::new(),
            change_channel_number: CallbackSlot::new(),
            skip_channels: CallbackSlot::new(),
            limiter,
        }
    }

    pub fn on_change_channel<F>(&self, callback: F)
    where
        F: FnMut(&str, &mut String) -> bool + Send + 'static,
    {
        self.change_channel.set(Box::new(callback));
    }

    pub fn on_change_channel_number<F>(&self, callback: F)
    where
        F: FnMut(&str, i64, &mut String) -> bool + Send + 'static,
    {
        self.change_channel_number.set(Box::new(callback));
    }

    /// Callback gets the number of channels to skip, negative for backwards
    pub fn on_skip_channels<F>(&self, callback: F)
    where
        F: FnMut(&str, i64, &mut String) -> bool + Send + 'static,
    {
        self.skip_channels.set(Box::new(callback));
    }

    pub fn send_change_channel_event(&self, channel_name: &str, cause: Cause) -> bool {
        self.device.emit(
            &self.limiter,
            None,
            CHANGE_CHANNEL,
            cause,
            channel_value(channel_name),
        )
    }

    fn handle_change_channel(&self, request: &Request<'_>) -> Option<(bool, String)> {
        let channel = request
            .value
            .get("channel")
            .and_then(Value::as_object)?;

        if channel.contains_key("name") {
            let mut name = str_field(channel, "name").to_string();
            return self
                .change_channel
                .call(|cb| cb(request.device_id, &mut name))
                .map(|success| (success, name));
        }
        if channel.contains_key("number") {
            let number = int_field(channel, "number");
            let mut name = String::new();
            return self
                .change_channel_number
                .call(|cb| cb(request.device_id, number, &mut name))
                .map(|success| (success, name));
        }
        None
    }
}

fn channel_value(name: &str) -> ValueMap {
    value_map(json!({ "channel": { "name": name } }))
}

impl CapabilityHandler for ChannelController {
    fn capability(&self) -> &'static str {
        "ChannelController"
    }

    fn try_handle(&self, request: &Request<'_>) -> HandledResult {
        let outcome = match request.action {
            CHANGE_CHANNEL => self.handle_change_channel(request),
            SKIP_CHANNELS => {
                let count = int_field(request.value, "channelCount");
                let mut name = String::new();
                self.skip_channels
                    .call(|cb| cb(request.device_id, count, &mut name))
                    .map(|success| (success, name))
            }
            _ => None,
        };

        outcome
            .map(|(success, name)| HandledResult::handled(success, channel_value(&name)))
            .unwrap_or_default()
    }
}
