//! Envelope types for request, response and event frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::reply_token::new_reply_token;

pub const PAYLOAD_VERSION: u32 = 2;
pub const SIGNATURE_VERSION: u32 = 1;

/// Open key/value map used for `payload.value`.
pub type ValueMap = serde_json::Map<String, Value>;

/// Turns a `json!({..})` literal into a [`ValueMap`]. Non-object values
/// yield an empty map.
pub fn value_map(value: Value) -> ValueMap {
    match value {
        Value::Object(map) => map,
        _ => ValueMap::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Request,
    Response,
    Event,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub payload_version: u32,
    pub signature_version: u32,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            payload_version: PAYLOAD_VERSION,
            signature_version: SIGNATURE_VERSION,
        }
    }
}

/// Reason an event was emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cause {
    #[serde(rename = "type")]
    pub kind: String,
}

impl Cause {
    pub const PHYSICAL_INTERACTION: &'static str = "PHYSICAL_INTERACTION";
    pub const PERIODIC_POLL: &'static str = "PERIODIC_POLL";
    pub const ALERT: &'static str = "ALERT";

    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }

    pub fn physical_interaction() -> Self {
        Self::new(Self::PHYSICAL_INTERACTION)
    }

    pub fn periodic_poll() -> Self {
        Self::new(Self::PERIODIC_POLL)
    }

    pub fn alert() -> Self {
        Self::new(Self::ALERT)
    }
}

impl Default for Cause {
    fn default() -> Self {
        Self::physical_interaction()
    }
}

impl From<&str> for Cause {
    fn from(kind: &str) -> Self {
        Self::new(kind)
    }
}

/// The signed part of a frame.
///
/// Field order is the serialization order and therefore part of the
/// signed bytes of every outbound frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Cause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub reply_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub value: ValueMap,
}

impl Payload {
    fn new(kind: MessageType, device_id: &str, action: &str) -> Self {
        Self {
            action: action.to_string(),
            cause: None,
            client_id: None,
            created_at: 0,
            device_id: device_id.to_string(),
            instance_id: None,
            message: None,
            reply_token: new_reply_token(),
            scope: None,
            success: None,
            kind,
            value: ValueMap::new(),
        }
    }

    /// Instance name addressed by the frame, `""` for the default instance.
    pub fn instance(&self) -> &str {
        self.instance_id.as_deref().unwrap_or_default()
    }

    /// Requests scoped to the module rather than to a device.
    pub fn is_module_scope(&self) -> bool {
        self.scope.as_deref() == Some("module")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(rename = "HMAC")]
    pub hmac: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub header: Header,
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

impl Envelope {
    fn with_payload(payload: Payload) -> Self {
        Self {
            header: Header::default(),
            payload,
            signature: None,
        }
    }

    /// Outbound request with an empty value and a fresh reply token.
    pub fn request(device_id: &str, action: &str) -> Self {
        Self::with_payload(Payload::new(MessageType::Request, device_id, action))
    }

    /// Default "not handled" response to `request`.
    pub fn response_to(request: &Envelope) -> Self {
        let source = &request.payload;
        let mut payload = Payload::new(MessageType::Response, &source.device_id, &source.action);
        payload.client_id = source.client_id.clone();
        payload.instance_id = source.instance_id.clone();
        payload.reply_token = source.reply_token.clone();
        payload.scope = source.scope.clone();
        payload.success = Some(false);
        payload.message = Some(format!("Device did not handle \"{}\"", source.action));
        Self::with_payload(payload)
    }

    pub fn event(device_id: &str, action: &str, cause: Cause) -> Self {
        let mut payload = Payload::new(MessageType::Event, device_id, action);
        payload.cause = Some(cause);
        Self::with_payload(payload)
    }

    pub fn with_instance(mut self, instance: &str) -> Self {
        if !instance.is_empty() {
            self.payload.instance_id = Some(instance.to_string());
        }
        self
    }

    pub fn with_value(mut self, value: ValueMap) -> Self {
        self.payload.value = value;
        self
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn kind(&self) -> MessageType {
        self.payload.kind
    }
}

#[derive(Deserialize)]
struct TimestampFrame {
    timestamp: u64,
}

/// Reads the server epoch seconds from a bootstrap `{"timestamp":N}` frame.
pub fn parse_timestamp_frame(raw: &str) -> Option<u64> {
    serde_json::from_str::<TimestampFrame>(raw)
        .ok()
        .map(|frame| frame.timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inbound_request() -> Envelope {
        let raw = r#"{"header":{"payloadVersion":2,"signatureVersion":1},
            "payload":{"action":"setPowerState","clientId":"alexa-skill","createdAt":1700000000,
            "deviceId":"dev-1","instanceId":"fan","replyToken":"token-1","type":"request",
            "value":{"state":"On"}},"signature":{"HMAC":"x"}}"#;
        Envelope::parse(raw).unwrap()
    }

    #[test]
    fn test_parse_request() {
        let request = inbound_request();
        assert_eq!(request.kind(), MessageType::Request);
        assert_eq!(request.payload.device_id, "dev-1");
        assert_eq!(request.payload.instance(), "fan");
        assert_eq!(request.payload.value["state"], "On");
        assert_eq!(request.signature.unwrap().hmac, "x");
    }

    #[test]
    fn test_response_copies_correlation_fields() {
        let request = inbound_request();
        let response = Envelope::response_to(&request);

        assert_eq!(response.kind(), MessageType::Response);
        assert_eq!(response.payload.action, "setPowerState");
        assert_eq!(response.payload.client_id.as_deref(), Some("alexa-skill"));
        assert_eq!(response.payload.instance_id.as_deref(), Some("fan"));
        assert_eq!(response.payload.reply_token, "token-1");
        assert_eq!(response.payload.success, Some(false));
        assert_eq!(
            response.payload.message.as_deref(),
            Some("Device did not handle \"setPowerState\"")
        );
        assert_eq!(response.payload.created_at, 0);
        assert!(response.payload.value.is_empty());
    }

    #[test]
    fn test_event_serialization_layout() {
        let event = Envelope::event("dev-1", "setPowerState", Cause::physical_interaction())
            .with_value(value_map(json!({"state": "Off"})));
        let raw = serde_json::to_string(&event).unwrap();

        assert!(raw.starts_with(r#"{"header":{"payloadVersion":2,"signatureVersion":1},"payload":{"action":"setPowerState","cause":{"type":"PHYSICAL_INTERACTION"},"createdAt":0,"deviceId":"dev-1","#));
        assert!(raw.contains(r#""type":"event","value":{"state":"Off"}}"#));
        assert!(event.signature.is_none());
        assert!(!raw.contains(r#""signature":"#));
        assert_eq!(event.payload.reply_token.len(), 36);
    }

    #[test]
    fn test_empty_instance_is_not_serialized() {
        let event = Envelope::event("dev-1", "setMode", Cause::default()).with_instance("");
        assert!(event.payload.instance_id.is_none());
        assert_eq!(event.payload.instance(), "");
    }

    #[test]
    fn test_module_scope() {
        let mut request = Envelope::request("", "otaUpdateAvailable");
        assert!(!request.payload.is_module_scope());
        request.payload.scope = Some("module".to_string());
        assert!(request.payload.is_module_scope());
    }

    #[test]
    fn test_parse_timestamp_frame() {
        assert_eq!(parse_timestamp_frame(r#"{"timestamp":1700000000}"#), Some(1700000000));
        assert_eq!(parse_timestamp_frame(r#"{"timestamp":"soon"}"#), None);
        assert_eq!(parse_timestamp_frame("garbage"), None);
    }
}
