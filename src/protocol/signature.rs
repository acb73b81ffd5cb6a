//! HMAC-SHA256 message signing and verification.
//!
//! The signature covers the payload bytes exactly as they appear on the
//! wire: everything between `"payload":` and `,"signature"`. Inbound frames
//! are therefore never re-serialized before verification; a frame that was
//! reformatted in transit fails the check even if it is semantically equal.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use super::envelope::{Envelope, Signature};

type HmacSha256 = Hmac<Sha256>;

const PAYLOAD_MARKER: &str = "\"payload\":";
const SIGNATURE_MARKER: &str = ",\"signature\"";
const TIMESTAMP_PREFIX: &str = "{\"timestamp\":";
const TIMESTAMP_FRAME_MAX_LEN: usize = 26;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Frame has no payload section")]
    MissingPayload,

    #[error("Frame carries no HMAC")]
    MissingSignature,

    #[error("HMAC mismatch")]
    Mismatch,

    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    #[error("Failed to serialize envelope: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Base64 (standard alphabet, padded) HMAC-SHA256 of `message` under `key`.
pub fn hmac_base64(message: &[u8], key: &[u8]) -> Result<String, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
    mac.update(message);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Raw payload substring of a serialized frame.
pub fn extract_payload(raw: &str) -> Option<&str> {
    let begin = raw.find(PAYLOAD_MARKER)?;
    if begin == 0 {
        return None;
    }
    let start = begin + PAYLOAD_MARKER.len();
    let end = start + raw[start..].find(SIGNATURE_MARKER)?;
    Some(&raw[start..end])
}

/// Bootstrap clock frame sent by the server right after connecting.
pub fn is_timestamp_frame(raw: &str) -> bool {
    raw.len() <= TIMESTAMP_FRAME_MAX_LEN && raw.starts_with(TIMESTAMP_PREFIX)
}

/// Signs `envelope` in place and returns the serialized frame.
pub fn sign(secret: &str, envelope: &mut Envelope) -> Result<String, SignatureError> {
    // placeholder so the serializer emits the `,"signature"` marker
    envelope.signature = Some(Signature::default());
    let unsigned = serde_json::to_string(envelope)?;
    let payload = extract_payload(&unsigned).ok_or(SignatureError::MissingPayload)?;
    let hmac = hmac_base64(payload.as_bytes(), secret.as_bytes())?;

    envelope.signature = Some(Signature { hmac });
    Ok(serde_json::to_string(envelope)?)
}

/// Checks the HMAC of a raw inbound frame.
pub fn check(secret: &str, raw: &str) -> Result<(), SignatureError> {
    if is_timestamp_frame(raw) {
        return Ok(());
    }

    let payload = extract_payload(raw).ok_or(SignatureError::MissingPayload)?;
    let received = received_hmac(raw).ok_or(SignatureError::MissingSignature)?;
    let expected = hmac_base64(payload.as_bytes(), secret.as_bytes())?;

    if bool::from(expected.as_bytes().ct_eq(received.as_bytes())) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

pub fn verify(secret: &str, raw: &str) -> bool {
    check(secret, raw).is_ok()
}

fn received_hmac(raw: &str) -> Option<String> {
    let frame: serde_json::Value = serde_json::from_str(raw).ok()?;
    frame
        .get("signature")?
        .get("HMAC")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{value_map, Cause};
    use serde_json::json;

    const SECRET: &str = "5b8c1d3a-secret";

    fn signed_event() -> String {
        let mut event = Envelope::event("dev-1", "setPowerState", Cause::physical_interaction())
            .with_value(value_map(json!({"state": "On"})));
        event.payload.created_at = 1700000000;
        sign(SECRET, &mut event).unwrap()
    }

    #[test]
    fn test_hmac_known_vector() {
        // RFC 4231 test case 2
        let mac = hmac_base64(b"what do ya want for nothing?", b"Jefe").unwrap();
        assert_eq!(mac, "W9zBRr9gdU5qBCQmCJV1x1oAPwidJzmDnexYuWTsOEM=");
    }

    #[test]
    fn test_extract_payload() {
        let raw = r#"{"header":{},"payload":{"a":1},"signature":{"HMAC":"x"}}"#;
        assert_eq!(extract_payload(raw), Some(r#"{"a":1}"#));
        assert_eq!(extract_payload(r#""payload":{"a":1},"signature""#), None);
        assert_eq!(extract_payload(r#"{"payload":{"a":1}}"#), None);
    }

    #[test]
    fn test_sign_then_verify() {
        let frame = signed_event();
        assert!(verify(SECRET, &frame));

        let payload = extract_payload(&frame).unwrap();
        let expected = hmac_base64(payload.as_bytes(), SECRET.as_bytes()).unwrap();
        assert!(frame.ends_with(&format!(r#","signature":{{"HMAC":"{}"}}}}"#, expected)));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let frame = signed_event();
        assert!(matches!(check("other", &frame), Err(SignatureError::Mismatch)));
    }

    #[test]
    fn test_tampered_payload_fails() {
        let frame = signed_event().replace(r#""state":"On""#, r#""state":"Of""#);
        assert!(!verify(SECRET, &frame));
    }

    #[test]
    fn test_tampered_signature_fails() {
        let frame = signed_event();
        let payload = extract_payload(&frame).unwrap().to_string();
        let hmac = hmac_base64(payload.as_bytes(), SECRET.as_bytes()).unwrap();
        let other = hmac_base64(b"{}", SECRET.as_bytes()).unwrap();
        let forged = frame.replace(&hmac, &other);
        assert!(!verify(SECRET, &forged));
    }

    #[test]
    fn test_reformatted_payload_fails() {
        let frame = signed_event().replace(r#""payload":{"#, r#""payload": {"#);
        assert!(!verify(SECRET, &frame));
    }

    #[test]
    fn test_missing_signature() {
        let raw = r#"{"header":{},"payload":{"a":1},"signature":{}}"#;
        assert!(matches!(check(SECRET, raw), Err(SignatureError::MissingSignature)));
    }

    #[test]
    fn test_timestamp_frame_is_valid() {
        assert!(verify(SECRET, r#"{"timestamp":1700000000}"#));
        assert!(!verify(SECRET, r#"{"timestamp":1700000000,"padding":"xxxxxxxx"}"#));
    }
}
