//! Wire protocol: envelope layout, HMAC signatures, reply tokens and
//! setting values.
//!
//! Every frame on the wire is a JSON object of the form
//! `{"header":{..},"payload":{..},"signature":{"HMAC":".."}}`. The only
//! exception is the bootstrap clock frame `{"timestamp":<secs>}` the server
//! sends right after a connection is established.

pub mod envelope;
pub mod reply_token;
pub mod signature;
pub mod value;

pub use envelope::{
    parse_timestamp_frame, value_map, Cause, Envelope, Header, MessageType, Payload, Signature,
    ValueMap, PAYLOAD_VERSION, SIGNATURE_VERSION,
};
pub use reply_token::new_reply_token;
pub use value::SettingValue;
