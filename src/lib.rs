//! Device-side client for a signed cloud device-control protocol.
//!
//! The crate keeps one persistent WebSocket session to the cloud broker
//! (plus an optional local UDP multicast listener), verifies and signs every
//! frame with HMAC-SHA256, routes inbound requests to composable capability
//! handlers and rate-limits outbound state events.
//!
//! ## Layout
//! - [`protocol`]: wire envelope, signatures, reply tokens, setting values
//! - [`capability`]: handler trait, event limiter and the concrete capabilities
//! - [`device`]: device composition, registry/router and the module pseudo-device
//! - [`queue`]: inbound/outbound queues between transports and the engine
//! - [`transport`]: WebSocket session state machine, UDP listener, server clock
//! - [`engine`]: the tick loop tying it all together
//! - [`config`]: TOML configuration

pub mod capability;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod transport;

pub use config::EngineConfig;
pub use device::{Device, DeviceBuilder, DeviceRegistry, MODULE_DEVICE_ID};
pub use engine::Engine;
pub use error::EngineError;
pub use protocol::{Cause, Envelope, MessageType, Payload, SettingValue};
