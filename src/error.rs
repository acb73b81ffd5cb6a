//! Error types of the engine surface.

use thiserror::Error;

use crate::protocol::signature::SignatureError;
use crate::transport::TransportError;

/// Errors returned by [`crate::Engine`] operations.
///
/// Integrity and transport failures of individual frames never show up
/// here; they are logged and the frame is dropped.
#[derive(Debug, Error)]
pub enum EngineError {
    /// App key or secret missing from the configuration
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// `begin` was called outside of a tokio runtime
    #[error("No async runtime available: {0}")]
    Runtime(String),

    /// Engine was already started
    #[error("Engine already running")]
    AlreadyRunning,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Signature error: {0}")]
    Signature(#[from] SignatureError),
}
