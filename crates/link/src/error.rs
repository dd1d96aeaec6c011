use skywatch_core::error::CoreError;
use skywatch_core::telemetry::MalformedPayload;

use crate::api::PullError;

/// Errors surfaced by the telemetry link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Push handshake failed: {0}")]
    TransportHandshakeFailure(String),

    #[error("Push transport closed: {0}")]
    TransportClosed(String),

    #[error("Pull cycle failed: {0}")]
    PullCycleFailure(#[from] PullError),

    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] MalformedPayload),

    #[error("Push transport is not connected")]
    NotConnected,

    #[error("Invalid alert request: {0}")]
    InvalidAlertRequest(#[from] CoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Telemetry coordinator has stopped")]
    Stopped,
}
