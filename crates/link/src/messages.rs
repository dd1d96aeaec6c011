//! Typed representations of the frames exchanged over the push transport.
//!
//! Every frame is a JSON object with a `type` discriminator. Inbound frames
//! are first deserialized into [`WireMessage`] and then validated into an
//! [`InboundMessage`]; the `aircraft_data` payload goes through the same
//! snapshot parser as the pull path.

use serde::{Deserialize, Serialize};
use skywatch_core::alert::{AlertRequest, RawAlert};
use skywatch_core::message_types::{
    MSG_TYPE_AIRCRAFT_DATA, MSG_TYPE_ALERT, MSG_TYPE_ALERT_REQUEST, MSG_TYPE_CONNECTION,
    MSG_TYPE_ECHO, MSG_TYPE_REQUEST_AIRCRAFT_DATA,
};
use skywatch_core::telemetry::{MalformedPayload, TelemetrySnapshot};

/// Raw inbound frame, discriminated on `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum WireMessage {
    #[serde(rename = "aircraft_data")]
    AircraftData { data: serde_json::Value },

    #[serde(rename = "alert")]
    Alert(RawAlert),

    #[serde(rename = "connection")]
    Connection {
        #[serde(default)]
        message: Option<String>,
    },

    #[serde(rename = "echo")]
    Echo {
        #[serde(default)]
        message: Option<serde_json::Value>,
    },

    /// Any `type` this client does not handle.
    #[serde(other)]
    Unknown,
}

/// A validated inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Telemetry(TelemetrySnapshot),
    Alert(RawAlert),
    Connection(Option<String>),
    Echo,
    Unknown,
}

impl InboundMessage {
    /// The `type` discriminator this message arrived with, if it is one we handle.
    pub fn type_name(&self) -> Option<&'static str> {
        match self {
            InboundMessage::Telemetry(_) => Some(MSG_TYPE_AIRCRAFT_DATA),
            InboundMessage::Alert(_) => Some(MSG_TYPE_ALERT),
            InboundMessage::Connection(_) => Some(MSG_TYPE_CONNECTION),
            InboundMessage::Echo => Some(MSG_TYPE_ECHO),
            InboundMessage::Unknown => None,
        }
    }
}

/// Parse a text frame into an [`InboundMessage`].
///
/// Frames that are not JSON, lack a `type`, or carry an `aircraft_data`
/// payload the snapshot parser rejects are reported as
/// [`MalformedPayload`].
pub fn parse_message(text: &str) -> Result<InboundMessage, MalformedPayload> {
    let wire: WireMessage =
        serde_json::from_str(text).map_err(|e| MalformedPayload::InvalidJson(e.to_string()))?;

    Ok(match wire {
        WireMessage::AircraftData { data } => {
            InboundMessage::Telemetry(TelemetrySnapshot::from_json(&data)?)
        }
        WireMessage::Alert(raw) => InboundMessage::Alert(raw),
        WireMessage::Connection { message } => InboundMessage::Connection(message),
        WireMessage::Echo { .. } => InboundMessage::Echo,
        WireMessage::Unknown => InboundMessage::Unknown,
    })
}

/// Client → server frames.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "alert_request")]
    AlertRequest(AlertRequest),

    #[serde(rename = "request_aircraft_data")]
    RequestAircraftData,
}

impl OutboundMessage {
    /// The `type` discriminator this message is sent with.
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundMessage::AlertRequest(_) => MSG_TYPE_ALERT_REQUEST,
            OutboundMessage::RequestAircraftData => MSG_TYPE_REQUEST_AIRCRAFT_DATA,
        }
    }

    /// Encode as a JSON text frame.
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).expect("outbound message is always serialisable")
    }
}
