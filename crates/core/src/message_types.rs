//! Push-transport message type discriminators.
//!
//! Every frame on the telemetry WebSocket is a JSON object whose `type`
//! field is one of these values.

/// Server → client: a telemetry snapshot under `data`.
pub const MSG_TYPE_AIRCRAFT_DATA: &str = "aircraft_data";

/// Server → client: a discrete alert (`alertType`, `message`, `severity`).
pub const MSG_TYPE_ALERT: &str = "alert";

/// Server → client: informational greeting sent after the handshake.
pub const MSG_TYPE_CONNECTION: &str = "connection";

/// Server → client: echo of a frame the client sent.
pub const MSG_TYPE_ECHO: &str = "echo";

/// Client → server: ask the server to broadcast an alert.
pub const MSG_TYPE_ALERT_REQUEST: &str = "alert_request";

/// Client → server: ask for the current snapshot immediately.
pub const MSG_TYPE_REQUEST_AIRCRAFT_DATA: &str = "request_aircraft_data";
