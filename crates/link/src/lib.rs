//! Skywatch telemetry link.
//!
//! Provides the push (WebSocket) and pull (HTTP) transports, typed wire
//! message parsing, the reconnection policy, and the
//! [`TelemetryCoordinator`](coordinator::TelemetryCoordinator) that
//! arbitrates between the two transports and feeds a display layer.

pub mod api;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod messages;
pub mod processor;
pub mod reconnect;

pub use config::LinkConfig;
pub use coordinator::TelemetryCoordinator;
pub use error::LinkError;
pub use events::ConnectionState;
