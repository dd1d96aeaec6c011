//! Skywatch core domain logic.
//!
//! Pure types and algorithms shared by the transport layer and any
//! display: the telemetry snapshot model, the threshold evaluator, alert
//! types, and the visible-alert board. Nothing in this crate performs I/O.

pub mod alert;
pub mod alert_board;
pub mod error;
pub mod message_types;
pub mod telemetry;
pub mod thresholds;
pub mod types;
