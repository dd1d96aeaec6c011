//! Connection state and the single-subscriber event slots.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use skywatch_core::alert::AlertEvent;
use skywatch_core::telemetry::TelemetrySnapshot;
use tokio::sync::mpsc;

/// Which transport, if any, is currently delivering telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Polling,
    Error,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Polling => "polling",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-subscriber event slot.
///
/// Subscribing again replaces the previous sender; the old receiver then
/// yields `None`. Emitting with no subscriber drops the event.
pub(crate) struct Subscription<T> {
    kind: &'static str,
    slot: Mutex<Option<mpsc::UnboundedSender<T>>>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(kind: &'static str) -> Self {
        Self {
            kind,
            slot: Mutex::new(None),
        }
    }

    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(tx);
        if previous.is_some() {
            tracing::debug!(kind = self.kind, "Replacing existing subscriber");
        }
        rx
    }

    pub(crate) fn emit(&self, event: T) {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = slot.as_ref() {
            // A dropped receiver just means nobody is listening.
            let _ = tx.send(event);
        }
    }
}

/// The three subscription kinds exposed by the coordinator.
pub(crate) struct Subscribers {
    pub(crate) telemetry: Subscription<TelemetrySnapshot>,
    pub(crate) alert: Subscription<AlertEvent>,
    pub(crate) status: Subscription<ConnectionState>,
}

impl Default for Subscribers {
    fn default() -> Self {
        Self {
            telemetry: Subscription::new("telemetry"),
            alert: Subscription::new("alert"),
            status: Subscription::new("connection_status"),
        }
    }
}
