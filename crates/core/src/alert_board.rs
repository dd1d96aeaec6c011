//! Visible-alert board with a fixed display window.
//!
//! [`AlertBoard`] keeps alerts in arrival order and drops each one once it
//! has been visible for the configured window (10 seconds by default). The
//! owner calls [`AlertBoard::sweep`] on a fixed period; staleness is bounded
//! by that period.

use std::collections::VecDeque;
use std::time::Duration;

use crate::alert::{AlertEvent, RawAlert};
use crate::types::{AlertId, Timestamp};

/// How long an alert stays visible.
pub const DEFAULT_ALERT_TTL: Duration = Duration::from_secs(10);

/// Ordered collection of currently visible alerts.
#[derive(Debug)]
pub struct AlertBoard {
    ttl: chrono::Duration,
    entries: VecDeque<AlertEvent>,
    last_id: Option<AlertId>,
}

impl Default for AlertBoard {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_TTL)
    }
}

impl AlertBoard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            entries: VecDeque::new(),
            last_id: None,
        }
    }

    /// Give an upstream alert an identity and append it.
    ///
    /// The id is the creation time in epoch milliseconds; if that would not
    /// exceed the previous id (same millisecond, or the clock stepped back)
    /// the previous id plus one is used instead.
    pub fn record(&mut self, raw: RawAlert, now: Timestamp) -> AlertEvent {
        let candidate = now.timestamp_millis();
        let id = match self.last_id {
            Some(last) if candidate <= last => last + 1,
            _ => candidate,
        };
        self.last_id = Some(id);

        let event = AlertEvent::from_raw(id, raw, now);
        self.entries.push_back(event.clone());
        event
    }

    /// Remove every alert that has been visible for at least the window.
    ///
    /// Survivors keep their order. Returns how many entries were removed.
    pub fn sweep(&mut self, now: Timestamp) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|alert| now.signed_duration_since(alert.created_at) < ttl);
        before - self.entries.len()
    }

    /// Visible alerts in arrival order.
    pub fn visible(&self) -> Vec<AlertEvent> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
