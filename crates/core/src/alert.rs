//! Alert types: inbound alert messages, displayed alert events, and
//! outbound alert requests.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{AlertId, Timestamp};

/// Label shown when an upstream alert carries no type.
pub const DEFAULT_ALERT_TYPE: &str = "System Alert";

/// Alert types are upper-case identifiers such as `ENGINE` or `LOW_FUEL`.
static ALERT_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z_]+$").expect("valid regex"));

const ALERT_TYPE_LEN: (usize, usize) = (2, 50);
const ALERT_MESSAGE_LEN: (usize, usize) = (5, 500);

/// Severity of an alert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Lenient parse used for inbound messages: case-insensitive, and
    /// anything unrecognised (or missing) is `Info`.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_uppercase()).as_deref() {
            Some("CRITICAL") => Severity::Critical,
            Some("WARNING") => Severity::Warning,
            _ => Severity::Info,
        }
    }

    /// Strict parse used for outbound requests.
    pub fn parse_strict(raw: &str) -> Result<Self, CoreError> {
        match raw {
            "INFO" => Ok(Severity::Info),
            "WARNING" => Ok(Severity::Warning),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(CoreError::Validation(format!(
                "severity must be INFO, WARNING, or CRITICAL, got {other:?}"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An alert message as received from upstream, before it gets an identity.
///
/// Every field is optional on the wire; [`AlertEvent`] fills in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAlert {
    #[serde(default)]
    pub alert_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
}

/// A discrete, time-bounded notification shown to the observer.
///
/// Never mutated after creation; the alert board only appends and removes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub id: AlertId,
    pub alert_type: String,
    pub message: String,
    pub severity: Severity,
    pub created_at: Timestamp,
}

impl AlertEvent {
    /// Build an event from an upstream message.
    pub fn from_raw(id: AlertId, raw: RawAlert, created_at: Timestamp) -> Self {
        let severity = Severity::parse_lenient(raw.severity.as_deref());
        Self {
            id,
            alert_type: raw
                .alert_type
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ALERT_TYPE.to_string()),
            message: raw.message.unwrap_or_default(),
            severity,
            created_at,
        }
    }
}

/// An operator-initiated alert to be broadcast by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRequest {
    pub alert_type: String,
    pub message: String,
    pub severity: Severity,
}

impl AlertRequest {
    /// Validate and build a request.
    ///
    /// * `alert_type` - 2 to 50 characters of `A-Z` and `_`.
    /// * `message`    - 5 to 500 characters after trimming.
    pub fn new(
        alert_type: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
    ) -> Result<Self, CoreError> {
        let request = Self {
            alert_type: alert_type.into(),
            message: message.into().trim().to_string(),
            severity,
        };
        request.validate()?;
        Ok(request)
    }

    /// Re-check the field constraints.
    pub fn validate(&self) -> Result<(), CoreError> {
        let type_len = self.alert_type.chars().count();
        if type_len < ALERT_TYPE_LEN.0 || type_len > ALERT_TYPE_LEN.1 {
            return Err(CoreError::Validation(format!(
                "alertType must be between {} and {} characters",
                ALERT_TYPE_LEN.0, ALERT_TYPE_LEN.1
            )));
        }
        if !ALERT_TYPE_RE.is_match(&self.alert_type) {
            return Err(CoreError::Validation(
                "alertType must contain only uppercase letters and underscores".into(),
            ));
        }

        let message_len = self.message.chars().count();
        if message_len < ALERT_MESSAGE_LEN.0 || message_len > ALERT_MESSAGE_LEN.1 {
            return Err(CoreError::Validation(format!(
                "message must be between {} and {} characters",
                ALERT_MESSAGE_LEN.0, ALERT_MESSAGE_LEN.1
            )));
        }
        Ok(())
    }
}
