//! One-line renderings of link events for the console log.

use skywatch_core::alert::AlertEvent;
use skywatch_core::telemetry::{Subsystem, TelemetrySnapshot};
use skywatch_core::thresholds::{Assessment, ChannelStatus, Evaluation};
use skywatch_link::ConnectionState;

/// Operator-facing name of the active source.
pub fn status_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Connected => "live (WebSocket)",
        ConnectionState::Polling => "REST API",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Disconnected => "disconnected",
        ConnectionState::Error => "error",
    }
}

/// Overall status plus the per-subsystem health from upstream flags.
///
/// ```text
/// WARNING engine=ANOMALY fuel=NORMAL hydraulic=NORMAL flight=NORMAL
/// ```
pub fn summary_line(snapshot: &TelemetrySnapshot) -> String {
    let summary = snapshot.summary();
    format!(
        "{} engine={} fuel={} hydraulic={} flight={}",
        summary.system_status(),
        summary.engine.as_str(),
        summary.fuel.as_str(),
        summary.hydraulic.as_str(),
        summary.flight.as_str(),
    )
}

/// Channels outside their normal range, worst first.
///
/// Unknown channels are not listed. Returns `None` when every measured
/// channel is normal.
pub fn exceedances(snapshot: &TelemetrySnapshot, evaluation: &Evaluation) -> Option<String> {
    let mut out: Vec<(ChannelStatus, String)> = evaluation
        .iter()
        .filter_map(|(channel, assessment)| match assessment {
            Assessment::Measured(status) if *status != ChannelStatus::Normal => {
                let value = snapshot.value(*channel)?;
                Some((*status, format!("{channel}={value} ({})", status.as_str())))
            }
            _ => None,
        })
        .collect();

    if out.is_empty() {
        return None;
    }
    out.sort_by(|a, b| b.0.cmp(&a.0));
    Some(
        out.into_iter()
            .map(|(_, text)| text)
            .collect::<Vec<_>>()
            .join(", "),
    )
}

/// Subsystems whose upstream anomaly flag is set.
pub fn flagged_subsystems(snapshot: &TelemetrySnapshot) -> Vec<&'static str> {
    let flags = snapshot.flags();
    Subsystem::ALL
        .iter()
        .filter(|s| flags.get(**s))
        .map(|s| s.label())
        .collect()
}

/// `[WARNING] ENGINE: Engine temperature anomaly detected (12:00:00)`
pub fn alert_line(alert: &AlertEvent) -> String {
    format!(
        "[{}] {}: {} ({})",
        alert.severity,
        alert.alert_type,
        alert.message,
        alert.created_at.format("%H:%M:%S"),
    )
}
