//! Console monitor: drives a [`TelemetryCoordinator`] and logs what it
//! delivers until shutdown.

use std::future::Future;

use skywatch_core::alert::{AlertEvent, Severity};
use skywatch_core::telemetry::TelemetrySnapshot;
use skywatch_core::thresholds::Evaluation;
use skywatch_link::{ConnectionState, TelemetryCoordinator};

use crate::console;

/// Subscribe, start the coordinator, and log events until `shutdown`
/// resolves. The coordinator is shut down before returning.
pub async fn run<F>(coordinator: &TelemetryCoordinator, shutdown: F)
where
    F: Future<Output = ()>,
{
    let mut telemetry = coordinator.on_telemetry();
    let mut alerts = coordinator.on_alert();
    let mut status = coordinator.on_connection_status();
    coordinator.start();

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown requested");
                break;
            }
            Some(snapshot) = telemetry.recv() => {
                log_telemetry(&snapshot, coordinator.latest_assessment().as_ref());
            }
            Some(alert) = alerts.recv() => log_alert(&alert, coordinator.visible_alerts().len()),
            Some(state) = status.recv() => log_status(state),
            else => break,
        }
    }

    coordinator.shutdown().await;
}

// Exceedances come from the coordinator's latest assessment.
fn log_telemetry(snapshot: &TelemetrySnapshot, evaluation: Option<&Evaluation>) {
    let timestamp = snapshot.timestamp();

    tracing::info!(
        %timestamp,
        summary = %console::summary_line(snapshot),
        "Telemetry",
    );

    if let Some(exceedances) = out_of_range(snapshot, evaluation) {
        tracing::warn!(
            %timestamp,
            flagged = ?console::flagged_subsystems(snapshot),
            exceedances = %exceedances,
            "Readings outside normal range",
        );
    }
}

fn out_of_range(snapshot: &TelemetrySnapshot, evaluation: Option<&Evaluation>) -> Option<String> {
    console::exceedances(snapshot, evaluation?)
}

fn log_alert(alert: &AlertEvent, visible: usize) {
    let line = console::alert_line(alert);
    match alert.severity {
        Severity::Critical => tracing::error!(alert_id = alert.id, visible, "{line}"),
        Severity::Warning => tracing::warn!(alert_id = alert.id, visible, "{line}"),
        Severity::Info => tracing::info!(alert_id = alert.id, visible, "{line}"),
    }
}

fn log_status(state: ConnectionState) {
    tracing::info!(
        state = %state,
        source = console::status_label(state),
        "Telemetry source changed",
    );
}
