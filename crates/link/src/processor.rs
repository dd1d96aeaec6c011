//! Per-snapshot processing shared by both transports.
//!
//! [`TelemetryProcessor`] runs the threshold evaluator, reports flag
//! disagreements, and (when enabled) produces threshold alerts. Snapshots
//! are delivered in arrival order whatever their timestamps say.

use std::fmt;

use skywatch_core::alert::RawAlert;
use skywatch_core::telemetry::TelemetrySnapshot;
use skywatch_core::thresholds::{
    evaluate, reconcile, Evaluation, FlagDisagreement, ThresholdAlerter,
};
use skywatch_core::types::Timestamp;

/// Which transport delivered a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Push,
    Pull,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Source::Push => "push",
            Source::Pull => "pull",
        })
    }
}

/// A snapshot accepted for delivery.
#[derive(Debug)]
pub struct Processed {
    pub snapshot: TelemetrySnapshot,
    pub evaluation: Evaluation,
    pub alerts: Vec<RawAlert>,
}

#[derive(Debug, Default)]
pub struct TelemetryProcessor {
    alerter: Option<ThresholdAlerter>,
    disagreements: Vec<FlagDisagreement>,
}

impl TelemetryProcessor {
    /// `alerter` is `None` when threshold alerts are disabled.
    pub fn new(alerter: Option<ThresholdAlerter>) -> Self {
        Self {
            alerter,
            disagreements: Vec::new(),
        }
    }

    pub fn process(
        &mut self,
        snapshot: TelemetrySnapshot,
        source: Source,
        now: Timestamp,
    ) -> Processed {
        tracing::trace!(%source, timestamp = %snapshot.timestamp(), "Processing snapshot");

        let evaluation = evaluate(&snapshot);
        self.check_flags(&snapshot);

        let alerts = match self.alerter.as_mut() {
            Some(alerter) => alerter.check(&snapshot, &evaluation, now),
            None => Vec::new(),
        };

        Processed {
            snapshot,
            evaluation,
            alerts,
        }
    }

    /// Disagreements reported by the most recent snapshot.
    pub fn disagreements(&self) -> &[FlagDisagreement] {
        &self.disagreements
    }

    // Warn only when the set of disagreeing subsystems changes.
    fn check_flags(&mut self, snapshot: &TelemetrySnapshot) {
        let disagreements = reconcile(snapshot);
        if disagreements == self.disagreements {
            return;
        }
        for d in &disagreements {
            tracing::warn!(
                subsystem = %d.subsystem,
                upstream = d.upstream,
                derived = d.derived,
                "Upstream anomaly flag disagrees with threshold evaluation",
            );
        }
        self.disagreements = disagreements;
    }
}
