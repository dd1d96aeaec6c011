//! Threshold evaluation engine for aircraft telemetry channels.
//!
//! Pure logic, no I/O. [`evaluate`] classifies every bounded channel of a
//! snapshot using the fixed [`BOUNDS`] table. The same table derives the
//! per-subsystem anomaly flags so they can be reconciled against the flags
//! the upstream server computes on its own.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::alert::{RawAlert, Severity};
use crate::telemetry::{AnomalyFlags, Channel, Subsystem, TelemetrySnapshot};
use crate::types::Timestamp;

/// Default minimum interval between repeated threshold alerts for one channel.
pub const DEFAULT_ALERT_COOLDOWN: Duration = Duration::from_secs(60);

/// Derived status of a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelStatus {
    Normal,
    Warning,
    Critical,
}

impl ChannelStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelStatus::Normal => "normal",
            ChannelStatus::Warning => "warning",
            ChannelStatus::Critical => "critical",
        }
    }
}

/// Bound that, when crossed strictly, makes a reading critical.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CriticalBound {
    Above(f64),
    Below(f64),
    Outside { low: f64, high: f64 },
}

impl CriticalBound {
    fn is_crossed(self, value: f64) -> bool {
        match self {
            CriticalBound::Above(high) => value > high,
            CriticalBound::Below(low) => value < low,
            CriticalBound::Outside { low, high } => value < low || value > high,
        }
    }
}

/// Which side of the normal range the server's anomaly flag checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagCheck {
    /// Flag below `min` or above `max`.
    Range,
    /// Flag above `max` only.
    AboveMax,
    /// Flag below `min` only.
    BelowMin,
    /// The server never flags this channel.
    Never,
}

/// Normal operating range for one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelBounds {
    pub channel: Channel,
    pub subsystem: Subsystem,
    pub min: f64,
    pub max: f64,
    pub critical: Option<CriticalBound>,
    /// Evaluate the magnitude of the reading (vertical speed is signed).
    pub magnitude: bool,
    pub flag_check: FlagCheck,
}

impl ChannelBounds {
    const fn new(channel: Channel, subsystem: Subsystem, min: f64, max: f64) -> Self {
        Self {
            channel,
            subsystem,
            min,
            max,
            critical: None,
            magnitude: false,
            flag_check: FlagCheck::Range,
        }
    }

    const fn flagged(mut self, check: FlagCheck) -> Self {
        self.flag_check = check;
        self
    }

    const fn critical(mut self, bound: CriticalBound) -> Self {
        self.critical = Some(bound);
        self
    }

    const fn by_magnitude(mut self) -> Self {
        self.magnitude = true;
        self
    }

    fn reading(&self, value: f64) -> f64 {
        if self.magnitude {
            value.abs()
        } else {
            value
        }
    }

    /// Classify a reading. Range edges are inclusive of `Normal`.
    pub fn classify(&self, value: f64) -> ChannelStatus {
        let value = self.reading(value);
        if self.critical.is_some_and(|bound| bound.is_crossed(value)) {
            ChannelStatus::Critical
        } else if value < self.min || value > self.max {
            ChannelStatus::Warning
        } else {
            ChannelStatus::Normal
        }
    }

    /// Whether the server would set the subsystem flag for this reading.
    ///
    /// Narrower than a non-normal [`classify`](Self::classify): one-sided
    /// checks ignore the other side of the range.
    pub fn raises_flag(&self, value: f64) -> bool {
        let value = self.reading(value);
        match self.flag_check {
            FlagCheck::Range => value < self.min || value > self.max,
            FlagCheck::AboveMax => value > self.max,
            FlagCheck::BelowMin => value < self.min,
            FlagCheck::Never => false,
        }
    }
}

/// The bounds table: the single source of truth for channel status.
pub const BOUNDS: [ChannelBounds; 15] = [
    ChannelBounds::new(Channel::EngineRpm, Subsystem::Engine, 500.0, 3000.0),
    ChannelBounds::new(Channel::EngineTemperature, Subsystem::Engine, 0.0, 200.0)
        .critical(CriticalBound::Above(200.0))
        .flagged(FlagCheck::AboveMax),
    ChannelBounds::new(Channel::OilPressure, Subsystem::Engine, 20.0, 100.0),
    ChannelBounds::new(Channel::OilTemperature, Subsystem::Engine, 0.0, 120.0)
        .critical(CriticalBound::Above(120.0))
        .flagged(FlagCheck::AboveMax),
    ChannelBounds::new(Channel::FuelLevel, Subsystem::Fuel, 20.0, 100.0)
        .critical(CriticalBound::Below(20.0))
        .flagged(FlagCheck::BelowMin),
    ChannelBounds::new(Channel::FuelConsumption, Subsystem::Fuel, 0.0, 1000.0)
        .critical(CriticalBound::Above(1000.0))
        .flagged(FlagCheck::AboveMax),
    ChannelBounds::new(Channel::FuelPressure, Subsystem::Fuel, 10.0, 50.0),
    // Shown on the fuel panel; the server does not check it.
    ChannelBounds::new(Channel::FuelTemperature, Subsystem::Fuel, 0.0, 50.0)
        .flagged(FlagCheck::Never),
    ChannelBounds::new(Channel::HydraulicPressure, Subsystem::Hydraulic, 2000.0, 3500.0)
        .critical(CriticalBound::Outside {
            low: 2000.0,
            high: 3500.0,
        }),
    ChannelBounds::new(Channel::HydraulicTemperature, Subsystem::Hydraulic, 0.0, 80.0)
        .critical(CriticalBound::Above(80.0))
        .flagged(FlagCheck::AboveMax),
    ChannelBounds::new(Channel::HydraulicFluidLevel, Subsystem::Hydraulic, 80.0, 100.0)
        .critical(CriticalBound::Below(80.0))
        .flagged(FlagCheck::BelowMin),
    ChannelBounds::new(Channel::Altitude, Subsystem::Altitude, 0.0, 45000.0)
        .critical(CriticalBound::Above(45000.0))
        .flagged(FlagCheck::AboveMax),
    ChannelBounds::new(Channel::VerticalSpeed, Subsystem::Altitude, 0.0, 5000.0)
        .critical(CriticalBound::Above(5000.0))
        .by_magnitude()
        .flagged(FlagCheck::AboveMax),
    ChannelBounds::new(Channel::Airspeed, Subsystem::Airspeed, 0.0, 600.0)
        .critical(CriticalBound::Above(600.0))
        .flagged(FlagCheck::AboveMax),
    ChannelBounds::new(Channel::MachNumber, Subsystem::Airspeed, 0.0, 0.9)
        .critical(CriticalBound::Above(0.9))
        .flagged(FlagCheck::AboveMax),
];

/// Look up the bounds for a channel, if it is evaluated at all.
pub fn bounds_for(channel: Channel) -> Option<&'static ChannelBounds> {
    BOUNDS.iter().find(|b| b.channel == channel)
}

/// Result of evaluating one channel.
///
/// A missing reading is `Unknown`: it displays as normal but must not be
/// treated as a confirmed normal by alerting code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assessment {
    Measured(ChannelStatus),
    Unknown,
}

impl Assessment {
    /// Status to show; `Unknown` shows as `Normal`.
    pub fn display_status(self) -> ChannelStatus {
        match self {
            Assessment::Measured(status) => status,
            Assessment::Unknown => ChannelStatus::Normal,
        }
    }

    pub fn is_unknown(self) -> bool {
        matches!(self, Assessment::Unknown)
    }
}

/// Channel-by-channel output of [`evaluate`].
pub type Evaluation = BTreeMap<Channel, Assessment>;

/// Classify every bounded channel of a snapshot.
///
/// Deterministic and side-effect free. Channels without bounds (ground
/// speed, cabin, electrical) do not appear in the result.
pub fn evaluate(snapshot: &TelemetrySnapshot) -> Evaluation {
    BOUNDS
        .iter()
        .map(|bounds| {
            let assessment = match snapshot.value(bounds.channel) {
                Some(value) => Assessment::Measured(bounds.classify(value)),
                None => Assessment::Unknown,
            };
            (bounds.channel, assessment)
        })
        .collect()
}

/// Per-subsystem flags implied by the bounds table.
///
/// Uses only the comparisons the server makes ([`ChannelBounds::raises_flag`]),
/// so a reading can be non-normal on display without raising a flag.
/// Missing channels never raise a flag.
pub fn derive_flags(snapshot: &TelemetrySnapshot) -> AnomalyFlags {
    let mut flags = AnomalyFlags::default();
    for bounds in &BOUNDS {
        if snapshot
            .value(bounds.channel)
            .is_some_and(|value| bounds.raises_flag(value))
        {
            flags.set(bounds.subsystem, true);
        }
    }
    flags
}

/// A subsystem where the upstream flag and the bounds table disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagDisagreement {
    pub subsystem: Subsystem,
    pub upstream: bool,
    pub derived: bool,
}

/// Compare the upstream flags of a snapshot with [`derive_flags`].
///
/// Returns an empty vec when both agree.
pub fn reconcile(snapshot: &TelemetrySnapshot) -> Vec<FlagDisagreement> {
    let upstream = snapshot.flags();
    let derived = derive_flags(snapshot);
    Subsystem::ALL
        .iter()
        .filter(|s| upstream.get(**s) != derived.get(**s))
        .map(|s| FlagDisagreement {
            subsystem: *s,
            upstream: upstream.get(*s),
            derived: derived.get(*s),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Threshold alerts
// ---------------------------------------------------------------------------

/// Turns evaluations into alert messages with a per-channel cooldown.
///
/// An alert is raised when a channel is measured at warning or critical,
/// unless the same channel already alerted at the same or higher status
/// within the cooldown window. Escalation from warning to critical alerts
/// immediately.
#[derive(Debug)]
pub struct ThresholdAlerter {
    cooldown: Duration,
    last_alert: HashMap<Channel, (ChannelStatus, Timestamp)>,
}

impl Default for ThresholdAlerter {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_COOLDOWN)
    }
}

impl ThresholdAlerter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_alert: HashMap::new(),
        }
    }

    /// Produce the alerts warranted by `evaluation` of `snapshot` at `now`.
    pub fn check(
        &mut self,
        snapshot: &TelemetrySnapshot,
        evaluation: &Evaluation,
        now: Timestamp,
    ) -> Vec<RawAlert> {
        let mut alerts = Vec::new();

        for (channel, assessment) in evaluation {
            let status = match assessment {
                Assessment::Measured(status) if *status != ChannelStatus::Normal => *status,
                _ => continue,
            };

            if !self.should_alert(*channel, status, now) {
                continue;
            }

            let value = snapshot.value(*channel).unwrap_or_default();
            let subsystem = bounds_for(*channel)
                .map(|b| b.subsystem.label())
                .unwrap_or("system");

            alerts.push(RawAlert {
                alert_type: Some(subsystem.to_ascii_uppercase()),
                message: Some(format!("{channel} {} at {value}", status.as_str())),
                severity: Some(
                    match status {
                        ChannelStatus::Critical => Severity::Critical,
                        _ => Severity::Warning,
                    }
                    .as_str()
                    .to_string(),
                ),
            });
        }

        alerts
    }

    fn should_alert(&mut self, channel: Channel, status: ChannelStatus, now: Timestamp) -> bool {
        if let Some((last_status, last_at)) = self.last_alert.get(&channel) {
            let elapsed = now.signed_duration_since(*last_at);
            let within_cooldown = elapsed
                .to_std()
                .map(|e| e < self.cooldown)
                .unwrap_or(true);
            if within_cooldown && status <= *last_status {
                return false;
            }
        }
        self.last_alert.insert(channel, (status, now));
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
