//! Aircraft telemetry snapshot model and its validating constructor.
//!
//! The upstream server sends snapshots as loosely-typed JSON objects with
//! camelCase field names. [`TelemetrySnapshot::from_json`] is the only way
//! to turn such a payload into a snapshot: it checks the structure and
//! returns [`MalformedPayload`] instead of trusting the input.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::types::Timestamp;

/// Legacy server timestamp format (`LocalDateTime` rendered without zone).
const SERVER_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// ISO local date-time without offset, with optional fractional seconds.
const ISO_LOCAL_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// One named numeric sensor field within a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    EngineRpm,
    EngineTemperature,
    OilPressure,
    OilTemperature,
    FuelLevel,
    FuelConsumption,
    FuelPressure,
    FuelTemperature,
    HydraulicPressure,
    HydraulicTemperature,
    HydraulicFluidLevel,
    Altitude,
    Airspeed,
    GroundSpeed,
    MachNumber,
    VerticalSpeed,
    CabinPressure,
    CabinTemperature,
    BatteryVoltage,
    GeneratorOutput,
}

impl Channel {
    /// Number of channels carried by every snapshot.
    pub const COUNT: usize = 20;

    /// Every channel, in wire order.
    pub const ALL: [Channel; Channel::COUNT] = [
        Channel::EngineRpm,
        Channel::EngineTemperature,
        Channel::OilPressure,
        Channel::OilTemperature,
        Channel::FuelLevel,
        Channel::FuelConsumption,
        Channel::FuelPressure,
        Channel::FuelTemperature,
        Channel::HydraulicPressure,
        Channel::HydraulicTemperature,
        Channel::HydraulicFluidLevel,
        Channel::Altitude,
        Channel::Airspeed,
        Channel::GroundSpeed,
        Channel::MachNumber,
        Channel::VerticalSpeed,
        Channel::CabinPressure,
        Channel::CabinTemperature,
        Channel::BatteryVoltage,
        Channel::GeneratorOutput,
    ];

    /// Field name used on the wire.
    pub fn wire_name(self) -> &'static str {
        match self {
            Channel::EngineRpm => "engineRPM",
            Channel::EngineTemperature => "engineTemperature",
            Channel::OilPressure => "oilPressure",
            Channel::OilTemperature => "oilTemperature",
            Channel::FuelLevel => "fuelLevel",
            Channel::FuelConsumption => "fuelConsumption",
            Channel::FuelPressure => "fuelPressure",
            Channel::FuelTemperature => "fuelTemperature",
            Channel::HydraulicPressure => "hydraulicPressure",
            Channel::HydraulicTemperature => "hydraulicTemperature",
            Channel::HydraulicFluidLevel => "hydraulicFluidLevel",
            Channel::Altitude => "altitude",
            Channel::Airspeed => "airspeed",
            Channel::GroundSpeed => "groundSpeed",
            Channel::MachNumber => "machNumber",
            Channel::VerticalSpeed => "verticalSpeed",
            Channel::CabinPressure => "cabinPressure",
            Channel::CabinTemperature => "cabinTemperature",
            Channel::BatteryVoltage => "batteryVoltage",
            Channel::GeneratorOutput => "generatorOutput",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ---------------------------------------------------------------------------
// Subsystem flags
// ---------------------------------------------------------------------------

/// Subsystem groups for which the upstream source supplies an anomaly flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Subsystem {
    Engine,
    Fuel,
    Hydraulic,
    Altitude,
    Airspeed,
}

impl Subsystem {
    pub const ALL: [Subsystem; 5] = [
        Subsystem::Engine,
        Subsystem::Fuel,
        Subsystem::Hydraulic,
        Subsystem::Altitude,
        Subsystem::Airspeed,
    ];

    /// Name of the boolean flag field on the wire.
    pub fn flag_name(self) -> &'static str {
        match self {
            Subsystem::Engine => "engineAnomaly",
            Subsystem::Fuel => "fuelAnomaly",
            Subsystem::Hydraulic => "hydraulicAnomaly",
            Subsystem::Altitude => "altitudeAnomaly",
            Subsystem::Airspeed => "airspeedAnomaly",
        }
    }

    /// Short lowercase label, e.g. `"fuel"`.
    pub fn label(self) -> &'static str {
        match self {
            Subsystem::Engine => "engine",
            Subsystem::Fuel => "fuel",
            Subsystem::Hydraulic => "hydraulic",
            Subsystem::Altitude => "altitude",
            Subsystem::Airspeed => "airspeed",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-subsystem anomaly flags as supplied by (or derived for) a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnomalyFlags {
    pub engine: bool,
    pub fuel: bool,
    pub hydraulic: bool,
    pub altitude: bool,
    pub airspeed: bool,
}

impl AnomalyFlags {
    pub fn get(&self, subsystem: Subsystem) -> bool {
        match subsystem {
            Subsystem::Engine => self.engine,
            Subsystem::Fuel => self.fuel,
            Subsystem::Hydraulic => self.hydraulic,
            Subsystem::Altitude => self.altitude,
            Subsystem::Airspeed => self.airspeed,
        }
    }

    pub fn set(&mut self, subsystem: Subsystem, value: bool) {
        match subsystem {
            Subsystem::Engine => self.engine = value,
            Subsystem::Fuel => self.fuel = value,
            Subsystem::Hydraulic => self.hydraulic = value,
            Subsystem::Altitude => self.altitude = value,
            Subsystem::Airspeed => self.airspeed = value,
        }
    }

    pub fn has_any(&self) -> bool {
        Subsystem::ALL.iter().any(|s| self.get(*s))
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One point-in-time set of sensor readings.
///
/// Immutable once constructed: there are no setters, and the coordinator
/// replaces the whole snapshot when a newer one arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    timestamp: Timestamp,
    values: [Option<f64>; Channel::COUNT],
    flags: AnomalyFlags,
}

/// Reasons a raw payload cannot become a [`TelemetrySnapshot`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedPayload {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no timestamp")]
    MissingTimestamp,

    #[error("unrecognised timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("channel {field} is not a finite number")]
    NonNumericChannel { field: &'static str },

    #[error("flag {field} is not a boolean")]
    NonBooleanFlag { field: &'static str },
}

impl TelemetrySnapshot {
    /// Start building a snapshot by hand (tests, embedders).
    pub fn builder(timestamp: Timestamp) -> SnapshotBuilder {
        SnapshotBuilder {
            snapshot: TelemetrySnapshot {
                timestamp,
                values: [None; Channel::COUNT],
                flags: AnomalyFlags::default(),
            },
        }
    }

    /// Parse a raw JSON text payload.
    pub fn parse(text: &str) -> Result<Self, MalformedPayload> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| MalformedPayload::InvalidJson(e.to_string()))?;
        Self::from_json(&value)
    }

    /// Validate a decoded JSON payload and build a snapshot from it.
    ///
    /// Channel fields may be absent or `null`; present values must be
    /// finite numbers. Anomaly flags may be absent (read as `false`).
    /// Unknown fields are ignored.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, MalformedPayload> {
        let obj = value.as_object().ok_or(MalformedPayload::NotAnObject)?;

        let timestamp = match obj.get("timestamp") {
            None | Some(serde_json::Value::Null) => return Err(MalformedPayload::MissingTimestamp),
            Some(raw) => parse_timestamp(raw)?,
        };

        let mut values = [None; Channel::COUNT];
        for channel in Channel::ALL {
            values[channel.index()] = match obj.get(channel.wire_name()) {
                None | Some(serde_json::Value::Null) => None,
                Some(serde_json::Value::Number(n)) => match n.as_f64() {
                    Some(v) if v.is_finite() => Some(v),
                    _ => {
                        return Err(MalformedPayload::NonNumericChannel {
                            field: channel.wire_name(),
                        })
                    }
                },
                Some(_) => {
                    return Err(MalformedPayload::NonNumericChannel {
                        field: channel.wire_name(),
                    })
                }
            };
        }

        let mut flags = AnomalyFlags::default();
        for subsystem in Subsystem::ALL {
            let flag = match obj.get(subsystem.flag_name()) {
                None | Some(serde_json::Value::Null) => false,
                Some(serde_json::Value::Bool(b)) => *b,
                Some(_) => {
                    return Err(MalformedPayload::NonBooleanFlag {
                        field: subsystem.flag_name(),
                    })
                }
            };
            flags.set(subsystem, flag);
        }

        Ok(Self {
            timestamp,
            values,
            flags,
        })
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Reading for a channel, or `None` when the source did not report it.
    pub fn value(&self, channel: Channel) -> Option<f64> {
        self.values[channel.index()]
    }

    /// Anomaly flags as supplied by the upstream source.
    pub fn flags(&self) -> AnomalyFlags {
        self.flags
    }

    /// Status-panel view of the upstream flags.
    pub fn summary(&self) -> SubsystemSummary {
        SubsystemSummary::from_flags(self.flags)
    }
}

/// Builder returned by [`TelemetrySnapshot::builder`].
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    snapshot: TelemetrySnapshot,
}

impl SnapshotBuilder {
    pub fn value(mut self, channel: Channel, value: f64) -> Self {
        self.snapshot.values[channel.index()] = Some(value);
        self
    }

    pub fn flag(mut self, subsystem: Subsystem, anomalous: bool) -> Self {
        self.snapshot.flags.set(subsystem, anomalous);
        self
    }

    pub fn build(self) -> TelemetrySnapshot {
        self.snapshot
    }
}

fn parse_timestamp(raw: &serde_json::Value) -> Result<Timestamp, MalformedPayload> {
    match raw {
        serde_json::Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(dt.with_timezone(&Utc));
            }
            NaiveDateTime::parse_from_str(s, SERVER_TIMESTAMP_FORMAT)
                .or_else(|_| NaiveDateTime::parse_from_str(s, ISO_LOCAL_TIMESTAMP_FORMAT))
                .map(|naive| naive.and_utc())
                .map_err(|_| MalformedPayload::InvalidTimestamp(s.clone()))
        }
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| MalformedPayload::InvalidTimestamp(n.to_string())),
        other => Err(MalformedPayload::InvalidTimestamp(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Subsystem summary
// ---------------------------------------------------------------------------

/// Health of one displayed subsystem, taken from the upstream flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsystemHealth {
    Normal,
    Anomaly,
}

impl SubsystemHealth {
    fn from_flag(anomalous: bool) -> Self {
        if anomalous {
            SubsystemHealth::Anomaly
        } else {
            SubsystemHealth::Normal
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubsystemHealth::Normal => "NORMAL",
            SubsystemHealth::Anomaly => "ANOMALY",
        }
    }
}

/// Summary of the upstream flags grouped the way status displays show them.
///
/// Flight health combines the altitude and airspeed flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsystemSummary {
    pub engine: SubsystemHealth,
    pub fuel: SubsystemHealth,
    pub hydraulic: SubsystemHealth,
    pub flight: SubsystemHealth,
}

impl SubsystemSummary {
    pub fn from_flags(flags: AnomalyFlags) -> Self {
        Self {
            engine: SubsystemHealth::from_flag(flags.engine),
            fuel: SubsystemHealth::from_flag(flags.fuel),
            hydraulic: SubsystemHealth::from_flag(flags.hydraulic),
            flight: SubsystemHealth::from_flag(flags.altitude || flags.airspeed),
        }
    }

    fn all(&self) -> [SubsystemHealth; 4] {
        [self.engine, self.fuel, self.hydraulic, self.flight]
    }

    pub fn has_any_anomaly(&self) -> bool {
        self.all().contains(&SubsystemHealth::Anomaly)
    }

    pub fn anomaly_count(&self) -> usize {
        self.all()
            .iter()
            .filter(|h| **h == SubsystemHealth::Anomaly)
            .count()
    }

    /// `"WARNING"` if any subsystem is anomalous, otherwise `"NORMAL"`.
    pub fn system_status(&self) -> &'static str {
        if self.has_any_anomaly() {
            "WARNING"
        } else {
            "NORMAL"
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
