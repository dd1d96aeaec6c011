use std::str::FromStr;
use std::time::Duration;

use skywatch_core::alert_board::DEFAULT_ALERT_TTL;
use skywatch_core::thresholds::DEFAULT_ALERT_COOLDOWN;

use crate::error::LinkError;
use crate::reconnect::ReconnectConfig;

pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/websocket";
pub const DEFAULT_POLL_URL: &str = "http://localhost:8080/api/aircraft/data";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Telemetry link configuration.
///
/// [`Default`] carries the fixed operating values; [`LinkConfig::from_env`]
/// lets deployments override them.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Push endpoint (default: `ws://localhost:8080/websocket`).
    pub ws_url: String,
    /// Pull endpoint (default: `http://localhost:8080/api/aircraft/data`).
    pub poll_url: String,
    /// Period between pulls while polling (default: 2 s).
    pub poll_interval: Duration,
    /// Push reconnection policy (default: fixed 2 s, 5 attempts).
    pub reconnect: ReconnectConfig,
    /// How long an alert stays visible (default: 10 s).
    pub alert_ttl: Duration,
    /// Period of the alert expiry sweep (default: 1 s).
    pub sweep_interval: Duration,
    /// Raise alerts from threshold crossings as well as upstream messages.
    pub threshold_alerts: bool,
    /// Per-channel cooldown for threshold alerts (default: 60 s).
    pub threshold_alert_cooldown: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.into(),
            poll_url: DEFAULT_POLL_URL.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            reconnect: ReconnectConfig::default(),
            alert_ttl: DEFAULT_ALERT_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            threshold_alerts: false,
            threshold_alert_cooldown: DEFAULT_ALERT_COOLDOWN,
        }
    }
}

impl LinkConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                           | Default                                   |
    /// |-----------------------------------|-------------------------------------------|
    /// | `SKYWATCH_WS_URL`                 | `ws://localhost:8080/websocket`           |
    /// | `SKYWATCH_POLL_URL`               | `http://localhost:8080/api/aircraft/data` |
    /// | `SKYWATCH_POLL_INTERVAL_MS`       | `2000`                                    |
    /// | `SKYWATCH_RECONNECT_DELAY_MS`     | `2000`                                    |
    /// | `SKYWATCH_MAX_RECONNECT_ATTEMPTS` | `5`                                       |
    /// | `SKYWATCH_ALERT_TTL_SECS`         | `10`                                      |
    /// | `SKYWATCH_SWEEP_INTERVAL_MS`      | `1000`                                    |
    /// | `SKYWATCH_THRESHOLD_ALERTS`       | `false`                                   |
    pub fn from_env() -> Result<Self, LinkError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LinkError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let ws_url = lookup("SKYWATCH_WS_URL").unwrap_or(defaults.ws_url);
        let poll_url = lookup("SKYWATCH_POLL_URL").unwrap_or(defaults.poll_url);

        let poll_interval = Duration::from_millis(setting(
            &lookup,
            "SKYWATCH_POLL_INTERVAL_MS",
            defaults.poll_interval.as_millis() as u64,
        )?);
        let reconnect_delay = Duration::from_millis(setting(
            &lookup,
            "SKYWATCH_RECONNECT_DELAY_MS",
            defaults.reconnect.delay.as_millis() as u64,
        )?);
        let max_attempts = setting(
            &lookup,
            "SKYWATCH_MAX_RECONNECT_ATTEMPTS",
            defaults.reconnect.max_attempts,
        )?;
        let alert_ttl = Duration::from_secs(setting(
            &lookup,
            "SKYWATCH_ALERT_TTL_SECS",
            defaults.alert_ttl.as_secs(),
        )?);
        let sweep_interval = Duration::from_millis(setting(
            &lookup,
            "SKYWATCH_SWEEP_INTERVAL_MS",
            defaults.sweep_interval.as_millis() as u64,
        )?);
        let threshold_alerts =
            setting(&lookup, "SKYWATCH_THRESHOLD_ALERTS", defaults.threshold_alerts)?;

        let config = Self {
            ws_url,
            poll_url,
            poll_interval,
            reconnect: ReconnectConfig::fixed(reconnect_delay, max_attempts),
            alert_ttl,
            sweep_interval,
            threshold_alerts,
            threshold_alert_cooldown: defaults.threshold_alert_cooldown,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject periods the event loop cannot tick on.
    pub fn validate(&self) -> Result<(), LinkError> {
        if self.poll_interval.is_zero() {
            return Err(LinkError::Config(
                "poll interval must be greater than zero".into(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(LinkError::Config(
                "sweep interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Replace zero periods with their defaults.
    pub(crate) fn with_nonzero_periods(mut self) -> Self {
        if self.poll_interval.is_zero() {
            tracing::warn!(
                default_ms = DEFAULT_POLL_INTERVAL.as_millis() as u64,
                "Zero poll interval, using the default",
            );
            self.poll_interval = DEFAULT_POLL_INTERVAL;
        }
        if self.sweep_interval.is_zero() {
            tracing::warn!(
                default_ms = DEFAULT_SWEEP_INTERVAL.as_millis() as u64,
                "Zero sweep interval, using the default",
            );
            self.sweep_interval = DEFAULT_SWEEP_INTERVAL;
        }
        self
    }
}

fn setting<T, F>(lookup: &F, name: &str, default: T) -> Result<T, LinkError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            LinkError::Config(format!("{name} has an invalid value: {raw:?}"))
        }),
    }
}
