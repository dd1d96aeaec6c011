//! `skywatch-agent` -- headless aircraft telemetry monitor.
//!
//! Connects to the aircraft monitoring server over WebSocket, falls back
//! to HTTP polling while the push channel is down, and logs telemetry,
//! threshold exceedances, alerts, and connection changes.
//!
//! # Environment variables
//!
//! | Variable                          | Required | Default                                   | Description                         |
//! |-----------------------------------|----------|-------------------------------------------|-------------------------------------|
//! | `SKYWATCH_WS_URL`                 | no       | `ws://localhost:8080/websocket`           | Push endpoint                       |
//! | `SKYWATCH_POLL_URL`               | no       | `http://localhost:8080/api/aircraft/data` | Pull endpoint                       |
//! | `SKYWATCH_POLL_INTERVAL_MS`       | no       | `2000`                                    | Milliseconds between pulls          |
//! | `SKYWATCH_RECONNECT_DELAY_MS`     | no       | `2000`                                    | Delay before each push reconnect    |
//! | `SKYWATCH_MAX_RECONNECT_ATTEMPTS` | no       | `5`                                       | Reconnects before staying on polling |
//! | `SKYWATCH_ALERT_TTL_SECS`         | no       | `10`                                      | Alert visibility window             |
//! | `SKYWATCH_SWEEP_INTERVAL_MS`      | no       | `1000`                                    | Alert expiry sweep period           |
//! | `SKYWATCH_THRESHOLD_ALERTS`       | no       | `false`                                   | Raise alerts from threshold crossings |
//! | `SKYWATCH_LOG_FORMAT`             | no       | `text`                                    | `text` or `json`                    |

use skywatch_link::{LinkConfig, TelemetryCoordinator};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = LinkConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    tracing::info!(
        ws_url = %config.ws_url,
        poll_url = %config.poll_url,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        threshold_alerts = config.threshold_alerts,
        "Starting skywatch-agent",
    );

    let coordinator = TelemetryCoordinator::from_config(config);
    skywatch_agent::monitor::run(&coordinator, shutdown_signal()).await;

    tracing::info!("skywatch-agent stopped");
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "skywatch_agent=info,skywatch_link=info".into());

    let json = std::env::var("SKYWATCH_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
