//! Coordinator behaviour against in-memory transports.
//!
//! Time is paused, so the poll period, reconnect delay and alert window
//! elapse instantly and in a deterministic order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use serde_json::json;
use skywatch_core::alert::{AlertEvent, AlertRequest, Severity};
use skywatch_core::telemetry::{Channel, TelemetrySnapshot};
use skywatch_core::thresholds::{Assessment, ChannelStatus};
use skywatch_link::api::{PullError, PullTransport};
use skywatch_link::client::{PushSession, PushTransport};
use skywatch_link::{ConnectionState, LinkConfig, LinkError, TelemetryCoordinator};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, Notify};
use tokio::time::{self, timeout, Instant};

const PULL_BASE_MS: i64 = 1_714_564_800_000;
const PUSH_BASE_MS: i64 = PULL_BASE_MS + 1_000_000;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

fn snapshot_json(timestamp_ms: i64, overrides: &serde_json::Value) -> serde_json::Value {
    let mut data = json!({
        "timestamp": timestamp_ms,
        "engineRPM": 2200.0,
        "engineTemperature": 185.0,
        "fuelLevel": 85.0,
        "hydraulicPressure": 2800.0,
        "altitude": 35000.0,
        "airspeed": 450.0
    });
    if let (Some(obj), Some(extra)) = (data.as_object_mut(), overrides.as_object()) {
        for (key, value) in extra {
            obj.insert(key.clone(), value.clone());
        }
    }
    data
}

fn aircraft_frame(timestamp_ms: i64) -> String {
    json!({ "type": "aircraft_data", "data": snapshot_json(timestamp_ms, &json!({})) }).to_string()
}

fn alert_frame(message: &str) -> String {
    json!({
        "type": "alert",
        "alertType": "ENGINE",
        "message": message,
        "severity": "WARNING"
    })
    .to_string()
}

struct FakePull {
    calls: AtomicUsize,
    failing: AtomicBool,
    overrides: serde_json::Value,
    held: AtomicBool,
    release: Notify,
}

impl FakePull {
    fn new(overrides: serde_json::Value, failing: bool) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(failing),
            overrides,
            held: AtomicBool::new(false),
            release: Notify::new(),
        }
    }

    /// Responses wait until [`FakePull::release`].
    fn held() -> Self {
        let pull = Self::new(json!({}), false);
        pull.held.store(true, Ordering::SeqCst);
        pull
    }

    fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.release.notify_one();
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl PullTransport for FakePull {
    async fn fetch(&self) -> Result<String, PullError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) as i64;
        if self.held.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(PullError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(snapshot_json(PULL_BASE_MS + n * 1_000, &self.overrides).to_string())
    }
}

/// What the next handshake does. An empty plan queue fails.
#[derive(Debug, Clone, Copy)]
enum Plan {
    Accept,
    Fail,
    Hang,
}

/// Test-side end of an accepted push session.
struct SessionHandle {
    frames: mpsc::UnboundedSender<String>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

struct FakePush {
    plans: Mutex<VecDeque<Plan>>,
    calls: AtomicUsize,
    sessions: mpsc::UnboundedSender<SessionHandle>,
}

impl FakePush {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushTransport for FakePush {
    async fn connect(&self) -> Result<Box<dyn PushSession>, LinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let plan = self.plans.lock().unwrap().pop_front().unwrap_or(Plan::Fail);

        match plan {
            Plan::Fail => Err(LinkError::TransportHandshakeFailure(
                "connection refused".into(),
            )),
            Plan::Hang => std::future::pending().await,
            Plan::Accept => {
                let (frames_tx, frames_rx) = mpsc::unbounded_channel();
                let sent = Arc::new(Mutex::new(Vec::new()));
                let closed = Arc::new(AtomicBool::new(false));
                let _ = self.sessions.send(SessionHandle {
                    frames: frames_tx,
                    sent: Arc::clone(&sent),
                    closed: Arc::clone(&closed),
                });
                Ok(Box::new(FakeSession {
                    frames: frames_rx,
                    sent,
                    closed,
                }))
            }
        }
    }
}

struct FakeSession {
    frames: mpsc::UnboundedReceiver<String>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl PushSession for FakeSession {
    async fn next_frame(&mut self) -> Option<Result<String, LinkError>> {
        self.frames.recv().await.map(Ok)
    }

    async fn send_text(&mut self, text: String) -> Result<(), LinkError> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    coordinator: TelemetryCoordinator,
    push: Arc<FakePush>,
    pull: Arc<FakePull>,
    sessions: mpsc::UnboundedReceiver<SessionHandle>,
    telemetry: mpsc::UnboundedReceiver<TelemetrySnapshot>,
    alerts: mpsc::UnboundedReceiver<AlertEvent>,
    status: mpsc::UnboundedReceiver<ConnectionState>,
}

fn harness(plans: Vec<Plan>) -> Harness {
    harness_with(LinkConfig::default(), plans, json!({}), false)
}

fn harness_with(
    config: LinkConfig,
    plans: Vec<Plan>,
    pull_overrides: serde_json::Value,
    pull_failing: bool,
) -> Harness {
    start_with(config, plans, FakePull::new(pull_overrides, pull_failing))
}

/// Subscribes to everything, then starts the coordinator.
fn start_with(config: LinkConfig, plans: Vec<Plan>, pull: FakePull) -> Harness {
    let (sessions_tx, sessions) = mpsc::unbounded_channel();
    let push = Arc::new(FakePush {
        plans: Mutex::new(plans.into()),
        calls: AtomicUsize::new(0),
        sessions: sessions_tx,
    });
    let pull = Arc::new(pull);

    let coordinator = TelemetryCoordinator::new(config, push.clone(), pull.clone());
    let telemetry = coordinator.on_telemetry();
    let alerts = coordinator.on_alert();
    let status = coordinator.on_connection_status();
    coordinator.start();

    Harness {
        coordinator,
        push,
        pull,
        sessions,
        telemetry,
        alerts,
        status,
    }
}

async fn next_status(rx: &mut mpsc::UnboundedReceiver<ConnectionState>) -> ConnectionState {
    timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("status change within 60s")
        .expect("status channel open")
}

async fn wait_for_state(rx: &mut mpsc::UnboundedReceiver<ConnectionState>, target: ConnectionState) {
    while next_status(rx).await != target {}
}

async fn next_session(rx: &mut mpsc::UnboundedReceiver<SessionHandle>) -> SessionHandle {
    timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("session within 60s")
        .expect("session channel open")
}

fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
        out.push(item);
    }
    out
}

// ---------------------------------------------------------------------------
// Start-up and degraded mode
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn starts_polling_and_pulls_immediately() {
    let mut h = harness(vec![Plan::Hang]);
    let started = Instant::now();

    assert_eq!(next_status(&mut h.status).await, ConnectionState::Polling);
    let first = h.telemetry.recv().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(first.timestamp().timestamp_millis(), PULL_BASE_MS);
    assert_eq!(h.pull.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn telemetry_keeps_flowing_when_push_never_connects() {
    let mut h = harness(vec![]);

    for _ in 0..10 {
        let snapshot = timeout(Duration::from_millis(2_100), h.telemetry.recv())
            .await
            .expect("telemetry at least every 2s")
            .unwrap();
        assert!(snapshot.value(Channel::EngineRpm).is_some());
    }
    assert_eq!(h.coordinator.state(), ConnectionState::Polling);
}

#[tokio::test(start_paused = true)]
async fn zero_intervals_fall_back_to_defaults() {
    let config = LinkConfig {
        poll_interval: Duration::ZERO,
        sweep_interval: Duration::ZERO,
        ..LinkConfig::default()
    };
    let mut h = harness_with(config, vec![Plan::Hang], json!({}), false);

    assert_eq!(next_status(&mut h.status).await, ConnectionState::Polling);
    h.telemetry.recv().await.unwrap();
    let started = Instant::now();
    h.telemetry.recv().await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(h.coordinator.state(), ConnectionState::Polling);
}

#[tokio::test(start_paused = true)]
async fn reconnect_gives_up_after_five_attempts() {
    let h = harness(vec![]);

    time::sleep(Duration::from_secs(60)).await;
    // The initial handshake plus five reconnects.
    assert_eq!(h.push.calls(), 6);
    assert_eq!(h.coordinator.state(), ConnectionState::Polling);

    time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.push.calls(), 6);
}

#[tokio::test(start_paused = true)]
async fn handshake_failure_reports_error_then_polling() {
    let mut h = harness(vec![Plan::Fail, Plan::Hang]);

    let statuses = [
        next_status(&mut h.status).await,
        next_status(&mut h.status).await,
        next_status(&mut h.status).await,
    ];
    assert_eq!(
        statuses,
        [
            ConnectionState::Polling,
            ConnectionState::Error,
            ConnectionState::Polling
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn pull_failure_is_transient() {
    let mut h = harness_with(LinkConfig::default(), vec![Plan::Hang], json!({}), true);

    assert_eq!(next_status(&mut h.status).await, ConnectionState::Polling);
    assert_eq!(next_status(&mut h.status).await, ConnectionState::Error);

    h.pull.set_failing(false);
    assert_eq!(next_status(&mut h.status).await, ConnectionState::Polling);
    assert!(h.telemetry.recv().await.is_some());
    assert_eq!(h.pull.calls(), 2);
}

// ---------------------------------------------------------------------------
// Push transport
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn no_pull_telemetry_once_push_is_connected() {
    let mut h = harness(vec![Plan::Accept]);

    wait_for_state(&mut h.status, ConnectionState::Connected).await;
    let session = next_session(&mut h.sessions).await;
    drain(&mut h.telemetry);
    let pulls = h.pull.calls();

    time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.pull.calls(), pulls);
    assert_eq!(h.telemetry.try_recv().unwrap_err(), TryRecvError::Empty);

    session.frames.send(aircraft_frame(PUSH_BASE_MS)).unwrap();
    let snapshot = h.telemetry.recv().await.unwrap();
    assert_eq!(snapshot.timestamp().timestamp_millis(), PUSH_BASE_MS);
    assert_eq!(h.coordinator.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn pull_in_flight_when_push_connects_is_discarded() {
    let mut h = start_with(LinkConfig::default(), vec![Plan::Accept], FakePull::held());

    wait_for_state(&mut h.status, ConnectionState::Connected).await;
    let _session = next_session(&mut h.sessions).await;
    assert_eq!(h.telemetry.try_recv().unwrap_err(), TryRecvError::Empty);

    h.pull.release();
    time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.telemetry.try_recv().unwrap_err(), TryRecvError::Empty);
    assert_eq!(h.pull.calls(), 1);
    assert!(h.coordinator.latest_assessment().is_none());
    assert_eq!(h.coordinator.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn push_loss_falls_back_to_polling_then_reconnects() {
    let mut h = harness(vec![Plan::Accept, Plan::Accept]);

    wait_for_state(&mut h.status, ConnectionState::Connected).await;
    let first = next_session(&mut h.sessions).await;
    drain(&mut h.telemetry);

    let closed = Arc::clone(&first.closed);
    drop(first);

    assert_eq!(next_status(&mut h.status).await, ConnectionState::Disconnected);
    assert_eq!(next_status(&mut h.status).await, ConnectionState::Polling);
    assert!(closed.load(Ordering::SeqCst));

    // Polling resumes with an immediate pull.
    assert!(h.telemetry.recv().await.is_some());

    // Reconnect after the fixed delay.
    assert_eq!(next_status(&mut h.status).await, ConnectionState::Connected);
    let _second = next_session(&mut h.sessions).await;
    assert_eq!(h.push.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn malformed_and_unknown_frames_are_ignored() {
    let mut h = harness(vec![Plan::Accept]);

    wait_for_state(&mut h.status, ConnectionState::Connected).await;
    let session = next_session(&mut h.sessions).await;
    drain(&mut h.telemetry);

    for frame in [
        "not json".to_string(),
        json!({ "type": "weather_update" }).to_string(),
        json!({ "type": "aircraft_data", "data": { "engineRPM": 2200.0 } }).to_string(),
        json!({ "type": "aircraft_data", "data": { "timestamp": PUSH_BASE_MS, "fuelLevel": "low" } })
            .to_string(),
        json!({ "type": "connection", "message": "Connected to Aircraft Monitoring System" })
            .to_string(),
        json!({ "type": "echo", "message": "ping" }).to_string(),
    ] {
        session.frames.send(frame).unwrap();
    }
    session.frames.send(aircraft_frame(PUSH_BASE_MS + 1)).unwrap();

    let snapshot = h.telemetry.recv().await.unwrap();
    assert_eq!(snapshot.timestamp().timestamp_millis(), PUSH_BASE_MS + 1);
    assert_eq!(h.status.try_recv().unwrap_err(), TryRecvError::Empty);
    assert_eq!(h.coordinator.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn snapshots_keep_flowing_after_upstream_clock_steps_back() {
    let mut h = harness(vec![Plan::Accept]);

    wait_for_state(&mut h.status, ConnectionState::Connected).await;
    let session = next_session(&mut h.sessions).await;
    drain(&mut h.telemetry);

    session.frames.send(aircraft_frame(PUSH_BASE_MS)).unwrap();
    let stepped_back = PUSH_BASE_MS - 3_600_000;
    for i in 0..5 {
        session.frames.send(aircraft_frame(stepped_back + i * 2_000)).unwrap();
    }

    let first = h.telemetry.recv().await.unwrap();
    assert_eq!(first.timestamp().timestamp_millis(), PUSH_BASE_MS);
    for i in 0..5 {
        let snapshot = h.telemetry.recv().await.unwrap();
        assert_eq!(snapshot.timestamp().timestamp_millis(), stepped_back + i * 2_000);
    }
    assert!(h.coordinator.latest_assessment().is_some());
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn push_alert_fires_once_with_fresh_id() {
    let mut h = harness(vec![Plan::Accept]);

    wait_for_state(&mut h.status, ConnectionState::Connected).await;
    let session = next_session(&mut h.sessions).await;

    session.frames.send(alert_frame("Engine temperature anomaly detected")).unwrap();
    let first = h.alerts.recv().await.unwrap();
    session.frames.send(alert_frame("Engine temperature anomaly detected")).unwrap();
    let second = h.alerts.recv().await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(first.alert_type, "ENGINE");
    assert_eq!(first.severity, Severity::Warning);
    assert_eq!(h.alerts.try_recv().unwrap_err(), TryRecvError::Empty);
    assert_eq!(h.coordinator.visible_alerts(), vec![first, second]);
}

#[tokio::test(start_paused = true)]
async fn alerts_expire_after_visibility_window() {
    let mut h = harness(vec![Plan::Accept]);

    wait_for_state(&mut h.status, ConnectionState::Connected).await;
    let session = next_session(&mut h.sessions).await;
    session.frames.send(alert_frame("Hydraulic pressure low")).unwrap();
    h.alerts.recv().await.unwrap();

    time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.coordinator.visible_alerts().len(), 1);

    time::sleep(Duration::from_secs(6)).await;
    assert!(h.coordinator.visible_alerts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn threshold_alerts_when_enabled() {
    let config = LinkConfig {
        threshold_alerts: true,
        ..LinkConfig::default()
    };
    let mut h = harness_with(
        config,
        vec![Plan::Hang],
        json!({ "fuelLevel": 15.0, "fuelAnomaly": true }),
        false,
    );

    h.telemetry.recv().await.unwrap();
    let alert = h.alerts.recv().await.unwrap();
    assert_eq!(alert.alert_type, "FUEL");
    assert_eq!(alert.severity, Severity::Critical);

    let assessment = h.coordinator.latest_assessment().unwrap();
    assert_eq!(
        assessment[&Channel::FuelLevel],
        Assessment::Measured(ChannelStatus::Critical)
    );

    // Same reading on the next pull stays inside the cooldown.
    h.telemetry.recv().await.unwrap();
    assert_eq!(h.alerts.try_recv().unwrap_err(), TryRecvError::Empty);
}

// ---------------------------------------------------------------------------
// Outbound commands
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn outbound_requires_connected_push() {
    let mut h = harness(vec![Plan::Hang]);
    assert_eq!(next_status(&mut h.status).await, ConnectionState::Polling);

    assert_matches!(
        h.coordinator.request_telemetry().await,
        Err(LinkError::NotConnected)
    );
}

#[tokio::test(start_paused = true)]
async fn invalid_alert_request_is_rejected() {
    let h = harness(vec![Plan::Hang]);
    let request = AlertRequest {
        alert_type: "engine".into(),
        message: "Engine temperature anomaly".into(),
        severity: Severity::Warning,
    };

    assert_matches!(
        h.coordinator.send_alert_request(request).await,
        Err(LinkError::InvalidAlertRequest(_))
    );
}

#[tokio::test(start_paused = true)]
async fn outbound_frames_are_sent_over_push() {
    let mut h = harness(vec![Plan::Accept]);

    wait_for_state(&mut h.status, ConnectionState::Connected).await;
    let session = next_session(&mut h.sessions).await;

    let request =
        AlertRequest::new("HYDRAULIC", "Hydraulic pressure dropping", Severity::Critical).unwrap();
    h.coordinator.send_alert_request(request).await.unwrap();
    h.coordinator.request_telemetry().await.unwrap();

    let sent: Vec<serde_json::Value> = session
        .sent
        .lock()
        .unwrap()
        .iter()
        .map(|text| serde_json::from_str(text).unwrap())
        .collect();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0]["type"], "alert_request");
    assert_eq!(sent[0]["alertType"], "HYDRAULIC");
    assert_eq!(sent[0]["severity"], "CRITICAL");
    assert_eq!(sent[1], json!({ "type": "request_aircraft_data" }));
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn shutdown_is_idempotent_and_closes_push() {
    let mut h = harness(vec![Plan::Accept]);

    wait_for_state(&mut h.status, ConnectionState::Connected).await;
    let session = next_session(&mut h.sessions).await;

    h.coordinator.shutdown().await;
    h.coordinator.shutdown().await;

    assert_eq!(h.coordinator.state(), ConnectionState::Disconnected);
    assert_eq!(next_status(&mut h.status).await, ConnectionState::Disconnected);
    assert!(session.closed.load(Ordering::SeqCst));
    assert_matches!(
        h.coordinator.request_telemetry().await,
        Err(LinkError::Stopped)
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_polling() {
    let h = harness(vec![Plan::Hang]);
    time::sleep(Duration::from_secs(3)).await;

    h.coordinator.shutdown().await;
    let pulls = h.pull.calls();

    time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.pull.calls(), pulls);
}

#[tokio::test(start_paused = true)]
async fn resubscribing_replaces_previous_subscriber() {
    let mut h = harness(vec![Plan::Hang]);
    let mut replacement = h.coordinator.on_telemetry();

    assert!(replacement.recv().await.is_some());
    assert!(h.telemetry.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn start_is_idempotent() {
    let mut h = harness(vec![Plan::Hang]);
    h.coordinator.start();

    h.telemetry.recv().await.unwrap();
    time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.pull.calls(), 1);
}
