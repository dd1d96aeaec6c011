//! Transport coordinator.
//!
//! [`TelemetryCoordinator`] keeps telemetry flowing from whichever transport
//! is available. It starts on pull polling, tries the push transport in
//! parallel, and stops polling once push is up. When push drops it falls
//! back to polling and retries push on the configured reconnect policy.
//!
//! All state lives in one spawned event loop. Pulls and handshakes run as
//! their own tasks and report back over an internal channel, so the loop
//! never blocks on I/O and every emission happens in arrival order.

use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use skywatch_core::alert::{AlertEvent, AlertRequest, RawAlert};
use skywatch_core::alert_board::AlertBoard;
use skywatch_core::telemetry::TelemetrySnapshot;
use skywatch_core::thresholds::{Evaluation, ThresholdAlerter};
use skywatch_core::types::Timestamp;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;

use crate::api::{HttpPullTransport, PullError, PullTransport};
use crate::client::{PushSession, PushTransport, WsPushTransport};
use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::events::{ConnectionState, Subscribers};
use crate::messages::{parse_message, InboundMessage, OutboundMessage};
use crate::processor::{Source, TelemetryProcessor};
use crate::reconnect::ReconnectPolicy;

/// Handle to a running telemetry link.
///
/// Create with [`new`](Self::new) or [`from_config`](Self::from_config),
/// register subscribers, then call [`start`](Self::start). Dropping the
/// handle cancels the event loop; [`shutdown`](Self::shutdown) also waits
/// for it to finish.
pub struct TelemetryCoordinator {
    cancel: CancellationToken,
    commands: mpsc::UnboundedSender<Command>,
    subscribers: Arc<Subscribers>,
    state: watch::Receiver<ConnectionState>,
    alerts: watch::Receiver<Vec<AlertEvent>>,
    assessment: watch::Receiver<Option<Evaluation>>,
    pending: Mutex<Option<EventLoop>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TelemetryCoordinator {
    /// Build a coordinator over arbitrary transports. Nothing runs until
    /// [`start`](Self::start).
    ///
    /// A zero poll or sweep interval is replaced by its default.
    pub fn new(
        config: LinkConfig,
        push: Arc<dyn PushTransport>,
        pull: Arc<dyn PullTransport>,
    ) -> Self {
        let config = config.with_nonzero_periods();
        let cancel = CancellationToken::new();
        let subscribers = Arc::new(Subscribers::default());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (alerts_tx, alerts_rx) = watch::channel(Vec::new());
        let (assessment_tx, assessment_rx) = watch::channel(None);

        let alerter = config
            .threshold_alerts
            .then(|| ThresholdAlerter::new(config.threshold_alert_cooldown));

        let event_loop = EventLoop {
            board: AlertBoard::new(config.alert_ttl),
            reconnect: ReconnectPolicy::new(config.reconnect.clone()),
            processor: TelemetryProcessor::new(alerter),
            config,
            push,
            pull,
            subscribers: Arc::clone(&subscribers),
            cancel: cancel.clone(),
            commands: command_rx,
            internal_tx,
            internal_rx,
            state_tx,
            alerts_tx,
            assessment_tx,
            state: ConnectionState::Disconnected,
            clock: Clock::start(),
            poll_timer: None,
            poll_generation: 0,
            reconnect_timer: None,
            handshake_in_flight: false,
            session: None,
        };

        Self {
            cancel,
            commands: command_tx,
            subscribers,
            state: state_rx,
            alerts: alerts_rx,
            assessment: assessment_rx,
            pending: Mutex::new(Some(event_loop)),
            task: Mutex::new(None),
        }
    }

    /// Build a coordinator over the WebSocket and HTTP transports named in
    /// `config`.
    pub fn from_config(config: LinkConfig) -> Self {
        let push = Arc::new(WsPushTransport::new(config.ws_url.clone()));
        let pull = Arc::new(HttpPullTransport::new(config.poll_url.clone()));
        Self::new(config, push, pull)
    }

    /// Spawn the event loop. Calling it again, or after shutdown, does
    /// nothing.
    pub fn start(&self) {
        let Some(event_loop) = lock(&self.pending).take() else {
            tracing::debug!("Telemetry coordinator already started");
            return;
        };
        if self.cancel.is_cancelled() {
            return;
        }
        let handle = tokio::spawn(event_loop.run());
        *lock(&self.task) = Some(handle);
    }

    /// Stop polling, close the push session, and wait for the loop to exit.
    ///
    /// Safe to call any number of times.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        lock(&self.pending).take();

        let handle = lock(&self.task).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Telemetry coordinator task failed");
            }
        }
    }

    /// Receive every delivered snapshot. Replaces any earlier subscriber.
    pub fn on_telemetry(&self) -> mpsc::UnboundedReceiver<TelemetrySnapshot> {
        self.subscribers.telemetry.subscribe()
    }

    /// Receive every recorded alert. Replaces any earlier subscriber.
    pub fn on_alert(&self) -> mpsc::UnboundedReceiver<AlertEvent> {
        self.subscribers.alert.subscribe()
    }

    /// Receive every connection state change. Replaces any earlier
    /// subscriber.
    pub fn on_connection_status(&self) -> mpsc::UnboundedReceiver<ConnectionState> {
        self.subscribers.status.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A watch on the connection state, for callers that only need the
    /// latest value.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Alerts currently inside their visibility window, oldest first.
    pub fn visible_alerts(&self) -> Vec<AlertEvent> {
        self.alerts.borrow().clone()
    }

    /// Evaluation of the most recently delivered snapshot.
    pub fn latest_assessment(&self) -> Option<Evaluation> {
        self.assessment.borrow().clone()
    }

    /// Ask the server to broadcast an alert. Push transport only.
    pub async fn send_alert_request(&self, request: AlertRequest) -> Result<(), LinkError> {
        request.validate()?;
        self.dispatch(OutboundMessage::AlertRequest(request)).await
    }

    /// Ask the server for an immediate snapshot. Push transport only.
    pub async fn request_telemetry(&self) -> Result<(), LinkError> {
        self.dispatch(OutboundMessage::RequestAircraftData).await
    }

    async fn dispatch(&self, message: OutboundMessage) -> Result<(), LinkError> {
        if self.cancel.is_cancelled() {
            return Err(LinkError::Stopped);
        }
        if lock(&self.pending).is_some() {
            tracing::warn!(
                message_type = message.type_name(),
                "Coordinator not started, dropping outbound message",
            );
            return Err(LinkError::NotConnected);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command {
                message,
                reply: reply_tx,
            })
            .map_err(|_| LinkError::Stopped)?;
        reply_rx.await.map_err(|_| LinkError::Stopped)?
    }
}

impl Drop for TelemetryCoordinator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

struct Command {
    message: OutboundMessage,
    reply: oneshot::Sender<Result<(), LinkError>>,
}

/// Results reported back by spawned I/O tasks.
enum Internal {
    Pulled {
        generation: u64,
        result: Result<String, PullError>,
    },
    Handshake(Result<Box<dyn PushSession>, LinkError>),
}

/// Wall-clock time that follows the tokio clock, so paused-time tests see
/// alert ages advance with `tokio::time`.
#[derive(Debug, Clone, Copy)]
struct Clock {
    wall: Timestamp,
    origin: Instant,
}

impl Clock {
    fn start() -> Self {
        Self {
            wall: chrono::Utc::now(),
            origin: Instant::now(),
        }
    }

    fn now(&self) -> Timestamp {
        self.wall + chrono::Duration::from_std(self.origin.elapsed()).unwrap_or(chrono::Duration::zero())
    }
}

struct EventLoop {
    config: LinkConfig,
    push: Arc<dyn PushTransport>,
    pull: Arc<dyn PullTransport>,
    subscribers: Arc<Subscribers>,
    cancel: CancellationToken,
    commands: mpsc::UnboundedReceiver<Command>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    state_tx: watch::Sender<ConnectionState>,
    alerts_tx: watch::Sender<Vec<AlertEvent>>,
    assessment_tx: watch::Sender<Option<Evaluation>>,

    state: ConnectionState,
    clock: Clock,
    board: AlertBoard,
    processor: TelemetryProcessor,
    reconnect: ReconnectPolicy,

    /// Present while polling. Results from an older generation are stale.
    poll_timer: Option<Interval>,
    poll_generation: u64,
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    handshake_in_flight: bool,
    session: Option<Box<dyn PushSession>>,
}

impl EventLoop {
    async fn run(mut self) {
        tracing::info!(
            ws_url = %self.config.ws_url,
            poll_url = %self.config.poll_url,
            "Telemetry coordinator started",
        );

        let period = self.config.sweep_interval;
        let mut sweep = time::interval_at(Instant::now() + period, period);

        self.start_polling();
        self.begin_handshake();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(internal) = self.internal_rx.recv() => match internal {
                    Internal::Pulled { generation, result } => self.handle_pull(generation, result),
                    Internal::Handshake(result) => self.handle_handshake(result),
                },
                frame = next_frame(&mut self.session) => self.handle_frame(frame).await,
                Some(command) = self.commands.recv() => self.handle_command(command).await,
                _ = tick(&mut self.poll_timer) => self.spawn_pull(),
                _ = fire(&mut self.reconnect_timer) => {
                    self.reconnect_timer = None;
                    self.begin_handshake();
                }
                _ = sweep.tick() => self.sweep(),
            }
        }

        self.teardown().await;
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        tracing::info!(from = %self.state, to = %next, "Connection state changed");
        self.state = next;
        self.state_tx.send_replace(next);
        self.subscribers.status.emit(next);
    }

    // -- pull -----------------------------------------------------------

    /// Pull once now, then every poll interval. Always ends in `polling`.
    fn start_polling(&mut self) {
        if self.poll_timer.is_none() {
            self.poll_generation += 1;
            tracing::info!(
                interval_ms = self.config.poll_interval.as_millis() as u64,
                "Starting pull polling",
            );

            self.spawn_pull();

            let period = self.config.poll_interval;
            let mut timer = time::interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.poll_timer = Some(timer);
        }
        self.transition(ConnectionState::Polling);
    }

    fn stop_polling(&mut self) {
        if self.poll_timer.take().is_some() {
            self.poll_generation += 1;
            tracing::info!("Stopping pull polling, push transport is active");
        }
    }

    fn spawn_pull(&self) {
        let pull = Arc::clone(&self.pull);
        let tx = self.internal_tx.clone();
        let cancel = self.cancel.clone();
        let generation = self.poll_generation;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = pull.fetch() => {
                    let _ = tx.send(Internal::Pulled { generation, result });
                }
            }
        });
    }

    fn handle_pull(&mut self, generation: u64, result: Result<String, PullError>) {
        if generation != self.poll_generation {
            tracing::debug!(generation, "Discarding result from a cancelled polling cycle");
            return;
        }

        let snapshot = result.and_then(|body| {
            TelemetrySnapshot::parse(&body).map_err(|e| PullError::Body(e.to_string()))
        });

        match snapshot {
            Ok(snapshot) => {
                if self.state == ConnectionState::Error {
                    self.transition(ConnectionState::Polling);
                }
                self.deliver(snapshot, Source::Pull);
            }
            Err(e) => {
                let error = LinkError::PullCycleFailure(e);
                tracing::warn!(error = %error, "Pull cycle failed");
                self.transition(ConnectionState::Error);
            }
        }
    }

    // -- push -----------------------------------------------------------

    fn begin_handshake(&mut self) {
        if self.handshake_in_flight || self.session.is_some() {
            return;
        }
        self.handshake_in_flight = true;
        if self.poll_timer.is_none() {
            self.transition(ConnectionState::Connecting);
        }

        let push = Arc::clone(&self.push);
        let tx = self.internal_tx.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = push.connect() => {
                    let _ = tx.send(Internal::Handshake(result));
                }
            }
        });
    }

    fn handle_handshake(&mut self, result: Result<Box<dyn PushSession>, LinkError>) {
        self.handshake_in_flight = false;

        match result {
            Ok(session) => {
                tracing::info!(
                    after_attempts = self.reconnect.attempts(),
                    "Push transport established",
                );
                self.session = Some(session);
                self.reconnect.reset();
                self.reconnect_timer = None;
                self.stop_polling();
                self.transition(ConnectionState::Connected);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Push handshake failed");
                self.transition(ConnectionState::Error);
                self.start_polling();
                self.schedule_reconnect();
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        if self.reconnect_timer.is_some() || self.handshake_in_flight {
            return;
        }
        match self.reconnect.next_attempt() {
            Some(attempt) => {
                tracing::info!(
                    attempt = attempt.number,
                    max_attempts = self.reconnect.max_attempts(),
                    delay_ms = attempt.delay.as_millis() as u64,
                    "Scheduling push reconnect",
                );
                self.reconnect_timer = Some(Box::pin(time::sleep(attempt.delay)));
            }
            None => {
                tracing::warn!(
                    attempts = self.reconnect.attempts(),
                    "Push reconnect attempts exhausted, staying on polling",
                );
            }
        }
    }

    async fn handle_frame(&mut self, frame: Option<Result<String, LinkError>>) {
        let text = match frame {
            Some(Ok(text)) => text,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Push transport receive error");
                self.on_push_closed().await;
                return;
            }
            None => {
                self.on_push_closed().await;
                return;
            }
        };

        let message = match parse_message(&text) {
            Ok(message) => message,
            Err(e) => {
                let error = LinkError::MalformedPayload(e);
                tracing::warn!(error = %error, raw_message = %text, "Dropping push frame");
                return;
            }
        };
        tracing::trace!(kind = message.type_name().unwrap_or("unknown"), "Push frame");

        match message {
            InboundMessage::Telemetry(snapshot) => self.deliver(snapshot, Source::Push),
            InboundMessage::Alert(raw) => self.record_alert(raw),
            InboundMessage::Connection(message) => {
                tracing::info!(
                    greeting = message.as_deref().unwrap_or_default(),
                    "Push transport greeting",
                );
            }
            InboundMessage::Echo => {
                tracing::debug!(raw_message = %text, "Echo from server");
            }
            InboundMessage::Unknown => {
                tracing::debug!(raw_message = %text, "Ignoring message of unknown type");
            }
        }
    }

    async fn on_push_closed(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
        tracing::info!("Push transport disconnected, falling back to polling");
        self.transition(ConnectionState::Disconnected);
        self.start_polling();
        self.schedule_reconnect();
    }

    async fn handle_command(&mut self, command: Command) {
        let result = match self.session.as_mut() {
            Some(session) => session.send_text(command.message.to_text()).await,
            None => {
                tracing::warn!(
                    message_type = command.message.type_name(),
                    "Push transport not connected, dropping outbound message",
                );
                Err(LinkError::NotConnected)
            }
        };
        if let Err(LinkError::TransportClosed(reason)) = &result {
            tracing::warn!(
                message_type = command.message.type_name(),
                reason = %reason,
                "Failed to send outbound message",
            );
        }
        let _ = command.reply.send(result);
    }

    // -- delivery ---------------------------------------------------------

    fn deliver(&mut self, snapshot: TelemetrySnapshot, source: Source) {
        let now = self.clock.now();
        let processed = self.processor.process(snapshot, source, now);

        self.assessment_tx.send_replace(Some(processed.evaluation));
        self.subscribers.telemetry.emit(processed.snapshot);

        for raw in processed.alerts {
            self.record_alert(raw);
        }
    }

    fn record_alert(&mut self, raw: RawAlert) {
        let event = self.board.record(raw, self.clock.now());
        tracing::info!(
            alert_id = event.id,
            alert_type = %event.alert_type,
            severity = %event.severity,
            "Alert recorded",
        );
        self.alerts_tx.send_replace(self.board.visible());
        self.subscribers.alert.emit(event);
    }

    fn sweep(&mut self) {
        let removed = self.board.sweep(self.clock.now());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.board.len(), "Expired alerts");
            self.alerts_tx.send_replace(self.board.visible());
        }
    }

    async fn teardown(&mut self) {
        self.poll_timer = None;
        self.poll_generation += 1;
        self.reconnect_timer = None;
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
        self.transition(ConnectionState::Disconnected);
        tracing::info!("Telemetry coordinator stopped");
    }
}

async fn next_frame(session: &mut Option<Box<dyn PushSession>>) -> Option<Result<String, LinkError>> {
    match session {
        Some(session) => session.next_frame().await,
        None => std::future::pending().await,
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn fire(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
