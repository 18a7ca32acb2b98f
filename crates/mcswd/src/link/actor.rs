//! Link actor - owns the transport, pending calls and subscriptions.
//!
//! # State machine
//!
//! ```text
//! CLOSED ──connect──▶ CONNECTING ──open──▶ OPEN
//!                         │                 │ ▲
//!                    fail │      close/error│ │ open
//!                         ▼                 ▼ │
//!                       RECONNECTING ◀──────┘ │
//!                         └── retry every interval
//! ```
//!
//! Entering `RECONNECTING` starts exactly one retry timer and publishes
//! exactly one `Disconnected` event; the timer is dropped on the next open.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Reply channel send failures are ignored (the caller gave up)
//! - A dead transport is treated as a connection fault, never a panic

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mcsw_core::{ConnectionState, OperationError};
use mcsw_protocol::{ClientFrame, LinkLevelEvent, RemoteEvent, ServerFrame, ALL_SCOPE};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{interval, interval_at, timeout, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::commands::{LinkCommand, LinkEvent, LinkStatus};
use super::transport::{Connection, Connector, TransportError, TransportSignal};
use super::LinkConfig;

/// How often abandoned calls (caller timed out) are swept from the table.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(1);

/// Floor for the retry period; `interval_at` rejects a zero period.
const MIN_RECONNECT_INTERVAL: Duration = Duration::from_millis(1);

type AttemptOutcome = Result<Connection, TransportError>;

/// A request waiting for its response frame.
struct PendingCall {
    operation: String,
    named_params: Value,
    respond_to: oneshot::Sender<Result<Value, OperationError>>,
}

/// The link actor.
///
/// Single owner of the transport. While `OPEN`, `connection` is `Some`;
/// in every other state it is `None`.
pub struct LinkActor {
    receiver: mpsc::Receiver<LinkCommand>,
    connector: Arc<dyn Connector>,
    config: LinkConfig,

    /// Address given by the first `connect`; reused by every retry.
    address: Option<String>,
    state: ConnectionState,
    /// Bumped on every transition into `OPEN`.
    epoch: u64,
    status: watch::Sender<LinkStatus>,
    events: broadcast::Sender<LinkEvent>,

    connection: Option<Connection>,
    attempt_tx: mpsc::UnboundedSender<AttemptOutcome>,
    attempt_rx: mpsc::UnboundedReceiver<AttemptOutcome>,
    attempt_in_flight: bool,
    reconnect_timer: Option<Interval>,

    pending: HashMap<u64, PendingCall>,
    next_request_id: u64,

    /// (event, scope) → sinks. Tied to the current transport.
    subscriptions: HashMap<(String, String), Vec<mpsc::UnboundedSender<RemoteEvent>>>,

    /// `connect` callers waiting for the transport to open.
    connect_waiters: Vec<oneshot::Sender<()>>,
}

impl LinkActor {
    pub fn new(
        receiver: mpsc::Receiver<LinkCommand>,
        connector: Arc<dyn Connector>,
        config: LinkConfig,
        events: broadcast::Sender<LinkEvent>,
        status: watch::Sender<LinkStatus>,
    ) -> Self {
        let (attempt_tx, attempt_rx) = mpsc::unbounded_channel();
        Self {
            receiver,
            connector,
            config,
            address: None,
            state: ConnectionState::Closed,
            epoch: 0,
            status,
            events,
            connection: None,
            attempt_tx,
            attempt_rx,
            attempt_in_flight: false,
            reconnect_timer: None,
            pending: HashMap::new(),
            next_request_id: 1,
            subscriptions: HashMap::new(),
            connect_waiters: Vec::new(),
        }
    }

    /// Runs the actor event loop until every handle is dropped.
    pub async fn run(mut self) {
        info!("Link actor starting");

        let mut housekeeping = interval(HOUSEKEEPING_INTERVAL);
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                Some(outcome) = self.attempt_rx.recv() => self.handle_attempt(outcome),
                signal = recv_inbound(&mut self.connection) => self.handle_signal(signal),
                () = tick(&mut self.reconnect_timer) => self.start_attempt(),
                _ = housekeeping.tick() => self.prune_abandoned_calls(),
            }
        }

        self.connection = None;
        self.reject_pending("link shut down");
        info!(epoch = self.epoch, "Link actor stopped");
    }

    fn handle_command(&mut self, cmd: LinkCommand) {
        match cmd {
            LinkCommand::Connect {
                address,
                respond_to,
            } => self.handle_connect(address, respond_to),
            LinkCommand::Invoke {
                operation,
                params,
                named_params,
                respond_to,
            } => self.handle_invoke(operation, params, named_params, respond_to),
            LinkCommand::Subscribe {
                event,
                scope,
                sink,
                respond_to,
            } => {
                let result = self.handle_subscribe(event, scope, sink);
                let _ = respond_to.send(result);
            }
        }
    }

    // ========================================================================
    // Connection lifecycle
    // ========================================================================

    fn handle_connect(&mut self, address: String, respond_to: oneshot::Sender<()>) {
        match self.state {
            ConnectionState::Open => {
                let _ = respond_to.send(());
            }
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                self.connect_waiters.push(respond_to);
            }
            ConnectionState::Closed => {
                info!(address = %address, "Connecting to media control server");
                self.address = Some(address);
                self.set_state(ConnectionState::Connecting);
                self.connect_waiters.push(respond_to);
                self.start_attempt();
            }
        }
    }

    fn start_attempt(&mut self) {
        if self.attempt_in_flight || self.connection.is_some() {
            return;
        }
        let Some(address) = self.address.clone() else {
            return;
        };

        self.attempt_in_flight = true;
        let connector = Arc::clone(&self.connector);
        let outcome_tx = self.attempt_tx.clone();
        let limit = self.config.connect_timeout;

        tokio::spawn(async move {
            let outcome = match timeout(limit, connector.connect(&address)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout {
                    timeout_ms: limit.as_millis() as u64,
                }),
            };
            let _ = outcome_tx.send(outcome);
        });
    }

    fn handle_attempt(&mut self, outcome: AttemptOutcome) {
        self.attempt_in_flight = false;

        match outcome {
            Ok(connection) => {
                if self.connection.is_some() {
                    debug!("Dropping surplus transport");
                    return;
                }
                self.on_open(connection);
            }
            Err(err @ TransportError::InvalidAddress { .. }) => {
                if self.state == ConnectionState::Reconnecting {
                    debug!(error = %err, "Reconnect attempt failed");
                    return;
                }
                warn!(error = %err, "Cannot use media control server address");
                // connect() never rejects: release callers, keep retrying
                self.release_connect_waiters();
                self.enter_reconnecting();
            }
            Err(err) => {
                if self.state == ConnectionState::Connecting {
                    warn!(
                        error = %err,
                        retry_ms = self.config.reconnect_interval.as_millis() as u64,
                        "Initial connect failed, retrying"
                    );
                } else {
                    debug!(error = %err, "Reconnect attempt failed");
                }
                self.enter_reconnecting();
            }
        }
    }

    fn on_open(&mut self, connection: Connection) {
        self.connection = Some(connection);
        self.reconnect_timer = None;
        self.epoch += 1;
        self.set_state(ConnectionState::Open);

        info!(
            epoch = self.epoch,
            address = self.address.as_deref().unwrap_or_default(),
            "Link open"
        );
        let _ = self.events.send(LinkEvent::Connected { epoch: self.epoch });
        self.release_connect_waiters();
    }

    /// Moves to `RECONNECTING`. Does nothing if a retry timer already runs.
    fn enter_reconnecting(&mut self) {
        if self.reconnect_timer.is_some() {
            return;
        }

        self.set_state(ConnectionState::Reconnecting);
        let _ = self.events.send(LinkEvent::Disconnected);

        let period = self.config.reconnect_interval.max(MIN_RECONNECT_INTERVAL);
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.reconnect_timer = Some(timer);
    }

    fn handle_transport_lost(&mut self, reason: &str) {
        if self.connection.take().is_none() {
            return;
        }

        warn!(
            reason = %reason,
            epoch = self.epoch,
            pending = self.pending.len(),
            "Link lost, reconnecting"
        );
        self.reject_pending("connection lost");
        self.subscriptions.clear();
        self.enter_reconnecting();
    }

    fn release_connect_waiters(&mut self) {
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Link state change");
        }
        self.state = state;
        let status = LinkStatus {
            state,
            epoch: self.epoch,
        };
        self.status.send_replace(status);
    }

    // ========================================================================
    // Calls and subscriptions
    // ========================================================================

    fn handle_invoke(
        &mut self,
        operation: String,
        params: Vec<Value>,
        named_params: Value,
        respond_to: oneshot::Sender<Result<Value, OperationError>>,
    ) {
        let Some(connection) = &self.connection else {
            let reason = format!("link is {}", self.state);
            let _ = respond_to.send(Err(OperationError::offline(operation, named_params, reason)));
            return;
        };

        let id = self.next_request_id;
        self.next_request_id += 1;

        if connection
            .outbound
            .send(ClientFrame::request(id, &operation, params))
            .is_err()
        {
            let _ = respond_to.send(Err(OperationError::offline(
                operation,
                named_params,
                "transport closed",
            )));
            self.handle_transport_lost("outbound channel closed");
            return;
        }

        trace!(id, operation = %operation, "Request sent");
        self.pending.insert(
            id,
            PendingCall {
                operation,
                named_params,
                respond_to,
            },
        );
    }

    fn handle_subscribe(
        &mut self,
        event: String,
        scope: String,
        sink: mpsc::UnboundedSender<RemoteEvent>,
    ) -> Result<(), OperationError> {
        let params = json!({ "event": event, "scope": scope });
        let Some(connection) = &self.connection else {
            let reason = format!("link is {}", self.state);
            return Err(OperationError::offline("onEvent", params, reason));
        };

        let key = (event, scope);
        if !self.subscriptions.contains_key(&key) {
            let frame = ClientFrame::subscribe(&key.0, &key.1);
            if connection.outbound.send(frame).is_err() {
                self.handle_transport_lost("outbound channel closed");
                return Err(OperationError::offline("onEvent", params, "transport closed"));
            }
            debug!(event = %key.0, scope = %key.1, "Subscribed");
        }
        let sinks = self.subscriptions.entry(key).or_default();
        if !sinks.iter().any(|existing| existing.same_channel(&sink)) {
            sinks.push(sink);
        }
        Ok(())
    }

    fn reject_pending(&mut self, reason: &str) {
        for (_, call) in self.pending.drain() {
            let _ = call.respond_to.send(Err(OperationError::offline(
                call.operation,
                call.named_params,
                reason,
            )));
        }
    }

    fn prune_abandoned_calls(&mut self) {
        let before = self.pending.len();
        self.pending.retain(|_, call| !call.respond_to.is_closed());
        let pruned = before - self.pending.len();
        if pruned > 0 {
            debug!(pruned, "Dropped abandoned calls");
        }
    }

    // ========================================================================
    // Inbound frames
    // ========================================================================

    fn handle_signal(&mut self, signal: TransportSignal) {
        match signal {
            TransportSignal::Frame(frame) => self.handle_frame(frame),
            TransportSignal::Closed { reason } => self.handle_transport_lost(&reason),
        }
    }

    fn handle_frame(&mut self, frame: ServerFrame) {
        match frame {
            ServerFrame::Response { id, result } => match self.pending.remove(&id) {
                Some(call) => {
                    let _ = call.respond_to.send(Ok(result));
                }
                None => debug!(id, "Response for unknown request"),
            },
            ServerFrame::Error { id, error } => match self.pending.remove(&id) {
                Some(call) => {
                    let err = OperationError::from_remote(error, call.operation, call.named_params);
                    debug!(id, error = %err, "Remote operation rejected");
                    let _ = call.respond_to.send(Err(err));
                }
                None => debug!(id, "Error for unknown request"),
            },
            ServerFrame::Event {
                event,
                identifier,
                data,
            } => match LinkLevelEvent::parse(&event, &data) {
                Ok(Some(level)) => self.publish_link_level(level),
                Ok(None) => self.deliver(&event, identifier, data),
                Err(e) => warn!(event = %event, error = %e, "Ignoring malformed event"),
            },
        }
    }

    fn publish_link_level(&self, event: LinkLevelEvent) {
        let local = match event {
            LinkLevelEvent::MediaState { media_id, state } => LinkEvent::MediaState { media_id, state },
            LinkLevelEvent::IceCandidate {
                media_id,
                candidate,
            } => LinkEvent::MediaStateIce {
                media_id,
                candidate,
            },
        };
        let _ = self.events.send(local);
    }

    /// Fans an event out to the sinks registered for its scope and to the
    /// wildcard sinks. Sinks whose receiver is gone are dropped.
    fn deliver(&mut self, event: &str, identifier: Option<String>, data: Value) {
        let scope = identifier.unwrap_or_else(|| ALL_SCOPE.to_string());
        let mut scopes = vec![scope];
        if scopes[0] != ALL_SCOPE {
            scopes.push(ALL_SCOPE.to_string());
        }

        let mut delivered = 0;
        for scope in scopes {
            let key = (event.to_string(), scope);
            let Some(sinks) = self.subscriptions.get_mut(&key) else {
                continue;
            };
            sinks.retain(|sink| {
                sink.send(RemoteEvent {
                    name: key.0.clone(),
                    scope: key.1.clone(),
                    data: data.clone(),
                })
                .is_ok()
            });
            delivered += sinks.len();
        }

        if delivered == 0 {
            trace!(event = %event, "Event without subscribers");
        }
    }
}

async fn recv_inbound(connection: &mut Option<Connection>) -> TransportSignal {
    match connection {
        Some(connection) => connection
            .inbound
            .recv()
            .await
            .unwrap_or_else(|| TransportSignal::Closed {
                reason: "transport dropped".to_string(),
            }),
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

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Connector that rejects every address.
    struct RejectingConnector {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Connector for RejectingConnector {
        async fn connect(&self, address: &str) -> Result<Connection, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::InvalidAddress {
                address: address.to_string(),
                reason: "test".to_string(),
            })
        }
    }

    fn create_actor() -> (
        mpsc::Sender<LinkCommand>,
        LinkActor,
        broadcast::Receiver<LinkEvent>,
        Arc<RejectingConnector>,
    ) {
        let (tx, rx) = mpsc::channel(16);
        let (event_tx, event_rx) = broadcast::channel(16);
        let (status_tx, _) = watch::channel(LinkStatus::default());
        let connector = Arc::new(RejectingConnector {
            attempts: AtomicUsize::new(0),
        });
        let config = LinkConfig {
            reconnect_interval: Duration::from_millis(50),
            ..LinkConfig::default()
        };
        let actor = LinkActor::new(rx, connector.clone(), config, event_tx, status_tx);
        (tx, actor, event_rx, connector)
    }

    fn create_actor_with_interval(
        reconnect_interval: Duration,
    ) -> (mpsc::Sender<LinkCommand>, LinkActor, Arc<RejectingConnector>) {
        let (tx, rx) = mpsc::channel(16);
        let (event_tx, _) = broadcast::channel(16);
        let (status_tx, _) = watch::channel(LinkStatus::default());
        let connector = Arc::new(RejectingConnector {
            attempts: AtomicUsize::new(0),
        });
        let config = LinkConfig {
            reconnect_interval,
            ..LinkConfig::default()
        };
        let actor = LinkActor::new(rx, connector.clone(), config, event_tx, status_tx);
        (tx, actor, connector)
    }

    #[tokio::test]
    async fn test_invoke_while_closed_is_offline() {
        let (tx, actor, _events, _) = create_actor();
        tokio::spawn(actor.run());

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(LinkCommand::Invoke {
            operation: "getRooms".to_string(),
            params: vec![],
            named_params: json!({}),
            respond_to: reply_tx,
        })
        .await
        .unwrap();

        let err = reply_rx.await.unwrap().unwrap_err();
        assert!(err.is_offline());
        assert_eq!(err.operation, "getRooms");
    }

    #[tokio::test]
    async fn test_subscribe_while_closed_is_offline() {
        let (tx, actor, _events, _) = create_actor();
        tokio::spawn(actor.run());

        let (sink, _stream) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(LinkCommand::Subscribe {
            event: "roomCreated".to_string(),
            scope: ALL_SCOPE.to_string(),
            sink,
            respond_to: reply_tx,
        })
        .await
        .unwrap();

        let err = reply_rx.await.unwrap().unwrap_err();
        assert!(err.is_offline());
        assert_eq!(err.operation, "onEvent");
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_with_unusable_address_resolves_and_retries() {
        let (tx, actor, mut events, connector) = create_actor();
        tokio::spawn(actor.run());

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(LinkCommand::Connect {
            address: "nowhere".to_string(),
            respond_to: reply_tx,
        })
        .await
        .unwrap();

        // Resolves instead of rejecting.
        reply_rx.await.unwrap();
        assert_eq!(events.recv().await.unwrap(), LinkEvent::Disconnected);

        tokio::time::sleep(Duration::from_millis(175)).await;
        assert!(connector.attempts.load(Ordering::SeqCst) >= 3);

        // Still only one disconnected event for the whole retry loop.
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_reconnect_interval_keeps_retrying() {
        let (tx, actor, connector) = create_actor_with_interval(Duration::ZERO);
        let task = tokio::spawn(actor.run());

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(LinkCommand::Connect {
            address: "nowhere".to_string(),
            respond_to: reply_tx,
        })
        .await
        .unwrap();
        reply_rx.await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());
        assert!(connector.attempts.load(Ordering::SeqCst) >= 3);
    }
}
