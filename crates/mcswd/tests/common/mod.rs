//! In-process mock of a media control server, plugged in through the
//! link's `Connector` seam.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mcsw_core::{ErrorCode, RemoteFailure};
use mcsw_protocol::{ClientFrame, ServerFrame};
use mcswd::link::{Connection, Connector, LinkConfig, TransportError, TransportSignal};
use serde_json::{json, Value};
use tokio::sync::mpsc;

// ============================================================================
// Mock server
// ============================================================================

#[derive(Default)]
struct MockState {
    rooms: Vec<String>,
    /// room → user ids
    users: HashMap<String, Vec<String>>,
    /// user → media ids
    medias: HashMap<String, Vec<String>>,

    refuse: bool,
    /// Operations that are accepted but never answered.
    hang: HashSet<String>,
    /// Operations answered with an error frame.
    fail: HashMap<String, RemoteFailure>,

    /// Subscription frames seen, one list per accepted connection.
    subscriptions: Vec<Vec<(String, String)>>,
    /// Every request seen, across connections.
    calls: Vec<(String, Vec<Value>)>,
    connect_attempts: usize,

    current: Option<mpsc::UnboundedSender<TransportSignal>>,
    next_id: usize,
}

/// Mock media control server. Clone it freely; clones share state.
#[derive(Clone, Default)]
pub struct MockMcs {
    state: Arc<Mutex<MockState>>,
}

impl MockMcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    pub fn set_rooms(&self, rooms: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.rooms = rooms.iter().map(|r| r.to_string()).collect();
    }

    pub fn add_user(&self, room: &str, user: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .users
            .entry(room.to_string())
            .or_default()
            .push(user.to_string());
    }

    pub fn add_media(&self, user: &str, media: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .medias
            .entry(user.to_string())
            .or_default()
            .push(media.to_string());
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().unwrap().refuse = refuse;
    }

    pub fn hang(&self, operation: &str) {
        self.state.lock().unwrap().hang.insert(operation.to_string());
    }

    pub fn unhang(&self, operation: &str) {
        self.state.lock().unwrap().hang.remove(operation);
    }

    pub fn fail(&self, operation: &str, code: i64, message: &str) {
        self.state.lock().unwrap().fail.insert(
            operation.to_string(),
            RemoteFailure {
                code: ErrorCode::Numeric(code),
                message: message.to_string(),
                details: json!({ "operation": operation }),
            },
        );
    }

    /// Drops the current connection as if the server went away.
    pub fn kill_connection(&self) {
        let current = self.state.lock().unwrap().current.take();
        if let Some(tx) = current {
            let _ = tx.send(TransportSignal::Closed {
                reason: "killed by test".to_string(),
            });
        }
    }

    /// Pushes an event frame on the current connection.
    pub fn emit(&self, event: &str, identifier: Option<&str>, data: Value) {
        let state = self.state.lock().unwrap();
        if let Some(tx) = &state.current {
            let frame = ServerFrame::event(event, identifier.map(str::to_string), data);
            let _ = tx.send(TransportSignal::Frame(frame));
        }
    }

    pub fn connections(&self) -> usize {
        self.state.lock().unwrap().subscriptions.len()
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.lock().unwrap().connect_attempts
    }

    /// Subscription frames of connection `index` (0-based).
    pub fn subscriptions(&self, index: usize) -> Vec<(String, String)> {
        let state = self.state.lock().unwrap();
        state.subscriptions.get(index).cloned().unwrap_or_default()
    }

    /// Subscription frames of the most recent connection.
    pub fn latest_subscriptions(&self) -> Vec<(String, String)> {
        let state = self.state.lock().unwrap();
        state.subscriptions.last().cloned().unwrap_or_default()
    }

    /// How many times `event` was subscribed for `scope` on connection `index`.
    pub fn subscription_count(&self, index: usize, event: &str, scope: &str) -> usize {
        self.subscriptions(index)
            .iter()
            .filter(|(e, s)| e == event && s == scope)
            .count()
    }

    /// Params of every call to `operation`, oldest first.
    pub fn calls(&self, operation: &str) -> Vec<Vec<Value>> {
        let state = self.state.lock().unwrap();
        state
            .calls
            .iter()
            .filter(|(op, _)| op == operation)
            .map(|(_, params)| params.clone())
            .collect()
    }

    fn answer(&self, method: &str, params: &[Value]) -> Option<Result<Value, RemoteFailure>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((method.to_string(), params.to_vec()));

        if state.hang.contains(method) {
            return None;
        }
        if let Some(failure) = state.fail.get(method) {
            return Some(Err(failure.clone()));
        }

        let arg = |idx: usize| {
            params
                .get(idx)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let result = match method {
            "getRooms" => json!({ "rooms": state.rooms }),
            "getUsers" => {
                let room = arg(0);
                let users: Vec<Value> = state
                    .users
                    .get(&room)
                    .map(|users| users.iter().map(|u| json!({ "id": u })).collect())
                    .unwrap_or_default();
                json!({ "users": users })
            }
            "getUserMedias" => {
                let user = arg(0);
                let medias: Vec<Value> = state
                    .medias
                    .get(&user)
                    .map(|medias| medias.iter().map(|m| json!({ "mediaId": m, "userId": user })).collect())
                    .unwrap_or_default();
                json!({ "medias": medias })
            }
            "join" => {
                state.next_id += 1;
                json!({ "userId": format!("{}-user{}", arg(0), state.next_id) })
            }
            "publish" | "subscribe" => {
                state.next_id += 1;
                json!({ "mediaId": format!("media{}", state.next_id), "descriptor": "v=0" })
            }
            _ => json!({}),
        };
        Some(Ok(result))
    }
}

#[async_trait]
impl Connector for MockMcs {
    async fn connect(&self, address: &str) -> Result<Connection, TransportError> {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientFrame>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let index = {
            let mut state = self.state.lock().unwrap();
            state.connect_attempts += 1;
            if state.refuse {
                return Err(TransportError::Connect {
                    address: address.to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            state.subscriptions.push(Vec::new());
            state.current = Some(in_tx.clone());
            state.subscriptions.len() - 1
        };

        let server = self.clone();
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                match frame {
                    ClientFrame::Subscribe { event, identifier } => {
                        let mut state = server.state.lock().unwrap();
                        if let Some(subs) = state.subscriptions.get_mut(index) {
                            subs.push((event, identifier));
                        }
                    }
                    ClientFrame::Request { id, method, params } => {
                        let reply = match server.answer(&method, &params) {
                            Some(Ok(result)) => ServerFrame::response(id, result),
                            Some(Err(failure)) => ServerFrame::error(id, failure),
                            None => continue,
                        };
                        if in_tx.send(TransportSignal::Frame(reply)).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(Connection {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub const TEST_ADDRESS: &str = "mock://mcs";

/// Link timings short enough for tests.
pub fn fast_link_config() -> LinkConfig {
    LinkConfig {
        reconnect_interval: Duration::from_millis(50),
        connect_timeout: Duration::from_secs(1),
        call_timeout: Duration::from_millis(500),
    }
}

/// Polls `check` every 10ms for up to 3 seconds.
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..300 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Like [`eventually`], for checks that need to await.
pub async fn eventually_async<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..300 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
