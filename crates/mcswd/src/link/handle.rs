//! Client interface for the link actor.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A stopped actor surfaces as an offline [`OperationError`]

use std::time::Duration;

use mcsw_core::{ConnectionState, OperationError};
use mcsw_protocol::{find_command, RemoteEvent};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::commands::{LinkCommand, LinkEvent, LinkStatus};

// ============================================================================
// Link Handle
// ============================================================================

/// Handle for interacting with the link actor.
///
/// Cheap to clone. Every component that talks to the media control server
/// holds a clone of the same handle; there is exactly one link per process.
///
/// # Usage
///
/// ```ignore
/// link.connect("ws://127.0.0.1:8020/mcs").await;
/// let rooms = link.get_rooms().await?;
///
/// let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
/// link.subscribe("userJoined", "room-1", tx).await?;
/// while let Some(event) = rx.recv().await {
///     // ...
/// }
/// ```
#[derive(Clone)]
pub struct LinkHandle {
    sender: mpsc::Sender<LinkCommand>,
    events: broadcast::Sender<LinkEvent>,
    status: watch::Receiver<LinkStatus>,
    call_timeout: Duration,
}

impl LinkHandle {
    pub fn new(
        sender: mpsc::Sender<LinkCommand>,
        events: broadcast::Sender<LinkEvent>,
        status: watch::Receiver<LinkStatus>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            sender,
            events,
            status,
            call_timeout,
        }
    }

    /// Connects to `address` and waits until the transport is open.
    ///
    /// Never fails. If the address is unusable, or the actor is gone, this
    /// returns right away and the link stays in its retry loop.
    pub async fn connect(&self, address: impl Into<String>) {
        let (tx, rx) = oneshot::channel();
        let cmd = LinkCommand::Connect {
            address: address.into(),
            respond_to: tx,
        };
        if self.sender.send(cmd).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Invokes a remote operation with positional params.
    ///
    /// # Errors
    ///
    /// Always a normalized [`OperationError`]: the remote rejection, an
    /// offline error (code 2001) if the link is not open or drops while the
    /// call is pending, or a timeout error after the configured call timeout.
    pub async fn invoke(&self, operation: &str, params: Vec<Value>) -> Result<Value, OperationError> {
        let named_params = match find_command(operation) {
            Some(spec) => spec.named_params(&params),
            None => Value::Array(params.clone()),
        };

        let (tx, rx) = oneshot::channel();
        let cmd = LinkCommand::Invoke {
            operation: operation.to_string(),
            params,
            named_params: named_params.clone(),
            respond_to: tx,
        };
        if self.sender.send(cmd).await.is_err() {
            return Err(OperationError::offline(operation, named_params, "link actor stopped"));
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(OperationError::offline(operation, named_params, "link actor stopped")),
            Err(_) => Err(OperationError::timeout(
                operation,
                named_params,
                self.call_timeout.as_millis() as u64,
            )),
        }
    }

    /// Registers `sink` for `event` within `scope` (an id or `"all"`).
    ///
    /// The registration lives as long as the current transport; listeners
    /// re-subscribe on every `Connected` event.
    ///
    /// # Errors
    ///
    /// Offline error if the link is not open.
    pub async fn subscribe(
        &self,
        event: &str,
        scope: &str,
        sink: mpsc::UnboundedSender<RemoteEvent>,
    ) -> Result<(), OperationError> {
        let (tx, rx) = oneshot::channel();
        let cmd = LinkCommand::Subscribe {
            event: event.to_string(),
            scope: scope.to_string(),
            sink,
            respond_to: tx,
        };
        let params = json!({ "event": event, "scope": scope });
        if self.sender.send(cmd).await.is_err() {
            return Err(OperationError::offline("onEvent", params, "link actor stopped"));
        }
        rx.await
            .unwrap_or_else(|_| Err(OperationError::offline("onEvent", params, "link actor stopped")))
    }

    /// Subscribes to connection-level and media-state events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    /// Current state and epoch.
    #[must_use]
    pub fn status(&self) -> LinkStatus {
        *self.status.borrow()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.status().state
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Waits until the link reports `OPEN` or `limit` elapses.
    ///
    /// Returns true if the link is open.
    pub async fn wait_open(&self, limit: Duration) -> bool {
        let mut status = self.status.clone();
        let open = tokio::time::timeout(limit, status.wait_for(|s| s.state.is_open())).await;
        matches!(open, Ok(Ok(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_handle() -> (LinkHandle, mpsc::Receiver<LinkCommand>, watch::Sender<LinkStatus>) {
        let (tx, rx) = mpsc::channel(8);
        let (event_tx, _) = broadcast::channel(8);
        let (status_tx, status_rx) = watch::channel(LinkStatus::default());
        let handle = LinkHandle::new(tx, event_tx, status_rx, Duration::from_millis(100));
        (handle, rx, status_tx)
    }

    #[tokio::test]
    async fn test_invoke_timeout_is_normalized() {
        let (handle, mut rx, _status) = create_test_handle();

        // Accept the command but never answer it.
        let keeper = tokio::spawn(async move {
            let cmd = rx.recv().await;
            tokio::time::sleep(Duration::from_secs(1)).await;
            drop(cmd);
        });

        let err = handle
            .invoke("getUsers", vec![json!("r1")])
            .await
            .unwrap_err();
        assert_eq!(err.code, mcsw_core::ErrorCode::Numeric(mcsw_core::REQUEST_TIMEOUT));
        assert_eq!(err.operation, "getUsers");
        assert_eq!(err.params, json!({"roomId": "r1"}));
        keeper.abort();
    }

    #[tokio::test]
    async fn test_invoke_unknown_operation_keeps_positional_params() {
        let (handle, mut rx, _status) = create_test_handle();

        tokio::spawn(async move {
            if let Some(LinkCommand::Invoke {
                named_params,
                respond_to,
                ..
            }) = rx.recv().await
            {
                assert_eq!(named_params, json!([1, 2]));
                let _ = respond_to.send(Ok(json!("ok")));
            }
        });

        let result = handle.invoke("custom", vec![json!(1), json!(2)]).await.unwrap();
        assert_eq!(result, json!("ok"));
    }

    #[tokio::test]
    async fn test_stopped_actor_is_offline() {
        let (handle, rx, _status) = create_test_handle();
        drop(rx);

        let err = handle.invoke("getRooms", vec![]).await.unwrap_err();
        assert!(err.is_offline());

        // connect() still returns.
        handle.connect("ws://localhost:1").await;
    }

    #[tokio::test]
    async fn test_status_reflects_watch() {
        let (handle, _rx, status) = create_test_handle();
        assert!(!handle.is_connected());

        status.send_replace(LinkStatus {
            state: ConnectionState::Open,
            epoch: 3,
        });
        assert!(handle.is_connected());
        assert_eq!(handle.status().epoch, 3);
        assert!(handle.wait_open(Duration::from_millis(10)).await);
    }
}
