//! Link actor commands and events.

use mcsw_core::{ConnectionState, MediaId, OperationError};
use mcsw_protocol::RemoteEvent;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

/// Commands sent to the link actor.
#[derive(Debug)]
pub enum LinkCommand {
    /// Start connecting to `address`. Answered once the transport is open,
    /// or right away if the address cannot be used at all.
    Connect {
        address: String,
        respond_to: oneshot::Sender<()>,
    },

    /// Invoke a remote operation.
    Invoke {
        operation: String,
        params: Vec<Value>,
        /// Named view of `params`, attached to errors.
        named_params: Value,
        respond_to: oneshot::Sender<Result<Value, OperationError>>,
    },

    /// Register `sink` for `event` within `scope`.
    Subscribe {
        event: String,
        scope: String,
        sink: mpsc::UnboundedSender<RemoteEvent>,
        respond_to: oneshot::Sender<Result<(), OperationError>>,
    },
}

/// Connection-level events published to local listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// The transport is open. `epoch` increases on every (re)connect.
    Connected { epoch: u64 },

    /// The transport was lost; the reconnect loop has started.
    Disconnected,

    /// Media state change reported by the server.
    MediaState { media_id: MediaId, state: Value },

    /// ICE candidate gathered by the server for a media.
    MediaStateIce { media_id: MediaId, candidate: Value },
}

impl LinkEvent {
    /// Local event name as seen by bus adapters.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Disconnected => "disconnected",
            Self::MediaState { .. } => "media-state",
            Self::MediaStateIce { .. } => "media-state-ice",
        }
    }
}

/// Snapshot of the link state, readable without a round trip to the actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStatus {
    pub state: ConnectionState,
    /// Epoch of the most recent `OPEN` transition (0 before the first).
    pub epoch: u64,
}
