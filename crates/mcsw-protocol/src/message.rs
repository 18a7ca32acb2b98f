//! Wire frames exchanged with the media control server.
//!
//! Every frame is one JSON text message tagged by `type`. Requests carry a
//! numeric id that the matching `response` or `error` frame echoes back.

use mcsw_core::RemoteFailure;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wildcard subscription scope: receive the event for every identifier.
pub const ALL_SCOPE: &str = "all";

/// Frames sent from the sidecar to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Invoke a remote operation with positional arguments.
    Request {
        id: u64,
        method: String,
        params: Vec<Value>,
    },

    /// Register interest in a named event restricted to `identifier`
    /// (or [`ALL_SCOPE`]).
    Subscribe { event: String, identifier: String },
}

impl ClientFrame {
    /// Creates a request frame.
    pub fn request(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self::Request {
            id,
            method: method.into(),
            params,
        }
    }

    /// Creates a subscription frame.
    pub fn subscribe(event: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::Subscribe {
            event: event.into(),
            identifier: identifier.into(),
        }
    }
}

/// Frames sent from the server to the sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Successful result of request `id`.
    Response {
        id: u64,
        #[serde(default)]
        result: Value,
    },

    /// Rejection of request `id`.
    Error { id: u64, error: RemoteFailure },

    /// A named event. `identifier` is the scope it was emitted under;
    /// link-level events (media state, ICE) have none.
    Event {
        event: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        identifier: Option<String>,
        #[serde(default)]
        data: Value,
    },
}

impl ServerFrame {
    /// Creates a response frame.
    pub fn response(id: u64, result: Value) -> Self {
        Self::Response { id, result }
    }

    /// Creates an error frame.
    pub fn error(id: u64, error: RemoteFailure) -> Self {
        Self::Error { id, error }
    }

    /// Creates an event frame.
    pub fn event(event: impl Into<String>, identifier: Option<String>, data: Value) -> Self {
        Self::Event {
            event: event.into(),
            identifier,
            data,
        }
    }
}

/// A scoped remote event as delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEvent {
    /// Event name, e.g. `userJoined`.
    pub name: String,
    /// Scope the subscriber registered for (a room/media id or `all`).
    pub scope: String,
    /// Event payload.
    pub data: Value,
}
