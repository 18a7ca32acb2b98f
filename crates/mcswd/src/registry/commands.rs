//! Registry actor commands.

use mcsw_core::{ConnectionId, SessionDescriptor, SessionId};
use thiserror::Error;
use tokio::sync::oneshot;

use super::session::RegisteredSession;

/// Commands sent to the registry actor.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Store a session under its descriptor key. Replaces any previous
    /// session with the same key.
    Register {
        session: RegisteredSession,
        respond_to: oneshot::Sender<SessionId>,
    },

    /// Remove and return a session.
    Take {
        session_id: SessionId,
        respond_to: oneshot::Sender<Option<RegisteredSession>>,
    },

    /// Keys of every session owned by `connection_id`.
    KeysForConnection {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<Vec<SessionId>>,
    },

    /// Keys of every registered session.
    AllKeys {
        respond_to: oneshot::Sender<Vec<SessionId>>,
    },

    Contains {
        session_id: SessionId,
        respond_to: oneshot::Sender<bool>,
    },

    /// Descriptors of every registered session.
    List {
        respond_to: oneshot::Sender<Vec<SessionDescriptor>>,
    },
}

/// Errors from registry operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry actor has stopped")]
    ChannelClosed,
}
