//! Session identity.
//!
//! A session is keyed by `"{connectionId}{internalId}-{role}"`. The same
//! key is needed when a session is registered and when every session of a
//! connection is looked up for teardown, so it is built in exactly one
//! place: [`SessionDescriptor::key`].

use serde::{Deserialize, Serialize};

use crate::ids::{ConnectionId, SessionId};

/// Identity of a registered session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    /// Connection that owns the session.
    pub connection_id: ConnectionId,
    /// Identifier internal to the owning connection (e.g. a stream id).
    pub internal_id: String,
    /// Role string such as `send`, `recv` or `sendrecv`.
    pub role: String,
}

impl SessionDescriptor {
    pub fn new(
        connection_id: impl Into<ConnectionId>,
        internal_id: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            internal_id: internal_id.into(),
            role: role.into(),
        }
    }

    /// Composite registry key: connection id, internal id, `-`, role.
    #[must_use]
    pub fn key(&self) -> SessionId {
        SessionId::new(format!(
            "{}{}-{}",
            self.connection_id, self.internal_id, self.role
        ))
    }

    /// Returns true if this session belongs to `connection_id`.
    #[must_use]
    pub fn belongs_to(&self, connection_id: &ConnectionId) -> bool {
        &self.connection_id == connection_id
    }
}
