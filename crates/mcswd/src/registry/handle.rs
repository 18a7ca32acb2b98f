//! Client interface for the registry actor.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`
//! - The stop family never returns an error

use std::sync::Arc;

use mcsw_core::{ConnectionId, SessionDescriptor, SessionId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::commands::{RegistryCommand, RegistryError};
use super::session::{RegisteredSession, SessionHandle};

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// # Usage
///
/// ```ignore
/// let descriptor = SessionDescriptor::new("c1", "u1", "send");
/// let key = registry.register(descriptor, Arc::new(session)).await?;
///
/// registry.stop_one(&key).await;          // idempotent
/// registry.stop_all_for_connection(&"c1".into()).await;
/// registry.stop_all().await;
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    /// Registers a session and returns its key.
    ///
    /// A session already stored under the same key is replaced without
    /// being stopped.
    ///
    /// # Errors
    ///
    /// `RegistryError::ChannelClosed` if the actor has shut down.
    pub async fn register(
        &self,
        descriptor: SessionDescriptor,
        handle: Arc<dyn SessionHandle>,
    ) -> Result<SessionId, RegistryError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryCommand::Register {
                session: RegisteredSession::new(descriptor, handle),
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;
        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Returns true if a session is registered under `session_id`.
    pub async fn contains(&self, session_id: &SessionId) -> Result<bool, RegistryError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryCommand::Contains {
                session_id: session_id.clone(),
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;
        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Descriptors of every registered session, ordered by key.
    pub async fn list(&self) -> Result<Vec<SessionDescriptor>, RegistryError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryCommand::List { respond_to: tx })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;
        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Stops one session. Never fails.
    ///
    /// Unknown ids (never registered, or already stopped) are a no-op. The
    /// entry is removed before the handle is stopped, so concurrent calls
    /// for the same id stop it at most once.
    pub async fn stop_one(&self, session_id: &SessionId) {
        let taken = match self.take(session_id).await {
            Ok(taken) => taken,
            Err(e) => {
                warn!(session = %session_id, error = %e, "Cannot stop session");
                return;
            }
        };
        let Some(session) = taken else {
            debug!(session = %session_id, "No such session, nothing to stop");
            return;
        };

        // Run the stop on its own task so a panicking handle is contained.
        let handle = Arc::clone(&session.handle);
        match tokio::spawn(async move { handle.stop().await }).await {
            Ok(Ok(())) => info!(session = %session_id, "Session stopped"),
            Ok(Err(e)) => warn!(session = %session_id, error = %e, "Session stop failed"),
            Err(e) => warn!(session = %session_id, error = %e, "Session stop aborted"),
        }
    }

    /// Stops every session owned by `connection_id`. Returns how many
    /// sessions matched.
    pub async fn stop_all_for_connection(&self, connection_id: &ConnectionId) -> usize {
        let (tx, rx) = oneshot::channel();
        let cmd = RegistryCommand::KeysForConnection {
            connection_id: connection_id.clone(),
            respond_to: tx,
        };
        let keys = match self.query_keys(cmd, rx).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(connection = %connection_id, error = %e, "Cannot stop connection sessions");
                return 0;
            }
        };
        debug!(connection = %connection_id, count = keys.len(), "Stopping connection sessions");
        self.stop_many(keys).await
    }

    /// Stops every registered session concurrently and waits for all of
    /// them. Returns how many sessions were stopped.
    pub async fn stop_all(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        let cmd = RegistryCommand::AllKeys { respond_to: tx };
        let keys = match self.query_keys(cmd, rx).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Cannot stop sessions");
                return 0;
            }
        };
        info!(count = keys.len(), "Stopping all sessions");
        self.stop_many(keys).await
    }

    async fn take(&self, session_id: &SessionId) -> Result<Option<RegisteredSession>, RegistryError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryCommand::Take {
                session_id: session_id.clone(),
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;
        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    async fn query_keys(
        &self,
        cmd: RegistryCommand,
        rx: oneshot::Receiver<Vec<SessionId>>,
    ) -> Result<Vec<SessionId>, RegistryError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;
        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    async fn stop_many(&self, keys: Vec<SessionId>) -> usize {
        let count = keys.len();
        let mut stops = JoinSet::new();
        for key in keys {
            let registry = self.clone();
            stops.spawn(async move { registry.stop_one(&key).await });
        }
        while let Some(joined) = stops.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Stop task failed");
            }
        }
        count
    }
}
