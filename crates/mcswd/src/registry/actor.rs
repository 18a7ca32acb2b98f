//! Registry actor - owns the session map.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Reply send failures are ignored (the caller dropped its receiver)

use std::collections::HashMap;

use mcsw_core::{ConnectionId, SessionDescriptor, SessionId};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::commands::RegistryCommand;
use super::session::RegisteredSession;

/// The registry actor.
///
/// Sessions are keyed by [`SessionDescriptor::key`], both when stored and
/// when looked up by connection.
pub struct RegistryActor {
    receiver: mpsc::Receiver<RegistryCommand>,
    sessions: HashMap<SessionId, RegisteredSession>,
}

impl RegistryActor {
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>) -> Self {
        Self {
            receiver,
            sessions: HashMap::new(),
        }
    }

    /// Processes commands until every handle is dropped.
    pub async fn run(mut self) {
        info!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(sessions = self.sessions.len(), "Registry actor stopped");
    }

    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register {
                session,
                respond_to,
            } => {
                let key = self.handle_register(session);
                let _ = respond_to.send(key);
            }
            RegistryCommand::Take {
                session_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.sessions.remove(&session_id));
            }
            RegistryCommand::KeysForConnection {
                connection_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.keys_for_connection(&connection_id));
            }
            RegistryCommand::AllKeys { respond_to } => {
                let _ = respond_to.send(self.sessions.keys().cloned().collect());
            }
            RegistryCommand::Contains {
                session_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.sessions.contains_key(&session_id));
            }
            RegistryCommand::List { respond_to } => {
                let mut descriptors: Vec<SessionDescriptor> = self
                    .sessions
                    .values()
                    .map(|s| s.descriptor.clone())
                    .collect();
                descriptors.sort_by_key(SessionDescriptor::key);
                let _ = respond_to.send(descriptors);
            }
        }
    }

    fn handle_register(&mut self, session: RegisteredSession) -> SessionId {
        let key = session.descriptor.key();
        if self.sessions.insert(key.clone(), session).is_some() {
            warn!(session = %key, "Replaced existing session");
        } else {
            debug!(session = %key, total = self.sessions.len(), "Session registered");
        }
        key
    }

    fn keys_for_connection(&self, connection_id: &ConnectionId) -> Vec<SessionId> {
        self.sessions
            .values()
            .filter(|s| s.descriptor.belongs_to(connection_id))
            .map(|s| s.descriptor.key())
            .collect()
    }

    /// Returns the number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
