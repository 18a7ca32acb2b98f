//! Stoppable session handles.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use mcsw_core::{OperationError, SessionDescriptor};
use thiserror::Error;

/// Errors a session may report while stopping.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Remote(#[from] OperationError),

    #[error("{0}")]
    Other(String),
}

/// A resource the registry can stop.
///
/// Implementors without anything to release can rely on the default
/// `stop`, which succeeds immediately.
#[async_trait]
pub trait SessionHandle: Send + Sync + 'static {
    async fn stop(&self) -> Result<(), SessionError> {
        Ok(())
    }
}

/// A session as stored by the registry.
#[derive(Clone)]
pub struct RegisteredSession {
    pub descriptor: SessionDescriptor,
    pub handle: Arc<dyn SessionHandle>,
}

impl RegisteredSession {
    pub fn new(descriptor: SessionDescriptor, handle: Arc<dyn SessionHandle>) -> Self {
        Self { descriptor, handle }
    }
}

impl fmt::Debug for RegisteredSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredSession")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}
