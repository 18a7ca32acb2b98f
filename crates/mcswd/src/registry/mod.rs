//! Session registry using Actor pattern.
//!
//! The registry owns every registered session handle. The actor only does
//! map bookkeeping; stop operations run on the [`RegistryHandle`] side so a
//! slow or hanging session never blocks the registry itself.
//!
//! # Stop semantics
//!
//! - `stop_one` removes the entry first, then stops the handle. Absent ids
//!   are a no-op; stop failures and panics are logged and absorbed.
//! - `stop_all_for_connection` and `stop_all` run `stop_one` for every
//!   matching session concurrently and wait for all of them.
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - Stop faults never propagate to the caller

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

mod actor;
mod commands;
mod handle;
mod media_session;
mod session;

pub use actor::RegistryActor;
pub use commands::{RegistryCommand, RegistryError};
pub use handle::RegistryHandle;
pub use media_session::MediaSession;
pub use session::{RegisteredSession, SessionError, SessionHandle};

const COMMAND_BUFFER: usize = 256;

/// Spawns the registry actor and returns a handle to it.
pub fn spawn_registry() -> (RegistryHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let actor = RegistryActor::new(rx);
    let task = tokio::spawn(actor.run());
    (RegistryHandle::new(tx), task)
}
