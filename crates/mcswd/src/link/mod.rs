//! Remote link using Actor pattern.
//!
//! The link owns the single persistent connection to the media control
//! server. It receives commands via a tokio mpsc channel, correlates
//! request/response frames, fans remote events out to subscribers and runs
//! the reconnect state machine.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐  LinkCommand   ┌─────────────────┐   ClientFrame   ┌──────────┐
//! │   LinkHandle    │───────────────▶│    LinkActor    │────────────────▶│   MCS    │
//! │ (cheap clones)  │  (mpsc+oneshot)│ (state owner)   │◀────────────────│ (remote) │
//! └─────────────────┘                └────────┬────────┘   ServerFrame   └──────────┘
//!                                             │
//!                      LinkEvent (broadcast)  │  RemoteEvent (per-subscription mpsc)
//!                                             ▼
//!                                  mirror, event logger, ...
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

mod actor;
mod api;
mod commands;
mod handle;
pub mod transport;

pub use actor::LinkActor;
pub use api::PublishAnswer;
pub use commands::{LinkCommand, LinkEvent, LinkStatus};
pub use handle::LinkHandle;
pub use transport::{Connection, Connector, TransportError, TransportSignal, WsConnector};

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 256;

/// Timing knobs of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// Fixed delay between reconnect attempts (no backoff).
    pub reconnect_interval: Duration,
    /// Upper bound on a single transport connect attempt.
    pub connect_timeout: Duration,
    /// Upper bound on a single remote call.
    pub call_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_millis(2000),
            connect_timeout: Duration::from_secs(5),
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// Spawn the link actor and return a handle for interaction.
///
/// The link starts `CLOSED`; nothing touches the network until
/// [`LinkHandle::connect`] is called. The returned `JoinHandle` lets a
/// supervisor notice if the actor task dies.
pub fn spawn_link(config: LinkConfig, connector: Arc<dyn Connector>) -> (LinkHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
    let (status_tx, status_rx) = watch::channel(LinkStatus::default());

    let actor = LinkActor::new(cmd_rx, connector, config, event_tx.clone(), status_tx);
    let task = tokio::spawn(actor.run());

    let handle = LinkHandle::new(cmd_tx, event_tx, status_rx, config.call_timeout);
    (handle, task)
}
