//! State mirror of the server's room topology.
//!
//! The mirror listens to the link. On every `Connected` event it throws its
//! state away and rebuilds it: list rooms, subscribe to each room's events
//! once, then feed the users and medias already present through the same
//! handlers that process live events.
//!
//! # Generations
//!
//! Every rebuild runs under the link epoch that triggered it. Snapshot
//! results and queued events carry that generation; anything from an older
//! generation is dropped, so a slow `getRooms` issued before a disconnect
//! cannot resurrect rooms after the next rebuild started.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::link::LinkHandle;

mod actor;
mod commands;
mod handle;

pub use actor::MirrorActor;
pub use commands::{MirrorCommand, MirrorError, MirrorView, RoomEntry};
pub use handle::MirrorHandle;

const COMMAND_BUFFER: usize = 64;

/// Spawns the mirror actor on top of `link`.
///
/// Spawn it before the first `connect` so the first `Connected` event is
/// not missed; if the link is already open the mirror rebuilds right away.
pub fn spawn_mirror(link: LinkHandle) -> (MirrorHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let actor = MirrorActor::new(rx, link);
    let task = tokio::spawn(actor.run());
    (MirrorHandle::new(tx), task)
}
