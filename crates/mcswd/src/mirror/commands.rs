//! Mirror actor commands and snapshots.

use chrono::{DateTime, Utc};
use mcsw_core::{Media, MediaId, OperationError, RoomId, User};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

/// Queries answered by the mirror actor.
#[derive(Debug)]
pub enum MirrorCommand {
    Inspect { respond_to: oneshot::Sender<MirrorView> },
}

/// Errors from the mirror handle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MirrorError {
    #[error("mirror actor has stopped")]
    ChannelClosed,
}

/// A tracked room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomEntry {
    pub room_id: RoomId,
    pub tracked_since: DateTime<Utc>,
}

/// Point-in-time view of the mirror.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MirrorView {
    /// Link epoch of the current rebuild; `None` while disconnected.
    pub generation: Option<u64>,
    /// Tracked rooms, ordered by id.
    pub rooms: Vec<RoomEntry>,
    /// Medias with a `mediaDisconnected` subscription, ordered by id.
    pub watched_medias: Vec<MediaId>,
}

/// Results of remote reads done off the actor loop.
#[derive(Debug)]
pub(crate) enum Snapshot {
    RoomsListed {
        generation: u64,
        result: Result<Vec<RoomId>, OperationError>,
    },
    RoomPopulated {
        generation: u64,
        room_id: RoomId,
        users: Vec<User>,
        medias: Vec<Media>,
    },
}

impl Snapshot {
    pub(crate) fn generation(&self) -> u64 {
        match self {
            Self::RoomsListed { generation, .. } | Self::RoomPopulated { generation, .. } => *generation,
        }
    }
}
