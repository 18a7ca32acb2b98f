//! Observed room/user/media records.
//!
//! These are transient: the mirror uses them to drive subscriptions and
//! logging, it does not keep a durable table of users or medias.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{MediaId, RoomId, UserId};

/// A user as reported by `getUsers` or a `userJoined`/`userLeft` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(alias = "id")]
    pub user_id: UserId,
    #[serde(alias = "room")]
    pub room_id: RoomId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Lifecycle marker of an observed media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaLifecycle {
    #[default]
    Connected,
    Disconnected,
}

impl fmt::Display for MediaLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => f.write_str("connected"),
            Self::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// A media stream as reported by `getUserMedias` or `mediaConnected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    #[serde(alias = "id")]
    pub media_id: MediaId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Not on the wire; anything the remote reports is connected until a
    /// `mediaDisconnected` event says otherwise.
    #[serde(skip)]
    pub lifecycle: MediaLifecycle,
}

impl Media {
    pub fn new(media_id: impl Into<MediaId>) -> Self {
        Self {
            media_id: media_id.into(),
            room_id: None,
            user_id: None,
            custom_identifier: None,
            name: None,
            lifecycle: MediaLifecycle::Connected,
        }
    }
}

/// Presenter/media pointer of a room's content floor.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Floor {
    #[serde(default)]
    pub media_id: Option<MediaId>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub custom_identifier: Option<String>,
}

/// Payload of a `contentFloorChanged` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloorChange {
    pub room_id: RoomId,
    #[serde(default)]
    pub floor: Option<Floor>,
    #[serde(default)]
    pub previous_floor: Option<Floor>,
}
