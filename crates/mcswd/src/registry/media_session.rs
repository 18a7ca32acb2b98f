//! A session backed by a remote user and its published medias.

use async_trait::async_trait;
use mcsw_core::{MediaId, OperationError, RoomId, UserId};
use serde_json::Value;
use tracing::{debug, warn};

use super::session::{SessionError, SessionHandle};
use crate::link::{LinkHandle, PublishAnswer};

/// A user joined to a room through the link, plus the medias it publishes.
///
/// Stopping it unpublishes every media and then leaves the room. A failed
/// unpublish does not prevent the leave.
pub struct MediaSession {
    link: LinkHandle,
    room: RoomId,
    user: UserId,
    medias: tokio::sync::Mutex<Vec<MediaId>>,
}

impl MediaSession {
    /// Wraps an already joined user.
    pub fn new(link: LinkHandle, room: RoomId, user: UserId) -> Self {
        Self {
            link,
            room,
            user,
            medias: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Joins `room` and wraps the new user.
    pub async fn join(
        link: LinkHandle,
        room: RoomId,
        user_type: &str,
        params: Value,
    ) -> Result<Self, OperationError> {
        let user = link.join(&room, user_type, params).await?;
        debug!(room = %room, user = %user, "Joined room");
        Ok(Self::new(link, room, user))
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Publishes a media for this user and remembers it for teardown.
    pub async fn publish(&self, media_type: &str, params: Value) -> Result<PublishAnswer, OperationError> {
        let answer = self
            .link
            .publish(&self.user, &self.room, media_type, params)
            .await?;
        self.medias.lock().await.push(answer.media_id.clone());
        Ok(answer)
    }

    /// Medias published through this session and not yet unpublished.
    pub async fn medias(&self) -> Vec<MediaId> {
        self.medias.lock().await.clone()
    }
}

#[async_trait]
impl SessionHandle for MediaSession {
    async fn stop(&self) -> Result<(), SessionError> {
        let medias = std::mem::take(&mut *self.medias.lock().await);

        let mut first_error = None;
        for media in &medias {
            if let Err(e) = self.link.unpublish(media).await {
                warn!(media = %media, error = %e, "Unpublish failed");
                first_error.get_or_insert(e);
            }
        }

        self.link.leave(&self.room, &self.user).await?;

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
