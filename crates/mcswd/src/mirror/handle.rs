//! Client interface for the mirror actor.

use mcsw_core::{MediaId, RoomId};
use tokio::sync::{mpsc, oneshot};

use super::commands::{MirrorCommand, MirrorError, MirrorView, RoomEntry};

/// Cheap-to-clone handle for inspecting the mirror.
#[derive(Clone)]
pub struct MirrorHandle {
    sender: mpsc::Sender<MirrorCommand>,
}

impl MirrorHandle {
    pub fn new(sender: mpsc::Sender<MirrorCommand>) -> Self {
        Self { sender }
    }

    /// Full view of the mirror.
    ///
    /// # Errors
    ///
    /// `MirrorError::ChannelClosed` if the actor has stopped.
    pub async fn view(&self) -> Result<MirrorView, MirrorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MirrorCommand::Inspect { respond_to: tx })
            .await
            .map_err(|_| MirrorError::ChannelClosed)?;
        rx.await.map_err(|_| MirrorError::ChannelClosed)
    }

    pub async fn rooms(&self) -> Result<Vec<RoomEntry>, MirrorError> {
        Ok(self.view().await?.rooms)
    }

    pub async fn room_ids(&self) -> Result<Vec<RoomId>, MirrorError> {
        Ok(self.rooms().await?.into_iter().map(|r| r.room_id).collect())
    }

    pub async fn watched_medias(&self) -> Result<Vec<MediaId>, MirrorError> {
        Ok(self.view().await?.watched_medias)
    }

    pub async fn generation(&self) -> Result<Option<u64>, MirrorError> {
        Ok(self.view().await?.generation)
    }
}
