//! Mirror actor - tracks rooms and drives per-room/per-media subscriptions.
//!
//! All mutations (room add/remove, subscription add) happen on this task,
//! one message at a time. Each is guarded by an existence check, so seeing
//! the same room or media twice (snapshot racing a live event, or
//! `roomCreated` racing `getRooms`) is a no-op.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Remote failures are logged; the mirror keeps whatever it has

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use mcsw_core::{Media, MediaId, RoomId, User};
use mcsw_protocol::event::{MEDIA_DISCONNECTED, ROOM_CREATED, ROOM_EVENTS};
use mcsw_protocol::{RemoteEvent, TopologyEvent, ALL_SCOPE};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::commands::{MirrorCommand, MirrorView, RoomEntry, Snapshot};
use crate::link::{LinkEvent, LinkHandle};

/// The mirror actor.
pub struct MirrorActor {
    receiver: mpsc::Receiver<MirrorCommand>,
    link: LinkHandle,
    link_events: broadcast::Receiver<LinkEvent>,

    /// Sink handed to the link for remote events. Replaced on every
    /// rebuild so events queued under an older generation are dropped.
    remote_tx: mpsc::UnboundedSender<RemoteEvent>,
    remote_rx: mpsc::UnboundedReceiver<RemoteEvent>,

    snapshot_tx: mpsc::UnboundedSender<Snapshot>,
    snapshot_rx: mpsc::UnboundedReceiver<Snapshot>,

    rooms: HashMap<RoomId, DateTime<Utc>>,
    watched_medias: HashSet<MediaId>,
    generation: Option<u64>,
}

impl MirrorActor {
    pub fn new(receiver: mpsc::Receiver<MirrorCommand>, link: LinkHandle) -> Self {
        let link_events = link.subscribe_events();
        let (remote_tx, remote_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        Self {
            receiver,
            link,
            link_events,
            remote_tx,
            remote_rx,
            snapshot_tx,
            snapshot_rx,
            rooms: HashMap::new(),
            watched_medias: HashSet::new(),
            generation: None,
        }
    }

    /// Runs the actor until its handles are dropped or the link stops.
    pub async fn run(mut self) {
        info!("Mirror actor starting");

        let status = self.link.status();
        if status.state.is_open() {
            self.resync(status.epoch).await;
        }

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                event = self.link_events.recv() => match event {
                    Ok(event) => self.handle_link_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Mirror lagged behind link events");
                        let status = self.link.status();
                        if status.state.is_open() {
                            self.resync(status.epoch).await;
                        } else {
                            self.generation = None;
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(event) = self.remote_rx.recv() => self.handle_remote_event(event).await,
                Some(snapshot) = self.snapshot_rx.recv() => self.handle_snapshot(snapshot).await,
            }
        }

        info!(rooms = self.rooms.len(), "Mirror actor stopped");
    }

    fn handle_command(&self, cmd: MirrorCommand) {
        match cmd {
            MirrorCommand::Inspect { respond_to } => {
                let _ = respond_to.send(self.view());
            }
        }
    }

    fn view(&self) -> MirrorView {
        let mut rooms: Vec<RoomEntry> = self
            .rooms
            .iter()
            .map(|(room_id, since)| RoomEntry {
                room_id: room_id.clone(),
                tracked_since: *since,
            })
            .collect();
        rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));

        let mut watched_medias: Vec<MediaId> = self.watched_medias.iter().cloned().collect();
        watched_medias.sort();

        MirrorView {
            generation: self.generation,
            rooms,
            watched_medias,
        }
    }

    async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connected { epoch } => self.resync(epoch).await,
            LinkEvent::Disconnected => {
                debug!(generation = ?self.generation, "Link down, mirror frozen until next connect");
                self.generation = None;
            }
            LinkEvent::MediaState { .. } | LinkEvent::MediaStateIce { .. } => {}
        }
    }

    // ========================================================================
    // Rebuild
    // ========================================================================

    /// Clears the mirror and starts rebuilding it for link epoch `epoch`.
    async fn resync(&mut self, epoch: u64) {
        if self.generation == Some(epoch) {
            return;
        }

        info!(
            epoch,
            dropped_rooms = self.rooms.len(),
            "Rebuilding mirror"
        );
        self.rooms.clear();
        self.watched_medias.clear();
        self.generation = Some(epoch);

        let (remote_tx, remote_rx) = mpsc::unbounded_channel();
        self.remote_tx = remote_tx;
        self.remote_rx = remote_rx;

        if let Err(e) = self
            .link
            .subscribe(ROOM_CREATED, ALL_SCOPE, self.remote_tx.clone())
            .await
        {
            warn!(error = %e, "Failed to subscribe to room creation");
        }

        let link = self.link.clone();
        let snapshots = self.snapshot_tx.clone();
        tokio::spawn(async move {
            let result = link.get_rooms().await;
            let _ = snapshots.send(Snapshot::RoomsListed {
                generation: epoch,
                result,
            });
        });
    }

    async fn handle_snapshot(&mut self, snapshot: Snapshot) {
        if self.generation != Some(snapshot.generation()) {
            debug!(
                snapshot = snapshot.generation(),
                current = ?self.generation,
                "Discarding stale snapshot"
            );
            return;
        }

        match snapshot {
            Snapshot::RoomsListed { result, .. } => match result {
                Ok(rooms) => {
                    debug!(count = rooms.len(), "Rooms listed");
                    for room_id in rooms {
                        self.add_room(room_id).await;
                    }
                }
                Err(e) => warn!(error = %e, "Failed to list rooms"),
            },
            Snapshot::RoomPopulated {
                room_id,
                users,
                medias,
                ..
            } => {
                if !self.rooms.contains_key(&room_id) {
                    debug!(room = %room_id, "Room gone before its snapshot arrived");
                    return;
                }
                for user in &users {
                    self.on_user_joined(user);
                }
                for media in medias {
                    self.on_media_connected(media, Some(&room_id)).await;
                }
            }
        }
    }

    /// Starts tracking `room_id`. No-op if already tracked.
    async fn add_room(&mut self, room_id: RoomId) {
        let Some(generation) = self.generation else {
            return;
        };
        if self.rooms.contains_key(&room_id) {
            return;
        }

        self.rooms.insert(room_id.clone(), Utc::now());
        info!(room = %room_id, "Tracking room");

        for event in ROOM_EVENTS {
            if let Err(e) = self
                .link
                .subscribe(event, room_id.as_str(), self.remote_tx.clone())
                .await
            {
                warn!(room = %room_id, event, error = %e, "Failed to subscribe to room event");
            }
        }

        let link = self.link.clone();
        let snapshots = self.snapshot_tx.clone();
        tokio::spawn(async move {
            let (users, medias) = fetch_room_contents(&link, &room_id).await;
            let _ = snapshots.send(Snapshot::RoomPopulated {
                generation,
                room_id,
                users,
                medias,
            });
        });
    }

    // ========================================================================
    // Live events
    // ========================================================================

    async fn handle_remote_event(&mut self, event: RemoteEvent) {
        let parsed = match TopologyEvent::parse(&event) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(event = %event.name, scope = %event.scope, error = %e, "Ignoring event");
                return;
            }
        };

        match parsed {
            TopologyEvent::RoomCreated { room_id } => self.add_room(room_id).await,
            TopologyEvent::RoomDestroyed { room_id } => {
                if self.rooms.remove(&room_id).is_some() {
                    info!(room = %room_id, "Room destroyed");
                }
            }
            TopologyEvent::UserJoined(user) => self.on_user_joined(&user),
            TopologyEvent::UserLeft(user) => {
                if self.rooms.contains_key(&user.room_id) {
                    info!(room = %user.room_id, user = %user.user_id, "User left");
                } else {
                    debug!(room = %user.room_id, "userLeft for untracked room");
                }
            }
            TopologyEvent::MediaConnected(media) => {
                let scope = (event.scope != ALL_SCOPE).then(|| RoomId::new(event.scope.as_str()));
                self.on_media_connected(media, scope.as_ref()).await;
            }
            TopologyEvent::MediaDisconnected { room_id, media_id } => {
                info!(
                    media = %media_id,
                    room = room_id.as_ref().map(RoomId::as_str).unwrap_or_default(),
                    "Media disconnected"
                );
            }
            TopologyEvent::ContentFloorChanged(change) => {
                if !self.rooms.contains_key(&change.room_id) {
                    debug!(room = %change.room_id, "contentFloorChanged for untracked room");
                    return;
                }
                let floor = change.floor.as_ref().and_then(|f| f.media_id.as_ref());
                let previous = change.previous_floor.as_ref().and_then(|f| f.media_id.as_ref());
                info!(
                    room = %change.room_id,
                    floor = floor.map(MediaId::as_str).unwrap_or_default(),
                    previous = previous.map(MediaId::as_str).unwrap_or_default(),
                    "Content floor changed"
                );
            }
        }
    }

    fn on_user_joined(&self, user: &User) {
        if self.rooms.contains_key(&user.room_id) {
            info!(room = %user.room_id, user = %user.user_id, "User joined");
        } else {
            debug!(room = %user.room_id, "userJoined for untracked room");
        }
    }

    /// Watches a media for disconnection. No-op if it is already watched
    /// or belongs to a room the mirror does not track.
    async fn on_media_connected(&mut self, media: Media, scope: Option<&RoomId>) {
        let room = media.room_id.as_ref().or(scope);
        if let Some(room) = room {
            if !self.rooms.contains_key(room) {
                debug!(room = %room, media = %media.media_id, "mediaConnected for untracked room");
                return;
            }
        }
        if !self.watched_medias.insert(media.media_id.clone()) {
            return;
        }

        info!(
            media = %media.media_id,
            room = room.map(RoomId::as_str).unwrap_or_default(),
            state = %media.lifecycle,
            "Media connected"
        );
        if let Err(e) = self
            .link
            .subscribe(MEDIA_DISCONNECTED, media.media_id.as_str(), self.remote_tx.clone())
            .await
        {
            warn!(media = %media.media_id, error = %e, "Failed to watch media");
            self.watched_medias.remove(&media.media_id);
        }
    }
}

/// Reads the users of a room and their medias. Failures read as empty.
async fn fetch_room_contents(link: &LinkHandle, room_id: &RoomId) -> (Vec<User>, Vec<Media>) {
    let users = match link.get_users(room_id).await {
        Ok(users) => users,
        Err(e) => {
            warn!(room = %room_id, error = %e, "Failed to list users");
            return (Vec::new(), Vec::new());
        }
    };

    let mut medias = Vec::new();
    for user in &users {
        match link.get_user_medias(&user.user_id).await {
            Ok(found) => medias.extend(found.into_iter().map(|mut media| {
                if media.room_id.is_none() {
                    media.room_id = Some(room_id.clone());
                }
                if media.user_id.is_none() {
                    media.user_id = Some(user.user_id.clone());
                }
                media
            })),
            Err(e) => warn!(user = %user.user_id, error = %e, "Failed to list medias"),
        }
    }
    (users, medias)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{LinkCommand, LinkStatus};
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::watch;

    /// A link handle whose actor accepts every subscription and reports no
    /// rooms.
    fn create_test_link() -> LinkHandle {
        let (tx, mut rx) = mpsc::channel(64);
        let (event_tx, _) = broadcast::channel(16);
        let (_status_tx, status_rx) = watch::channel(LinkStatus::default());
        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    LinkCommand::Subscribe { respond_to, .. } => {
                        let _ = respond_to.send(Ok(()));
                    }
                    LinkCommand::Invoke { respond_to, .. } => {
                        let _ = respond_to.send(Ok(json!({"rooms": [], "users": []})));
                    }
                    LinkCommand::Connect { respond_to, .. } => {
                        let _ = respond_to.send(());
                    }
                }
            }
        });
        LinkHandle::new(tx, event_tx, status_rx, Duration::from_secs(1))
    }

    fn create_actor() -> MirrorActor {
        let (_tx, rx) = mpsc::channel(4);
        MirrorActor::new(rx, create_test_link())
    }

    #[tokio::test]
    async fn test_stale_room_listing_is_discarded() {
        let mut actor = create_actor();
        actor.resync(1).await;
        actor.resync(2).await;

        actor
            .handle_snapshot(Snapshot::RoomsListed {
                generation: 1,
                result: Ok(vec![RoomId::new("old-room")]),
            })
            .await;
        assert!(actor.rooms.is_empty());

        actor
            .handle_snapshot(Snapshot::RoomsListed {
                generation: 2,
                result: Ok(vec![RoomId::new("r1")]),
            })
            .await;
        assert_eq!(actor.view().rooms.len(), 1);
    }

    #[tokio::test]
    async fn test_resync_clears_previous_state() {
        let mut actor = create_actor();
        actor.resync(1).await;
        actor.add_room(RoomId::new("r1")).await;
        actor
            .on_media_connected(Media::new("m1"), Some(&RoomId::new("r1")))
            .await;
        assert_eq!(actor.watched_medias.len(), 1);

        actor.resync(2).await;
        assert!(actor.rooms.is_empty());
        assert!(actor.watched_medias.is_empty());
        assert_eq!(actor.view().generation, Some(2));
    }

    #[tokio::test]
    async fn test_add_room_is_idempotent() {
        let mut actor = create_actor();
        actor.resync(1).await;
        actor.add_room(RoomId::new("r1")).await;
        let since = actor.rooms.get(&RoomId::new("r1")).copied();

        actor.add_room(RoomId::new("r1")).await;
        assert_eq!(actor.rooms.len(), 1);
        assert_eq!(actor.rooms.get(&RoomId::new("r1")).copied(), since);
    }

    #[tokio::test]
    async fn test_add_room_while_disconnected_is_ignored() {
        let mut actor = create_actor();
        actor.add_room(RoomId::new("r1")).await;
        assert!(actor.rooms.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_for_destroyed_room_is_dropped() {
        let mut actor = create_actor();
        actor.resync(1).await;
        actor
            .handle_snapshot(Snapshot::RoomPopulated {
                generation: 1,
                room_id: RoomId::new("gone"),
                users: vec![],
                medias: vec![Media::new("m1")],
            })
            .await;
        assert!(actor.watched_medias.is_empty());
    }
}
