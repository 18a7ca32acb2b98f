//! Remote event vocabulary and payload parsing.

use mcsw_core::{FloorChange, Media, MediaId, RoomId, User};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::message::{RemoteEvent, ALL_SCOPE};

pub const ROOM_CREATED: &str = "roomCreated";
pub const ROOM_DESTROYED: &str = "roomDestroyed";
pub const USER_JOINED: &str = "userJoined";
pub const USER_LEFT: &str = "userLeft";
pub const MEDIA_CONNECTED: &str = "mediaConnected";
pub const MEDIA_DISCONNECTED: &str = "mediaDisconnected";
pub const CONTENT_FLOOR_CHANGED: &str = "contentFloorChanged";

/// Link-level media state event (not scoped, no subscription needed).
pub const MEDIA_STATE: &str = "mediaState";
/// Link-level ICE candidate event.
pub const MEDIA_STATE_ICE: &str = "onIceCandidate";
/// Namespaced spelling of [`MEDIA_STATE_ICE`] some servers emit.
pub const MEDIA_STATE_ICE_NAMESPACED: &str = "mediaState:onIceCandidate";

/// Events registered per room when the room becomes tracked.
pub const ROOM_EVENTS: [&str; 5] = [
    ROOM_DESTROYED,
    USER_JOINED,
    USER_LEFT,
    MEDIA_CONNECTED,
    CONTENT_FLOOR_CHANGED,
];

/// Errors decoding frames or event payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    #[error("invalid {event} payload: {reason}")]
    InvalidPayload { event: String, reason: String },

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("{command} expects {expected} argument(s), got {got}")]
    Arity {
        command: String,
        expected: String,
        got: usize,
    },
}

impl ProtocolError {
    fn payload(event: &str, err: impl std::fmt::Display) -> Self {
        Self::InvalidPayload {
            event: event.to_string(),
            reason: err.to_string(),
        }
    }
}

/// A topology event the mirror reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum TopologyEvent {
    RoomCreated { room_id: RoomId },
    RoomDestroyed { room_id: RoomId },
    UserJoined(User),
    UserLeft(User),
    MediaConnected(Media),
    MediaDisconnected {
        room_id: Option<RoomId>,
        media_id: MediaId,
    },
    ContentFloorChanged(FloorChange),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomCreatedPayload {
    #[serde(alias = "roomId")]
    room: RoomId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomDestroyedPayload {
    #[serde(alias = "room")]
    room_id: RoomId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaDisconnectedPayload {
    #[serde(default)]
    room_id: Option<RoomId>,
    media_id: MediaId,
}

impl TopologyEvent {
    /// Decodes a scoped remote event.
    ///
    /// Room-scoped payloads that omit the room id inherit it from the
    /// subscription scope.
    pub fn parse(event: &RemoteEvent) -> Result<Self, ProtocolError> {
        let name = event.name.as_str();
        match name {
            ROOM_CREATED => {
                let p: RoomCreatedPayload = decode(name, event.data.clone())?;
                Ok(Self::RoomCreated { room_id: p.room })
            }
            ROOM_DESTROYED => {
                let data = with_room_scope(event.data.clone(), &event.scope);
                let p: RoomDestroyedPayload = decode(name, data)?;
                Ok(Self::RoomDestroyed { room_id: p.room_id })
            }
            USER_JOINED => {
                let data = with_room_scope(event.data.clone(), &event.scope);
                Ok(Self::UserJoined(decode(name, data)?))
            }
            USER_LEFT => {
                let data = with_room_scope(event.data.clone(), &event.scope);
                Ok(Self::UserLeft(decode(name, data)?))
            }
            MEDIA_CONNECTED => {
                // Either `{media: {...}}` or the media object itself.
                let data = match event.data.get("media") {
                    Some(inner) if inner.is_object() => inner.clone(),
                    _ => event.data.clone(),
                };
                Ok(Self::MediaConnected(decode(name, data)?))
            }
            MEDIA_DISCONNECTED => {
                let p: MediaDisconnectedPayload = decode(name, event.data.clone())?;
                Ok(Self::MediaDisconnected {
                    room_id: p.room_id,
                    media_id: p.media_id,
                })
            }
            CONTENT_FLOOR_CHANGED => {
                let data = with_room_scope(event.data.clone(), &event.scope);
                Ok(Self::ContentFloorChanged(decode(name, data)?))
            }
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }
}

/// Unscoped events the link itself republishes to local listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkLevelEvent {
    MediaState { media_id: MediaId, state: Value },
    IceCandidate { media_id: MediaId, candidate: Value },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaStatePayload {
    media_id: MediaId,
    #[serde(default)]
    state: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IcePayload {
    media_id: MediaId,
    #[serde(default)]
    candidate: Value,
}

impl LinkLevelEvent {
    /// Decodes a link-level event; `Ok(None)` if `name` is not one.
    pub fn parse(name: &str, data: &Value) -> Result<Option<Self>, ProtocolError> {
        match name {
            MEDIA_STATE => {
                let p: MediaStatePayload = decode(name, data.clone())?;
                Ok(Some(Self::MediaState {
                    media_id: p.media_id,
                    state: p.state,
                }))
            }
            MEDIA_STATE_ICE | MEDIA_STATE_ICE_NAMESPACED => {
                let p: IcePayload = decode(name, data.clone())?;
                Ok(Some(Self::IceCandidate {
                    media_id: p.media_id,
                    candidate: p.candidate,
                }))
            }
            _ => Ok(None),
        }
    }
}

fn decode<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|e| ProtocolError::payload(event, e))
}

fn with_room_scope(mut data: Value, scope: &str) -> Value {
    if scope == ALL_SCOPE {
        return data;
    }
    if let Value::Object(map) = &mut data {
        if !map.contains_key("roomId") && !map.contains_key("room") {
            map.insert("roomId".to_string(), Value::String(scope.to_string()));
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(name: &str, scope: &str, data: Value) -> RemoteEvent {
        RemoteEvent {
            name: name.to_string(),
            scope: scope.to_string(),
            data,
        }
    }

    #[test]
    fn test_room_created() {
        let parsed = TopologyEvent::parse(&event(ROOM_CREATED, "all", json!({"room": "r1"}))).unwrap();
        assert_eq!(
            parsed,
            TopologyEvent::RoomCreated {
                room_id: RoomId::new("r1")
            }
        );
    }

    #[test]
    fn test_user_joined_inherits_scope() {
        let parsed =
            TopologyEvent::parse(&event(USER_JOINED, "r1", json!({"userId": "u1"}))).unwrap();
        match parsed {
            TopologyEvent::UserJoined(user) => {
                assert_eq!(user.user_id.as_str(), "u1");
                assert_eq!(user.room_id.as_str(), "r1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_media_connected_wrapped_and_flat() {
        let wrapped = TopologyEvent::parse(&event(
            MEDIA_CONNECTED,
            "r1",
            json!({"media": {"mediaId": "m1", "roomId": "r1"}}),
        ))
        .unwrap();
        let flat =
            TopologyEvent::parse(&event(MEDIA_CONNECTED, "r1", json!({"mediaId": "m1", "roomId": "r1"})))
                .unwrap();
        assert_eq!(wrapped, flat);
    }

    #[test]
    fn test_room_destroyed_accepts_room_id() {
        let parsed =
            TopologyEvent::parse(&event(ROOM_DESTROYED, "r2", json!({"roomId": "r2"}))).unwrap();
        assert_eq!(
            parsed,
            TopologyEvent::RoomDestroyed {
                room_id: RoomId::new("r2")
            }
        );
    }

    #[test]
    fn test_invalid_payload() {
        let err = TopologyEvent::parse(&event(MEDIA_DISCONNECTED, "m1", json!({"roomId": "r1"})))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { .. }));
    }

    #[test]
    fn test_unknown_event() {
        let err = TopologyEvent::parse(&event("somethingElse", "all", json!({}))).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownEvent(name) if name == "somethingElse"));
    }

    #[test]
    fn test_link_level_events() {
        let state = LinkLevelEvent::parse(MEDIA_STATE, &json!({"mediaId": "m1", "state": "FLOWING"}))
            .unwrap()
            .unwrap();
        assert_eq!(
            state,
            LinkLevelEvent::MediaState {
                media_id: MediaId::new("m1"),
                state: json!("FLOWING")
            }
        );

        let ice = LinkLevelEvent::parse(
            MEDIA_STATE_ICE_NAMESPACED,
            &json!({"mediaId": "m1", "candidate": {"candidate": "a=1"}}),
        )
        .unwrap();
        assert!(matches!(ice, Some(LinkLevelEvent::IceCandidate { .. })));

        assert!(LinkLevelEvent::parse(USER_JOINED, &json!({})).unwrap().is_none());
    }
}
