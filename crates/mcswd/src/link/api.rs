//! Typed wrappers around the remote operations.
//!
//! Each method forwards to [`LinkHandle::invoke`] with the arguments in the
//! order the server expects and unwraps the result envelope
//! (`{rooms: [...]}`, `{users: [...]}`, ...) into local types.

use mcsw_core::{Media, MediaId, OperationError, RoomId, User, UserId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::handle::LinkHandle;

/// Result of `publish`/`subscribe`: the new media and its SDP answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishAnswer {
    pub media_id: MediaId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RoomEntry {
    Id(RoomId),
    Object {
        #[serde(alias = "roomId")]
        id: RoomId,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinResult {
    #[serde(alias = "userId")]
    user_id: UserId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaResult {
    media_id: MediaId,
    #[serde(default)]
    descriptor: Option<Value>,
}

impl LinkHandle {
    pub async fn get_rooms(&self) -> Result<Vec<RoomId>, OperationError> {
        let result = self.invoke("getRooms", vec![]).await?;
        let entries: Vec<RoomEntry> = field("getRooms", json!({}), result, "rooms")?;
        Ok(entries
            .into_iter()
            .map(|entry| match entry {
                RoomEntry::Id(id) | RoomEntry::Object { id } => id,
            })
            .collect())
    }

    /// Users of `room`. Entries that omit their room inherit `room`.
    pub async fn get_users(&self, room: &RoomId) -> Result<Vec<User>, OperationError> {
        let result = self.invoke("getUsers", vec![json!(room)]).await?;
        let params = json!({ "roomId": room });
        let Value::Object(mut map) = result else {
            return Err(OperationError::malformed("getUsers", params, "expected an object"));
        };
        let mut users = map.remove("users").unwrap_or(Value::Array(vec![]));
        if let Value::Array(items) = &mut users {
            for item in items.iter_mut() {
                if let Value::Object(user) = item {
                    if !user.contains_key("roomId") && !user.contains_key("room") {
                        user.insert("roomId".to_string(), json!(room));
                    }
                }
            }
        }
        serde_json::from_value(users)
            .map_err(|e| OperationError::malformed("getUsers", params, e.to_string()))
    }

    pub async fn get_user_medias(&self, user: &UserId) -> Result<Vec<Media>, OperationError> {
        let result = self.invoke("getUserMedias", vec![json!(user)]).await?;
        field("getUserMedias", json!({ "userId": user }), result, "medias")
    }

    /// Joins `room` as a user of kind `user_type` and returns the user id.
    pub async fn join(&self, room: &RoomId, user_type: &str, params: Value) -> Result<UserId, OperationError> {
        let args = vec![json!(room), json!(user_type), params];
        let named = json!({ "room": room, "type": user_type });
        let result = self.invoke("join", args).await?;
        match result {
            Value::String(id) => Ok(UserId::new(id)),
            other => serde_json::from_value::<JoinResult>(other)
                .map(|joined| joined.user_id)
                .map_err(|e| OperationError::malformed("join", named, e.to_string())),
        }
    }

    pub async fn leave(&self, room: &RoomId, user: &UserId) -> Result<Value, OperationError> {
        self.invoke("leave", vec![json!(room), json!(user)]).await
    }

    pub async fn publish_and_subscribe(
        &self,
        room: &RoomId,
        user: &UserId,
        source: &MediaId,
        media_type: &str,
        params: Value,
    ) -> Result<Value, OperationError> {
        let args = vec![json!(room), json!(user), json!(source), json!(media_type), params];
        self.invoke("publishAndSubscribe", args).await
    }

    pub async fn publish(
        &self,
        user: &UserId,
        room: &RoomId,
        media_type: &str,
        params: Value,
    ) -> Result<PublishAnswer, OperationError> {
        let args = vec![json!(user), json!(room), json!(media_type), params];
        let result = self.invoke("publish", args).await?;
        media_answer("publish", json!({ "user": user, "room": room }), result)
    }

    pub async fn unpublish(&self, media: &MediaId) -> Result<Value, OperationError> {
        self.invoke("unpublish", vec![json!(media)]).await
    }

    /// Subscribes `user` to `source`. Named `subscribe_media` to keep it
    /// apart from event subscription.
    pub async fn subscribe_media(
        &self,
        user: &UserId,
        source: &MediaId,
        media_type: &str,
        params: Value,
    ) -> Result<PublishAnswer, OperationError> {
        let args = vec![json!(user), json!(source), json!(media_type), params];
        let result = self.invoke("subscribe", args).await?;
        media_answer("subscribe", json!({ "user": user, "sourceId": source }), result)
    }

    pub async fn unsubscribe(&self, user: &UserId, media: &MediaId) -> Result<Value, OperationError> {
        self.invoke("unsubscribe", vec![json!(user), json!(media)]).await
    }

    /// Connects `source` to `sinks`; `media_type` defaults to `ALL`.
    pub async fn connect_media(
        &self,
        source: &MediaId,
        sinks: &[MediaId],
        media_type: Option<&str>,
    ) -> Result<Value, OperationError> {
        let args = vec![json!(source), json!(sinks), json!(media_type.unwrap_or("ALL"))];
        self.invoke("connect", args).await
    }

    /// Disconnects `source` from `sinks`; `media_type` defaults to `ALL`.
    pub async fn disconnect_media(
        &self,
        source: &MediaId,
        sinks: &[MediaId],
        media_type: Option<&str>,
    ) -> Result<Value, OperationError> {
        let args = vec![json!(source), json!(sinks), json!(media_type.unwrap_or("ALL"))];
        self.invoke("disconnect", args).await
    }

    pub async fn add_ice_candidate(&self, media: &MediaId, candidate: Value) -> Result<Value, OperationError> {
        self.invoke("addIceCandidate", vec![json!(media), candidate]).await
    }

    pub async fn start_recording(&self, user: &UserId, media: &MediaId, path: &str) -> Result<Value, OperationError> {
        self.invoke("startRecording", vec![json!(user), json!(media), json!(path)])
            .await
    }

    pub async fn stop_recording(&self, user: &UserId, recording_id: &str) -> Result<Value, OperationError> {
        self.invoke("stopRecording", vec![json!(user), json!(recording_id)])
            .await
    }
}

/// Extracts `key` from a result object. A missing key reads as empty.
fn field<T: DeserializeOwned>(
    operation: &str,
    params: Value,
    result: Value,
    key: &str,
) -> Result<T, OperationError> {
    let value = match result {
        Value::Object(mut map) => map.remove(key).unwrap_or(Value::Array(vec![])),
        other => {
            return Err(OperationError::malformed(
                operation,
                params,
                format!("expected an object with `{key}`, got {other}"),
            ))
        }
    };
    serde_json::from_value(value).map_err(|e| OperationError::malformed(operation, params, e.to_string()))
}

fn media_answer(operation: &str, params: Value, result: Value) -> Result<PublishAnswer, OperationError> {
    let media: MediaResult = serde_json::from_value(result)
        .map_err(|e| OperationError::malformed(operation, params, e.to_string()))?;
    Ok(PublishAnswer {
        media_id: media.media_id,
        answer: media.descriptor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_unwraps_envelope() {
        let rooms: Vec<RoomEntry> =
            field("getRooms", json!({}), json!({"rooms": ["r1", {"id": "r2"}]}), "rooms").unwrap();
        let ids: Vec<String> = rooms
            .into_iter()
            .map(|entry| match entry {
                RoomEntry::Id(id) | RoomEntry::Object { id } => id.to_string(),
            })
            .collect();
        assert_eq!(ids, vec!["r1", "r2"]);
    }

    #[test]
    fn test_field_missing_key_is_empty() {
        let medias: Vec<Media> = field("getUserMedias", json!({}), json!({}), "medias").unwrap();
        assert!(medias.is_empty());
    }

    #[test]
    fn test_field_rejects_non_object() {
        let err = field::<Vec<Media>>("getUserMedias", json!({"userId": "u1"}), json!(42), "medias")
            .unwrap_err();
        assert_eq!(err.operation, "getUserMedias");
        assert_eq!(err.params, json!({"userId": "u1"}));
    }

    #[test]
    fn test_media_answer_shape() {
        let answer = media_answer(
            "publish",
            json!({}),
            json!({"mediaId": "m1", "descriptor": "v=0"}),
        )
        .unwrap();
        assert_eq!(answer.media_id.as_str(), "m1");
        assert_eq!(answer.answer, Some(json!("v=0")));
    }
}
