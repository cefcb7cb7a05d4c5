use rocket::serde::json::Json;
use rocket::{State, delete, get, post};

use super::{ApiError, resolve_room, room_error};
use crate::models::{PinBody, PinnedMessage, default_channel};
use crate::registry::RoomRegistry;

#[post("/api/room/<name>/pin/<message_id>", format = "json", data = "<body>")]
pub async fn pin_message(
    registry: &State<RoomRegistry>,
    name: &str,
    message_id: &str,
    body: Option<Json<PinBody>>,
) -> Result<Json<PinnedMessage>, ApiError> {
    let room = resolve_room(registry, name)?;
    let channel = body
        .map(|b| b.into_inner().channel)
        .unwrap_or_else(default_channel);
    room.pin_message(message_id.to_string(), channel)
        .await
        .map(Json)
        .map_err(room_error)
}

#[delete("/api/room/<name>/pin/<message_id>")]
pub async fn unpin_message(
    registry: &State<RoomRegistry>,
    name: &str,
    message_id: &str,
) -> Result<Json<serde_json::Value>, ApiError> {
    let room = resolve_room(registry, name)?;
    room.unpin_message(message_id.to_string())
        .await
        .map_err(room_error)?;
    Ok(Json(serde_json::json!({"unpinned": true})))
}

#[get("/api/room/<name>/pins?<channel>")]
pub async fn list_pins(
    registry: &State<RoomRegistry>,
    name: &str,
    channel: Option<&str>,
) -> Result<Json<Vec<PinnedMessage>>, ApiError> {
    let room = resolve_room(registry, name)?;
    room.list_pins(channel.map(String::from))
        .await
        .map(Json)
        .map_err(room_error)
}
