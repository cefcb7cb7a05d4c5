use rocket::serde::json::Json;
use rocket::{State, delete, get, put};

use super::{ApiError, resolve_room, room_error};
use crate::models::{DeleteMessageBody, EditHistoryEntry, EditMessageBody, Message};
use crate::registry::RoomRegistry;

#[put("/api/room/<name>/message/<message_id>", format = "json", data = "<body>")]
pub async fn edit_message(
    registry: &State<RoomRegistry>,
    name: &str,
    message_id: &str,
    body: Json<EditMessageBody>,
) -> Result<Json<Message>, ApiError> {
    let room = resolve_room(registry, name)?;
    let body = body.into_inner();
    room.edit_message(message_id.to_string(), body.username, body.new_message)
        .await
        .map(Json)
        .map_err(room_error)
}

#[delete("/api/room/<name>/message/<message_id>", format = "json", data = "<body>")]
pub async fn delete_message(
    registry: &State<RoomRegistry>,
    name: &str,
    message_id: &str,
    body: Json<DeleteMessageBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let room = resolve_room(registry, name)?;
    room.delete_message(message_id.to_string(), body.into_inner().username)
        .await
        .map_err(room_error)?;
    Ok(Json(serde_json::json!({"deleted": true})))
}

#[get("/api/room/<name>/message/<message_id>/history")]
pub async fn get_edit_history(
    registry: &State<RoomRegistry>,
    name: &str,
    message_id: &str,
) -> Result<Json<Vec<EditHistoryEntry>>, ApiError> {
    let room = resolve_room(registry, name)?;
    room.edit_history(message_id.to_string())
        .await
        .map(Json)
        .map_err(room_error)
}
