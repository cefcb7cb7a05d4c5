use rocket::serde::json::Json;
use rocket::{State, get, post, put};

use super::{ApiError, resolve_room, room_error};
use crate::models::{RoomExport, RoomInfo, StartDestructionBody, UpdateRoomInfoBody};
use crate::registry::{RoomRegistry, generate_room_id};

/// Allocate a private room: the 64-hex identity is the only capability
/// needed to reach it, so it is returned as the raw response body.
#[post("/api/room")]
pub fn create_room() -> String {
    generate_room_id()
}

#[get("/api/room/<name>/info")]
pub async fn get_room_info(
    registry: &State<RoomRegistry>,
    name: &str,
) -> Result<Json<RoomInfo>, ApiError> {
    let room = resolve_room(registry, name)?;
    room.room_info().await.map(Json).map_err(room_error)
}

#[put("/api/room/<name>/info", format = "json", data = "<body>")]
pub async fn update_room_info(
    registry: &State<RoomRegistry>,
    name: &str,
    body: Json<UpdateRoomInfoBody>,
) -> Result<Json<RoomInfo>, ApiError> {
    let room = resolve_room(registry, name)?;
    let body = body.into_inner();
    room.update_room_info(body.name, body.note)
        .await
        .map(Json)
        .map_err(room_error)
}

#[get("/api/room/<name>/export")]
pub async fn export_room(
    registry: &State<RoomRegistry>,
    name: &str,
) -> Result<Json<RoomExport>, ApiError> {
    let room = resolve_room(registry, name)?;
    room.export().await.map(Json).map_err(room_error)
}

#[post("/api/room/<name>/destruction/start", format = "json", data = "<body>")]
pub async fn start_destruction(
    registry: &State<RoomRegistry>,
    name: &str,
    body: Json<StartDestructionBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let room = resolve_room(registry, name)?;
    let countdown = body.countdown_seconds;
    let destruction_time = room
        .start_destruction(countdown)
        .await
        .map_err(room_error)?;
    Ok(Json(serde_json::json!({
        "countdown": countdown,
        "destructionTime": destruction_time,
    })))
}

#[post("/api/room/<name>/destruction/cancel")]
pub async fn cancel_destruction(
    registry: &State<RoomRegistry>,
    name: &str,
) -> Result<Json<serde_json::Value>, ApiError> {
    let room = resolve_room(registry, name)?;
    room.cancel_destruction().await.map_err(room_error)?;
    Ok(Json(serde_json::json!({"cancelled": true})))
}
