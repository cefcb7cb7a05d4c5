use rocket::serde::json::Json;
use rocket::{State, get};

use super::{ApiError, resolve_room, room_error};
use crate::models::{ChannelStat, Message};
use crate::registry::RoomRegistry;

#[get("/api/room/<name>/channels")]
pub async fn list_channels(
    registry: &State<RoomRegistry>,
    name: &str,
) -> Result<Json<Vec<ChannelStat>>, ApiError> {
    let room = resolve_room(registry, name)?;
    room.list_channels().await.map(Json).map_err(room_error)
}

#[get("/api/room/<name>/channel/<channel>/messages?<limit>")]
pub async fn channel_messages(
    registry: &State<RoomRegistry>,
    name: &str,
    channel: &str,
    limit: Option<i64>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let room = resolve_room(registry, name)?;
    room.channel_messages(channel.to_string(), limit)
        .await
        .map(Json)
        .map_err(room_error)
}

#[get("/api/room/<name>/channel/search?<q>")]
pub async fn search_channels(
    registry: &State<RoomRegistry>,
    name: &str,
    q: &str,
) -> Result<Json<Vec<ChannelStat>>, ApiError> {
    let room = resolve_room(registry, name)?;
    room.search_channels(q.to_string())
        .await
        .map(Json)
        .map_err(room_error)
}
