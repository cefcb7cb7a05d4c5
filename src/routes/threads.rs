use rocket::serde::json::Json;
use rocket::{State, get};

use super::{ApiError, resolve_room, room_error};
use crate::models::Message;
use crate::registry::RoomRegistry;

/// Replies to a message: direct children by default, the bounded-depth
/// transitive closure with `?nested=true`. Either way in chronological
/// order.
#[get("/api/room/<name>/thread/<message_id>?<nested>")]
pub async fn get_thread(
    registry: &State<RoomRegistry>,
    name: &str,
    message_id: &str,
    nested: Option<bool>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let room = resolve_room(registry, name)?;
    room.thread_replies(message_id.to_string(), nested.unwrap_or(false))
        .await
        .map(Json)
        .map_err(room_error)
}
