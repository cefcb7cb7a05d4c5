// Route module decomposition — each domain area in its own file.
// Shared types (request guards, error helpers) live here; route functions in
// submodules.

mod channels;
mod files;
mod messages;
mod pins;
mod rooms;
mod stream;
mod system;
mod threads;

// --- Re-exports (all route functions used by lib.rs mount) ---

pub use channels::{channel_messages, list_channels, search_channels};
pub use files::{download_file, upload_file};
pub use messages::{delete_message, edit_message, get_edit_history};
pub use pins::{list_pins, pin_message, unpin_message};
pub use rooms::{
    cancel_destruction, create_room, export_room, get_room_info, start_destruction,
    update_room_info,
};
pub use stream::websocket;
pub use system::{health, internal_error, not_found, payload_too_large};
pub use threads::get_thread;

// --- Shared request guards and helpers ---

use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::serde::json::Json;
use rocket::State;

use crate::coordinator::CoordinatorHandle;
use crate::models::RoomError;
use crate::registry::RoomRegistry;

pub struct ClientIp(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let ip = req
            .headers()
            .get_one("X-Forwarded-For")
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .or_else(|| req.remote().map(|r| r.ip().to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        Outcome::Success(ClientIp(ip))
    }
}

pub type ApiError = (Status, Json<serde_json::Value>);

pub fn api_error(status: Status, message: &str) -> ApiError {
    (status, Json(serde_json::json!({"error": message})))
}

/// Map a coordinator error onto the HTTP taxonomy.
pub fn room_error(err: RoomError) -> ApiError {
    let status = match &err {
        RoomError::NotFound(_) => Status::NotFound,
        RoomError::Forbidden(_) => Status::Forbidden,
        RoomError::BadRequest(_) => Status::BadRequest,
        RoomError::Internal(_) => Status::InternalServerError,
    };
    api_error(status, &err.to_string())
}

/// Resolve a URL room name to its identity, or the router's 404.
pub fn resolve_room_id(registry: &State<RoomRegistry>, name: &str) -> Result<String, ApiError> {
    registry
        .resolve(name)
        .ok_or_else(|| api_error(Status::NotFound, "Name too long"))
}

/// Resolve a room name all the way to its coordinator handle.
pub fn resolve_room(
    registry: &State<RoomRegistry>,
    name: &str,
) -> Result<CoordinatorHandle, ApiError> {
    let room_id = resolve_room_id(registry, name)?;
    registry.coordinator(&room_id).map_err(room_error)
}
