use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::blob::BlobStore;
use crate::coordinator::{CoordinatorHandle, RoomCoordinator};
use crate::models::RoomError;
use crate::rate_limit::LimiterRegistry;
use crate::store::RoomStore;

/// Longest room name that gets a derived identity; anything longer is
/// rejected outright.
pub const MAX_ROOM_NAME_LEN: usize = 32;

/// Generate an unguessable room identity: 256 bits as 64 hex chars.
pub fn generate_room_id() -> String {
    format!(
        "{:032x}{:032x}",
        uuid::Uuid::new_v4().as_u128(),
        uuid::Uuid::new_v4().as_u128()
    )
}

/// Process-local map of room identity to its coordinator. Coordinators are
/// created on first reference and recover everything durable from their
/// SQLite file, so the map itself holds no room state.
pub struct RoomRegistry {
    rooms_dir: PathBuf,
    blobs: Arc<BlobStore>,
    limiters: Arc<LimiterRegistry>,
    rooms: Mutex<HashMap<String, CoordinatorHandle>>,
}

impl RoomRegistry {
    pub fn new(rooms_dir: PathBuf, blobs: Arc<BlobStore>, limiters: Arc<LimiterRegistry>) -> Self {
        RoomRegistry {
            rooms_dir,
            blobs,
            limiters,
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Map a URL room name to its identity: 64 hex chars pass through, short
    /// names get a deterministic derived identity, anything else is refused.
    pub fn resolve(&self, name: &str) -> Option<String> {
        if name.len() == 64 && name.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Some(name.to_ascii_lowercase());
        }
        if name.chars().count() <= MAX_ROOM_NAME_LEN {
            return Some(hex::encode(Sha256::digest(name.as_bytes())));
        }
        None
    }

    /// Handle to the room's coordinator, spawning it on first reference.
    /// Must be called from within a tokio runtime.
    pub fn coordinator(&self, room_id: &str) -> Result<CoordinatorHandle, RoomError> {
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = rooms.get(room_id) {
            return Ok(handle.clone());
        }
        let path = self.rooms_dir.join(format!("{room_id}.db"));
        let store = RoomStore::open(&path)
            .map_err(|e| RoomError::Internal(format!("Failed to open room storage: {e}")))?;
        let handle = RoomCoordinator::spawn(
            room_id.to_string(),
            store,
            self.blobs.clone(),
            self.limiters.clone(),
        );
        rooms.insert(room_id.to_string(), handle.clone());
        Ok(handle)
    }

    /// Handle to an already-running coordinator, if any.
    pub fn lookup(&self, room_id: &str) -> Option<CoordinatorHandle> {
        let rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        rooms.get(room_id).cloned()
    }
}
