use serde::{Deserialize, Serialize};

/// A chat message as it travels on the wire and (mostly) as it is stored.
/// Field names follow the stream frame format: `name` is the sender,
/// `message` is the opaque payload.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    #[serde(rename = "messageId")]
    pub message_id: String,
    #[serde(rename = "name")]
    pub username: String,
    #[serde(rename = "message")]
    pub text: String,
    /// Milliseconds since epoch, strictly monotonic within a room.
    pub timestamp: i64,
    pub channel: String,
    #[serde(rename = "replyTo", skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyRef>,
    #[serde(rename = "editedAt", skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<i64>,
    #[serde(rename = "threadInfo", skip_serializing_if = "Option::is_none")]
    pub thread_info: Option<ThreadInfo>,
}

impl Message {
    pub fn is_file(&self) -> bool {
        self.text.starts_with("FILE:")
    }
}

/// Client-supplied reference to the message being replied to. Echoed back
/// verbatim on broadcast; only `message_id` is interpreted server-side.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReplyRef {
    #[serde(rename = "messageId")]
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ThreadInfo {
    #[serde(rename = "replyCount")]
    pub reply_count: i64,
}

/// An inbound stream frame. The two client frame kinds (handshake and
/// message) share one loose shape; the ingress state machine decides which
/// fields matter.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "messageId", default)]
    pub message_id: Option<String>,
    #[serde(rename = "replyTo", default)]
    pub reply_to: Option<ReplyRef>,
    #[serde(default)]
    pub channel: Option<String>,
}

// --- HTTP request bodies ---

#[derive(Debug, Deserialize)]
pub struct EditMessageBody {
    pub username: String,
    #[serde(rename = "newMessage")]
    pub new_message: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMessageBody {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoomInfoBody {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StartDestructionBody {
    #[serde(rename = "countdownSeconds")]
    pub countdown_seconds: i64,
}

#[derive(Debug, Deserialize)]
pub struct PinBody {
    #[serde(default = "default_channel")]
    pub channel: String,
}

pub fn default_channel() -> String {
    "general".to_string()
}

// --- HTTP responses ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RoomInfo {
    pub name: String,
    pub note: String,
}

/// Per-channel aggregate: how many messages, and when the channel last saw
/// one.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChannelStat {
    pub channel: String,
    #[serde(rename = "messageCount")]
    pub message_count: i64,
    #[serde(rename = "lastUsed")]
    pub last_used: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EditHistoryEntry {
    #[serde(rename = "oldText")]
    pub old_text: String,
    #[serde(rename = "editedAt")]
    pub edited_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PinnedMessage {
    #[serde(flatten)]
    pub message: Message,
    #[serde(rename = "pinnedAt")]
    pub pinned_at: i64,
}

/// Full administrative dump of one room.
#[derive(Debug, Serialize, Deserialize)]
pub struct RoomExport {
    #[serde(rename = "roomInfo")]
    pub room_info: RoomInfo,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(rename = "fileUrl")]
    pub file_url: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "fileType")]
    pub file_type: String,
    #[serde(rename = "fileSize")]
    pub file_size: i64,
}

/// Error surfaced by a coordinator operation; the route layer maps the
/// variant to an HTTP status.
#[derive(Debug, Clone)]
pub enum RoomError {
    NotFound(String),
    Forbidden(String),
    BadRequest(String),
    Internal(String),
}

impl std::fmt::Display for RoomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomError::NotFound(m)
            | RoomError::Forbidden(m)
            | RoomError::BadRequest(m)
            | RoomError::Internal(m) => f.write_str(m),
        }
    }
}
