use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant, Interval, MissedTickBehavior};

use crate::blob::BlobStore;
use crate::models::{
    ChannelStat, ClientFrame, EditHistoryEntry, Message, PinnedMessage, RoomError, RoomExport,
    RoomInfo,
};
use crate::rate_limit::{IngressGate, LimiterRegistry};
use crate::store::{META_DESTRUCTION_TIME, META_NAME, META_NOTE, RoomStore};

const MAX_MESSAGE_LEN: usize = 6000;
const MAX_CHANNEL_LEN: usize = 100;
const MAX_USERNAME_LEN: usize = 32;
const MAX_THREAD_DEPTH: usize = 10;
const MIN_DESTRUCTION_SECS: i64 = 10;
const MAX_DESTRUCTION_SECS: i64 = 86_400;
const CHANNEL_LIST_LIMIT: i64 = 100;
const CHANNEL_SEARCH_LIMIT: i64 = 20;
const DEFAULT_MESSAGE_LIMIT: i64 = 100;

pub type SessionId = u64;

/// What the coordinator hands to a session's socket task.
#[derive(Debug)]
pub enum SessionEvent {
    Frame(String),
    Close { reason: String },
}

/// Live per-session state. Reconstructed from scratch whenever a coordinator
/// restarts; nothing here is durable.
struct Session {
    outbound: mpsc::UnboundedSender<SessionEvent>,
    /// None until the handshake frame arrives; immutable afterwards.
    username: Option<String>,
    gate: IngressGate,
    /// Frames broadcast while the session is still unnamed, delivered in
    /// order on handshake.
    queued: Vec<String>,
    dead: bool,
}

struct DestructionTimer {
    destroy_at_ms: i64,
    ticker: Interval,
}

pub enum Command {
    Connect {
        session_id: SessionId,
        source_key: String,
        outbound: mpsc::UnboundedSender<SessionEvent>,
    },
    Inbound {
        session_id: SessionId,
        text: String,
    },
    Disconnect {
        session_id: SessionId,
    },
    EditMessage {
        message_id: String,
        username: String,
        new_text: String,
        reply: oneshot::Sender<Result<Message, RoomError>>,
    },
    DeleteMessage {
        message_id: String,
        username: String,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    EditHistory {
        message_id: String,
        reply: oneshot::Sender<Result<Vec<EditHistoryEntry>, RoomError>>,
    },
    ThreadReplies {
        message_id: String,
        nested: bool,
        reply: oneshot::Sender<Result<Vec<Message>, RoomError>>,
    },
    ChannelMessages {
        channel: String,
        limit: Option<i64>,
        reply: oneshot::Sender<Result<Vec<Message>, RoomError>>,
    },
    ListChannels {
        reply: oneshot::Sender<Result<Vec<ChannelStat>, RoomError>>,
    },
    SearchChannels {
        prefix: String,
        reply: oneshot::Sender<Result<Vec<ChannelStat>, RoomError>>,
    },
    RoomInfo {
        reply: oneshot::Sender<Result<RoomInfo, RoomError>>,
    },
    UpdateRoomInfo {
        name: Option<String>,
        note: Option<String>,
        reply: oneshot::Sender<Result<RoomInfo, RoomError>>,
    },
    StartDestruction {
        countdown_seconds: i64,
        reply: oneshot::Sender<Result<i64, RoomError>>,
    },
    CancelDestruction {
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Export {
        reply: oneshot::Sender<Result<RoomExport, RoomError>>,
    },
    PinMessage {
        message_id: String,
        channel: String,
        reply: oneshot::Sender<Result<PinnedMessage, RoomError>>,
    },
    UnpinMessage {
        message_id: String,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    ListPins {
        channel: Option<String>,
        reply: oneshot::Sender<Result<Vec<PinnedMessage>, RoomError>>,
    },
}

/// Cloneable address of one room's coordinator. Session ids are allocated
/// here so that `connect`/`inbound`/`disconnect` stay plain ordered sends.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<Command>,
    next_session_id: Arc<AtomicU64>,
}

impl CoordinatorHandle {
    pub fn connect(
        &self,
        source_key: String,
        outbound: mpsc::UnboundedSender<SessionEvent>,
    ) -> SessionId {
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let _ = self.tx.send(Command::Connect {
            session_id,
            source_key,
            outbound,
        });
        session_id
    }

    pub fn inbound(&self, session_id: SessionId, text: String) {
        let _ = self.tx.send(Command::Inbound { session_id, text });
    }

    pub fn disconnect(&self, session_id: SessionId) {
        let _ = self.tx.send(Command::Disconnect { session_id });
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, RoomError>>) -> Command,
    ) -> Result<T, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .map_err(|_| RoomError::Internal("Room coordinator is gone".to_string()))?;
        rx.await
            .map_err(|_| RoomError::Internal("Room coordinator dropped the request".to_string()))?
    }

    pub async fn edit_message(
        &self,
        message_id: String,
        username: String,
        new_text: String,
    ) -> Result<Message, RoomError> {
        self.request(|reply| Command::EditMessage {
            message_id,
            username,
            new_text,
            reply,
        })
        .await
    }

    pub async fn delete_message(
        &self,
        message_id: String,
        username: String,
    ) -> Result<(), RoomError> {
        self.request(|reply| Command::DeleteMessage {
            message_id,
            username,
            reply,
        })
        .await
    }

    pub async fn edit_history(
        &self,
        message_id: String,
    ) -> Result<Vec<EditHistoryEntry>, RoomError> {
        self.request(|reply| Command::EditHistory { message_id, reply })
            .await
    }

    pub async fn thread_replies(
        &self,
        message_id: String,
        nested: bool,
    ) -> Result<Vec<Message>, RoomError> {
        self.request(|reply| Command::ThreadReplies {
            message_id,
            nested,
            reply,
        })
        .await
    }

    pub async fn channel_messages(
        &self,
        channel: String,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, RoomError> {
        self.request(|reply| Command::ChannelMessages {
            channel,
            limit,
            reply,
        })
        .await
    }

    pub async fn list_channels(&self) -> Result<Vec<ChannelStat>, RoomError> {
        self.request(|reply| Command::ListChannels { reply }).await
    }

    pub async fn search_channels(&self, prefix: String) -> Result<Vec<ChannelStat>, RoomError> {
        self.request(|reply| Command::SearchChannels { prefix, reply })
            .await
    }

    pub async fn room_info(&self) -> Result<RoomInfo, RoomError> {
        self.request(|reply| Command::RoomInfo { reply }).await
    }

    pub async fn update_room_info(
        &self,
        name: Option<String>,
        note: Option<String>,
    ) -> Result<RoomInfo, RoomError> {
        self.request(|reply| Command::UpdateRoomInfo { name, note, reply })
            .await
    }

    pub async fn start_destruction(&self, countdown_seconds: i64) -> Result<i64, RoomError> {
        self.request(|reply| Command::StartDestruction {
            countdown_seconds,
            reply,
        })
        .await
    }

    pub async fn cancel_destruction(&self) -> Result<(), RoomError> {
        self.request(|reply| Command::CancelDestruction { reply })
            .await
    }

    pub async fn export(&self) -> Result<RoomExport, RoomError> {
        self.request(|reply| Command::Export { reply }).await
    }

    pub async fn pin_message(
        &self,
        message_id: String,
        channel: String,
    ) -> Result<PinnedMessage, RoomError> {
        self.request(|reply| Command::PinMessage {
            message_id,
            channel,
            reply,
        })
        .await
    }

    pub async fn unpin_message(&self, message_id: String) -> Result<(), RoomError> {
        self.request(|reply| Command::UnpinMessage { message_id, reply })
            .await
    }

    pub async fn list_pins(&self, channel: Option<String>) -> Result<Vec<PinnedMessage>, RoomError> {
        self.request(|reply| Command::ListPins { channel, reply })
            .await
    }
}

/// The authoritative owner of one room: its sessions, its message log, its
/// destruction timer. Runs as a single task; commands are processed strictly
/// in arrival order, so no room state is ever touched concurrently.
pub struct RoomCoordinator {
    room_id: String,
    store: RoomStore,
    blobs: Arc<BlobStore>,
    limiters: Arc<LimiterRegistry>,
    sessions: HashMap<SessionId, Session>,
    last_timestamp: i64,
    destruction: Option<DestructionTimer>,
    rx: mpsc::UnboundedReceiver<Command>,
}

fn internal(e: impl std::fmt::Display) -> RoomError {
    RoomError::Internal(e.to_string())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Pull the blob key out of a `FILE:<url>|<name>|<mime>` payload.
fn file_key_of(text: &str) -> Option<String> {
    let url = text.strip_prefix("FILE:")?.split('|').next()?;
    url.rsplit('/')
        .next()
        .filter(|k| !k.is_empty())
        .map(String::from)
}

impl RoomCoordinator {
    pub fn spawn(
        room_id: String,
        store: RoomStore,
        blobs: Arc<BlobStore>,
        limiters: Arc<LimiterRegistry>,
    ) -> CoordinatorHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let last_timestamp = store.last_timestamp();
        let coordinator = RoomCoordinator {
            room_id,
            store,
            blobs,
            limiters,
            sessions: HashMap::new(),
            last_timestamp,
            destruction: None,
            rx,
        };
        tokio::spawn(coordinator.run());
        CoordinatorHandle {
            tx,
            next_session_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub async fn run(mut self) {
        self.resume_destruction();
        loop {
            let armed = self.destruction.is_some();
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                _ = Self::next_tick(&mut self.destruction), if armed => {
                    self.on_destruction_tick();
                }
            }
        }
    }

    async fn next_tick(destruction: &mut Option<DestructionTimer>) {
        match destruction.as_mut() {
            Some(timer) => {
                timer.ticker.tick().await;
            }
            None => std::future::pending().await,
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect {
                session_id,
                source_key,
                outbound,
            } => self.accept_session(session_id, source_key, outbound),
            Command::Inbound { session_id, text } => self.on_inbound(session_id, &text),
            Command::Disconnect { session_id } => {
                if let Some(session) = self.sessions.remove(&session_id)
                    && let Some(name) = session.username
                {
                    self.broadcast(&json!({"quit": name}));
                }
            }
            Command::EditMessage {
                message_id,
                username,
                new_text,
                reply,
            } => {
                let _ = reply.send(self.edit_message(&message_id, &username, new_text));
            }
            Command::DeleteMessage {
                message_id,
                username,
                reply,
            } => {
                let _ = reply.send(self.delete_message(&message_id, &username));
            }
            Command::EditHistory { message_id, reply } => {
                let _ = reply.send(self.edit_history(&message_id));
            }
            Command::ThreadReplies {
                message_id,
                nested,
                reply,
            } => {
                let _ = reply.send(self.thread_replies(&message_id, nested));
            }
            Command::ChannelMessages {
                channel,
                limit,
                reply,
            } => {
                let limit = limit.unwrap_or(DEFAULT_MESSAGE_LIMIT).clamp(1, 1000);
                let _ = reply.send(self.store.channel_messages(&channel, limit).map_err(internal));
            }
            Command::ListChannels { reply } => {
                let _ = reply.send(self.store.list_channels(CHANNEL_LIST_LIMIT).map_err(internal));
            }
            Command::SearchChannels { prefix, reply } => {
                let _ = reply.send(
                    self.store
                        .search_channels(&prefix, CHANNEL_SEARCH_LIMIT)
                        .map_err(internal),
                );
            }
            Command::RoomInfo { reply } => {
                let _ = reply.send(Ok(self.room_info()));
            }
            Command::UpdateRoomInfo { name, note, reply } => {
                let _ = reply.send(self.update_room_info(name, note));
            }
            Command::StartDestruction {
                countdown_seconds,
                reply,
            } => {
                let _ = reply.send(self.start_destruction(countdown_seconds));
            }
            Command::CancelDestruction { reply } => {
                let _ = reply.send(self.cancel_destruction());
            }
            Command::Export { reply } => {
                let _ = reply.send(self.export());
            }
            Command::PinMessage {
                message_id,
                channel,
                reply,
            } => {
                let _ = reply.send(self.pin_message(&message_id, &channel));
            }
            Command::UnpinMessage { message_id, reply } => {
                let _ = reply.send(self.unpin_message(&message_id));
            }
            Command::ListPins { channel, reply } => {
                let _ = reply.send(self.store.list_pins(channel.as_deref()).map_err(internal));
            }
        }
    }

    // --- session lifecycle ---

    fn accept_session(
        &mut self,
        session_id: SessionId,
        source_key: String,
        outbound: mpsc::UnboundedSender<SessionEvent>,
    ) {
        let gate = IngressGate::new(self.limiters.source(&source_key));
        let mut session = Session {
            outbound,
            username: None,
            gate,
            queued: Vec::new(),
            dead: false,
        };
        // the current roster, delivered once the client names itself
        for peer in self.sessions.values() {
            if let Some(name) = &peer.username {
                session.queued.push(json!({"joined": name}).to_string());
            }
        }
        self.sessions.insert(session_id, session);
    }

    fn on_inbound(&mut self, session_id: SessionId, raw: &str) {
        let Some(named) = self
            .sessions
            .get(&session_id)
            .map(|s| s.username.is_some())
        else {
            return;
        };
        let frame: ClientFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(_) => {
                self.send_to(session_id, &json!({"error": "Malformed frame"}));
                return;
            }
        };
        if named {
            self.on_message(session_id, frame);
        } else {
            self.on_handshake(session_id, frame);
        }
    }

    fn on_handshake(&mut self, session_id: SessionId, frame: ClientFrame) {
        let name = frame
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "anonymous".to_string());
        let name: String = name.chars().take(MAX_USERNAME_LEN).collect();

        // a reconnect takes the name over from its stale session
        let stale: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(id, s)| **id != session_id && s.username.as_deref() == Some(name.as_str()))
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            if let Some(session) = self.sessions.remove(&id) {
                let _ = session.outbound.send(SessionEvent::Close {
                    reason: "reconnected from another session".to_string(),
                });
            }
        }

        let Some(session) = self.sessions.get_mut(&session_id) else {
            return;
        };
        session.username = Some(name.clone());
        let queued = std::mem::take(&mut session.queued);
        for text in queued {
            if session.outbound.send(SessionEvent::Frame(text)).is_err() {
                session.dead = true;
                break;
            }
        }
        self.broadcast(&json!({"joined": name}));
        self.send_to(session_id, &json!({"ready": true}));
    }

    fn on_message(&mut self, session_id: SessionId, frame: ClientFrame) {
        let accepted = self
            .sessions
            .get(&session_id)
            .map(|s| s.gate.try_accept())
            .unwrap_or(false);
        if !accepted {
            self.send_to(
                session_id,
                &json!({"error": "Your IP is being rate-limited, please try again later."}),
            );
            return;
        }

        let Some(username) = self
            .sessions
            .get(&session_id)
            .and_then(|s| s.username.clone())
        else {
            return;
        };
        let Some(text) = frame.message else {
            self.send_to(session_id, &json!({"error": "Unknown message type"}));
            return;
        };

        let is_file = text.starts_with("FILE:");
        if !is_file && text.chars().count() > MAX_MESSAGE_LEN {
            self.send_to(session_id, &json!({"error": "Message too long."}));
            return;
        }
        let channel = frame
            .channel
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "general".to_string());
        if channel.chars().count() > MAX_CHANNEL_LEN {
            self.send_to(session_id, &json!({"error": "Channel name too long."}));
            return;
        }
        if is_file && text["FILE:".len()..].split('|').count() < 3 {
            self.send_to(session_id, &json!({"error": "Invalid file message format"}));
            return;
        }

        let timestamp = self.next_timestamp();
        let message = Message {
            message_id: frame
                .message_id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            username,
            text,
            timestamp,
            channel,
            reply_to: frame.reply_to,
            edited_at: None,
            thread_info: None,
        };

        // fan out before persisting; a storage failure is the author's
        // problem, not the room's
        match serde_json::to_value(&message) {
            Ok(wire) => self.broadcast(&wire),
            Err(e) => {
                self.send_to(session_id, &json!({"error": e.to_string()}));
                return;
            }
        }

        if let Err(e) = self.store.insert_message(&message) {
            self.send_to(session_id, &json!({"error": e.to_string()}));
            return;
        }

        if let Some(reply) = message.reply_to.as_ref() {
            let parent_id = reply.message_id.clone();
            match self
                .store
                .insert_thread_edge(&parent_id, &message.message_id, timestamp)
            {
                Ok(()) => {
                    let reply_count = self.store.reply_count(&parent_id);
                    self.broadcast(&json!({
                        "threadUpdate": {
                            "messageId": parent_id,
                            "threadInfo": {"replyCount": reply_count},
                        }
                    }));
                }
                Err(e) => self.send_to(session_id, &json!({"error": e.to_string()})),
            }
        }

        if message.is_file()
            && let Some(key) = file_key_of(&message.text)
            && let Err(e) = self.store.insert_file_reference(&message.message_id, &key)
        {
            eprintln!("⚠️  Room {}: failed to track file reference: {e}", self.room_tag());
        }
    }

    /// Strictly monotonic per room, clock regressions included.
    fn next_timestamp(&mut self) -> i64 {
        self.last_timestamp = now_ms().max(self.last_timestamp + 1);
        self.last_timestamp
    }

    fn send_to(&mut self, session_id: SessionId, frame: &serde_json::Value) {
        if let Some(session) = self.sessions.get_mut(&session_id)
            && session
                .outbound
                .send(SessionEvent::Frame(frame.to_string()))
                .is_err()
        {
            session.dead = true;
        }
    }

    /// Fan one frame out to every ready session; queue it for unnamed ones.
    /// Sessions whose channel is gone get reaped, each with one `{quit}`
    /// notice.
    fn broadcast(&mut self, frame: &serde_json::Value) {
        let text = frame.to_string();
        let mut reaped: Vec<SessionId> = Vec::new();
        for (id, session) in self.sessions.iter_mut() {
            if session.dead {
                reaped.push(*id);
                continue;
            }
            if session.username.is_some() {
                if session
                    .outbound
                    .send(SessionEvent::Frame(text.clone()))
                    .is_err()
                {
                    session.dead = true;
                    reaped.push(*id);
                }
            } else {
                session.queued.push(text.clone());
            }
        }
        let mut quits = Vec::new();
        for id in reaped {
            if let Some(session) = self.sessions.remove(&id)
                && let Some(name) = session.username
            {
                quits.push(name);
            }
        }
        for name in quits {
            self.broadcast(&json!({"quit": name}));
        }
    }

    // --- message mutation ---

    fn edit_message(
        &mut self,
        message_id: &str,
        username: &str,
        new_text: String,
    ) -> Result<Message, RoomError> {
        let existing = self
            .store
            .get_message(message_id)
            .map_err(internal)?
            .ok_or_else(|| RoomError::NotFound("Message not found".to_string()))?;
        if existing.username != username {
            return Err(RoomError::Forbidden(
                "You can only edit your own messages".to_string(),
            ));
        }
        if existing.is_file() {
            return Err(RoomError::BadRequest("Cannot edit file messages".to_string()));
        }
        if new_text.is_empty() || new_text.chars().count() > MAX_MESSAGE_LEN {
            return Err(RoomError::BadRequest(
                "Message must be 1-6000 characters".to_string(),
            ));
        }

        let edited_at = now_ms();
        self.store
            .apply_edit(message_id, &existing.text, &new_text, edited_at)
            .map_err(internal)?;
        self.broadcast(&json!({
            "messageEdited": {
                "messageId": message_id,
                "message": new_text.clone(),
                "editedAt": edited_at,
            }
        }));
        Ok(Message {
            text: new_text,
            edited_at: Some(edited_at),
            ..existing
        })
    }

    fn delete_message(&mut self, message_id: &str, username: &str) -> Result<(), RoomError> {
        let existing = self
            .store
            .get_message(message_id)
            .map_err(internal)?
            .ok_or_else(|| RoomError::NotFound("Message not found".to_string()))?;
        if existing.username != username {
            return Err(RoomError::Forbidden(
                "You can only delete your own messages".to_string(),
            ));
        }
        self.store.delete_message(message_id).map_err(internal)?;
        self.broadcast(&json!({"messageDeleted": message_id}));
        Ok(())
    }

    fn edit_history(&self, message_id: &str) -> Result<Vec<EditHistoryEntry>, RoomError> {
        if !self.store.message_exists(message_id) {
            return Err(RoomError::NotFound("Message not found".to_string()));
        }
        self.store.edit_history(message_id).map_err(internal)
    }

    // --- threads ---

    fn thread_replies(&self, message_id: &str, nested: bool) -> Result<Vec<Message>, RoomError> {
        if !self.store.message_exists(message_id) {
            return Err(RoomError::NotFound("Message not found".to_string()));
        }
        if nested {
            self.store
                .nested_replies(message_id, MAX_THREAD_DEPTH)
                .map_err(internal)
        } else {
            self.store.direct_replies(message_id).map_err(internal)
        }
    }

    // --- room info / export ---

    fn room_info(&self) -> RoomInfo {
        RoomInfo {
            name: self.store.get_meta(META_NAME).unwrap_or_default(),
            note: self.store.get_meta(META_NOTE).unwrap_or_default(),
        }
    }

    fn update_room_info(
        &mut self,
        name: Option<String>,
        note: Option<String>,
    ) -> Result<RoomInfo, RoomError> {
        if let Some(name) = name {
            self.store.set_meta(META_NAME, &name).map_err(internal)?;
        }
        if let Some(note) = note {
            self.store.set_meta(META_NOTE, &note).map_err(internal)?;
        }
        let info = self.room_info();
        self.broadcast(&json!({
            "roomInfoUpdate": {"name": info.name.clone(), "note": info.note.clone()}
        }));
        Ok(info)
    }

    fn export(&self) -> Result<RoomExport, RoomError> {
        Ok(RoomExport {
            room_info: self.room_info(),
            messages: self.store.all_messages().map_err(internal)?,
        })
    }

    // --- pins ---

    fn pin_message(&mut self, message_id: &str, channel: &str) -> Result<PinnedMessage, RoomError> {
        let message = self
            .store
            .get_message(message_id)
            .map_err(internal)?
            .ok_or_else(|| RoomError::NotFound("Message not found".to_string()))?;
        let pinned_at = now_ms();
        self.store
            .pin_message(message_id, channel, pinned_at)
            .map_err(internal)?;
        self.broadcast(&json!({
            "messagePinned": {
                "messageId": message_id,
                "channel": channel,
                "pinnedAt": pinned_at,
            }
        }));
        Ok(PinnedMessage { message, pinned_at })
    }

    fn unpin_message(&mut self, message_id: &str) -> Result<(), RoomError> {
        let removed = self.store.unpin_message(message_id).map_err(internal)?;
        if !removed {
            return Err(RoomError::NotFound("Message is not pinned".to_string()));
        }
        self.broadcast(&json!({"messageUnpinned": message_id}));
        Ok(())
    }

    // --- destruction ---

    fn start_destruction(&mut self, countdown_seconds: i64) -> Result<i64, RoomError> {
        if !(MIN_DESTRUCTION_SECS..=MAX_DESTRUCTION_SECS).contains(&countdown_seconds) {
            return Err(RoomError::BadRequest(format!(
                "Countdown must be between {MIN_DESTRUCTION_SECS} and {MAX_DESTRUCTION_SECS} seconds"
            )));
        }
        let destroy_at = now_ms() + countdown_seconds * 1000;
        self.store
            .set_meta(META_DESTRUCTION_TIME, &destroy_at.to_string())
            .map_err(internal)?;
        // replaces any earlier schedule
        self.arm_destruction(destroy_at);
        self.broadcast(&json!({
            "destructionUpdate": {
                "countdown": countdown_seconds,
                "destructionTime": destroy_at,
            }
        }));
        Ok(destroy_at)
    }

    fn cancel_destruction(&mut self) -> Result<(), RoomError> {
        self.store.delete_meta(META_DESTRUCTION_TIME).map_err(internal)?;
        self.destruction = None;
        self.broadcast(&json!({"destructionUpdate": {"cancelled": true}}));
        Ok(())
    }

    fn arm_destruction(&mut self, destroy_at_ms: i64) {
        let mut ticker = tokio::time::interval_at(
            Instant::now() + Duration::from_secs(1),
            Duration::from_secs(1),
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.destruction = Some(DestructionTimer {
            destroy_at_ms,
            ticker,
        });
    }

    /// On cold start, pick up a schedule left behind in room metadata.
    /// A deadline already in the past destroys the room immediately.
    fn resume_destruction(&mut self) {
        if let Some(raw) = self.store.get_meta(META_DESTRUCTION_TIME)
            && let Ok(destroy_at) = raw.parse::<i64>()
        {
            if destroy_at <= now_ms() {
                self.execute_destruction();
            } else {
                self.arm_destruction(destroy_at);
            }
        }
    }

    fn on_destruction_tick(&mut self) {
        let Some(timer) = &self.destruction else {
            return;
        };
        let destroy_at = timer.destroy_at_ms;
        let remaining_ms = destroy_at - now_ms();
        if remaining_ms <= 0 {
            self.execute_destruction();
        } else {
            self.broadcast(&json!({
                "destructionUpdate": {
                    "countdown": (remaining_ms + 999) / 1000,
                    "destructionTime": destroy_at,
                }
            }));
        }
    }

    /// Terminal operation: notify, evict every session, delete referenced
    /// blobs, wipe the schema. The room lives on, empty.
    fn execute_destruction(&mut self) {
        self.broadcast(&json!({"destructionUpdate": {"roomDestroyed": true}}));
        for (_, session) in self.sessions.drain() {
            let _ = session.outbound.send(SessionEvent::Close {
                reason: "room destroyed".to_string(),
            });
        }

        match self.store.file_keys() {
            Ok(keys) => {
                for key in keys {
                    if let Err(e) = self.blobs.delete(&key) {
                        eprintln!("⚠️  Room {}: failed to delete blob {key}: {e}", self.room_tag());
                    }
                }
            }
            Err(e) => {
                eprintln!(
                    "⚠️  Room {}: failed to enumerate file references: {e}",
                    self.room_tag()
                );
            }
        }

        if let Err(e) = self.store.reset() {
            eprintln!("⚠️  Room {}: failed to clear storage: {e}", self.room_tag());
        }
        self.destruction = None;
        println!("💥 Room {} destroyed", self.room_tag());
    }

    fn room_tag(&self) -> &str {
        &self.room_id[..self.room_id.len().min(8)]
    }
}
