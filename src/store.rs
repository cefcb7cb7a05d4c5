use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashSet;
use std::path::Path;

use crate::models::{ChannelStat, EditHistoryEntry, Message, PinnedMessage, ThreadInfo};

/// Recognized `room_metadata` keys. Unrecognized keys are stored but never
/// interpreted.
pub const META_NAME: &str = "name";
pub const META_NOTE: &str = "note";
pub const META_DESTRUCTION_TIME: &str = "destruction-time";

/// Durable state of exactly one room: one SQLite file, exclusively owned by
/// the room's coordinator, so no lock wraps the connection.
pub struct RoomStore {
    conn: Connection,
}

const MESSAGE_COLUMNS: &str = "m.message_id, m.username, m.text, m.channel, m.timestamp, \
     m.reply_to, m.edited_at, \
     (SELECT COUNT(*) FROM threads t WHERE t.parent_message_id = m.message_id)";

fn map_pinned(row: &Row) -> rusqlite::Result<PinnedMessage> {
    Ok(PinnedMessage {
        message: map_message(row)?,
        pinned_at: row.get(8)?,
    })
}

fn map_message(row: &Row) -> rusqlite::Result<Message> {
    let reply_to_json: Option<String> = row.get(5)?;
    let reply_count: i64 = row.get(7)?;
    Ok(Message {
        message_id: row.get(0)?,
        username: row.get(1)?,
        text: row.get(2)?,
        channel: row.get(3)?,
        timestamp: row.get(4)?,
        reply_to: reply_to_json.and_then(|s| serde_json::from_str(&s).ok()),
        edited_at: row.get(6)?,
        thread_info: (reply_count > 0).then_some(ThreadInfo {
            reply_count,
        }),
    })
}

impl RoomStore {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = RoomStore { conn };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = RoomStore { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS messages (
                message_id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                text TEXT NOT NULL,
                channel TEXT NOT NULL DEFAULT 'general',
                timestamp INTEGER NOT NULL,
                reply_to TEXT,
                edited_at INTEGER,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_timestamp
                ON messages(timestamp DESC);
            CREATE INDEX IF NOT EXISTS idx_messages_channel_timestamp
                ON messages(channel, timestamp DESC);

            CREATE TABLE IF NOT EXISTS threads (
                parent_message_id TEXT NOT NULL,
                reply_message_id TEXT NOT NULL,
                reply_timestamp INTEGER NOT NULL,
                PRIMARY KEY (parent_message_id, reply_message_id)
            );
            CREATE INDEX IF NOT EXISTS idx_threads_parent
                ON threads(parent_message_id);

            CREATE TABLE IF NOT EXISTS edit_history (
                message_id TEXT NOT NULL,
                old_text TEXT NOT NULL,
                edited_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_edit_history_message
                ON edit_history(message_id);

            CREATE TABLE IF NOT EXISTS room_metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS file_references (
                message_id TEXT NOT NULL,
                file_key TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_file_references_message
                ON file_references(message_id);

            CREATE TABLE IF NOT EXISTS pins (
                message_id TEXT PRIMARY KEY,
                channel TEXT NOT NULL,
                pinned_at INTEGER NOT NULL
            );",
        )
    }

    /// Wipe every room entity, leaving an empty schema. Terminal step of
    /// room destruction.
    pub fn reset(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "DELETE FROM messages;
             DELETE FROM threads;
             DELETE FROM edit_history;
             DELETE FROM room_metadata;
             DELETE FROM file_references;
             DELETE FROM pins;",
        )
    }

    /// Floor for monotonic timestamp assignment after a cold start.
    pub fn last_timestamp(&self) -> i64 {
        self.conn
            .query_row("SELECT COALESCE(MAX(timestamp), 0) FROM messages", [], |r| r.get(0))
            .unwrap_or(0)
    }

    // --- messages ---

    pub fn insert_message(&self, msg: &Message) -> rusqlite::Result<()> {
        let reply_to = msg
            .reply_to
            .as_ref()
            .map(|r| serde_json::to_string(r).unwrap_or_default());
        self.conn.execute(
            "INSERT INTO messages (message_id, username, text, channel, timestamp, reply_to, edited_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &msg.message_id,
                &msg.username,
                &msg.text,
                &msg.channel,
                msg.timestamp,
                reply_to,
                msg.edited_at,
                msg.timestamp,
            ],
        )?;
        Ok(())
    }

    pub fn get_message(&self, message_id: &str) -> rusqlite::Result<Option<Message>> {
        self.conn
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.message_id = ?1"),
                params![message_id],
                map_message,
            )
            .optional()
    }

    pub fn message_exists(&self, message_id: &str) -> bool {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM messages WHERE message_id = ?1",
                params![message_id],
                |r| r.get::<_, i64>(0),
            )
            .map(|c| c > 0)
            .unwrap_or(false)
    }

    /// Record the pre-edit text, then overwrite. One transaction so the
    /// history row never goes missing under a mid-edit failure.
    pub fn apply_edit(
        &mut self,
        message_id: &str,
        old_text: &str,
        new_text: &str,
        edited_at: i64,
    ) -> rusqlite::Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO edit_history (message_id, old_text, edited_at) VALUES (?1, ?2, ?3)",
            params![message_id, old_text, edited_at],
        )?;
        tx.execute(
            "UPDATE messages SET text = ?1, edited_at = ?2 WHERE message_id = ?3",
            params![new_text, edited_at, message_id],
        )?;
        tx.commit()
    }

    /// Remove a message and every dependent row: edit history, thread edges
    /// in both roles, file references, pins, then the message itself.
    pub fn delete_message(&mut self, message_id: &str) -> rusqlite::Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM edit_history WHERE message_id = ?1", params![message_id])?;
        tx.execute(
            "DELETE FROM threads WHERE parent_message_id = ?1 OR reply_message_id = ?1",
            params![message_id],
        )?;
        tx.execute("DELETE FROM file_references WHERE message_id = ?1", params![message_id])?;
        tx.execute("DELETE FROM pins WHERE message_id = ?1", params![message_id])?;
        tx.execute("DELETE FROM messages WHERE message_id = ?1", params![message_id])?;
        tx.commit()
    }

    pub fn edit_history(&self, message_id: &str) -> rusqlite::Result<Vec<EditHistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT old_text, edited_at FROM edit_history WHERE message_id = ?1 ORDER BY edited_at ASC",
        )?;
        let rows = stmt
            .query_map(params![message_id], |row| {
                Ok(EditHistoryEntry {
                    old_text: row.get(0)?,
                    edited_at: row.get(1)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // --- channels ---

    /// Most-recent-first scan, reversed so the caller gets chronological
    /// order.
    pub fn channel_messages(&self, channel: &str, limit: i64) -> rusqlite::Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.channel = ?1
             ORDER BY m.timestamp DESC LIMIT ?2"
        ))?;
        let mut messages: Vec<Message> = stmt
            .query_map(params![channel, limit], map_message)?
            .filter_map(|r| r.ok())
            .collect();
        messages.reverse();
        Ok(messages)
    }

    pub fn list_channels(&self, limit: i64) -> rusqlite::Result<Vec<ChannelStat>> {
        let mut stmt = self.conn.prepare(
            "SELECT channel, COUNT(*), MAX(timestamp) AS last_used FROM messages
             GROUP BY channel ORDER BY last_used DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(ChannelStat {
                    channel: row.get(0)?,
                    message_count: row.get(1)?,
                    last_used: row.get(2)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn search_channels(&self, prefix: &str, limit: i64) -> rusqlite::Result<Vec<ChannelStat>> {
        let escaped = prefix
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let mut stmt = self.conn.prepare(
            "SELECT channel, COUNT(*), MAX(timestamp) AS last_used FROM messages
             WHERE channel LIKE ?1 ESCAPE '\\'
             GROUP BY channel ORDER BY last_used DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![format!("{escaped}%"), limit], |row| {
                Ok(ChannelStat {
                    channel: row.get(0)?,
                    message_count: row.get(1)?,
                    last_used: row.get(2)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // --- threads ---

    pub fn insert_thread_edge(
        &self,
        parent_message_id: &str,
        reply_message_id: &str,
        reply_timestamp: i64,
    ) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO threads (parent_message_id, reply_message_id, reply_timestamp)
             VALUES (?1, ?2, ?3)",
            params![parent_message_id, reply_message_id, reply_timestamp],
        )?;
        Ok(())
    }

    pub fn reply_count(&self, parent_message_id: &str) -> i64 {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM threads WHERE parent_message_id = ?1",
                params![parent_message_id],
                |r| r.get(0),
            )
            .unwrap_or(0)
    }

    pub fn direct_replies(&self, parent_message_id: &str) -> rusqlite::Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages m
             JOIN threads t ON t.reply_message_id = m.message_id
             WHERE t.parent_message_id = ?1 ORDER BY m.timestamp ASC"
        ))?;
        let rows = stmt
            .query_map(params![parent_message_id], map_message)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Transitive reply closure, breadth-first, bounded at `max_depth`
    /// levels. Replies form a DAG (a reply's parent always exists before
    /// the reply), so the `seen` set is belt-and-braces against bad data.
    pub fn nested_replies(
        &self,
        parent_message_id: &str,
        max_depth: usize,
    ) -> rusqlite::Result<Vec<Message>> {
        let mut out: Vec<Message> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(parent_message_id.to_string());
        let mut frontier = vec![parent_message_id.to_string()];

        for _ in 0..max_depth {
            if frontier.is_empty() {
                break;
            }
            let mut next = Vec::new();
            for parent in &frontier {
                for reply in self.direct_replies(parent)? {
                    if seen.insert(reply.message_id.clone()) {
                        next.push(reply.message_id.clone());
                        out.push(reply);
                    }
                }
            }
            frontier = next;
        }

        out.sort_by_key(|m| m.timestamp);
        Ok(out)
    }

    // --- room metadata ---

    pub fn get_meta(&self, key: &str) -> Option<String> {
        self.conn
            .query_row(
                "SELECT value FROM room_metadata WHERE key = ?1",
                params![key],
                |r| r.get(0),
            )
            .optional()
            .ok()
            .flatten()
    }

    pub fn set_meta(&self, key: &str, value: &str) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO room_metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete_meta(&self, key: &str) -> rusqlite::Result<()> {
        self.conn
            .execute("DELETE FROM room_metadata WHERE key = ?1", params![key])?;
        Ok(())
    }

    // --- file references ---

    pub fn insert_file_reference(&self, message_id: &str, file_key: &str) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO file_references (message_id, file_key) VALUES (?1, ?2)",
            params![message_id, file_key],
        )?;
        Ok(())
    }

    /// Every blob key referenced by this room; consumed by destruction.
    pub fn file_keys(&self) -> rusqlite::Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT file_key FROM file_references")?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // --- pins ---

    pub fn pin_message(&self, message_id: &str, channel: &str, pinned_at: i64) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO pins (message_id, channel, pinned_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(message_id) DO UPDATE SET channel = excluded.channel, pinned_at = excluded.pinned_at",
            params![message_id, channel, pinned_at],
        )?;
        Ok(())
    }

    /// Returns false when nothing was pinned.
    pub fn unpin_message(&self, message_id: &str) -> rusqlite::Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM pins WHERE message_id = ?1", params![message_id])?;
        Ok(n > 0)
    }

    pub fn list_pins(&self, channel: Option<&str>) -> rusqlite::Result<Vec<PinnedMessage>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS}, p.pinned_at FROM pins p
             JOIN messages m ON m.message_id = p.message_id
             {} ORDER BY p.pinned_at ASC",
            if channel.is_some() { "WHERE p.channel = ?1" } else { "" }
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = match channel {
            Some(c) => stmt
                .query_map(params![c], map_pinned)?
                .filter_map(|r| r.ok())
                .collect(),
            None => stmt
                .query_map([], map_pinned)?
                .filter_map(|r| r.ok())
                .collect(),
        };
        Ok(rows)
    }

    // --- export ---

    pub fn all_messages(&self) -> rusqlite::Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages m ORDER BY m.timestamp ASC"
        ))?;
        let rows = stmt
            .query_map([], map_message)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}
