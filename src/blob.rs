use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;

/// Opaque key-value store for uploaded file bodies, with content-type
/// metadata. Shared between the upload/download routes and the room
/// coordinators (which delete referenced blobs on room destruction).
pub struct BlobStore {
    conn: Mutex<Connection>,
}

/// A stored blob as returned by `get`.
pub struct Blob {
    pub body: Vec<u8>,
    pub content_type: String,
    pub etag: String,
}

/// Generate an unguessable blob key: 32 hex chars.
pub fn generate_blob_key() -> String {
    format!("{:032x}", uuid::Uuid::new_v4().as_u128())
}

impl BlobStore {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS blobs (
                key TEXT PRIMARY KEY,
                content_type TEXT NOT NULL DEFAULT 'application/octet-stream',
                etag TEXT NOT NULL,
                data BLOB NOT NULL,
                created_at INTEGER NOT NULL
            );",
        )?;
        Ok(BlobStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn put(&self, key: &str, body: &[u8], content_type: &str) -> rusqlite::Result<()> {
        let etag = hex::encode(Sha256::digest(body));
        let now = chrono::Utc::now().timestamp_millis();
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO blobs (key, content_type, etag, data, created_at) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(key) DO UPDATE SET content_type = excluded.content_type,
                 etag = excluded.etag, data = excluded.data",
            params![key, content_type, &etag, body, now],
        )?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> rusqlite::Result<Option<Blob>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.query_row(
            "SELECT data, content_type, etag FROM blobs WHERE key = ?1",
            params![key],
            |row| {
                Ok(Blob {
                    body: row.get(0)?,
                    content_type: row.get(1)?,
                    etag: row.get(2)?,
                })
            },
        )
        .optional()
    }

    pub fn delete(&self, key: &str) -> rusqlite::Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute("DELETE FROM blobs WHERE key = ?1", params![key])?;
        Ok(())
    }
}
