use rocket::local::blocking::Client;
use std::path::PathBuf;
use tokio::sync::mpsc;

use roomcast::coordinator::{CoordinatorHandle, SessionEvent, SessionId};
use roomcast::rate_limit::LimiterConfig;
use roomcast::registry::RoomRegistry;

/// Wrapper around Client that auto-deletes the temp data directory on drop.
/// Uses Option<Client> so the SQLite connections close before the files go.
pub struct TestClient {
    client: Option<Client>,
    data_dir: PathBuf,
}

impl Drop for TestClient {
    fn drop(&mut self) {
        drop(self.client.take());
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}

impl std::ops::Deref for TestClient {
    type Target = Client;
    fn deref(&self) -> &Client {
        self.client.as_ref().unwrap()
    }
}

pub fn test_client() -> TestClient {
    test_client_with_config(LimiterConfig::default())
}

pub fn test_client_with_config(config: LimiterConfig) -> TestClient {
    // unique temp dir for each test (avoids parallel test contention)
    let data_dir = std::env::temp_dir().join(format!(
        "roomcast_test_{:032x}",
        uuid::Uuid::new_v4().as_u128()
    ));
    let rocket = roomcast::rocket_with_config(data_dir.to_str().unwrap(), config);
    let client = Client::tracked(rocket).expect("valid rocket instance");
    TestClient {
        client: Some(client),
        data_dir,
    }
}

/// Any request through the room's coordinator is processed after everything
/// already queued, so one cheap GET makes prior stream frames observable.
pub fn sync_room(client: &Client, name: &str) {
    let res = client.get(format!("/api/room/{name}/info")).dispatch();
    assert_eq!(res.status(), rocket::http::Status::Ok);
}

/// Coordinator handle for a room, spawning it on the server's runtime first.
pub fn room_handle(client: &Client, name: &str) -> CoordinatorHandle {
    sync_room(client, name);
    let registry = client.rocket().state::<RoomRegistry>().expect("registry state");
    let room_id = registry.resolve(name).expect("room name resolves");
    registry.lookup(&room_id).expect("coordinator running")
}

/// Open a session and complete the handshake, draining frames up to
/// `{ready: true}`.
pub fn join_room(
    client: &Client,
    handle: &CoordinatorHandle,
    room: &str,
    username: &str,
) -> (SessionId, mpsc::UnboundedReceiver<SessionEvent>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = handle.connect(format!("test-ip-{username}"), tx);
    handle.inbound(session, serde_json::json!({"name": username}).to_string());
    sync_room(client, room);
    loop {
        match rx.try_recv() {
            Ok(SessionEvent::Frame(text)) => {
                let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
                if frame.get("ready").is_some() {
                    break;
                }
            }
            other => panic!("handshake did not complete: {other:?}"),
        }
    }
    (session, rx)
}

/// Send one message frame and wait for the coordinator to process it.
pub fn send_message(
    client: &Client,
    handle: &CoordinatorHandle,
    room: &str,
    session: SessionId,
    frame: serde_json::Value,
) {
    handle.inbound(session, frame.to_string());
    sync_room(client, room);
}

/// Everything currently buffered for a session, parsed.
pub fn drain_frames(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<serde_json::Value> {
    let mut frames = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let SessionEvent::Frame(text) = event {
            frames.push(serde_json::from_str(&text).unwrap());
        }
    }
    frames
}
