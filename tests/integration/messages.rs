use crate::common::{drain_frames, join_room, room_handle, send_message, test_client};
use rocket::http::{ContentType, Status};
use serde_json::json;

#[test]
fn test_edit_message_roundtrip() {
    let client = test_client();
    let handle = room_handle(&client, "edits");
    let (alice, mut rx) = join_room(&client, &handle, "edits", "alice");
    send_message(&client, &handle, "edits", alice, json!({"message": "v1", "messageId": "m1"}));

    let res = client
        .put("/api/room/edits/message/m1")
        .header(ContentType::JSON)
        .body(r#"{"username": "alice", "newMessage": "v2"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let edited: serde_json::Value = res.into_json().unwrap();
    assert_eq!(edited["message"], "v2");
    assert!(edited["editedAt"].is_i64());

    // the edit was broadcast to the live session
    crate::common::sync_room(&client, "edits");
    let frames = drain_frames(&mut rx);
    assert!(frames.iter().any(|f| f["messageEdited"]["messageId"] == "m1"));

    // and the old text landed in the history
    let history: Vec<serde_json::Value> = client
        .get("/api/room/edits/message/m1/history")
        .dispatch()
        .into_json()
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["oldText"], "v1");
}

#[test]
fn test_edit_by_non_author_is_forbidden() {
    let client = test_client();
    let handle = room_handle(&client, "edits-auth");
    let (alice, _rx) = join_room(&client, &handle, "edits-auth", "alice");
    send_message(&client, &handle, "edits-auth", alice, json!({"message": "mine", "messageId": "m1"}));

    let res = client
        .put("/api/room/edits-auth/message/m1")
        .header(ContentType::JSON)
        .body(r#"{"username": "bob", "newMessage": "stolen"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["error"], "You can only edit your own messages");
}

#[test]
fn test_edit_of_file_message_is_rejected() {
    let client = test_client();
    let handle = room_handle(&client, "edits-file");
    let (alice, _rx) = join_room(&client, &handle, "edits-file", "alice");
    send_message(
        &client,
        &handle,
        "edits-file",
        alice,
        json!({"message": "FILE:/files/k1|photo.png|image/png", "messageId": "f1"}),
    );

    let res = client
        .put("/api/room/edits-file/message/f1")
        .header(ContentType::JSON)
        .body(r#"{"username": "alice", "newMessage": "edited"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["error"], "Cannot edit file messages");
}

#[test]
fn test_edit_missing_message_is_404() {
    let client = test_client();
    let res = client
        .put("/api/room/edits-404/message/ghost")
        .header(ContentType::JSON)
        .body(r#"{"username": "alice", "newMessage": "hello"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn test_delete_by_author_broadcasts_and_removes() {
    let client = test_client();
    let handle = room_handle(&client, "deletes");
    let (alice, mut rx) = join_room(&client, &handle, "deletes", "alice");
    send_message(&client, &handle, "deletes", alice, json!({"message": "gone soon", "messageId": "mX"}));

    let res = client
        .delete("/api/room/deletes/message/mX")
        .header(ContentType::JSON)
        .body(r#"{"username": "alice"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);

    crate::common::sync_room(&client, "deletes");
    let frames = drain_frames(&mut rx);
    assert!(frames.iter().any(|f| f["messageDeleted"] == "mX"));

    let messages: Vec<serde_json::Value> = client
        .get("/api/room/deletes/channel/general/messages")
        .dispatch()
        .into_json()
        .unwrap();
    assert!(messages.is_empty());
}

#[test]
fn test_delete_by_non_author_is_forbidden() {
    let client = test_client();
    let handle = room_handle(&client, "deletes-auth");
    let (alice, _rx) = join_room(&client, &handle, "deletes-auth", "alice");
    send_message(&client, &handle, "deletes-auth", alice, json!({"message": "mine", "messageId": "mX"}));

    let res = client
        .delete("/api/room/deletes-auth/message/mX")
        .header(ContentType::JSON)
        .body(r#"{"username": "bob"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Forbidden);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["error"], "You can only delete your own messages");
}

#[test]
fn test_delete_cascades_thread_and_history() {
    let client = test_client();
    let handle = room_handle(&client, "cascade");
    let (alice, _rx) = join_room(&client, &handle, "cascade", "alice");
    send_message(&client, &handle, "cascade", alice, json!({"message": "root", "messageId": "m1"}));
    send_message(
        &client,
        &handle,
        "cascade",
        alice,
        json!({"message": "re", "messageId": "m2", "replyTo": {"messageId": "m1"}}),
    );
    client
        .put("/api/room/cascade/message/m1")
        .header(ContentType::JSON)
        .body(r#"{"username": "alice", "newMessage": "root v2"}"#)
        .dispatch();

    client
        .delete("/api/room/cascade/message/m1")
        .header(ContentType::JSON)
        .body(r#"{"username": "alice"}"#)
        .dispatch();

    // the root is gone, so its thread and history 404
    assert_eq!(
        client.get("/api/room/cascade/thread/m1").dispatch().status(),
        Status::NotFound
    );
    assert_eq!(
        client
            .get("/api/room/cascade/message/m1/history")
            .dispatch()
            .status(),
        Status::NotFound
    );

    // the reply survives with its dangling replyTo
    let messages: Vec<serde_json::Value> = client
        .get("/api/room/cascade/channel/general/messages")
        .dispatch()
        .into_json()
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["messageId"], "m2");
    assert_eq!(messages[0]["replyTo"]["messageId"], "m1");
}
