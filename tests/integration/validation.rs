use crate::common::{drain_frames, join_room, room_handle, send_message, test_client};
use rocket::http::Status;
use serde_json::json;

#[test]
fn test_room_name_length_routing() {
    let client = test_client();

    // 32 characters: derived identity
    let max_name = "n".repeat(32);
    let res = client.get(format!("/api/room/{max_name}/info")).dispatch();
    assert_eq!(res.status(), Status::Ok);

    // 33 characters: rejected
    let long_name = "n".repeat(33);
    let res = client.get(format!("/api/room/{long_name}/info")).dispatch();
    assert_eq!(res.status(), Status::NotFound);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["error"], "Name too long");

    // 64 hex characters: direct identity
    let hex_id = "c0".repeat(32);
    let res = client.get(format!("/api/room/{hex_id}/info")).dispatch();
    assert_eq!(res.status(), Status::Ok);

    // 65 characters: rejected
    let over_hex = format!("{hex_id}f");
    let res = client.get(format!("/api/room/{over_hex}/info")).dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn test_derived_and_direct_identities_are_distinct_rooms() {
    let client = test_client();
    let handle = room_handle(&client, "alpha");
    let (alice, _rx) = join_room(&client, &handle, "alpha", "alice");
    send_message(&client, &handle, "alpha", alice, json!({"message": "only in alpha"}));

    let other: Vec<serde_json::Value> = client
        .get("/api/room/beta/channel/general/messages")
        .dispatch()
        .into_json()
        .unwrap();
    assert!(other.is_empty());

    let alpha: Vec<serde_json::Value> = client
        .get("/api/room/alpha/channel/general/messages")
        .dispatch()
        .into_json()
        .unwrap();
    assert_eq!(alpha.len(), 1);
}

#[test]
fn test_message_and_channel_length_limits_on_ingress() {
    let client = test_client();
    let handle = room_handle(&client, "limits");
    let (alice, mut rx) = join_room(&client, &handle, "limits", "alice");

    send_message(&client, &handle, "limits", alice, json!({"message": "x".repeat(6000)}));
    send_message(&client, &handle, "limits", alice, json!({"message": "x".repeat(6001)}));
    send_message(
        &client,
        &handle,
        "limits",
        alice,
        json!({"message": "ok", "channel": "c".repeat(101)}),
    );

    let frames = drain_frames(&mut rx);
    let errors: Vec<&str> = frames
        .iter()
        .filter_map(|f| f["error"].as_str())
        .collect();
    assert_eq!(errors, vec!["Message too long.", "Channel name too long."]);

    // only the 6000-char message made it through
    let messages: Vec<serde_json::Value> = client
        .get("/api/room/limits/channel/general/messages")
        .dispatch()
        .into_json()
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["message"].as_str().unwrap().len(), 6000);
}

#[test]
fn test_file_sentinel_skips_the_length_limit() {
    let client = test_client();
    let handle = room_handle(&client, "filemsg");
    let (alice, mut rx) = join_room(&client, &handle, "filemsg", "alice");

    let long_name = "n".repeat(6100);
    send_message(
        &client,
        &handle,
        "filemsg",
        alice,
        json!({"message": format!("FILE:/files/k1|{long_name}|text/plain")}),
    );
    let frames = drain_frames(&mut rx);
    assert!(frames.iter().all(|f| f.get("error").is_none()));
}

#[test]
fn test_server_assigns_message_id_when_missing() {
    let client = test_client();
    let handle = room_handle(&client, "assigned");
    let (alice, _rx) = join_room(&client, &handle, "assigned", "alice");
    send_message(&client, &handle, "assigned", alice, json!({"message": "no id"}));

    let messages: Vec<serde_json::Value> = client
        .get("/api/room/assigned/channel/general/messages")
        .dispatch()
        .into_json()
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert!(!messages[0]["messageId"].as_str().unwrap().is_empty());
}

#[test]
fn test_duplicate_message_id_reports_an_error_to_the_author() {
    let client = test_client();
    let handle = room_handle(&client, "dups");
    let (alice, mut rx) = join_room(&client, &handle, "dups", "alice");
    send_message(&client, &handle, "dups", alice, json!({"message": "one", "messageId": "same"}));
    send_message(&client, &handle, "dups", alice, json!({"message": "two", "messageId": "same"}));

    let frames = drain_frames(&mut rx);
    assert!(frames.iter().any(|f| f.get("error").is_some()));

    // only the first insert survived
    let messages: Vec<serde_json::Value> = client
        .get("/api/room/dups/channel/general/messages")
        .dispatch()
        .into_json()
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["message"], "one");
}
