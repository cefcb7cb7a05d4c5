use crate::common::{drain_frames, join_room, room_handle, test_client};
use rocket::http::{ContentType, Status};

#[test]
fn test_countdown_bounds_are_enforced() {
    let client = test_client();
    for (countdown, expected) in [
        (9, Status::BadRequest),
        (10, Status::Ok),
        (86_400, Status::Ok),
        (86_401, Status::BadRequest),
    ] {
        let res = client
            .post("/api/room/doom/destruction/start")
            .header(ContentType::JSON)
            .body(format!(r#"{{"countdownSeconds": {countdown}}}"#))
            .dispatch();
        assert_eq!(res.status(), expected, "countdown {countdown}");
    }
    // leave the room unscheduled
    let res = client.post("/api/room/doom/destruction/cancel").dispatch();
    assert_eq!(res.status(), Status::Ok);
}

#[test]
fn test_start_broadcasts_and_cancel_announces() {
    let client = test_client();
    let handle = room_handle(&client, "ticking");
    let (_alice, mut rx) = join_room(&client, &handle, "ticking", "alice");

    let res = client
        .post("/api/room/ticking/destruction/start")
        .header(ContentType::JSON)
        .body(r#"{"countdownSeconds": 60}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let started: serde_json::Value = res.into_json().unwrap();
    let destruction_time = started["destructionTime"].as_i64().unwrap();
    assert!(started["countdown"] == 60);

    crate::common::sync_room(&client, "ticking");
    let frames = drain_frames(&mut rx);
    let update = frames
        .iter()
        .find(|f| f["destructionUpdate"].is_object())
        .expect("destruction broadcast");
    assert_eq!(update["destructionUpdate"]["countdown"], 60);
    assert_eq!(update["destructionUpdate"]["destructionTime"], destruction_time);

    let res = client.post("/api/room/ticking/destruction/cancel").dispatch();
    assert_eq!(res.status(), Status::Ok);
    crate::common::sync_room(&client, "ticking");
    let frames = drain_frames(&mut rx);
    assert!(frames.iter().any(|f| f["destructionUpdate"]["cancelled"] == true));
}

#[test]
fn test_restart_replaces_the_earlier_schedule() {
    let client = test_client();
    let first = client
        .post("/api/room/rearm/destruction/start")
        .header(ContentType::JSON)
        .body(r#"{"countdownSeconds": 60}"#)
        .dispatch();
    let first: serde_json::Value = first.into_json().unwrap();

    let second = client
        .post("/api/room/rearm/destruction/start")
        .header(ContentType::JSON)
        .body(r#"{"countdownSeconds": 3600}"#)
        .dispatch();
    let second: serde_json::Value = second.into_json().unwrap();

    assert!(
        second["destructionTime"].as_i64().unwrap()
            > first["destructionTime"].as_i64().unwrap()
    );
    client.post("/api/room/rearm/destruction/cancel").dispatch();
}

#[test]
fn test_cancel_without_schedule_is_idempotent() {
    let client = test_client();
    for _ in 0..2 {
        let res = client.post("/api/room/calm/destruction/cancel").dispatch();
        assert_eq!(res.status(), Status::Ok);
    }
}
