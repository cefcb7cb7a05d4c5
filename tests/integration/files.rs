use crate::common::test_client;
use rocket::http::{Header, Status};

const BOUNDARY: &str = "roomcast-test-boundary";

fn multipart_body(file_name: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_header() -> Header<'static> {
    Header::new(
        "Content-Type",
        format!("multipart/form-data; boundary={BOUNDARY}"),
    )
}

#[test]
fn test_upload_then_download_roundtrip() {
    let client = test_client();
    let res = client
        .post("/api/room/uploads/upload")
        .header(multipart_header())
        .body(multipart_body("note.txt", "text/plain", b"hello blob"))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let upload: serde_json::Value = res.into_json().unwrap();
    assert_eq!(upload["fileName"], "note.txt");
    assert_eq!(upload["fileSize"], 10);
    let url = upload["fileUrl"].as_str().unwrap().to_string();
    assert!(url.starts_with("/files/"));

    let res = client.get(&url).dispatch();
    assert_eq!(res.status(), Status::Ok);
    assert_eq!(
        res.headers().get_one("Cache-Control"),
        Some("public, max-age=31536000")
    );
    assert!(res.headers().get_one("ETag").is_some());
    let content_type = res.headers().get_one("Content-Type").unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));
    assert_eq!(res.into_bytes().unwrap(), b"hello blob".to_vec());
}

#[test]
fn test_download_of_missing_blob_is_404() {
    let client = test_client();
    let res = client.get("/files/no-such-key").dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn test_upload_to_overlong_room_name_is_404() {
    let client = test_client();
    let long = "x".repeat(33);
    let res = client
        .post(format!("/api/room/{long}/upload"))
        .header(multipart_header())
        .body(multipart_body("a.bin", "application/octet-stream", b"x"))
        .dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn test_upload_boundary_at_exactly_10mb() {
    let client = test_client();
    let exactly = vec![b'a'; 10 * 1024 * 1024];
    let res = client
        .post("/api/room/uploads/upload")
        .header(multipart_header())
        .body(multipart_body("big.bin", "application/octet-stream", &exactly))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let upload: serde_json::Value = res.into_json().unwrap();
    assert_eq!(upload["fileSize"], 10 * 1024 * 1024);

    let over = vec![b'a'; 10 * 1024 * 1024 + 1];
    let res = client
        .post("/api/room/uploads/upload")
        .header(multipart_header())
        .body(multipart_body("toobig.bin", "application/octet-stream", &over))
        .dispatch();
    assert_eq!(res.status(), Status::PayloadTooLarge);
}
