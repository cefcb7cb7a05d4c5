use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::http::{ContentType, Header, Status};
use rocket::response::{self, Responder, Response};
use rocket::{FromForm, Request, State, get, post};
use rocket::serde::json::Json;
use std::io::Cursor;
use std::sync::Arc;

use super::{ApiError, api_error, resolve_room_id};
use crate::blob::{BlobStore, generate_blob_key};
use crate::models::UploadResponse;
use crate::registry::RoomRegistry;

/// Upload ceiling; anything past this is 413.
const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(FromForm)]
pub struct UploadForm<'r> {
    pub file: TempFile<'r>,
}

#[post("/api/room/<name>/upload", data = "<form>")]
pub async fn upload_file(
    registry: &State<RoomRegistry>,
    blobs: &State<Arc<BlobStore>>,
    name: &str,
    form: Form<UploadForm<'_>>,
) -> Result<Json<UploadResponse>, ApiError> {
    // the room must at least resolve; the blob itself lives outside it
    resolve_room_id(registry, name)?;

    let file = &form.file;
    if file.len() > MAX_UPLOAD_BYTES {
        return Err(api_error(Status::PayloadTooLarge, "File too large (max 10 MB)"));
    }

    let file_name = file
        .raw_name()
        .and_then(|n| n.as_str())
        .unwrap_or("file")
        .to_string();
    let content_type = file
        .content_type()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let mut body = Vec::with_capacity(file.len() as usize);
    let mut reader = file
        .open()
        .await
        .map_err(|e| api_error(Status::InternalServerError, &e.to_string()))?;
    rocket::tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut body)
        .await
        .map_err(|e| api_error(Status::InternalServerError, &e.to_string()))?;

    let key = generate_blob_key();
    blobs
        .put(&key, &body, &content_type)
        .map_err(|e| api_error(Status::InternalServerError, &e.to_string()))?;

    Ok(Json(UploadResponse {
        file_url: format!("/files/{key}"),
        file_name,
        file_type: content_type,
        file_size: body.len() as i64,
    }))
}

/// Blob body with its stored content type, an etag and a long-lived cache
/// header (blob keys are immutable once written).
pub struct BlobResponse {
    body: Vec<u8>,
    content_type: String,
    etag: String,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for BlobResponse {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'o> {
        let content_type =
            ContentType::parse_flexible(&self.content_type).unwrap_or(ContentType::Binary);
        Response::build()
            .header(content_type)
            .header(Header::new("Cache-Control", "public, max-age=31536000"))
            .header(Header::new("ETag", format!("\"{}\"", self.etag)))
            .sized_body(self.body.len(), Cursor::new(self.body))
            .ok()
    }
}

#[get("/files/<key>")]
pub fn download_file(
    blobs: &State<Arc<BlobStore>>,
    key: &str,
) -> Result<BlobResponse, ApiError> {
    let blob = blobs
        .get(key)
        .map_err(|e| api_error(Status::InternalServerError, &e.to_string()))?
        .ok_or_else(|| api_error(Status::NotFound, "File not found"))?;
    Ok(BlobResponse {
        body: blob.body,
        content_type: blob.content_type,
        etag: blob.etag,
    })
}
