use rocket::Request;
use rocket::serde::json::Json;
use rocket::get;

#[get("/api/health")]
pub fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "roomcast",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[rocket::catch(404)]
pub fn not_found(req: &Request) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "error": "Not found",
        "path": req.uri().path().as_str()
    }))
}

#[rocket::catch(413)]
pub fn payload_too_large() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "error": "Payload too large (uploads are capped at 10 MB)"
    }))
}

#[rocket::catch(500)]
pub fn internal_error() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "error": "Internal server error"
    }))
}
