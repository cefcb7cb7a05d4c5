pub mod blob;
pub mod coordinator;
pub mod models;
pub mod rate_limit;
pub mod registry;
pub mod routes;
pub mod store;

use blob::BlobStore;
use rate_limit::{LimiterConfig, LimiterRegistry};
use registry::RoomRegistry;
use rocket_cors::CorsOptions;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

pub fn rocket() -> rocket::Rocket<rocket::Build> {
    let data_dir = env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());
    rocket_with_data_dir(&data_dir)
}

pub fn rocket_with_data_dir(data_dir: &str) -> rocket::Rocket<rocket::Build> {
    build_rocket(data_dir, LimiterConfig::from_env())
}

pub fn rocket_with_config(
    data_dir: &str,
    limiter_config: LimiterConfig,
) -> rocket::Rocket<rocket::Build> {
    build_rocket(data_dir, limiter_config)
}

fn build_rocket(data_dir: &str, limiter_config: LimiterConfig) -> rocket::Rocket<rocket::Build> {
    let data_dir = PathBuf::from(data_dir);
    let rooms_dir = data_dir.join("rooms");
    std::fs::create_dir_all(&rooms_dir).ok();

    let blobs = Arc::new(
        BlobStore::open(&data_dir.join("blobs.db")).expect("Failed to open blob store"),
    );
    let limiters = Arc::new(LimiterRegistry::new(limiter_config));
    let registry = RoomRegistry::new(rooms_dir, blobs.clone(), limiters);

    let cors = CorsOptions::default()
        .to_cors()
        .expect("Failed to create CORS");

    // Uploads are capped at 10MB by the handler; the transport limits leave
    // headroom for the multipart framing
    let figment = rocket::Config::figment()
        .merge(("limits.file", 11 * 1024 * 1024))
        .merge(("limits.data-form", 12 * 1024 * 1024))
        .merge(("limits.json", 1024 * 1024));

    rocket::custom(figment)
        .manage(registry)
        .manage(blobs)
        .attach(cors)
        .register(
            "/",
            rocket::catchers![
                routes::not_found,
                routes::payload_too_large,
                routes::internal_error,
            ],
        )
        .mount(
            "/",
            rocket::routes![
                routes::health,
                routes::create_room,
                routes::websocket,
                routes::upload_file,
                routes::download_file,
                routes::list_channels,
                routes::channel_messages,
                routes::search_channels,
                routes::get_thread,
                routes::edit_message,
                routes::delete_message,
                routes::get_edit_history,
                routes::pin_message,
                routes::unpin_message,
                routes::list_pins,
                routes::get_room_info,
                routes::update_room_info,
                routes::start_destruction,
                routes::cancel_destruction,
                routes::export_room,
            ],
        )
        .attach(rocket::fairing::AdHoc::on_liftoff("Data Directory", {
            move |_rocket| {
                Box::pin(async move {
                    println!("📦 Room data under: {}", data_dir.display());
                })
            }
        }))
}
