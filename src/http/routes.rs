use axum::{routing::get, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn albums() -> Router<AppState> {
    Router::new()
        .route(
            "/albums",
            get(handlers::list_albums).post(handlers::create_album),
        )
        .route(
            "/albums/:album_id",
            get(handlers::get_album)
                .put(handlers::update_album)
                .delete(handlers::delete_album),
        )
}

pub fn photos() -> Router<AppState> {
    Router::new()
        .route(
            "/albums/:album_id/photos",
            get(handlers::list_photos).post(handlers::add_photo),
        )
        .route(
            "/albums/:album_id/photos/:photo_id",
            get(handlers::get_photo)
                .patch(handlers::update_photo)
                .delete(handlers::delete_photo),
        )
        .route(
            "/albums/:album_id/photos/:photo_id/image",
            get(handlers::photo_image),
        )
}

pub fn files() -> Router<AppState> {
    Router::new().route("/files/:user_id/:album_id/*file", get(handlers::public_file))
}
