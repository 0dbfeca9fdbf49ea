//! Defines every route exposed by the gateway.
//!
//! ## Structure
//! - **Users**
//!   - `POST /api/users/search`: look up user ids by phone number
//!
//! - **Messages**
//!   - `POST /api/messages/send`: text message
//!   - `POST /api/messages/send-image`: image message by `image_key`
//!   - `POST /api/messages/send-file`: file message by `file_key`
//!   - `GET|POST /api/messages/send-simple`: text to a `user_id`
//!
//! - **Files**
//!   - `POST /api/files/upload`: multipart `file`
//!   - `POST /api/files/upload-image`: multipart `image`
//!   - `GET  /api/files/list`: recent uploads
//!   - `GET  /api/files/{resource_key}`: one upload's metadata
//!   - `GET  /api/files/{resource_key}/view`: how to view an image
//!
//! Health probes sit at the root. `/`, the test pages (`/user-search`,
//! `/message-send`, `/image-test`, `/debug-image`, `/file-test`) and
//! `/static/*` are served from the configured directory.

use crate::{
    handlers::{
        file_handlers::{get_file, list_files, upload_file, upload_image, view_image},
        health_handlers::{api_index, healthz, readyz},
        message_handlers::{
            send_file_message, send_image_message, send_message, send_simple_get,
            send_simple_post,
        },
        user_handlers::search_user,
    },
    services::ingest::MAX_UPLOAD_BYTES,
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::path::Path;
use tower_http::{
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

/// Request body ceiling for upload routes: the payload ceiling plus room for
/// multipart framing and the small text fields.
const UPLOAD_BODY_LIMIT: usize = MAX_UPLOAD_BYTES + 1024 * 1024;

/// Test pages served from the static directory, besides `/` → `index.html`.
const PAGES: [(&str, &str); 5] = [
    ("/user-search", "user-search.html"),
    ("/message-send", "message-send.html"),
    ("/image-test", "image-test.html"),
    ("/debug-image", "debug_image.html"),
    ("/file-test", "file-test.html"),
];

/// Build and return the router for all gateway routes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes(static_dir: &str) -> Router<AppState> {
    let static_root = Path::new(static_dir);
    let mut pages =
        Router::new().route_service("/", ServeFile::new(static_root.join("index.html")));
    for (path, file) in PAGES {
        pages = pages.route_service(path, ServeFile::new(static_root.join(file)));
    }

    let uploads = Router::new()
        .route("/api/files/upload", post(upload_file))
        .route("/api/files/upload-image", post(upload_image))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT));

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api", get(api_index))
        .route("/api/", get(api_index))
        // users
        .route("/api/users/search", post(search_user))
        // messages
        .route("/api/messages/send", post(send_message))
        .route("/api/messages/send-image", post(send_image_message))
        .route("/api/messages/send-file", post(send_file_message))
        .route(
            "/api/messages/send-simple",
            get(send_simple_get).post(send_simple_post),
        )
        // files
        .merge(uploads)
        .route("/api/files/list", get(list_files))
        .route("/api/files/{resource_key}", get(get_file))
        .route("/api/files/{resource_key}/view", get(view_image))
        // static pages
        .merge(pages)
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
}
