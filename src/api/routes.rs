use axum::{Router, routing::{get, post}};
use axum::extract::DefaultBodyLimit;
use std::sync::Arc;
use tower_http::cors::{CorsLayer, AllowOrigin};
use axum::http::Method;
use crate::AppState;
use crate::api::{handlers, handlers_face};

/// Event pictures are phone-camera sized; leave room above the provider limit.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(vec![Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(vec![axum::http::header::CONTENT_TYPE, axum::http::header::ACCEPT, axum::http::header::AUTHORIZATION]);

    // Segments after `/faces/` share one parameter name so the router accepts them.
    let api = Router::new()
        .route("/events/:id/status", get(handlers_face::get_status))
        .route("/events/:id/picture", get(handlers_face::get_picture).put(handlers_face::upload_picture))
        .route("/events/:id/picture/metadata", get(handlers_face::get_picture_metadata))
        .route("/events/:id/faces", get(handlers_face::list_faces).post(handlers_face::add_manual_face))
        .route("/events/:id/faces/metadata", get(handlers_face::get_faces_metadata))
        .route("/events/:id/faces/:filename", get(handlers_face::get_face_image).delete(handlers_face::delete_face))
        .route("/events/:id/faces/:filename/avatar", post(handlers_face::upload_avatar))
        .route("/events/:id/faces/:filename/qq-avatar", post(handlers_face::request_qq_avatar))
        .route("/events/:id/faces/:filename/qq-profile", get(handlers_face::get_face_qq_profile))
        .route("/events/:id/avatars/:filename", get(handlers_face::get_avatar))
        .route("/events/:id/qq-profiles/:qq", get(handlers_face::get_qq_nickname))
        .route("/logs", get(handlers::list_logs));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

