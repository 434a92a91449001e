use std::sync::Arc;
use axum::{extract::{State, Path, Multipart}, http::{StatusCode, header}, Json};
use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};
use image::ImageFormat;
use serde::Deserialize;
use tracing::{error, warn};
use crate::AppState;
use crate::db::EventGate;
use crate::error::{FaceError, FaceResult};
use crate::models::ProcessStatus;
use crate::pipeline::avatar::fallback_nickname;
use crate::pipeline::face::{FaceProcessor, ManualFace};
use crate::utils::path::{extension, is_plain_filename, AVATAR_EXTENSIONS, ORIGINAL_FILENAME};

type ApiResult = Result<Response, Response>;

fn error_json(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn face_error(e: FaceError) -> Response {
    let status = match &e {
        FaceError::InvalidBox(_) | FaceError::InvalidFilename(_) | FaceError::InvalidAccount(_) => StatusCode::BAD_REQUEST,
        FaceError::ArtifactNotFound(_) => StatusCode::NOT_FOUND,
        FaceError::ImageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        FaceError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("request failed: {}", e);
        return error_json(status, "Internal error");
    }
    let message = match &e {
        FaceError::ArtifactNotFound(_) => "Not found".to_string(),
        other => other.to_string(),
    };
    error_json(status, message)
}

fn parse_event_id(raw: &str) -> Result<i64, Response> {
    raw.parse::<i64>().map_err(|_| error_json(StatusCode::BAD_REQUEST, "Invalid event ID"))
}

fn plain_filename(raw: &str) -> Result<(), Response> {
    if is_plain_filename(raw) {
        Ok(())
    } else {
        Err(error_json(StatusCode::BAD_REQUEST, "Invalid filename"))
    }
}

/// Looks the event up in the registry; 404 when absent, 403 when `require_open`
/// and the event is closed.
async fn gate(state: &AppState, event_id: i64, require_open: bool) -> Result<EventGate, Response> {
    let registry = state.registry.clone();
    let res = tokio::task::spawn_blocking(move || registry.lookup(event_id)).await;
    match res {
        Ok(Ok(Some(gate))) if require_open && !gate.is_open => Err(error_json(StatusCode::FORBIDDEN, "Event is not open")),
        Ok(Ok(Some(gate))) => Ok(gate),
        Ok(Ok(None)) => Err(error_json(StatusCode::NOT_FOUND, "Event not found")),
        Ok(Err(e)) => {
            error!(event_id, "event registry lookup failed: {}", e);
            Err(error_json(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
        Err(_) => Err(error_json(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")),
    }
}

/// Runs a processor operation on the blocking pool.
async fn run<T, F>(state: &AppState, f: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce(&FaceProcessor) -> FaceResult<T> + Send + 'static,
{
    let processor = state.pipeline.processor().clone();
    match tokio::task::spawn_blocking(move || f(&processor)).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(face_error(e)),
        Err(e) => {
            error!("blocking task failed: {}", e);
            Err(error_json(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
    }
}

fn image_response(bytes: Vec<u8>, name: &str) -> Response {
    let content_type = match image::guess_format(&bytes) {
        Ok(ImageFormat::Jpeg) => "image/jpeg".to_string(),
        Ok(ImageFormat::Png) => "image/png".to_string(),
        Ok(ImageFormat::Gif) => "image/gif".to_string(),
        Ok(ImageFormat::WebP) => "image/webp".to_string(),
        _ => mime_guess::from_path(name).first_or_octet_stream().to_string(),
    };
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type), (header::CACHE_CONTROL, "no-cache".to_string())],
        bytes,
    )
        .into_response()
}

/// The `file` part of a multipart body: client file name and bytes.
async fn read_file_field(multipart: &mut Multipart) -> Result<(String, Vec<u8>), Response> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(error_json(StatusCode::BAD_REQUEST, "No file uploaded")),
            Err(e) => return Err(error_json(StatusCode::BAD_REQUEST, format!("Invalid multipart body: {}", e))),
        };
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| error_json(StatusCode::BAD_REQUEST, format!("Failed to read upload: {}", e)))?;
        return Ok((name, bytes.to_vec()));
    }
}

fn accepted_image_ext(name: &str) -> Result<String, Response> {
    match extension(name) {
        Some(ext) if AVATAR_EXTENSIONS.contains(&ext.as_str()) => Ok(ext),
        _ => Err(error_json(StatusCode::BAD_REQUEST, "Only jpg, jpeg, png allowed")),
    }
}

pub async fn get_status(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let event_id = parse_event_id(&id)?;
    let status = run(&state, move |p| Ok(p.status(event_id))).await?;
    let mut body = serde_json::to_value(status)
        .map_err(|_| error_json(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))?;
    body["message"] = serde_json::Value::String(status.message());
    let code = match status {
        ProcessStatus::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::OK,
    };
    Ok((code, Json(body)).into_response())
}

pub async fn get_picture(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let event_id = parse_event_id(&id)?;
    let bytes = run(&state, move |p| p.read_original(event_id)).await?;
    Ok(image_response(bytes, ORIGINAL_FILENAME))
}

pub async fn get_picture_metadata(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let event_id = parse_event_id(&id)?;
    let record = run(&state, move |p| Ok(p.store().load(event_id).ok().flatten())).await?;
    match record {
        Some(record) => Ok((StatusCode::OK, Json(serde_json::json!({
            "pic_info": record.image_info,
            "event_id": event_id
        }))).into_response()),
        None => Err(error_json(StatusCode::NOT_FOUND, "Metadata not found")),
    }
}

pub async fn upload_picture(State(state): State<Arc<AppState>>, Path(id): Path<String>, mut multipart: Multipart) -> ApiResult {
    let event_id = parse_event_id(&id)?;
    gate(&state, event_id, false).await?;
    let (name, bytes) = read_file_field(&mut multipart).await?;
    accepted_image_ext(&name)?;
    if bytes.is_empty() {
        return Err(error_json(StatusCode::BAD_REQUEST, "No file uploaded"));
    }
    // Detection continues in the background; the ticket is not awaited.
    let _ticket = state.pipeline.on_photo_uploaded(event_id, bytes).await.map_err(face_error)?;
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({
        "message": "Image uploaded, processing faces",
        "event_id": event_id
    }))).into_response())
}

pub async fn list_faces(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let event_id = parse_event_id(&id)?;
    let faces = run(&state, move |p| p.list_faces(event_id)).await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "faces": faces, "event_id": event_id }))).into_response())
}

pub async fn get_faces_metadata(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let event_id = parse_event_id(&id)?;
    let record = run(&state, move |p| Ok(p.store().load(event_id))).await?;
    match record {
        Ok(Some(record)) => Ok((StatusCode::OK, Json(record)).into_response()),
        Ok(None) => Err(error_json(StatusCode::NOT_FOUND, "Metadata not found")),
        Err(e) => {
            warn!(event_id, "metadata unreadable: {}", e);
            Err(error_json(StatusCode::NOT_FOUND, "Metadata not found"))
        }
    }
}

pub async fn get_face_image(State(state): State<Arc<AppState>>, Path((id, filename)): Path<(String, String)>) -> ApiResult {
    let event_id = parse_event_id(&id)?;
    plain_filename(&filename)?;
    let name = filename.clone();
    let bytes = run(&state, move |p| p.read_face(event_id, &name)).await?;
    Ok(image_response(bytes, &filename))
}

pub async fn add_manual_face(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<ManualFace>, JsonRejection>,
) -> ApiResult {
    let event_id = parse_event_id(&id)?;
    let Json(req) = body.map_err(|e| error_json(StatusCode::BAD_REQUEST, format!("Invalid request: {}", e.body_text())))?;
    gate(&state, event_id, false).await?;
    let face = run(&state, move |p| p.add_manual_face(event_id, req)).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({
        "message": "Face added",
        "face_info": face
    }))).into_response())
}

pub async fn delete_face(State(state): State<Arc<AppState>>, Path((id, filename)): Path<(String, String)>) -> ApiResult {
    let event_id = parse_event_id(&id)?;
    plain_filename(&filename)?;
    gate(&state, event_id, false).await?;
    run(&state, move |p| p.delete_face(event_id, &filename)).await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "message": "Face deleted" }))).into_response())
}

pub async fn upload_avatar(
    State(state): State<Arc<AppState>>,
    Path((id, face)): Path<(String, String)>,
    mut multipart: Multipart,
) -> ApiResult {
    let event_id = parse_event_id(&id)?;
    plain_filename(&face)?;
    gate(&state, event_id, true).await?;
    let (name, bytes) = read_file_field(&mut multipart).await?;
    let ext = accepted_image_ext(&name)?;
    let filename = run(&state, move |p| p.upload_avatar(event_id, &face, &ext, &bytes)).await?;
    Ok((StatusCode::OK, Json(serde_json::json!({
        "message": "Avatar uploaded",
        "filename": filename
    }))).into_response())
}

pub async fn get_avatar(State(state): State<Arc<AppState>>, Path((id, filename)): Path<(String, String)>) -> ApiResult {
    let event_id = parse_event_id(&id)?;
    plain_filename(&filename)?;
    let name = filename.clone();
    let bytes = run(&state, move |p| p.read_avatar(event_id, &name)).await?;
    Ok(image_response(bytes, &filename))
}

pub async fn get_qq_nickname(State(state): State<Arc<AppState>>, Path((_id, qq)): Path<(String, String)>) -> ApiResult {
    let qq_number = qq.clone();
    let processor = state.pipeline.processor().clone();
    let res = tokio::task::spawn_blocking(move || processor.qq_nickname(&qq_number))
        .await
        .unwrap_or(Err(FaceError::QueueClosed));
    let body = match res {
        Ok(nickname) => serde_json::json!({ "nickname": nickname, "qq_number": qq, "success": true }),
        Err(e) => serde_json::json!({
            "nickname": fallback_nickname(&qq),
            "qq_number": qq,
            "success": false,
            "error": e.to_string()
        }),
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}

#[derive(Deserialize)]
pub struct QqAvatarReq {
    #[serde(rename = "qqNumber")]
    qq_number: String,
}

pub async fn request_qq_avatar(
    State(state): State<Arc<AppState>>,
    Path((id, face)): Path<(String, String)>,
    body: Result<Json<QqAvatarReq>, JsonRejection>,
) -> ApiResult {
    let event_id = parse_event_id(&id)?;
    plain_filename(&face)?;
    let Json(req) = body.map_err(|_| error_json(StatusCode::BAD_REQUEST, "Missing qqNumber"))?;
    gate(&state, event_id, true).await?;
    let _ticket = state
        .pipeline
        .request_qq_avatar(event_id, face.clone(), req.qq_number.trim().to_string())
        .await
        .map_err(face_error)?;
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({
        "message": "QQ avatar download started",
        "face": face
    }))).into_response())
}

pub async fn get_face_qq_profile(State(state): State<Arc<AppState>>, Path((id, filename)): Path<(String, String)>) -> ApiResult {
    let event_id = parse_event_id(&id)?;
    plain_filename(&filename)?;
    let name = filename.clone();
    let sidecar = run(&state, move |p| p.face_qq_info(event_id, &name)).await?;
    let body = match sidecar {
        Some(info) => serde_json::json!({ "qq_number": info.qq_number, "filename": filename }),
        None => serde_json::json!({ "qq_number": null, "filename": filename }),
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}
