use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use curio_core::error::ApiError;

use crate::auth::{SessionAuth, require_owner};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/uploads", post(upload_image))
        .route("/v1/audio/uploads", post(upload_audio))
}

pub fn read_router() -> Router<AppState> {
    Router::new().route("/v1/uploads/{upload_id}", get(get_upload))
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct UploadResponse {
    pub upload_id: Uuid,
    /// Always `image/jpeg` after preprocessing
    pub mime_type: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AudioUploadResponse {
    /// Pass as `audio_ref` in a conversation turn
    pub audio_ref: String,
    pub expires_at: DateTime<Utc>,
}

struct FilePart {
    content_type: String,
    file_name: Option<String>,
    bytes: Vec<u8>,
}

/// First multipart field named `field_name`. Other fields are ignored.
async fn read_file_field(multipart: &mut Multipart, field_name: &str) -> Result<FilePart, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(field_name) {
            continue;
        }
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?.to_vec();
        return Ok(FilePart {
            content_type,
            file_name,
            bytes,
        });
    }
    Err(AppError::Validation {
        message: format!("Multipart field '{field_name}' is required"),
        field: Some(field_name.to_string()),
        received: None,
        docs_hint: Some(format!(
            "Send multipart/form-data with the file in a field named '{field_name}'."
        )),
    })
}

/// Upload a photo
///
/// Accepts JPEG, PNG or WebP in the multipart field `image`. The image is
/// scanned, bounded in size and re-encoded as JPEG without metadata.
#[utoipa::path(
    post,
    path = "/v1/uploads",
    request_body(content_type = "multipart/form-data", description = "Field `image` holds the photo"),
    responses(
        (status = 201, description = "Upload stored", body = UploadResponse),
        (status = 400, description = "Missing field or undecodable image", body = ApiError),
        (status = 401, description = "Missing or invalid session", body = ApiError),
        (status = 413, description = "Image too large", body = ApiError),
        (status = 415, description = "Unsupported image type", body = ApiError)
    ),
    security(("session_auth" = [])),
    tag = "uploads"
)]
pub async fn upload_image(
    State(state): State<AppState>,
    auth: SessionAuth,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let part = read_file_field(&mut multipart, "image").await?;
    let record = state
        .sessions
        .store_image(
            &auth.session_id,
            part.file_name,
            &part.content_type,
            &part.bytes,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            upload_id: record.upload_id,
            mime_type: record.mime_type,
            expires_at: record.expires_at,
        }),
    ))
}

/// Upload a recorded question
///
/// Accepts a short clip in the multipart field `audio`. The returned
/// `audio_ref` is transcribed when used in a conversation turn.
#[utoipa::path(
    post,
    path = "/v1/audio/uploads",
    request_body(content_type = "multipart/form-data", description = "Field `audio` holds the clip"),
    responses(
        (status = 201, description = "Clip stored", body = AudioUploadResponse),
        (status = 400, description = "Missing field", body = ApiError),
        (status = 401, description = "Missing or invalid session", body = ApiError),
        (status = 413, description = "Clip too large", body = ApiError),
        (status = 415, description = "Unsupported audio type", body = ApiError)
    ),
    security(("session_auth" = [])),
    tag = "uploads"
)]
pub async fn upload_audio(
    State(state): State<AppState>,
    auth: SessionAuth,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<AudioUploadResponse>), AppError> {
    let part = read_file_field(&mut multipart, "audio").await?;
    let record = state
        .sessions
        .store_user_audio(&auth.session_id, &part.content_type, &part.bytes)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AudioUploadResponse {
            audio_ref: record.audio_ref,
            expires_at: record.expires_at,
        }),
    ))
}

/// Fetch the preprocessed photo of an upload owned by the caller's session
#[utoipa::path(
    get,
    path = "/v1/uploads/{upload_id}",
    params(("upload_id" = Uuid, Path, description = "Upload id")),
    responses(
        (status = 200, description = "JPEG bytes", content_type = "image/jpeg"),
        (status = 401, description = "Missing or invalid session", body = ApiError),
        (status = 403, description = "Upload belongs to another session", body = ApiError),
        (status = 404, description = "Unknown or expired upload", body = ApiError)
    ),
    security(("session_auth" = [])),
    tag = "uploads"
)]
pub async fn get_upload(
    State(state): State<AppState>,
    auth: SessionAuth,
    Path(upload_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let image = state
        .sessions
        .resolve_image(&upload_id.to_string())
        .ok_or_else(|| AppError::NotFound {
            resource: format!("upload '{upload_id}'"),
        })?;
    require_owner(&auth, &image.session_id, "Upload")?;

    let bytes = tokio::fs::read(&image.file_path).await?;
    Ok((
        [
            (header::CONTENT_TYPE, image.mime_type),
            (header::CACHE_CONTROL, "private, max-age=300".to_string()),
        ],
        Body::from(bytes),
    )
        .into_response())
}
