use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use curio_core::error::{self, ApiError};

use crate::ingest::IngestError;
use crate::pipeline::TurnError;

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Missing or invalid session credentials (401)
    Unauthorized {
        message: String,
        docs_hint: Option<String>,
    },
    /// Resource belongs to another session (403)
    Forbidden {
        message: String,
        docs_hint: Option<String>,
    },
    /// Resource not found (404)
    NotFound { resource: String },
    /// Upload exceeds the configured size limit (413)
    PayloadTooLarge { limit_bytes: usize },
    /// Upload has a mime type we do not accept (415)
    UnsupportedMediaType { received: String },
    /// Internal error (500)
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>, field: &str) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
            received: None,
            docs_hint: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    received,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::Unauthorized { message, docs_hint } => (
                StatusCode::UNAUTHORIZED,
                ApiError {
                    error: error::codes::UNAUTHORIZED.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::Forbidden { message, docs_hint } => (
                StatusCode::FORBIDDEN,
                ApiError {
                    error: error::codes::FORBIDDEN.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                ApiError {
                    error: error::codes::NOT_FOUND.to_string(),
                    message: format!("{resource} not found"),
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: None,
                },
            ),
            AppError::PayloadTooLarge { limit_bytes } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ApiError {
                    error: error::codes::PAYLOAD_TOO_LARGE.to_string(),
                    message: format!("Upload exceeds the {limit_bytes} byte limit"),
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: Some("Resize or compress the file and retry.".to_string()),
                },
            ),
            AppError::UnsupportedMediaType { received } => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                ApiError {
                    error: error::codes::UNSUPPORTED_MEDIA_TYPE.to_string(),
                    message: format!("Unsupported media type '{received}'"),
                    field: Some("content_type".to_string()),
                    received: Some(serde_json::Value::String(received)),
                    request_id,
                    docs_hint: Some("Upload a JPEG, PNG or WebP image.".to_string()),
                },
            ),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("io error: {err}"))
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::TooLarge { limit_bytes } => AppError::PayloadTooLarge { limit_bytes },
            IngestError::UnsupportedMediaType(received) => {
                AppError::UnsupportedMediaType { received }
            }
            IngestError::Empty => AppError::validation("Uploaded file is empty", "file"),
            IngestError::Decode(reason) => AppError::Validation {
                message: format!("Image could not be decoded: {reason}"),
                field: Some("image".to_string()),
                received: None,
                docs_hint: Some("Send a valid JPEG, PNG or WebP photo.".to_string()),
            },
            IngestError::Rejected(reason) => AppError::Validation {
                message: format!("File was rejected: {reason}"),
                field: Some("file".to_string()),
                received: None,
                docs_hint: None,
            },
            IngestError::Io(err) => AppError::Internal(format!("upload storage failed: {err}")),
        }
    }
}

impl From<TurnError> for AppError {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::ConversationNotFound(id) => AppError::NotFound {
                resource: format!("conversation '{id}'"),
            },
            TurnError::SessionMismatch => AppError::Forbidden {
                message: "Conversation belongs to a different session".to_string(),
                docs_hint: Some(
                    "Use the session that started the analysis for this conversation.".to_string(),
                ),
            },
            TurnError::AudioNotFound(audio_ref) => AppError::NotFound {
                resource: format!("audio '{audio_ref}'"),
            },
            TurnError::EmptyInput => AppError::Validation {
                message: "Turn needs non-empty text or a transcribable audio_ref".to_string(),
                field: Some("text".to_string()),
                received: None,
                docs_hint: Some(
                    "Send {\"text\": \"...\"} or upload audio via POST /v1/audio/uploads first."
                        .to_string(),
                ),
            },
            TurnError::Io(err) => AppError::Internal(format!("turn audio read failed: {err}")),
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::Validation {
            message: format!("Invalid multipart body: {}", err.body_text()),
            field: Some("body".to_string()),
            received: None,
            docs_hint: Some("Send multipart/form-data with the file in the expected field.".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use super::*;

    #[test]
    fn ingest_errors_map_to_http_statuses() {
        let too_large = AppError::from(IngestError::TooLarge { limit_bytes: 10 }).into_response();
        assert_eq!(too_large.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let unsupported =
            AppError::from(IngestError::UnsupportedMediaType("text/plain".to_string()))
                .into_response();
        assert_eq!(unsupported.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let empty = AppError::from(IngestError::Empty).into_response();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn turn_errors_map_to_http_statuses() {
        let missing =
            AppError::from(TurnError::ConversationNotFound("c1".to_string())).into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let foreign = AppError::from(TurnError::SessionMismatch).into_response();
        assert_eq!(foreign.status(), StatusCode::FORBIDDEN);

        let empty = AppError::from(TurnError::EmptyInput).into_response();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    }
}
