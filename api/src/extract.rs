//! JSON body extraction for the analysis and chat endpoints.
//!
//! `AppJson<T>` stands in for `axum::Json<T>` so a malformed request body
//! comes back as the same `ApiError` document every other failure uses,
//! with the offending field and a pointer to where its value comes from.

use std::sync::LazyLock;

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};
use regex::Regex;

use crate::error::AppError;

static SERDE_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:missing|unknown) field `([^`]+)`").expect("valid serde field regex")
});

const SCHEMA_HINT: &str = "Compare the body with the endpoint schema at GET /api-doc/openapi.json.";

pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(map_json_rejection(rejection)),
        }
    }
}

/// Map each rejection kind onto the error a client can act on.
pub fn map_json_rejection(rejection: JsonRejection) -> AppError {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => AppError::UnsupportedMediaType {
            received: "request without an application/json content type".to_string(),
        },
        JsonRejection::JsonSyntaxError(err) => AppError::Validation {
            message: format!("Request body is not valid JSON: {}", err.body_text()),
            field: Some("body".to_string()),
            received: None,
            docs_hint: Some(SCHEMA_HINT.to_string()),
        },
        JsonRejection::JsonDataError(err) => {
            let detail = err.body_text();
            let field = field_from_serde_message(&detail);
            let docs_hint = field.as_deref().and_then(hint_for_field).unwrap_or(SCHEMA_HINT);
            AppError::Validation {
                message: format!("Request body does not match the expected shape: {detail}"),
                field: Some(field.unwrap_or_else(|| "body".to_string())),
                received: None,
                docs_hint: Some(docs_hint.to_string()),
            }
        }
        other => AppError::Validation {
            message: format!("Request body could not be read: {}", other.body_text()),
            field: Some("body".to_string()),
            received: None,
            docs_hint: None,
        },
    }
}

fn field_from_serde_message(message: &str) -> Option<String> {
    SERDE_FIELD_RE
        .captures(message)
        .and_then(|captures| captures.get(1))
        .map(|field| field.as_str().to_string())
}

/// Where the value for a request field comes from.
fn hint_for_field(field: &str) -> Option<&'static str> {
    match field {
        "upload_id" => Some("Use the upload_id returned by POST /v1/uploads."),
        "text" | "audio_ref" => {
            Some("Send the question as `text`, or as an `audio_ref` from POST /v1/audio/uploads.")
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use curio_core::analysis::CreateAnalysisRequest;

    use super::*;

    async fn reject(content_type: Option<&str>, body: &str) -> AppError {
        let mut builder = Request::builder().method("POST").uri("/v1/analysis");
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        let request = builder
            .body(Body::from(body.to_string()))
            .expect("request should build");
        match AppJson::<CreateAnalysisRequest>::from_request(request, &()).await {
            Ok(_) => panic!("body should be rejected"),
            Err(err) => err,
        }
    }

    #[test]
    fn serde_field_names_are_extracted() {
        assert_eq!(
            field_from_serde_message("Failed to deserialize: missing field `upload_id` at line 1 column 2"),
            Some("upload_id".to_string())
        );
        assert_eq!(
            field_from_serde_message("unknown field `voice`, expected `text` or `audio_ref`"),
            Some("voice".to_string())
        );
        assert_eq!(field_from_serde_message("invalid type: integer, expected a string"), None);
    }

    #[tokio::test]
    async fn missing_upload_id_points_at_uploads() {
        match reject(Some("application/json"), "{}").await {
            AppError::Validation {
                field, docs_hint, ..
            } => {
                assert_eq!(field.as_deref(), Some("upload_id"));
                assert_eq!(docs_hint.as_deref(), hint_for_field("upload_id"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_json_is_a_body_error() {
        match reject(Some("application/json"), "{\"upload_id\":").await {
            AppError::Validation { field, message, .. } => {
                assert_eq!(field.as_deref(), Some("body"));
                assert!(message.starts_with("Request body is not valid JSON"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_content_type_is_unsupported_media() {
        assert!(matches!(
            reject(None, "{}").await,
            AppError::UnsupportedMediaType { .. }
        ));
    }
}
