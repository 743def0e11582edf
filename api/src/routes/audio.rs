use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use curio_core::error::ApiError;

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/audio/{audio_id}", get(stream_audio))
}

/// Stream a synthesized reply
///
/// Audio ids are unguessable and the endpoint needs no session headers, so
/// the URL can be handed straight to an audio element.
#[utoipa::path(
    get,
    path = "/v1/audio/{audio_id}",
    params(("audio_id" = String, Path, description = "Id from a reply audio stream URL")),
    responses(
        (status = 200, description = "Audio bytes with their recorded content type"),
        (status = 404, description = "Unknown audio asset", body = ApiError)
    ),
    tag = "audio"
)]
pub async fn stream_audio(
    State(state): State<AppState>,
    Path(audio_id): Path<String>,
) -> Result<Response, AppError> {
    let asset = state.voice.asset(&audio_id).ok_or_else(|| AppError::NotFound {
        resource: format!("audio '{audio_id}'"),
    })?;
    let file = tokio::fs::read(&asset.path).await.map_err(|err| {
        tracing::warn!(audio_id = %audio_id, error = %err, "audio asset missing on disk");
        AppError::NotFound {
            resource: format!("audio '{audio_id}'"),
        }
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, asset.content_type),
            (header::CACHE_CONTROL, "public, max-age=86400, immutable".to_string()),
        ],
        Body::from(file),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::Utc;

    use crate::routes::testing::TestApp;
    use crate::voice::AudioAsset;

    #[tokio::test]
    async fn streams_registered_assets_with_their_content_type() {
        let app = TestApp::new();
        let path = app.dir.path().join("clip.wav");
        std::fs::write(&path, b"RIFFfake").expect("write clip");
        app.state.stores.audio_assets.put(
            "clip-1",
            AudioAsset {
                audio_id: "clip-1".to_string(),
                content_type: "audio/wav".to_string(),
                path,
                created_at: Utc::now(),
            },
        );

        let response = app.get("/v1/audio/clip-1", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").expect("content-type"),
            "audio/wav"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(&bytes[..], b"RIFFfake");
    }

    #[tokio::test]
    async fn unknown_audio_is_not_found() {
        let app = TestApp::new();
        let response = app.get("/v1/audio/missing", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
