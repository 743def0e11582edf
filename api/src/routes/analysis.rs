use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use curio_core::analysis::{
    AnalysisResult, AnalysisStatus, CreateAnalysisRequest, CreateAnalysisResponse,
};
use curio_core::error::ApiError;

use crate::auth::{SessionAuth, require_owner};
use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

pub fn write_router() -> Router<AppState> {
    Router::new().route("/v1/analysis", post(create_analysis))
}

pub fn read_router() -> Router<AppState> {
    Router::new().route("/v1/analysis/{analysis_id}", get(get_analysis))
}

/// Start analyzing an uploaded photo
///
/// Returns immediately with a queued analysis. Poll
/// `GET /v1/analysis/{analysis_id}` until the status is `ready` or `failed`.
#[utoipa::path(
    post,
    path = "/v1/analysis",
    request_body = CreateAnalysisRequest,
    responses(
        (status = 202, description = "Analysis queued", body = CreateAnalysisResponse),
        (status = 400, description = "Invalid request body", body = ApiError),
        (status = 401, description = "Missing or invalid session", body = ApiError),
        (status = 403, description = "Upload belongs to another session", body = ApiError),
        (status = 404, description = "Unknown or expired upload", body = ApiError)
    ),
    security(("session_auth" = [])),
    tag = "analysis"
)]
pub async fn create_analysis(
    State(state): State<AppState>,
    auth: SessionAuth,
    AppJson(req): AppJson<CreateAnalysisRequest>,
) -> Result<(StatusCode, Json<CreateAnalysisResponse>), AppError> {
    let image = state
        .sessions
        .resolve_image(&req.upload_id.to_string())
        .ok_or_else(|| AppError::NotFound {
            resource: format!("upload '{}'", req.upload_id),
        })?;
    require_owner(&auth, &image.session_id, "Upload")?;

    // The task is detached; its result is observed by polling.
    let task = state
        .orchestrator
        .start_analysis(&auth.session_id, req.upload_id);

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateAnalysisResponse {
            analysis_id: task.analysis_id,
            status: AnalysisStatus::Queued,
        }),
    ))
}

/// Poll an analysis
#[utoipa::path(
    get,
    path = "/v1/analysis/{analysis_id}",
    params(("analysis_id" = Uuid, Path, description = "Analysis id")),
    responses(
        (status = 200, description = "Current analysis state", body = AnalysisResult),
        (status = 401, description = "Missing or invalid session", body = ApiError),
        (status = 403, description = "Analysis belongs to another session", body = ApiError),
        (status = 404, description = "Unknown analysis", body = ApiError)
    ),
    security(("session_auth" = [])),
    tag = "analysis"
)]
pub async fn get_analysis(
    State(state): State<AppState>,
    auth: SessionAuth,
    Path(analysis_id): Path<Uuid>,
) -> Result<Json<AnalysisResult>, AppError> {
    let result = state
        .orchestrator
        .get(&analysis_id)
        .ok_or_else(|| AppError::NotFound {
            resource: format!("analysis '{analysis_id}'"),
        })?;
    require_owner(&auth, &result.session_id, "Analysis")?;
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::routes::testing::{TestApp, json_body};

    #[tokio::test]
    async fn analysis_is_accepted_then_becomes_ready() {
        let app = TestApp::new();
        let session = app.session();
        let upload_id = app.upload_png(&session, "oak_tree.png").await;

        let response = app
            .post_json("/v1/analysis", Some(&session), json!({ "upload_id": upload_id }))
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["status"], "queued");
        let analysis_id = body["analysis_id"].as_str().expect("analysis_id").to_string();

        let result = app.poll_until_terminal(&session, &analysis_id).await;
        assert_eq!(result["status"], "ready");
        assert_eq!(result["entity"]["label"], "oak tree");
        assert!(result["first_reply_text"].as_str().is_some_and(|text| !text.is_empty()));
        assert!(result["conversation_id"].is_string());
    }

    #[tokio::test]
    async fn unknown_or_foreign_uploads_are_rejected_synchronously() {
        let app = TestApp::new();
        let owner = app.session();
        let stranger = app.session();
        let upload_id = app.upload_png(&owner, "oak.png").await;

        let missing = app
            .post_json(
                "/v1/analysis",
                Some(&owner),
                json!({ "upload_id": uuid::Uuid::now_v7() }),
            )
            .await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let foreign = app
            .post_json("/v1/analysis", Some(&stranger), json!({ "upload_id": upload_id }))
            .await;
        assert_eq!(foreign.status(), StatusCode::FORBIDDEN);

        let malformed = app
            .post_json("/v1/analysis", Some(&owner), json!({ "upload": upload_id }))
            .await;
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(malformed).await["field"], "upload_id");
    }

    #[tokio::test]
    async fn polling_is_scoped_to_the_owning_session() {
        let app = TestApp::new();
        let owner = app.session();
        let upload_id = app.upload_png(&owner, "oak.png").await;
        let body = json_body(
            app.post_json("/v1/analysis", Some(&owner), json!({ "upload_id": upload_id }))
                .await,
        )
        .await;
        let analysis_id = body["analysis_id"].as_str().expect("analysis_id").to_string();

        let stranger = app.session();
        let denied = app
            .get(&format!("/v1/analysis/{analysis_id}"), Some(&stranger))
            .await;
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let unknown = app
            .get(&format!("/v1/analysis/{}", uuid::Uuid::now_v7()), Some(&owner))
            .await;
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }
}
