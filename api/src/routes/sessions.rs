use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/sessions", post(create_session))
}

/// Response for POST /v1/sessions. The token is shown only once.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SessionResponse {
    pub session_id: String,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Start an anonymous session
///
/// Send the returned pair back as `x-session-id` and `x-session-token` on
/// every session-scoped request.
#[utoipa::path(
    post,
    path = "/v1/sessions",
    responses(
        (status = 201, description = "Session created", body = SessionResponse),
        (status = 429, description = "Rate limited", body = curio_core::error::ApiError)
    ),
    tag = "sessions"
)]
pub async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let issued = state.sessions.create_session();
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            session_id: issued.session_id,
            session_token: issued.session_token,
            expires_at: issued.expires_at,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::routes::testing::{TestApp, json_body};

    #[tokio::test]
    async fn issues_a_usable_session() {
        let app = TestApp::new();
        let response = app.post_json("/v1/sessions", None, serde_json::json!({})).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = json_body(response).await;
        let session_id = body["session_id"].as_str().expect("session_id");
        let token = body["session_token"].as_str().expect("session_token");
        assert!(app.state.sessions.validate_session(session_id, token).is_some());
    }
}
