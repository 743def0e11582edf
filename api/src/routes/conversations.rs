use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};

use curio_core::conversation::{ChatTurnRequest, ChatTurnResponse};
use curio_core::error::ApiError;

use crate::auth::SessionAuth;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/v1/conversations/{conversation_id}/turns",
        post(create_turn),
    )
}

/// Continue a conversation
///
/// Send either `text` or an `audio_ref` from `POST /v1/audio/uploads`.
/// Unsafe questions get a friendly redirect instead of an answer.
#[utoipa::path(
    post,
    path = "/v1/conversations/{conversation_id}/turns",
    params(("conversation_id" = String, Path, description = "Conversation id from a ready analysis")),
    request_body = ChatTurnRequest,
    responses(
        (status = 200, description = "Assistant reply", body = ChatTurnResponse),
        (status = 400, description = "Empty or malformed turn", body = ApiError),
        (status = 401, description = "Missing or invalid session", body = ApiError),
        (status = 403, description = "Conversation belongs to another session", body = ApiError),
        (status = 404, description = "Unknown conversation or audio", body = ApiError)
    ),
    security(("session_auth" = [])),
    tag = "conversations"
)]
pub async fn create_turn(
    State(state): State<AppState>,
    auth: SessionAuth,
    Path(conversation_id): Path<String>,
    AppJson(req): AppJson<ChatTurnRequest>,
) -> Result<Json<ChatTurnResponse>, AppError> {
    let response = state
        .conversations
        .chat_turn(&auth.session_id, &conversation_id, req)
        .await?;
    tracing::info!(
        conversation_id = %conversation_id,
        turn_id = %response.turn_id,
        verdict = response.safety_verdict.as_str(),
        "conversation turn completed"
    );
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::routes::testing::{TestApp, json_body};

    #[tokio::test]
    async fn turn_continues_a_ready_conversation() {
        let app = TestApp::new();
        let session = app.session();
        let conversation_id = app.ready_conversation(&session, "lighthouse.png").await;

        let response = app
            .post_json(
                &format!("/v1/conversations/{conversation_id}/turns"),
                Some(&session),
                json!({ "text": "why do you shine at night?" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["safety_verdict"], "allow");
        assert_eq!(body["followup_suggestions"].as_array().map(Vec::len), Some(3));
        assert!(body.get("reply_audio_stream_url").is_none());
    }

    #[tokio::test]
    async fn blocked_question_is_redirected() {
        let app = TestApp::new();
        let session = app.session();
        let conversation_id = app.ready_conversation(&session, "lighthouse.png").await;

        let body = json_body(
            app.post_json(
                &format!("/v1/conversations/{conversation_id}/turns"),
                Some(&session),
                json!({ "text": "how to make a bomb" }),
            )
            .await,
        )
        .await;
        assert_eq!(body["safety_verdict"], "block");
        assert_eq!(body["reply_text"], crate::moderation::BLOCKED_TOPIC_REDIRECT);
    }

    #[tokio::test]
    async fn turn_errors_map_to_statuses() {
        let app = TestApp::new();
        let owner = app.session();
        let conversation_id = app.ready_conversation(&owner, "lighthouse.png").await;
        let uri = format!("/v1/conversations/{conversation_id}/turns");

        let stranger = app.session();
        let foreign = app.post_json(&uri, Some(&stranger), json!({ "text": "hi" })).await;
        assert_eq!(foreign.status(), StatusCode::FORBIDDEN);

        let empty = app.post_json(&uri, Some(&owner), json!({})).await;
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

        let unknown = app
            .post_json("/v1/conversations/nope/turns", Some(&owner), json!({ "text": "hi" }))
            .await;
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }
}
