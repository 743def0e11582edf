use serde_json::json;

use crate::util::{SessionCredentials, api_request, exit_error};

pub async fn turn(
    api_url: &str,
    session: &SessionCredentials,
    conversation_id: &str,
    text: Option<String>,
    audio_ref: Option<String>,
    raw: bool,
) -> i32 {
    if text.is_none() && audio_ref.is_none() {
        exit_error(
            "a turn needs --text or --audio-ref",
            Some("Record a question with `curio upload-audio <file>` to get an audio_ref."),
        );
    }
    api_request(
        api_url,
        reqwest::Method::POST,
        &format!("/v1/conversations/{conversation_id}/turns"),
        Some(session),
        Some(json!({ "text": text, "audio_ref": audio_ref })),
        raw,
    )
    .await
}
