use std::path::Path;

use serde_json::json;

use crate::util::{client, connection_error, exit_code_for, print_error, print_json};

/// Download a synthesized reply to `output`.
pub async fn download(api_url: &str, audio_id: &str, output: &Path, raw: bool) -> i32 {
    let resp = match client()
        .get(format!("{api_url}/v1/audio/{audio_id}"))
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(err) => return connection_error(&err),
    };
    let status = resp.status().as_u16();
    if exit_code_for(status) != 0 {
        let body = resp.json().await.unwrap_or_else(|_| json!({ "status": status }));
        print_error(&body);
        return exit_code_for(status);
    }

    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let bytes = match resp.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => return connection_error(&err),
    };
    if let Err(err) = std::fs::write(output, &bytes) {
        print_error(&json!({
            "error": "cli_error",
            "message": format!("Failed to write '{}': {err}", output.display()),
        }));
        return 4;
    }

    print_json(
        &json!({
            "audio_id": audio_id,
            "content_type": content_type,
            "bytes": bytes.len(),
            "path": output.display().to_string(),
        }),
        raw,
    );
    0
}
