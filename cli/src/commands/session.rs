use serde_json::json;

use crate::util::{connection_error, exit_code_for, print_error, print_json, send_json};

/// Create a session and print shell exports next to the JSON response.
pub async fn create(api_url: &str, raw: bool) -> i32 {
    let (status, body) =
        match send_json(api_url, reqwest::Method::POST, "/v1/sessions", None, Some(json!({}))).await {
            Ok(response) => response,
            Err(err) => return connection_error(&err),
        };
    if exit_code_for(status) != 0 {
        print_error(&body);
        return exit_code_for(status);
    }

    print_json(&body, raw);
    if let (Some(id), Some(token)) = (body["session_id"].as_str(), body["session_token"].as_str()) {
        eprintln!("export CURIO_SESSION_ID={id}");
        eprintln!("export CURIO_SESSION_TOKEN={token}");
    }
    0
}
