use std::path::Path;

use serde_json::json;

/// Session credentials sent as `x-session-id` / `x-session-token`.
#[derive(Debug, Clone)]
pub struct SessionCredentials {
    pub id: String,
    pub token: String,
}

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub fn print_json(value: &serde_json::Value, raw: bool) {
    if raw {
        println!("{value}");
    } else {
        println!("{}", pretty(value));
    }
}

pub fn print_error(value: &serde_json::Value) {
    eprintln!("{}", pretty(value));
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    print_error(&err);
    std::process::exit(4);
}

/// Resolve session credentials from flags/env or exit with a usage error.
pub fn require_session(id: Option<String>, token: Option<String>) -> SessionCredentials {
    match (id, token) {
        (Some(id), Some(token)) => SessionCredentials { id, token },
        _ => exit_error(
            "session credentials are required for this command",
            Some(
                "Run `curio session create` and export CURIO_SESSION_ID and CURIO_SESSION_TOKEN, \
                 or pass --session-id/--session-token.",
            ),
        ),
    }
}

/// Exit codes: 0=success (2xx), 1=client error (4xx), 2=server error (5xx),
///             3=connection error, 4=usage error
pub fn exit_code_for(status: u16) -> i32 {
    match status {
        200..=299 => 0,
        400..=499 => 1,
        _ => 2,
    }
}

pub fn connection_error(err: &reqwest::Error) -> i32 {
    print_error(&json!({
        "error": "connection_error",
        "message": format!("{err}"),
        "docs_hint": "Is the API server running? Check CURIO_API_URL."
    }));
    3
}

fn with_session(
    mut req: reqwest::RequestBuilder,
    session: Option<&SessionCredentials>,
) -> reqwest::RequestBuilder {
    if let Some(session) = session {
        req = req
            .header("x-session-id", session.id.as_str())
            .header("x-session-token", session.token.as_str());
    }
    req
}

/// Execute an API request and return status plus JSON body (no printing).
pub async fn send_json(
    api_url: &str,
    method: reqwest::Method,
    path: &str,
    session: Option<&SessionCredentials>,
    body: Option<serde_json::Value>,
) -> Result<(u16, serde_json::Value), reqwest::Error> {
    let mut req = with_session(client().request(method, format!("{api_url}{path}")), session);
    if let Some(body) = body {
        req = req.json(&body);
    }
    let resp = req.send().await?;
    let status = resp.status().as_u16();
    let body = resp
        .json()
        .await
        .unwrap_or_else(|e| json!({"raw_error": format!("Failed to parse response as JSON: {e}")}));
    Ok((status, body))
}

/// Execute an API request, print the response, return a structured exit code.
pub async fn api_request(
    api_url: &str,
    method: reqwest::Method,
    path: &str,
    session: Option<&SessionCredentials>,
    body: Option<serde_json::Value>,
    raw: bool,
) -> i32 {
    match send_json(api_url, method, path, session, body).await {
        Ok((status, body)) => report(status, &body, raw),
        Err(err) => connection_error(&err),
    }
}

/// Upload a local file as a single multipart field.
pub async fn upload_file(
    api_url: &str,
    path: &str,
    session: &SessionCredentials,
    field: &'static str,
    file: &Path,
    content_type: Option<&str>,
    raw: bool,
) -> i32 {
    let bytes = match std::fs::read(file) {
        Ok(bytes) => bytes,
        Err(err) => exit_error(&format!("Failed to read '{}': {err}", file.display()), None),
    };
    let mime = content_type
        .map(str::to_string)
        .unwrap_or_else(|| mime_for_path(file).to_string());
    let file_name = file
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload")
        .to_string();
    let part = match reqwest::multipart::Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(&mime)
    {
        Ok(part) => part,
        Err(err) => exit_error(&format!("Invalid content type '{mime}': {err}"), None),
    };
    let form = reqwest::multipart::Form::new().part(field, part);

    let req = with_session(client().post(format!("{api_url}{path}")), Some(session)).multipart(form);
    let resp = match req.send().await {
        Ok(resp) => resp,
        Err(err) => return connection_error(&err),
    };
    let status = resp.status().as_u16();
    let body = resp
        .json()
        .await
        .unwrap_or_else(|e| json!({"raw_error": format!("Failed to parse response as JSON: {e}")}));
    report(status, &body, raw)
}

fn report(status: u16, body: &serde_json::Value, raw: bool) -> i32 {
    let exit_code = exit_code_for(status);
    if exit_code == 0 {
        print_json(body, raw);
    } else {
        print_error(body);
    }
    exit_code
}

/// Content type guessed from the file extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "webm" => "audio/webm",
        "ogg" | "oga" => "audio/ogg",
        "mp3" => "audio/mpeg",
        "m4a" | "mp4" => "audio/mp4",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}
