use std::time::{Duration, Instant};

use curio_core::analysis::{AnalysisResult, CreateAnalysisResponse};
use serde_json::json;

use crate::util::{
    SessionCredentials, api_request, connection_error, exit_code_for, exit_error, print_error,
    print_json, send_json,
};

/// Start an analysis. With `wait`, poll until it reaches a terminal status.
pub async fn start(
    api_url: &str,
    session: &SessionCredentials,
    upload_id: &str,
    wait: Option<Duration>,
    interval: Duration,
    raw: bool,
) -> i32 {
    let (status, body) = match send_json(
        api_url,
        reqwest::Method::POST,
        "/v1/analysis",
        Some(session),
        Some(json!({ "upload_id": upload_id })),
    )
    .await
    {
        Ok(response) => response,
        Err(err) => return connection_error(&err),
    };
    if exit_code_for(status) != 0 {
        print_error(&body);
        return exit_code_for(status);
    }

    let Some(timeout) = wait else {
        print_json(&body, raw);
        return 0;
    };
    let created: CreateAnalysisResponse = match serde_json::from_value(body) {
        Ok(created) => created,
        Err(err) => exit_error(&format!("Unexpected analysis response: {err}"), None),
    };
    poll(api_url, session, &created.analysis_id.to_string(), timeout, interval, raw).await
}

pub async fn get(api_url: &str, session: &SessionCredentials, analysis_id: &str, raw: bool) -> i32 {
    api_request(
        api_url,
        reqwest::Method::GET,
        &format!("/v1/analysis/{analysis_id}"),
        Some(session),
        None,
        raw,
    )
    .await
}

async fn poll(
    api_url: &str,
    session: &SessionCredentials,
    analysis_id: &str,
    timeout: Duration,
    interval: Duration,
    raw: bool,
) -> i32 {
    let started = Instant::now();
    let path = format!("/v1/analysis/{analysis_id}");
    loop {
        let (status, body) =
            match send_json(api_url, reqwest::Method::GET, &path, Some(session), None).await {
                Ok(response) => response,
                Err(err) => return connection_error(&err),
            };
        if exit_code_for(status) != 0 {
            print_error(&body);
            return exit_code_for(status);
        }

        let terminal = serde_json::from_value::<AnalysisResult>(body.clone())
            .map(|result| result.status.is_terminal())
            .unwrap_or(false);
        if terminal {
            print_json(&body, raw);
            return 0;
        }
        if started.elapsed() >= timeout {
            print_error(&json!({
                "error": "timeout",
                "message": format!("analysis {analysis_id} still running after {}s", timeout.as_secs()),
                "last": body,
            }));
            return 2;
        }
        tokio::time::sleep(interval).await;
    }
}
