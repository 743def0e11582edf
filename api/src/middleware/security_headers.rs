use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

/// Baseline security headers for every response.
///
/// Camera and microphone stay available to the same origin since the client
/// captures photos and voice questions. JSON responses are never cached;
/// audio and image streams set their own cache policy.
pub async fn apply(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let is_json = response
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));

    let headers = response.headers_mut();
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "permissions-policy",
        HeaderValue::from_static("camera=(self), microphone=(self), geolocation=()"),
    );
    if is_json && !headers.contains_key("cache-control") {
        headers.insert("cache-control", HeaderValue::from_static("no-store"));
    }
    response
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router, middleware};
    use tower::ServiceExt;

    async fn ok() -> StatusCode {
        StatusCode::OK
    }

    async fn json() -> Json<serde_json::Value> {
        Json(serde_json::json!({ "status": "ok" }))
    }

    fn app() -> Router {
        Router::new()
            .route("/plain", get(ok))
            .route("/json", get(json))
            .layer(middleware::from_fn(super::apply))
    }

    async fn fetch(uri: &str) -> axum::response::Response {
        app()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed")
    }

    #[tokio::test]
    async fn apply_adds_security_headers() {
        let response = fetch("/plain").await;
        let headers = response.headers();
        assert_eq!(
            headers
                .get("x-content-type-options")
                .expect("x-content-type-options header should exist"),
            "nosniff"
        );
        assert_eq!(
            headers
                .get("permissions-policy")
                .expect("permissions-policy header should exist"),
            "camera=(self), microphone=(self), geolocation=()"
        );
        assert!(headers.get("cache-control").is_none());
    }

    #[tokio::test]
    async fn json_responses_are_not_cached() {
        let response = fetch("/json").await;
        assert_eq!(
            response
                .headers()
                .get("cache-control")
                .expect("cache-control header should exist"),
            "no-store"
        );
    }
}
