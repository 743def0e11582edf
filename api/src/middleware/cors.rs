use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::CorsLayer;

use crate::auth::{SESSION_ID_HEADER, SESSION_TOKEN_HEADER};

const DEFAULT_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

/// Build a CORS layer from the `CURIO_CORS_ORIGINS` env var.
///
/// - Origins: comma-separated list (default: local dev servers)
/// - Methods: GET, POST, OPTIONS
/// - Headers: Content-Type plus the session header pair
/// - Max age: 3600s
pub fn build_cors_layer() -> CorsLayer {
    let origins_str =
        std::env::var("CURIO_CORS_ORIGINS").unwrap_or_else(|_| DEFAULT_ORIGINS.to_string());
    build_cors_layer_for(&origins_str)
}

fn parse_origins(origins_str: &str) -> Vec<HeaderValue> {
    origins_str
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect()
}

fn build_cors_layer_for(origins_str: &str) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(parse_origins(origins_str))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static(SESSION_ID_HEADER),
            HeaderName::from_static(SESSION_TOKEN_HEADER),
        ])
        .max_age(std::time::Duration::from_secs(3600))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    use super::*;

    #[test]
    fn origins_are_trimmed_and_blank_entries_dropped() {
        let origins = parse_origins(" https://curio.app , ,http://localhost:5173");
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[0], "https://curio.app");
    }

    #[tokio::test]
    async fn allowed_origin_is_echoed() {
        let app = Router::new()
            .route("/health", get(|| async { StatusCode::OK }))
            .layer(build_cors_layer_for("https://curio.app"));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("origin", "https://curio.app")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");

        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .expect("allow-origin header should exist"),
            "https://curio.app"
        );
    }
}
