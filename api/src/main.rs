use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::{Json, Router, middleware as axum_middleware};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

mod auth;
mod config;
mod entity;
mod error;
mod extract;
mod ingest;
mod middleware;
mod moderation;
mod persona;
mod pipeline;
mod providers;
mod research;
mod retention;
mod routes;
mod sessions;
mod state;
mod store;
mod voice;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Multipart framing on top of the largest accepted file.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Curio API",
        version = "0.1.0",
        description = "Photograph something and talk with it: identification, kid-safe facts, persona replies and voice."
    ),
    paths(
        routes::health::health_check,
        routes::sessions::create_session,
        routes::uploads::upload_image,
        routes::uploads::upload_audio,
        routes::uploads::get_upload,
        routes::analysis::create_analysis,
        routes::analysis::get_analysis,
        routes::conversations::create_turn,
        routes::audio::stream_audio,
    ),
    components(schemas(
        HealthResponse,
        routes::sessions::SessionResponse,
        routes::uploads::UploadResponse,
        routes::uploads::AudioUploadResponse,
        curio_core::error::ApiError,
        curio_core::analysis::AnalysisStatus,
        curio_core::analysis::AnalysisResult,
        curio_core::analysis::CreateAnalysisRequest,
        curio_core::analysis::CreateAnalysisResponse,
        curio_core::conversation::ChatTurnRequest,
        curio_core::conversation::ChatTurnResponse,
        curio_core::entity::CanonicalEntity,
        curio_core::entity::EntityCategory,
        curio_core::entity::RoleplayMode,
        curio_core::moderation::SafetyVerdict,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "session_auth",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                auth::SESSION_TOKEN_HEADER,
                "Session token from POST /v1/sessions, sent together with x-session-id",
            ))),
        );
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "curio_api=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = config::AppConfig::from_env();
    if let Err(err) = std::fs::create_dir_all(&config.data_dir) {
        tracing::error!(data_dir = %config.data_dir.display(), error = %err, "cannot create data directory");
        std::process::exit(1);
    }
    let http = match reqwest::Client::builder()
        .user_agent(concat!("curio-api/", env!("CARGO_PKG_VERSION")))
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(error = %err, "failed to build HTTP client");
            std::process::exit(1);
        }
    };

    let port = config.port;
    let upload_body_limit = config.max_upload_bytes.max(config.max_audio_bytes) + MULTIPART_OVERHEAD_BYTES;
    let app_state = state::AppState::build(config, http);
    let sweeper = retention::RetentionSweeper::new(
        &app_state.config,
        app_state.stores.clone(),
        app_state.sessions.clone(),
    );
    retention::spawn_sweeper(std::sync::Arc::new(sweeper), SWEEP_INTERVAL);

    // CORS
    let cors_layer = middleware::cors::build_cors_layer();

    // Router with per-group rate limiting
    let app = Router::new()
        .route("/api-doc/openapi.json", get(openapi_json))
        .merge(routes::health::router())
        .merge(routes::sessions::router().layer(middleware::rate_limit::sessions_layer()))
        .merge(
            routes::uploads::router()
                .layer(DefaultBodyLimit::max(upload_body_limit))
                .layer(middleware::rate_limit::uploads_layer()),
        )
        .merge(routes::uploads::read_router().layer(middleware::rate_limit::reads_layer()))
        .merge(routes::analysis::write_router().layer(middleware::rate_limit::analysis_layer()))
        .merge(routes::analysis::read_router().layer(middleware::rate_limit::reads_layer()))
        .merge(routes::conversations::router().layer(middleware::rate_limit::chat_layer()))
        .merge(routes::audio::router().layer(middleware::rate_limit::reads_layer()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn(middleware::security_headers::apply))
                .layer(cors_layer),
        )
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Curio API listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%addr, error = %err, "failed to bind listener");
            std::process::exit(1);
        }
    };
    if let Err(err) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!(error = %err, "server terminated");
        std::process::exit(1);
    }
}
