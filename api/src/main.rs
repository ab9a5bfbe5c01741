use std::net::SocketAddr;

use axum::Router;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod error;
mod middleware;
mod routes;
mod state;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Shule Assistant API",
        version = "0.1.0",
        description = "Conversational command gateway for the Shule school console. Each session keeps its own short-term memory and acts with the caller's own school API token."
    ),
    paths(
        routes::health::health_check,
        routes::assistant::create_session,
        routes::assistant::submit_turn,
        routes::assistant::set_flow_field,
        routes::assistant::submit_flow,
        routes::assistant::cancel_flow,
        routes::assistant::get_transcript,
        routes::assistant::close_session,
    ),
    components(schemas(
        HealthResponse,
        shule_core::error::ApiError,
        shule_core::Identity,
        shule_core::Role,
        shule_core::Message,
        shule_core::Speaker,
        shule_core::Chip,
        shule_core::Navigation,
        shule_core::TurnStatus,
        shule_core::flow::FlowState,
        shule_core::flow::FlowKind,
        routes::assistant::CreateSessionResponse,
        routes::assistant::TurnRequest,
        routes::assistant::TurnResponse,
        routes::assistant::FlowFieldRequest,
        routes::assistant::FlowResponse,
        routes::assistant::TranscriptResponse,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer,
                ),
            ),
        );
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_sessions: usize,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shule_api=debug,shule_core=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let app_state = state::AppState::from_env();

    // HTTPS enforcement (only when SHULE_REQUIRE_HTTPS=true)
    let require_https = std::env::var("SHULE_REQUIRE_HTTPS")
        .map(|v| v == "true")
        .unwrap_or(false);

    let cors_layer = middleware::cors::build_cors_layer();

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::assistant::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .option_layer(require_https.then(|| {
                    axum::middleware::from_fn(middleware::https::require_https)
                }))
                .layer(cors_layer),
        )
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!("Shule assistant API listening on {}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server stopped");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down; open assistant sessions are dropped");
}
