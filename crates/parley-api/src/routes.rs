//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression,
//! body limits, and all endpoint handlers.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use parley_core::config::ParleyConfig;
use parley_core::error::ParleyError;

use crate::handlers;
use crate::state::AppState;

/// Create the axum Router with all routes and middleware.
///
/// # Arguments
/// * `state` - The shared application state.
///
/// # Returns
/// A fully configured axum Router ready to serve requests.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    // Routes that do NOT require authentication.
    let public_routes = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health));

    let protected_routes = Router::new()
        .route("/api/ingest", post(handlers::ingest))
        .route("/api/transcripts", get(handlers::list_transcripts))
        .route("/api/transcripts/{id}", get(handlers::get_transcript))
        .route("/api/search", get(handlers::search))
        .route("/api/analytics/topics", get(handlers::topics))
        .route("/api/analytics/participants", get(handlers::participants))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::auth::require_auth,
        ));

    let body_limit = state.config.server.max_body_bytes;

    public_routes
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}

/// Start the HTTP server on the configured address.
///
/// Serves until Ctrl-C is received.
pub async fn start_server(config: &ParleyConfig, state: AppState) -> Result<(), ParleyError> {
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ParleyError::Api(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ParleyError::Api(format!("Server error: {}", e)))?;

    tracing::info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
