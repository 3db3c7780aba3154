//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression, body limits
//! and bearer authentication. Streaming routes are kept out of the
//! compression layer so each fragment reaches the client as it arrives.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use hatch_core::config::HatchConfig;
use hatch_core::error::HatchError;

use crate::handlers;
use crate::state::AppState;

const BODY_LIMIT: usize = 1024 * 1024;
const AUDIO_BODY_LIMIT: usize = 25 * 1024 * 1024;

fn cors_layer(port: u16) -> CorsLayer {
    let dev_port = port.saturating_add(1);
    let origins: Vec<HeaderValue> = [port, dev_port]
        .iter()
        .flat_map(|p| {
            [
                format!("http://127.0.0.1:{}", p),
                format!("http://localhost:{}", p),
            ]
        })
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .expose_headers([header::CONTENT_DISPOSITION])
}

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(state.config.general.port);

    // Routes that do NOT require authentication.
    let public_routes = Router::new().route("/health", get(handlers::health));

    let json_routes = Router::new()
        .route("/api/auth/logout", post(handlers::logout))
        .route(
            "/api/ideas",
            get(handlers::list_ideas).post(handlers::create_idea),
        )
        .route(
            "/api/ideas/{id}",
            get(handlers::get_idea).delete(handlers::delete_idea),
        )
        .route(
            "/api/nurture/{idea_id}",
            get(handlers::get_conversation).delete(handlers::reset_conversation),
        )
        .route(
            "/api/nurture/{idea_id}/export",
            get(handlers::export_document),
        )
        .route(
            "/api/transcribe",
            post(handlers::transcribe).layer(DefaultBodyLimit::max(AUDIO_BODY_LIMIT)),
        )
        .layer(CompressionLayer::new());

    // Chunked text responses, never compressed. The one-shot generation
    // shares the path and so lives here too.
    let stream_routes = Router::new()
        .route(
            "/api/nurture",
            post(handlers::nurture_stream).put(handlers::generate_output),
        )
        .route(
            "/api/nurture/{idea_id}/messages",
            post(handlers::post_message),
        );

    let protected_routes = json_routes
        .merge(stream_routes)
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::auth::require_auth,
        ));

    public_routes
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured address.
///
/// Binds to 127.0.0.1 (localhost only) on the port from config.
pub async fn start_server(config: &HatchConfig, state: AppState) -> Result<(), HatchError> {
    let addr = format!("127.0.0.1:{}", config.general.port);
    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| HatchError::Api(format!("Failed to bind: {}", e)))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| HatchError::Api(format!("Server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_builds_for_edge_ports() {
        let _ = cors_layer(3040);
        let _ = cors_layer(u16::MAX);
    }
}
