use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Speech recognition
        .route("/startRecording", post(handlers::start_recording))
        .route("/stopRecording", post(handlers::stop_recording))
        // Completion + speech synthesis
        .route("/startSynthesizing", post(handlers::start_synthesizing))
        .route("/stopSynthesizing", post(handlers::stop_synthesizing))
        // Diagnostics
        .route("/status", get(handlers::get_status))
        // Request logging; the browser front end calls from another origin
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
