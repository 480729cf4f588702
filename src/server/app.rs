use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::api::api_routes;
use crate::websocket::ws_handler;

use super::AppState;

pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let ws_path = state.settings.websocket.path.clone();
    let body_limit = state.settings.server.body_limit_bytes;

    Router::new()
        // WebSocket endpoint
        .route(&ws_path, get(ws_handler))
        // Merge API routes
        .merge(api_routes())
        // Add middleware
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Add state
        .with_state(state)
}
