//! REST API Routes Module

pub mod health;
pub mod tracking;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the complete router with all endpoints.
pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        .merge(tracking::create_router())
        .merge(health::create_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
