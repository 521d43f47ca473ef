//! weaver HTTP and WebSocket server.
//!
//! Exposes workflow definitions, validation, planning, runs and advisory
//! suggestions as a JSON API, and streams run events to observers over a
//! WebSocket.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

use axum::Router;
use axum::routing::{get, post};
use state::AppState;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Builds the application router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route(
            "/api/workflows",
            get(routes::list_workflows).post(routes::create_workflow),
        )
        .route(
            "/api/workflows/{id}",
            get(routes::get_workflow).put(routes::update_workflow),
        )
        .route("/api/workflows/{id}/validate", post(routes::validate_workflow))
        .route("/api/workflows/{id}/plan", get(routes::plan_workflow))
        .route("/api/workflows/{id}/execute", post(routes::execute_workflow))
        .route("/api/workflows/{id}/runs", get(routes::list_runs))
        .route("/api/workflows/{id}/suggestions", get(routes::suggestions))
        .route("/api/runs/{id}", get(routes::get_run))
        .route("/api/runs/{id}/cancel", post(routes::cancel_run))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
