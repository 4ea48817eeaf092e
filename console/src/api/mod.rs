//! HTTP API routes for the diagnostics console backend.
//!
//! Stateless read-only access to the trace log and the reconstructed
//! cycle view; the admin UI renders what these endpoints return.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;

pub mod traces;

use crate::app_state::AppState;

#[derive(Clone)]
pub struct ApiState {
    pub app_state: Arc<AppState>,
}

/// Configure all API routes
pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/health", get(health_check))
        // Trace diagnostics routes
        .route("/trace/events", get(traces::get_events))
        .route("/trace/events.jsonl", get(traces::export_events_jsonl))
        .route("/trace/cycles", get(traces::get_cycles))
}

/// Health check endpoint
pub async fn health_check(State(_state): State<ApiState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "kautio-console",
            "version": "0.1.0"
        })),
    )
}
