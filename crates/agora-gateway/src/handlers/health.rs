//! Health check endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use agora_store::Store;

use crate::state::GatewayState;

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Organization actors currently running.
    pub active_actors: usize,
}

/// Health check handler. Public.
///
/// ```text
/// GET /health
///
/// Response: 200 OK
/// { "status": "healthy", "version": "0.1.0", "activeActors": 2 }
/// ```
pub async fn health<S: Store + 'static>(
    State(state): State<Arc<GatewayState<S>>>,
) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        active_actors: state.hub.active_actors(),
    };

    (StatusCode::OK, Json(response))
}
