use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::feed::types::ConnectionState;
use crate::tracker::StatusReceiver;

#[derive(Clone)]
pub struct HealthState {
    pub status: StatusReceiver,
    pub shape_count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Whether the service is running
    pub healthy: bool,
    /// Connection state of the upstream vehicle stream
    pub stream_state: ConnectionState,
    /// Number of route shapes in the served layer
    pub shape_count: usize,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service health status", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<HealthState>) -> Json<HealthResponse> {
    let stream_state = *state.status.borrow();
    Json(HealthResponse {
        healthy: true,
        stream_state,
        shape_count: state.shape_count,
    })
}

pub fn router(status: StatusReceiver, shape_count: usize) -> Router {
    let state = HealthState {
        status,
        shape_count,
    };
    Router::new()
        .route("/", get(health_check))
        .with_state(state)
}
