use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::feed::types::ConnectionState;

use super::VehiclesState;

#[derive(Debug, Serialize, ToSchema)]
pub struct StreamStatusResponse {
    /// Connection state of the upstream vehicle stream
    pub state: ConnectionState,
    /// Endpoint being streamed, absent when streaming is not configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Connection state of the live vehicle stream
#[utoipa::path(
    get,
    path = "/api/vehicles/status",
    responses(
        (status = 200, description = "Current stream connection state", body = StreamStatusResponse)
    ),
    tag = "vehicles"
)]
pub async fn stream_status(State(state): State<VehiclesState>) -> Json<StreamStatusResponse> {
    let stream_state = *state.status.borrow();
    Json(StreamStatusResponse {
        state: stream_state,
        endpoint: state.endpoint,
    })
}
