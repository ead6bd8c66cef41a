mod list;
mod status;

pub use list::*;
pub use status::*;

use axum::{routing::get, Router};

use crate::tracker::{SnapshotReceiver, StatusReceiver};

#[derive(Clone)]
pub struct VehiclesState {
    pub snapshot: SnapshotReceiver,
    pub status: StatusReceiver,
    /// Endpoint being streamed, when streaming is configured
    pub endpoint: Option<String>,
}

pub fn router(
    snapshot: SnapshotReceiver,
    status: StatusReceiver,
    endpoint: Option<String>,
) -> Router {
    let state = VehiclesState {
        snapshot,
        status,
        endpoint,
    };
    Router::new()
        .route("/", get(list_vehicles))
        .route("/status", get(stream_status))
        .with_state(state)
}
