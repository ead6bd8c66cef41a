pub mod health;
pub mod shapes;
pub mod vehicles;
pub mod ws;

use std::sync::Arc;

use axum::{routing::get, Router};
use geojson::FeatureCollection;

use crate::tracker::VehicleTracker;

pub fn router(
    tracker: &VehicleTracker,
    shape_layer: Arc<FeatureCollection>,
    endpoint: Option<String>,
) -> Router {
    let ws_state = ws::WsState {
        snapshot: tracker.snapshot(),
        status: tracker.status(),
        notices_tx: tracker.notices(),
    };

    Router::new()
        .nest(
            "/vehicles",
            vehicles::router(tracker.snapshot(), tracker.status(), endpoint),
        )
        .nest("/shapes", shapes::router(shape_layer.clone()))
        .nest(
            "/health",
            health::router(tracker.status(), shape_layer.features.len()),
        )
        .route("/ws", get(ws::ws_stream).with_state(ws_state))
}
