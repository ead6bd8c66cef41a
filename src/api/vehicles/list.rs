use axum::{extract::State, Json};
use geojson::FeatureCollection;

use super::VehiclesState;

/// Current vehicle positions
#[utoipa::path(
    get,
    path = "/api/vehicles",
    responses(
        (status = 200, description = "GeoJSON FeatureCollection of current vehicle positions")
    ),
    tag = "vehicles"
)]
pub async fn list_vehicles(State(state): State<VehiclesState>) -> Json<FeatureCollection> {
    let snapshot = state.snapshot.borrow().as_ref().clone();
    Json(snapshot)
}
