use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use geojson::FeatureCollection;

#[derive(Clone)]
pub struct ShapesState {
    pub layer: Arc<FeatureCollection>,
}

/// Route shapes with their style properties
#[utoipa::path(
    get,
    path = "/api/shapes",
    responses(
        (status = 200, description = "GeoJSON FeatureCollection of route shapes")
    ),
    tag = "shapes"
)]
pub async fn list_shapes(State(state): State<ShapesState>) -> Json<FeatureCollection> {
    Json(state.layer.as_ref().clone())
}

pub fn router(layer: Arc<FeatureCollection>) -> Router {
    let state = ShapesState { layer };
    Router::new().route("/", get(list_shapes)).with_state(state)
}
