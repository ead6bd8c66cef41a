//! Route shape decoding and styling.
//!
//! Shapes arrive as precision-5 encoded polylines inside a JSON:API style
//! document, alongside the trips and routes needed to color them. The layer
//! built here is static for the life of the process and served as GeoJSON.

use std::collections::HashMap;
use std::path::Path;

use geo_types::LineString;
use geojson::{feature, Feature, FeatureCollection, Geometry, JsonObject};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::feed::types::RelationshipRef;

/// Coordinate precision of the encoded polylines
const PRECISION: u32 = 5;

#[derive(Error, Debug)]
pub enum ShapeError {
    #[error("Failed to read shape document: {0}")]
    ReadError(String),
    #[error("Failed to parse shape document: {0}")]
    ParseError(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShapeRecord {
    pub id: String,
    pub attributes: ShapeAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShapeAttributes {
    /// Encoded polyline for the full shape geometry
    pub polyline: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TripRecord {
    pub id: String,
    #[serde(default)]
    pub relationships: Option<TripRelationships>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TripRelationships {
    #[serde(default)]
    pub shape: Option<RelationshipRef>,
    #[serde(default)]
    pub route: Option<RelationshipRef>,
}

impl TripRecord {
    fn shape_id(&self) -> Option<&str> {
        let data = self.relationships.as_ref()?.shape.as_ref()?.data.as_ref()?;
        Some(data.id.as_str())
    }

    fn route_id(&self) -> Option<&str> {
        let data = self.relationships.as_ref()?.route.as_ref()?.data.as_ref()?;
        Some(data.id.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteRecord {
    pub id: String,
    pub attributes: RouteAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteAttributes {
    /// Hex color without the leading `#`
    #[serde(default)]
    pub color: Option<String>,
}

/// Side-loaded record accompanying the shapes
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncludedRecord {
    Trip(TripRecord),
    Route(RouteRecord),
    #[serde(other)]
    Other,
}

/// Shape document with its side-loaded trips and routes
#[derive(Debug, Clone, Deserialize)]
pub struct ShapeDocument {
    pub data: Vec<ShapeRecord>,
    #[serde(default)]
    pub included: Vec<IncludedRecord>,
}

pub fn load_document(path: &Path) -> Result<ShapeDocument, ShapeError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| ShapeError::ReadError(e.to_string()))?;
    serde_json::from_str(&contents).map_err(|e| ShapeError::ParseError(e.to_string()))
}

/// Decode each record's polyline into a line feature. Records that fail to
/// decode are dropped, never the whole layer.
pub fn decode_records(records: &[ShapeRecord]) -> FeatureCollection {
    let mut features = Vec::with_capacity(records.len());
    for record in records {
        match polyline::decode_polyline(&record.attributes.polyline, PRECISION) {
            Ok(line) => features.push(shape_feature(&record.id, &line)),
            Err(e) => {
                warn!(shape = %record.id, error = %e, "failed to decode shape polyline, skipping")
            }
        }
    }
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn shape_feature(id: &str, line: &LineString<f64>) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("id".to_string(), json!(id));
    Feature {
        bbox: None,
        geometry: Some(Geometry::from(line)),
        id: Some(feature::Id::String(id.to_string())),
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Keep only the canonical variant of each shape. The upstream feed marks
/// these in the shape id; every other variant duplicates the same track.
pub fn dedupe_canonical(collection: FeatureCollection) -> FeatureCollection {
    let FeatureCollection {
        bbox,
        features,
        foreign_members,
    } = collection;
    let features = features.into_iter().filter(is_canonical_line).collect();
    FeatureCollection {
        bbox,
        features,
        foreign_members,
    }
}

fn is_canonical_line(feature: &Feature) -> bool {
    let is_line = matches!(
        feature.geometry.as_ref().map(|g| &g.value),
        Some(geojson::Value::LineString(_))
    );
    let is_canonical = feature
        .properties
        .as_ref()
        .and_then(|p| p.get("id"))
        .and_then(|v| v.as_str())
        .is_some_and(|id| id.contains("canonical"));
    is_line && is_canonical
}

/// Join from shape id to route color, built from the side-loaded records
#[derive(Debug, Default)]
pub struct RouteMetadata {
    shape_to_route: HashMap<String, String>,
    route_colors: HashMap<String, String>,
}

impl RouteMetadata {
    pub fn from_included(included: &[IncludedRecord]) -> Self {
        let mut metadata = RouteMetadata::default();
        for record in included {
            match record {
                IncludedRecord::Trip(trip) => {
                    if let (Some(shape), Some(route)) = (trip.shape_id(), trip.route_id()) {
                        metadata
                            .shape_to_route
                            .insert(shape.to_string(), route.to_string());
                    } else {
                        debug!(trip = %trip.id, "trip record missing shape or route link");
                    }
                }
                IncludedRecord::Route(route) => {
                    if let Some(color) = &route.attributes.color {
                        metadata
                            .route_colors
                            .insert(route.id.clone(), format!("#{}", color));
                    }
                }
                IncludedRecord::Other => {}
            }
        }
        metadata
    }

    pub fn color_for_shape(&self, shape_id: &str) -> Option<&str> {
        let route = self.shape_to_route.get(shape_id)?;
        self.route_colors.get(route).map(String::as_str)
    }
}

/// Attach each shape's route color to its properties, where one is known
pub fn annotate_colors(collection: &mut FeatureCollection, metadata: &RouteMetadata) {
    for feature in &mut collection.features {
        let Some(shape_id) = feature
            .properties
            .as_ref()
            .and_then(|p| p.get("id"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
        else {
            continue;
        };
        match metadata.color_for_shape(&shape_id) {
            Some(color) => {
                if let Some(properties) = feature.properties.as_mut() {
                    properties.insert("color".to_string(), json!(color));
                }
            }
            None => debug!(shape = %shape_id, "no route color for shape"),
        }
    }
}

/// Decode, dedupe and color a shape document into the servable layer
pub fn build_layer(document: &ShapeDocument) -> FeatureCollection {
    let decoded = decode_records(&document.data);
    let mut layer = dedupe_canonical(decoded);
    let metadata = RouteMetadata::from_included(&document.included);
    annotate_colors(&mut layer, &metadata);
    layer
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE_POLYLINE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

    fn make_shape(id: &str, encoded: &str) -> ShapeRecord {
        ShapeRecord {
            id: id.to_string(),
            attributes: ShapeAttributes {
                polyline: encoded.to_string(),
            },
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "{} is not close to {}",
            actual,
            expected
        );
    }

    // --- polyline decoding tests ---

    #[test]
    fn test_decode_reference_polyline() {
        let records = vec![make_shape("ref", REFERENCE_POLYLINE)];
        let collection = decode_records(&records);
        assert_eq!(collection.features.len(), 1);

        let Some(Geometry {
            value: geojson::Value::LineString(line),
            ..
        }) = &collection.features[0].geometry
        else {
            panic!("expected a line geometry");
        };
        let expected = [[-120.2, 38.5], [-120.95, 40.7], [-126.453, 43.252]];
        assert_eq!(line.len(), expected.len());
        for (position, want) in line.iter().zip(expected) {
            assert_close(position[0], want[0]);
            assert_close(position[1], want[1]);
        }
    }

    #[test]
    fn test_decoded_feature_carries_id() {
        let collection = decode_records(&[make_shape("shape-7", REFERENCE_POLYLINE)]);
        let feature = &collection.features[0];
        assert_eq!(feature.id, Some(feature::Id::String("shape-7".to_string())));
        let properties = feature.properties.as_ref().unwrap();
        assert_eq!(properties["id"], json!("shape-7"));
    }

    #[test]
    fn test_malformed_polyline_is_skipped() {
        let records = vec![make_shape("good", REFERENCE_POLYLINE), make_shape("bad", "_")];
        let collection = decode_records(&records);
        assert_eq!(collection.features.len(), 1);
        assert_eq!(
            collection.features[0].id,
            Some(feature::Id::String("good".to_string()))
        );
    }

    // --- dedupe tests ---

    #[test]
    fn test_dedupe_keeps_canonical_variants() {
        let records = vec![
            make_shape("1-canonical", REFERENCE_POLYLINE),
            make_shape("1-alt", REFERENCE_POLYLINE),
        ];
        let collection = dedupe_canonical(decode_records(&records));
        assert_eq!(collection.features.len(), 1);
        assert_eq!(
            collection.features[0].id,
            Some(feature::Id::String("1-canonical".to_string()))
        );
    }

    #[test]
    fn test_dedupe_drops_features_without_line_geometry() {
        let mut properties = JsonObject::new();
        properties.insert("id".to_string(), json!("odd-canonical"));
        let feature = Feature {
            bbox: None,
            geometry: None,
            id: None,
            properties: Some(properties),
            foreign_members: None,
        };
        let collection = FeatureCollection {
            bbox: None,
            features: vec![feature],
            foreign_members: None,
        };
        assert!(dedupe_canonical(collection).features.is_empty());
    }

    // --- color join tests ---

    #[test]
    fn test_build_layer_joins_colors_through_trips() {
        let document: ShapeDocument = serde_json::from_str(
            r#"{
                "data": [
                    {"id": "shape-red-canonical", "attributes": {"polyline": "_p~iF~ps|U_ulLnnqC"}},
                    {"id": "shape-red-alt", "attributes": {"polyline": "_p~iF~ps|U_ulLnnqC"}}
                ],
                "included": [
                    {
                        "type": "trip",
                        "id": "trip-1",
                        "relationships": {
                            "shape": {"data": {"id": "shape-red-canonical", "type": "shape"}},
                            "route": {"data": {"id": "Red", "type": "route"}}
                        }
                    },
                    {"type": "route", "id": "Red", "attributes": {"color": "DA291C"}},
                    {"type": "stop", "id": "place-1"}
                ]
            }"#,
        )
        .unwrap();

        let layer = build_layer(&document);
        assert_eq!(layer.features.len(), 1);
        let properties = layer.features[0].properties.as_ref().unwrap();
        assert_eq!(properties["id"], json!("shape-red-canonical"));
        assert_eq!(properties["color"], json!("#DA291C"));
    }

    #[test]
    fn test_color_join_requires_trip_and_route() {
        let document: ShapeDocument = serde_json::from_str(
            r#"{
                "data": [],
                "included": [
                    {
                        "type": "trip",
                        "id": "trip-1",
                        "relationships": {"shape": {"data": {"id": "s1", "type": "shape"}}}
                    },
                    {"type": "route", "id": "Red", "attributes": {"color": "DA291C"}}
                ]
            }"#,
        )
        .unwrap();
        let metadata = RouteMetadata::from_included(&document.included);
        assert_eq!(metadata.color_for_shape("s1"), None);
    }

    #[test]
    fn test_shape_without_color_is_left_plain() {
        let records = vec![make_shape("lone-canonical", REFERENCE_POLYLINE)];
        let mut collection = decode_records(&records);
        annotate_colors(&mut collection, &RouteMetadata::default());
        let properties = collection.features[0].properties.as_ref().unwrap();
        assert!(!properties.contains_key("color"));
    }

    #[test]
    fn test_document_without_included_parses() {
        let document: ShapeDocument = serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert!(document.data.is_empty());
        assert!(document.included.is_empty());
    }
}
