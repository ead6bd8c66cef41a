//! Reconciliation of stream events into the tracked vehicle set.

use geojson::{feature::Id, Feature, FeatureCollection, Geometry, JsonObject};
use serde_json::json;

use crate::feed::types::{FeedEvent, MovementStatus, VehicleRecord};

/// Tracked state of one vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    pub id: String,
    pub longitude: f64,
    pub latitude: f64,
    pub bearing: Option<f64>,
    pub status: Option<MovementStatus>,
    pub label: Option<String>,
    pub route: Option<String>,
    pub speed: Option<f64>,
}

impl From<VehicleRecord> for Vehicle {
    fn from(record: VehicleRecord) -> Self {
        let route = record
            .relationships
            .and_then(|r| r.route)
            .and_then(|r| r.data)
            .map(|d| d.id);
        Vehicle {
            id: record.id,
            longitude: record.attributes.longitude,
            latitude: record.attributes.latitude,
            bearing: record.attributes.bearing,
            status: record.attributes.current_status,
            label: record.attributes.label,
            route,
            speed: record.attributes.speed,
        }
    }
}

/// The vehicle set as reconciled from the stream so far.
///
/// Insertion order is preserved; in-place updates keep a vehicle's position.
#[derive(Debug, Default)]
pub struct VehicleStore {
    vehicles: Vec<Vehicle>,
}

impl VehicleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one stream event into the set.
    ///
    /// `add` and `update` both upsert: the stream is trusted over local
    /// membership bookkeeping, so an update for an unknown vehicle inserts
    /// it and an add for a known one replaces it. Removing an unknown
    /// vehicle does nothing.
    pub fn apply(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Reset(records) => {
                self.vehicles.clear();
                for record in records {
                    self.upsert(record.into());
                }
            }
            FeedEvent::Add(record) | FeedEvent::Update(record) => self.upsert(record.into()),
            FeedEvent::Remove(record) => self.remove(&record.id),
        }
    }

    fn upsert(&mut self, vehicle: Vehicle) {
        match self.vehicles.iter_mut().find(|v| v.id == vehicle.id) {
            Some(existing) => *existing = vehicle,
            None => self.vehicles.push(vehicle),
        }
    }

    fn remove(&mut self, id: &str) {
        self.vehicles.retain(|v| v.id != id);
    }

    /// Snapshot of the whole set as point features
    pub fn to_feature_collection(&self) -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: self.vehicles.iter().map(vehicle_feature).collect(),
            foreign_members: None,
        }
    }
}

fn vehicle_feature(vehicle: &Vehicle) -> Feature {
    let mut properties = JsonObject::new();
    if let Some(bearing) = vehicle.bearing {
        properties.insert("bearing".to_string(), json!(bearing));
    }
    if let Some(status) = vehicle.status {
        properties.insert("status".to_string(), json!(status.as_str()));
    }
    if let Some(label) = &vehicle.label {
        properties.insert("label".to_string(), json!(label));
    }
    if let Some(route) = &vehicle.route {
        properties.insert("route".to_string(), json!(route));
    }
    if let Some(speed) = vehicle.speed {
        properties.insert("speed".to_string(), json!(speed));
    }
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geojson::Value::Point(vec![
            vehicle.longitude,
            vehicle.latitude,
        ]))),
        id: Some(Id::String(vehicle.id.clone())),
        properties: Some(properties),
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::{
        RefData, RelationshipRef, RemoveRecord, VehicleAttributes, VehicleRelationships,
    };

    fn make_record(id: &str, latitude: f64, longitude: f64) -> VehicleRecord {
        VehicleRecord {
            id: id.to_string(),
            attributes: VehicleAttributes {
                latitude,
                longitude,
                bearing: None,
                current_status: None,
                label: None,
                speed: None,
            },
            relationships: None,
        }
    }

    fn remove_for(id: &str) -> FeedEvent {
        FeedEvent::Remove(RemoveRecord { id: id.to_string() })
    }

    fn find<'a>(store: &'a VehicleStore, id: &str) -> Option<&'a Vehicle> {
        store.vehicles.iter().find(|v| v.id == id)
    }

    // --- reconciliation tests ---

    #[test]
    fn test_reset_replaces_everything() {
        let mut store = VehicleStore::new();
        store.apply(FeedEvent::Reset(vec![
            make_record("a", 1.0, 1.0),
            make_record("b", 2.0, 2.0),
        ]));
        assert_eq!(store.vehicles.len(), 2);

        store.apply(FeedEvent::Reset(vec![make_record("c", 3.0, 3.0)]));
        assert_eq!(store.vehicles.len(), 1);
        assert!(find(&store, "a").is_none());
        assert!(find(&store, "c").is_some());
    }

    #[test]
    fn test_update_for_unknown_vehicle_inserts() {
        let mut store = VehicleStore::new();
        store.apply(FeedEvent::Update(make_record("ghost", 4.0, 5.0)));
        assert_eq!(store.vehicles.len(), 1);
        assert_eq!(find(&store, "ghost").unwrap().latitude, 4.0);
    }

    #[test]
    fn test_add_for_known_vehicle_replaces() {
        let mut store = VehicleStore::new();
        store.apply(FeedEvent::Add(make_record("a", 1.0, 1.0)));
        store.apply(FeedEvent::Add(make_record("a", 9.0, 9.0)));
        assert_eq!(store.vehicles.len(), 1);
        assert_eq!(find(&store, "a").unwrap().latitude, 9.0);
    }

    #[test]
    fn test_remove_unknown_vehicle_is_noop() {
        let mut store = VehicleStore::new();
        store.apply(FeedEvent::Add(make_record("a", 1.0, 1.0)));
        store.apply(remove_for("missing"));
        assert_eq!(store.vehicles.len(), 1);
    }

    #[test]
    fn test_applying_same_update_twice_is_idempotent() {
        let mut store = VehicleStore::new();
        store.apply(FeedEvent::Reset(vec![make_record("a", 1.0, 1.0)]));
        store.apply(FeedEvent::Update(make_record("a", 5.0, 5.0)));
        let after_one = store.vehicles.clone();
        store.apply(FeedEvent::Update(make_record("a", 5.0, 5.0)));
        assert_eq!(store.vehicles, after_one);
    }

    #[test]
    fn test_add_then_remove_restores_prior_state() {
        let mut store = VehicleStore::new();
        store.apply(FeedEvent::Reset(vec![make_record("a", 1.0, 1.0)]));
        let before = store.vehicles.clone();
        store.apply(FeedEvent::Add(make_record("b", 2.0, 2.0)));
        store.apply(remove_for("b"));
        assert_eq!(store.vehicles, before);
    }

    #[test]
    fn test_event_sequence_settles_on_expected_set() {
        let mut store = VehicleStore::new();
        store.apply(FeedEvent::Reset(vec![
            make_record("a", 1.0, 1.0),
            make_record("b", 2.0, 2.0),
        ]));
        store.apply(FeedEvent::Update(make_record("a", 1.5, 1.5)));
        store.apply(remove_for("b"));
        store.apply(FeedEvent::Add(make_record("c", 3.0, 3.0)));

        assert_eq!(store.vehicles.len(), 2);
        assert_eq!(find(&store, "a").unwrap().latitude, 1.5);
        assert!(find(&store, "b").is_none());
        assert!(find(&store, "c").is_some());
    }

    #[test]
    fn test_duplicate_ids_in_reset_collapse_to_last() {
        let mut store = VehicleStore::new();
        store.apply(FeedEvent::Reset(vec![
            make_record("a", 1.0, 1.0),
            make_record("a", 2.0, 2.0),
        ]));
        assert_eq!(store.vehicles.len(), 1);
        assert_eq!(find(&store, "a").unwrap().latitude, 2.0);
    }

    #[test]
    fn test_update_preserves_ordering() {
        let mut store = VehicleStore::new();
        store.apply(FeedEvent::Reset(vec![
            make_record("a", 1.0, 1.0),
            make_record("b", 2.0, 2.0),
            make_record("c", 3.0, 3.0),
        ]));
        store.apply(FeedEvent::Update(make_record("b", 8.0, 8.0)));

        let ids: Vec<&str> = store.vehicles.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    // --- snapshot tests ---

    #[test]
    fn test_feature_collection_shape() {
        let mut record = make_record("veh-1", 42.33, -71.05);
        record.attributes.bearing = Some(135.0);
        record.attributes.current_status = Some(MovementStatus::StoppedAt);
        record.attributes.label = Some("1817".to_string());
        record.relationships = Some(VehicleRelationships {
            route: Some(RelationshipRef {
                data: Some(RefData {
                    id: "Red".to_string(),
                }),
            }),
        });

        let mut store = VehicleStore::new();
        store.apply(FeedEvent::Add(record));
        let collection = store.to_feature_collection();
        assert_eq!(collection.features.len(), 1);

        let feature = &collection.features[0];
        assert_eq!(feature.id, Some(Id::String("veh-1".to_string())));
        let Some(Geometry {
            value: geojson::Value::Point(position),
            ..
        }) = &feature.geometry
        else {
            panic!("expected a point geometry");
        };
        assert_eq!(position, &vec![-71.05, 42.33]);

        let properties = feature.properties.as_ref().unwrap();
        assert_eq!(properties["bearing"], json!(135.0));
        assert_eq!(properties["status"], json!("STOPPED_AT"));
        assert_eq!(properties["label"], json!("1817"));
        assert_eq!(properties["route"], json!("Red"));
        assert!(!properties.contains_key("speed"));
    }

    #[test]
    fn test_empty_store_yields_empty_collection() {
        let store = VehicleStore::new();
        let collection = store.to_feature_collection();
        assert!(collection.features.is_empty());
    }
}
