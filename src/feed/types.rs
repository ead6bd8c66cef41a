//! Wire types for the vehicle stream and the messages relayed to consumers.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Connection state of the upstream stream, observable by consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
            ConnectionState::Error => "error",
        }
    }
}

/// Movement status reported per vehicle by the upstream feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementStatus {
    StoppedAt,
    InTransitTo,
    IncomingAt,
    /// Used when the feed reports a status this build does not know
    #[serde(other)]
    Unknown,
}

impl MovementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementStatus::StoppedAt => "STOPPED_AT",
            MovementStatus::InTransitTo => "IN_TRANSIT_TO",
            MovementStatus::IncomingAt => "INCOMING_AT",
            MovementStatus::Unknown => "UNKNOWN",
        }
    }
}

/// Full vehicle record as delivered by `reset`, `add` and `update` events.
/// Only the fields the engine consumes are typed; everything else in the
/// upstream record passes through untouched.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VehicleRecord {
    pub id: String,
    pub attributes: VehicleAttributes,
    #[serde(default)]
    pub relationships: Option<VehicleRelationships>,
}

/// Position and display attributes of a vehicle record
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VehicleAttributes {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub bearing: Option<f64>,
    #[serde(default)]
    pub current_status: Option<MovementStatus>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VehicleRelationships {
    #[serde(default)]
    pub route: Option<RelationshipRef>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelationshipRef {
    #[serde(default)]
    pub data: Option<RefData>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RefData {
    pub id: String,
}

/// Minimal record carried by `remove` events
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoveRecord {
    pub id: String,
}

/// A parsed stream event, tagged with its upstream event type
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Complete current state, always the first event after a connection opens
    Reset(Vec<VehicleRecord>),
    /// A newly appeared vehicle
    Add(VehicleRecord),
    /// Replacement state for an already known vehicle
    Update(VehicleRecord),
    /// A vehicle that disappeared from the feed
    Remove(RemoveRecord),
}

impl FeedEvent {
    /// Parse a named stream event's JSON payload.
    ///
    /// Returns `Ok(None)` for event types this engine does not consume.
    pub fn parse(event: &str, data: &str) -> Result<Option<Self>, serde_json::Error> {
        match event {
            "reset" => serde_json::from_str(data).map(FeedEvent::Reset).map(Some),
            "add" => serde_json::from_str(data).map(FeedEvent::Add).map(Some),
            "update" => serde_json::from_str(data).map(FeedEvent::Update).map(Some),
            "remove" => serde_json::from_str(data).map(FeedEvent::Remove).map(Some),
            _ => Ok(None),
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            FeedEvent::Reset(_) => "reset",
            FeedEvent::Add(_) => "add",
            FeedEvent::Update(_) => "update",
            FeedEvent::Remove(_) => "remove",
        }
    }
}

/// Message union delivered to the registered session callback
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    /// Connection state transition
    Status(ConnectionState),
    /// A parsed stream event
    Data(FeedEvent),
    /// A non-fatal failure, e.g. a payload that did not parse
    Error(String),
}

/// Target description for one streaming session
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOptions {
    pub api_key: String,
    pub endpoint: String,
    /// Raw query fragment appended to the stream URL, e.g. `filter[route]=Red`
    pub filter_params: Option<String>,
}

impl StreamOptions {
    /// Fully-qualified stream URL. Two starts targeting the same URL are
    /// the same logical session.
    pub fn feed_url(&self, base_url: &str) -> String {
        let mut url = format!(
            "{}/{}/?api_key={}",
            base_url.trim_end_matches('/'),
            self.endpoint,
            self.api_key
        );
        if let Some(filter) = &self.filter_params {
            url.push('&');
            url.push_str(filter);
        }
        url
    }
}
