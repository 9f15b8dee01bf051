use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub is_online: bool,
    pub current_order_count: u8,
    pub location: Option<GeoPoint>,
    pub location_updated_at: Option<DateTime<Utc>>,
    pub deactivated: bool,
    pub created_at: DateTime<Utc>,
}

impl Driver {
    pub fn can_take_order(&self, max_concurrent_orders: u8) -> bool {
        self.is_online && !self.deactivated && self.current_order_count < max_concurrent_orders
    }
}

/// One position report, republished to tracking subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPing {
    pub driver_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Candidate produced for a single dispatch run. Never persisted.
#[derive(Debug, Clone)]
pub struct DriverCandidate {
    pub driver_id: Uuid,
    pub name: String,
    pub distance_km: f64,
    pub load: u8,
}
