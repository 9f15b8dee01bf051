use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;

/// One order line. Prices are integer minor units (paise).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: String,
    pub title: String,
    pub unit_price: i64,
    pub quantity: u32,
}

impl LineItem {
    /// `None` when the multiplication would overflow i64.
    pub fn line_total(&self) -> Option<i64> {
        self.unit_price.checked_mul(i64::from(self.quantity))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryLocation {
    pub lat: f64,
    pub lng: f64,
    pub address: String,
}

impl DeliveryLocation {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Placed,
    Confirmed,
    Assigned,
    PickedUp,
    Delivered,
    Returning,
    WarehouseReached,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::WarehouseReached
        )
    }

    /// States that may still be cancelled: anything before pickup.
    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            OrderStatus::Pending
                | OrderStatus::Placed
                | OrderStatus::Confirmed
                | OrderStatus::Assigned
        )
    }

    /// States in which a driver must be attached to the order.
    pub fn has_driver(self) -> bool {
        matches!(
            self,
            OrderStatus::Assigned
                | OrderStatus::PickedUp
                | OrderStatus::Delivered
                | OrderStatus::Returning
                | OrderStatus::WarehouseReached
        )
    }

    /// Legal lifecycle edges. Cancellation branches off every
    /// pre-pickup state; `picked_up -> returning -> warehouse_reached`
    /// is the failed-delivery recovery path.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        match (self, next) {
            (Pending, Placed) => true,
            (Placed, Confirmed) => true,
            (Placed, Assigned) => true,
            (Confirmed, Assigned) => true,
            (Assigned, PickedUp) => true,
            (PickedUp, Delivered) => true,
            (PickedUp, Returning) => true,
            (Returning, WarehouseReached) => true,
            (from, Cancelled) => from.is_cancellable(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub items: Vec<LineItem>,
    pub total_amount: i64,
    pub delivery_location: DeliveryLocation,
    pub status: OrderStatus,
    pub driver_id: Option<Uuid>,
    pub driver_name: Option<String>,
    pub payment_status: PaymentStatus,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Incremented on every store write; the compare-and-swap token.
    pub version: u64,
}
