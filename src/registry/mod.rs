use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::driver::{Driver, DriverCandidate, GeoPoint, LocationPing};
use crate::observability::metrics::Metrics;

/// Queryable index of drivers eligible for dispatch. Load counters are a
/// ranking heuristic with last-writer-wins semantics; exclusivity lives in
/// the order state machine, not here.
pub struct DriverRegistry {
    drivers: DashMap<Uuid, Driver>,
    location_tx: broadcast::Sender<LocationPing>,
    max_concurrent_orders: u8,
    metrics: Metrics,
}

impl DriverRegistry {
    pub fn new(max_concurrent_orders: u8, ping_buffer_size: usize, metrics: Metrics) -> Self {
        let (location_tx, _unused_rx) = broadcast::channel(ping_buffer_size);
        Self {
            drivers: DashMap::new(),
            location_tx,
            max_concurrent_orders,
            metrics,
        }
    }

    pub fn max_concurrent_orders(&self) -> u8 {
        self.max_concurrent_orders
    }

    pub fn register(&self, name: String, location: Option<GeoPoint>) -> Driver {
        let now = Utc::now();
        let driver = Driver {
            id: Uuid::new_v4(),
            name,
            is_online: true,
            current_order_count: 0,
            location,
            location_updated_at: location.map(|_| now),
            deactivated: false,
            created_at: now,
        };

        self.drivers.insert(driver.id, driver.clone());
        driver
    }

    pub fn get(&self, id: Uuid) -> Result<Driver, AppError> {
        self.drivers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("driver {} not found", id)))
    }

    pub fn all(&self) -> Vec<Driver> {
        self.drivers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn report_location(&self, id: Uuid, lat: f64, lng: f64) -> Result<Driver, AppError> {
        let driver = {
            let mut driver = self
                .drivers
                .get_mut(&id)
                .ok_or_else(|| AppError::NotFound(format!("driver {} not found", id)))?;

            driver.location = Some(GeoPoint { lat, lng });
            driver.location_updated_at = Some(Utc::now());
            driver.clone()
        };

        let _ = self.location_tx.send(LocationPing {
            driver_id: id,
            lat,
            lng,
            recorded_at: Utc::now(),
        });

        Ok(driver)
    }

    pub fn set_online(&self, id: Uuid, online: bool) -> Result<Driver, AppError> {
        let mut driver = self
            .drivers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("driver {} not found", id)))?;

        driver.is_online = online;
        Ok(driver.clone())
    }

    /// Soft-deactivate: the driver drops out of dispatch but the record
    /// stays, since historical orders reference it.
    pub fn deactivate(&self, id: Uuid) -> Result<Driver, AppError> {
        let mut driver = self
            .drivers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("driver {} not found", id)))?;

        driver.deactivated = true;
        driver.is_online = false;
        Ok(driver.clone())
    }

    /// Single query snapshot of eligible drivers ordered by ascending
    /// distance to the given point. Non-restartable; re-invoke for a
    /// fresh view.
    pub fn candidates_near(
        &self,
        point: GeoPoint,
        max_results: usize,
    ) -> std::vec::IntoIter<DriverCandidate> {
        let mut candidates: Vec<DriverCandidate> = self
            .drivers
            .iter()
            .filter_map(|entry| {
                let driver = entry.value();
                if !driver.can_take_order(self.max_concurrent_orders) {
                    return None;
                }

                let location = driver.location?;
                Some(DriverCandidate {
                    driver_id: driver.id,
                    name: driver.name.clone(),
                    distance_km: haversine_km(&location, &point),
                    load: driver.current_order_count,
                })
            })
            .collect();

        candidates.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        candidates.truncate(max_results);
        candidates.into_iter()
    }

    // Load counters mutate only here, so the per-driver gauge stays in
    // step with `current_order_count` no matter which path changed it.
    pub fn increment_load(&self, id: Uuid) {
        if let Some(mut driver) = self.drivers.get_mut(&id) {
            driver.current_order_count = driver.current_order_count.saturating_add(1);
            self.set_load_gauge(id, driver.current_order_count);
        }
    }

    pub fn decrement_load(&self, id: Uuid) {
        if let Some(mut driver) = self.drivers.get_mut(&id) {
            driver.current_order_count = driver.current_order_count.saturating_sub(1);
            self.set_load_gauge(id, driver.current_order_count);
        }
    }

    fn set_load_gauge(&self, id: Uuid, count: u8) {
        self.metrics
            .driver_load
            .with_label_values(&[&id.to_string()])
            .set(f64::from(count));
    }

    pub fn subscribe_pings(&self) -> broadcast::Receiver<LocationPing> {
        self.location_tx.subscribe()
    }
}
