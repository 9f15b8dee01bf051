use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};

/// Whether a conditional update should write or leave the document as-is.
/// `Skip` is the idempotent no-op path (e.g. the same driver retrying an
/// assignment that already succeeded).
pub enum UpdateDecision {
    Apply,
    Skip,
}

pub type CheckFn = Box<dyn FnOnce(&Order) -> Result<UpdateDecision, AppError> + Send>;
pub type ApplyFn = Box<dyn FnOnce(&mut Order) + Send>;

/// Contract the core needs from a document store: get, create,
/// atomic conditional update, and per-document change subscriptions.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, order: Order) -> Result<(), AppError>;

    async fn get(&self, id: Uuid) -> Result<Order, AppError>;

    /// Atomic read-modify-write on one order document. `check` runs against
    /// the current document while the entry is exclusively held; if it
    /// decides `Apply`, `apply` mutates the document and the version and
    /// `updated_at` are bumped in the same critical section. Returns the
    /// document before and after the write (identical on `Skip`).
    async fn update_if(
        &self,
        id: Uuid,
        check: CheckFn,
        apply: ApplyFn,
    ) -> Result<(Order, Order), AppError>;

    /// Change feed for one order. Every successful write republishes the
    /// full document snapshot.
    fn watch(&self, id: Uuid) -> broadcast::Receiver<Order>;

    /// Snapshot of orders still waiting for a driver, for the redispatch
    /// sweep.
    async fn unassigned(&self) -> Result<Vec<Order>, AppError>;

    async fn count(&self) -> usize;
}

/// In-process store. DashMap entry guards give per-document atomicity;
/// a versioned write counter stands in for the document database's
/// compare-and-swap primitive.
pub struct MemoryOrderStore {
    orders: DashMap<Uuid, Order>,
    watchers: DashMap<Uuid, broadcast::Sender<Order>>,
    event_buffer_size: usize,
}

impl MemoryOrderStore {
    pub fn new(event_buffer_size: usize) -> Self {
        Self {
            orders: DashMap::new(),
            watchers: DashMap::new(),
            event_buffer_size,
        }
    }

    fn publish(&self, order: &Order) {
        if let Some(tx) = self.watchers.get(&order.id) {
            let _ = tx.send(order.clone());
        }
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create(&self, order: Order) -> Result<(), AppError> {
        match self.orders.entry(order.id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "order {} already exists",
                order.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(order);
                Ok(())
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Order, AppError> {
        self.orders
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("order {} not found", id)))
    }

    async fn update_if(
        &self,
        id: Uuid,
        check: CheckFn,
        apply: ApplyFn,
    ) -> Result<(Order, Order), AppError> {
        let snapshot = {
            let mut entry = self
                .orders
                .get_mut(&id)
                .ok_or_else(|| AppError::NotFound(format!("order {} not found", id)))?;

            let before = entry.value().clone();
            match check(entry.value())? {
                UpdateDecision::Skip => return Ok((before.clone(), before)),
                UpdateDecision::Apply => {}
            }

            let order = entry.value_mut();
            apply(order);
            order.version += 1;
            order.updated_at = Utc::now();
            (before, order.clone())
        };

        self.publish(&snapshot.1);
        Ok(snapshot)
    }

    fn watch(&self, id: Uuid) -> broadcast::Receiver<Order> {
        self.watchers
            .entry(id)
            .or_insert_with(|| broadcast::channel(self.event_buffer_size).0)
            .subscribe()
    }

    async fn unassigned(&self) -> Result<Vec<Order>, AppError> {
        Ok(self
            .orders
            .iter()
            .filter(|entry| {
                let order = entry.value();
                matches!(order.status, OrderStatus::Placed | OrderStatus::Confirmed)
                    && order.driver_id.is_none()
            })
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn count(&self) -> usize {
        self.orders.len()
    }
}
