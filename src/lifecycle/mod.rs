use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{DeliveryLocation, LineItem, Order, OrderStatus, PaymentStatus};
use crate::registry::DriverRegistry;
use crate::store::{OrderStore, UpdateDecision};

pub struct NewOrder {
    pub customer_id: Uuid,
    pub items: Vec<LineItem>,
    pub total_amount: i64,
    pub delivery_location: DeliveryLocation,
}

/// Result of an assignment attempt. `newly_assigned` is false when the same
/// driver retried an assignment that had already landed.
#[derive(Debug)]
pub struct AssignmentResult {
    pub order: Order,
    pub newly_assigned: bool,
}

/// Sole mutator of `Order.status` and `Order.driver_id`. All writes go
/// through the store's conditional update, so concurrent callers racing on
/// one order are serialized by the expected-prior-state check.
pub struct OrderLifecycle {
    store: Arc<dyn OrderStore>,
    registry: Arc<DriverRegistry>,
}

impl OrderLifecycle {
    pub fn new(store: Arc<dyn OrderStore>, registry: Arc<DriverRegistry>) -> Self {
        Self { store, registry }
    }

    /// Validates and persists a new order in `placed`. Dispatch is the
    /// caller's concern; a dispatch hand-off failure must never fail
    /// creation.
    pub async fn create(&self, new: NewOrder) -> Result<Order, AppError> {
        if new.items.is_empty() {
            return Err(AppError::Validation("order has no items".to_string()));
        }

        let mut computed: i64 = 0;
        for item in &new.items {
            if item.unit_price < 0 {
                return Err(AppError::Validation(format!(
                    "unitPrice cannot be negative for {}",
                    item.product_id
                )));
            }
            if item.quantity == 0 {
                return Err(AppError::Validation(format!(
                    "quantity must be at least 1 for {}",
                    item.product_id
                )));
            }

            let line = item.line_total().ok_or_else(|| {
                AppError::Validation(format!("line total overflows for {}", item.product_id))
            })?;
            computed = computed
                .checked_add(line)
                .ok_or_else(|| AppError::Validation("order total overflows".to_string()))?;
        }

        if computed != new.total_amount {
            return Err(AppError::Validation(format!(
                "totalAmount {} does not match sum of line totals {}",
                new.total_amount, computed
            )));
        }

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            customer_id: new.customer_id,
            items: new.items,
            total_amount: new.total_amount,
            delivery_location: new.delivery_location,
            status: OrderStatus::Placed,
            driver_id: None,
            driver_name: None,
            payment_status: PaymentStatus::Pending,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
            version: 0,
        };

        self.store.create(order.clone()).await?;
        info!(order_id = %order.id, customer_id = %order.customer_id, "order placed");
        Ok(order)
    }

    pub async fn get(&self, order_id: Uuid) -> Result<Order, AppError> {
        self.store.get(order_id).await
    }

    /// Conditional transition: succeeds only if the stored status still
    /// equals `expected` at write time. Legality of the edge is checked
    /// first, so an illegal request fails the same way regardless of
    /// concurrent activity.
    pub async fn transition(
        &self,
        order_id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<Order, AppError> {
        // `assigned` and `cancelled` carry driver bookkeeping the generic
        // path would skip: only `assign_driver` may attach a driver, and
        // only `cancel` detaches one and frees the load slot.
        match next {
            OrderStatus::Assigned => {
                return Err(AppError::IllegalTransition(
                    "driver assignment must go through the assignment operation".to_string(),
                ));
            }
            OrderStatus::Cancelled => {
                return Err(AppError::IllegalTransition(
                    "cancellation must go through the cancel operation".to_string(),
                ));
            }
            _ => {}
        }

        if !expected.can_transition_to(next) {
            error!(
                order_id = %order_id,
                ?expected,
                ?next,
                "illegal transition requested"
            );
            return Err(AppError::IllegalTransition(format!(
                "{expected:?} -> {next:?} is not a legal order transition"
            )));
        }

        let (_, after) = self
            .store
            .update_if(
                order_id,
                Box::new(move |order| {
                    if order.status == expected {
                        Ok(UpdateDecision::Apply)
                    } else {
                        Err(AppError::Conflict(format!(
                            "order is {:?}, expected {:?}",
                            order.status, expected
                        )))
                    }
                }),
                Box::new(move |order| order.status = next),
            )
            .await?;

        if after.status == OrderStatus::Delivered {
            if let Some(driver_id) = after.driver_id {
                self.registry.decrement_load(driver_id);
            }
        }

        info!(order_id = %order_id, status = ?after.status, "order transitioned");
        Ok(after)
    }

    /// The one operation defending against two drivers accepting the same
    /// order: a single atomic read-modify-write. First caller wins; losers
    /// get `Conflict` and must not retry against this order. The same
    /// driver retrying after a transient failure is a no-op success.
    pub async fn assign_driver(
        &self,
        order_id: Uuid,
        driver_id: Uuid,
        driver_name: String,
    ) -> Result<AssignmentResult, AppError> {
        let name = driver_name.clone();
        let (before, after) = self
            .store
            .update_if(
                order_id,
                Box::new(move |order| match order.status {
                    OrderStatus::Placed | OrderStatus::Confirmed => Ok(UpdateDecision::Apply),
                    OrderStatus::Assigned if order.driver_id == Some(driver_id) => {
                        Ok(UpdateDecision::Skip)
                    }
                    _ => Err(AppError::Conflict("order no longer available".to_string())),
                }),
                Box::new(move |order| {
                    order.status = OrderStatus::Assigned;
                    order.driver_id = Some(driver_id);
                    order.driver_name = Some(name);
                }),
            )
            .await?;

        let newly_assigned = before.status != OrderStatus::Assigned;
        if newly_assigned {
            info!(order_id = %order_id, driver_id = %driver_id, "driver assigned");
        }

        Ok(AssignmentResult {
            order: after,
            newly_assigned,
        })
    }

    /// Allowed only before pickup. Detaches the driver (and frees their
    /// load slot) since a cancelled order no longer holds one.
    pub async fn cancel(&self, order_id: Uuid, reason: String) -> Result<Order, AppError> {
        let (before, after) = self
            .store
            .update_if(
                order_id,
                Box::new(|order| {
                    if order.status.can_transition_to(OrderStatus::Cancelled) {
                        Ok(UpdateDecision::Apply)
                    } else {
                        Err(AppError::IllegalTransition(format!(
                            "order in {:?} can no longer be cancelled",
                            order.status
                        )))
                    }
                }),
                Box::new(move |order| {
                    order.status = OrderStatus::Cancelled;
                    order.cancel_reason = Some(reason);
                    order.driver_id = None;
                    order.driver_name = None;
                }),
            )
            .await?;

        if let Some(driver_id) = before.driver_id {
            self.registry.decrement_load(driver_id);
        }

        info!(order_id = %order_id, "order cancelled");
        Ok(after)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::{NewOrder, OrderLifecycle};
    use crate::error::AppError;
    use crate::models::order::{DeliveryLocation, LineItem, OrderStatus};
    use crate::observability::metrics::Metrics;
    use crate::registry::DriverRegistry;
    use crate::store::MemoryOrderStore;

    fn lifecycle() -> (OrderLifecycle, Arc<DriverRegistry>) {
        let store = Arc::new(MemoryOrderStore::new(16));
        let registry = Arc::new(DriverRegistry::new(3, 16, Metrics::new()));
        (OrderLifecycle::new(store, registry.clone()), registry)
    }

    fn new_order(total: i64) -> NewOrder {
        NewOrder {
            customer_id: Uuid::new_v4(),
            items: vec![
                LineItem {
                    product_id: "p-1".to_string(),
                    title: "Filter Coffee".to_string(),
                    unit_price: 250,
                    quantity: 2,
                },
                LineItem {
                    product_id: "p-2".to_string(),
                    title: "Vada Pav".to_string(),
                    unit_price: 500,
                    quantity: 1,
                },
            ],
            total_amount: total,
            delivery_location: DeliveryLocation {
                lat: 19.0760,
                lng: 72.8777,
                address: "Marine Drive".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn create_persists_in_placed() {
        let (lifecycle, _) = lifecycle();
        let order = lifecycle.create(new_order(1000)).await.unwrap();

        assert_eq!(order.status, OrderStatus::Placed);
        assert!(order.driver_id.is_none());
    }

    #[tokio::test]
    async fn create_rejects_empty_items() {
        let (lifecycle, _) = lifecycle();
        let mut order = new_order(0);
        order.items.clear();

        let err = lifecycle.create(order).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn create_rejects_total_mismatch() {
        let (lifecycle, _) = lifecycle();
        let err = lifecycle.create(new_order(999)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn create_rejects_negative_unit_price_even_when_total_matches() {
        let (lifecycle, _) = lifecycle();
        let mut order = new_order(-1000);
        order.items = vec![LineItem {
            product_id: "p-1".to_string(),
            title: "Refund".to_string(),
            unit_price: -500,
            quantity: 2,
        }];

        let err = lifecycle.create(order).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn create_rejects_zero_quantity() {
        let (lifecycle, _) = lifecycle();
        let mut order = new_order(0);
        order.items = vec![LineItem {
            product_id: "p-1".to_string(),
            title: "Phantom".to_string(),
            unit_price: 500,
            quantity: 0,
        }];

        let err = lifecycle.create(order).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn create_rejects_overflowing_line_total() {
        let (lifecycle, _) = lifecycle();
        let mut order = new_order(0);
        order.items = vec![LineItem {
            product_id: "p-1".to_string(),
            title: "Everything".to_string(),
            unit_price: i64::MAX,
            quantity: 2,
        }];

        let err = lifecycle.create(order).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn transition_with_stale_expectation_conflicts() {
        let (lifecycle, _) = lifecycle();
        let order = lifecycle.create(new_order(1000)).await.unwrap();
        lifecycle
            .transition(order.id, OrderStatus::Placed, OrderStatus::Confirmed)
            .await
            .unwrap();

        // The edge is legal, but the stored state has moved on.
        let err = lifecycle
            .transition(order.id, OrderStatus::Placed, OrderStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn illegal_edge_fails_before_touching_the_store() {
        let (lifecycle, _) = lifecycle();
        let order = lifecycle.create(new_order(1000)).await.unwrap();

        let err = lifecycle
            .transition(order.id, OrderStatus::Placed, OrderStatus::Delivered)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::IllegalTransition(_)));

        let stored = lifecycle.get(order.id).await.unwrap();
        assert_eq!(stored.version, 0);
    }

    #[tokio::test]
    async fn generic_transition_cannot_attach_a_driver() {
        let (lifecycle, _) = lifecycle();
        let order = lifecycle.create(new_order(1000)).await.unwrap();

        let err = lifecycle
            .transition(order.id, OrderStatus::Placed, OrderStatus::Assigned)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::IllegalTransition(_)));

        let stored = lifecycle.get(order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Placed);
        assert!(stored.driver_id.is_none());
    }

    #[tokio::test]
    async fn generic_transition_cannot_cancel_around_the_driver_bookkeeping() {
        let (lifecycle, registry) = lifecycle();
        let driver = registry.register("Held".to_string(), None);
        let order = lifecycle.create(new_order(1000)).await.unwrap();

        lifecycle
            .assign_driver(order.id, driver.id, driver.name)
            .await
            .unwrap();
        registry.increment_load(driver.id);

        let err = lifecycle
            .transition(order.id, OrderStatus::Assigned, OrderStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::IllegalTransition(_)));

        let stored = lifecycle.get(order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Assigned);
        assert_eq!(stored.driver_id, Some(driver.id));

        // The dedicated path still works and releases the slot.
        let cancelled = lifecycle
            .cancel(order.id, "restaurant closed".to_string())
            .await
            .unwrap();
        assert!(cancelled.driver_id.is_none());
        assert_eq!(registry.get(driver.id).unwrap().current_order_count, 0);
    }

    #[tokio::test]
    async fn transition_on_unknown_order_is_not_found() {
        let (lifecycle, _) = lifecycle();
        let err = lifecycle
            .transition(Uuid::new_v4(), OrderStatus::Placed, OrderStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn assign_driver_sets_status_and_driver() {
        let (lifecycle, registry) = lifecycle();
        let driver = registry.register("Asha".to_string(), None);
        let order = lifecycle.create(new_order(1000)).await.unwrap();

        let result = lifecycle
            .assign_driver(order.id, driver.id, driver.name.clone())
            .await
            .unwrap();

        assert!(result.newly_assigned);
        assert_eq!(result.order.status, OrderStatus::Assigned);
        assert_eq!(result.order.driver_id, Some(driver.id));
        assert_eq!(result.order.driver_name.as_deref(), Some("Asha"));
    }

    #[tokio::test]
    async fn second_driver_loses_the_race() {
        let (lifecycle, registry) = lifecycle();
        let first = registry.register("First".to_string(), None);
        let second = registry.register("Second".to_string(), None);
        let order = lifecycle.create(new_order(1000)).await.unwrap();

        lifecycle
            .assign_driver(order.id, first.id, first.name)
            .await
            .unwrap();

        let err = lifecycle
            .assign_driver(order.id, second.id, second.name)
            .await
            .unwrap_err();
        match err {
            AppError::Conflict(msg) => assert_eq!(msg, "order no longer available"),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn same_driver_retry_is_a_noop_success() {
        let (lifecycle, registry) = lifecycle();
        let driver = registry.register("Retry".to_string(), None);
        let order = lifecycle.create(new_order(1000)).await.unwrap();

        let first = lifecycle
            .assign_driver(order.id, driver.id, driver.name.clone())
            .await
            .unwrap();
        let retry = lifecycle
            .assign_driver(order.id, driver.id, driver.name)
            .await
            .unwrap();

        assert!(first.newly_assigned);
        assert!(!retry.newly_assigned);
        assert_eq!(first.order.version, retry.order.version);
    }

    #[tokio::test]
    async fn concurrent_assignments_admit_exactly_one_winner() {
        let (lifecycle, registry) = lifecycle();
        let lifecycle = Arc::new(lifecycle);
        let order = lifecycle.create(new_order(1000)).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let driver = registry.register(format!("racer-{i}"), None);
            let lifecycle = lifecycle.clone();
            let order_id = order.id;
            handles.push(tokio::spawn(async move {
                lifecycle
                    .assign_driver(order_id, driver.id, driver.name)
                    .await
            }));
        }

        let mut winners = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(result) => {
                    assert!(result.newly_assigned);
                    winners += 1;
                }
                Err(AppError::Conflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(conflicts, 7);
    }

    #[tokio::test]
    async fn cancel_from_placed_reaches_terminal_state() {
        let (lifecycle, _) = lifecycle();
        let order = lifecycle.create(new_order(1000)).await.unwrap();

        let cancelled = lifecycle
            .cancel(order.id, "customer changed mind".to_string())
            .await
            .unwrap();

        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(
            cancelled.cancel_reason.as_deref(),
            Some("customer changed mind")
        );
        assert!(cancelled.status.is_terminal());
    }

    #[tokio::test]
    async fn cancel_after_pickup_is_illegal() {
        let (lifecycle, registry) = lifecycle();
        let driver = registry.register("Carrier".to_string(), None);
        let order = lifecycle.create(new_order(1000)).await.unwrap();

        lifecycle
            .assign_driver(order.id, driver.id, driver.name)
            .await
            .unwrap();
        lifecycle
            .transition(order.id, OrderStatus::Assigned, OrderStatus::PickedUp)
            .await
            .unwrap();

        let err = lifecycle
            .cancel(order.id, "too late".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::IllegalTransition(_)));
    }

    #[tokio::test]
    async fn cancel_of_assigned_order_frees_the_driver_slot() {
        let (lifecycle, registry) = lifecycle();
        let driver = registry.register("Freed".to_string(), None);
        let order = lifecycle.create(new_order(1000)).await.unwrap();

        lifecycle
            .assign_driver(order.id, driver.id, driver.name)
            .await
            .unwrap();
        registry.increment_load(driver.id);
        assert_eq!(registry.get(driver.id).unwrap().current_order_count, 1);

        let cancelled = lifecycle
            .cancel(order.id, "restaurant closed".to_string())
            .await
            .unwrap();

        assert!(cancelled.driver_id.is_none());
        assert_eq!(registry.get(driver.id).unwrap().current_order_count, 0);
    }

    #[tokio::test]
    async fn delivery_decrements_the_driver_load() {
        let (lifecycle, registry) = lifecycle();
        let driver = registry.register("Done".to_string(), None);
        let order = lifecycle.create(new_order(1000)).await.unwrap();

        lifecycle
            .assign_driver(order.id, driver.id, driver.name)
            .await
            .unwrap();
        registry.increment_load(driver.id);

        lifecycle
            .transition(order.id, OrderStatus::Assigned, OrderStatus::PickedUp)
            .await
            .unwrap();
        let delivered = lifecycle
            .transition(order.id, OrderStatus::PickedUp, OrderStatus::Delivered)
            .await
            .unwrap();

        assert_eq!(delivered.status, OrderStatus::Delivered);
        assert_eq!(delivered.driver_id, Some(driver.id));
        assert_eq!(registry.get(driver.id).unwrap().current_order_count, 0);
    }
}
