use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::DriverCandidate;
use crate::models::order::OrderStatus;
use crate::state::AppState;

/// How one dispatch run ended. Everything except `Assigned` leaves the
/// order unassigned and visible to the redispatch sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Assigned,
    AlreadyHandled,
    NoDriver,
    Conflict,
    TimedOut,
}

impl DispatchOutcome {
    fn label(self) -> &'static str {
        match self {
            DispatchOutcome::Assigned => "assigned",
            DispatchOutcome::AlreadyHandled => "already_handled",
            DispatchOutcome::NoDriver => "no_driver",
            DispatchOutcome::Conflict => "conflict",
            DispatchOutcome::TimedOut => "timeout",
        }
    }
}

/// Worker loop consuming order ids from the dispatch queue. Failures are
/// absorbed here; nothing propagates back to order creation.
pub async fn run_dispatch_engine(state: Arc<AppState>, mut order_rx: mpsc::Receiver<Uuid>) {
    info!("dispatch engine started");

    while let Some(order_id) = order_rx.recv().await {
        state.metrics.orders_awaiting_dispatch.dec();

        let start = Instant::now();
        let label = match dispatch_order(&state, order_id).await {
            Ok(outcome) => outcome.label(),
            Err(err) => {
                error!(order_id = %order_id, error = %err, "dispatch run failed");
                "error"
            }
        };

        state
            .metrics
            .dispatch_latency_seconds
            .with_label_values(&[label])
            .observe(start.elapsed().as_secs_f64());
        state
            .metrics
            .dispatch_total
            .with_label_values(&[label])
            .inc();
    }

    warn!("dispatch engine stopped: queue channel closed");
}

/// Pick the nearest candidate under the load cap; if even the nearest sits
/// beyond the cutoff radius there is no eligible driver.
pub fn select_candidate(
    candidates: impl Iterator<Item = DriverCandidate>,
    max_concurrent_orders: u8,
    cutoff_radius_km: f64,
) -> Option<DriverCandidate> {
    candidates
        .filter(|c| c.load < max_concurrent_orders)
        .min_by(|a, b| a.distance_km.total_cmp(&b.distance_km))
        .filter(|c| c.distance_km <= cutoff_radius_km)
}

pub async fn dispatch_order(
    state: &AppState,
    order_id: Uuid,
) -> Result<DispatchOutcome, AppError> {
    let order = match state.store.get(order_id).await {
        Ok(order) => order,
        Err(AppError::NotFound(_)) => {
            warn!(order_id = %order_id, "queued order vanished before dispatch");
            return Ok(DispatchOutcome::AlreadyHandled);
        }
        Err(err) => return Err(err),
    };

    // A sweep or manual acceptance may have gotten here first.
    if !matches!(order.status, OrderStatus::Placed | OrderStatus::Confirmed) {
        return Ok(DispatchOutcome::AlreadyHandled);
    }

    let drop_point = order.delivery_location.point();
    let max_candidates = state.config.max_candidates;
    let registry = state.registry.clone();

    let candidates = match timeout(state.config.dispatch_timeout(), async move {
        registry.candidates_near(drop_point, max_candidates)
    })
    .await
    {
        Ok(candidates) => candidates,
        Err(_) => {
            warn!(order_id = %order_id, "candidate query timed out");
            return Ok(DispatchOutcome::TimedOut);
        }
    };

    // Load cap re-checked here even though the registry filters: the
    // snapshot may be stale by the time this run looks at it.
    let Some(candidate) = select_candidate(
        candidates,
        state.registry.max_concurrent_orders(),
        state.config.cutoff_radius_km,
    ) else {
        info!(order_id = %order_id, "no eligible driver within cutoff radius");
        return Ok(DispatchOutcome::NoDriver);
    };

    let assignment = timeout(
        state.config.dispatch_timeout(),
        state
            .lifecycle
            .assign_driver(order_id, candidate.driver_id, candidate.name.clone()),
    )
    .await;

    match assignment {
        Ok(Ok(result)) => {
            if result.newly_assigned {
                state.registry.increment_load(candidate.driver_id);
            }

            info!(
                order_id = %order_id,
                driver_id = %candidate.driver_id,
                distance_km = candidate.distance_km,
                "order dispatched"
            );
            Ok(DispatchOutcome::Assigned)
        }
        Ok(Err(AppError::Conflict(_))) => {
            // Lost the race to another dispatch run or a manual acceptance.
            // Never retried within this run; the sweep owns retries.
            info!(order_id = %order_id, driver_id = %candidate.driver_id, "assignment lost race");
            Ok(DispatchOutcome::Conflict)
        }
        Ok(Err(err)) => Err(err),
        Err(_) => {
            warn!(order_id = %order_id, "assignment transition timed out");
            Ok(DispatchOutcome::TimedOut)
        }
    }
}
