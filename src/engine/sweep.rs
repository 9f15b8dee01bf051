use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::queue::enqueue_dispatch;
use crate::state::AppState;

/// Periodic safety net for orders the initial dispatch attempt left
/// unassigned (no drivers online, everyone too far, lost races, timeouts).
/// Re-enqueues them for a fresh dispatch run; the run itself re-checks
/// order state, so double-enqueues are harmless.
pub async fn run_redispatch_sweep(state: Arc<AppState>, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "redispatch sweep started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    // The first tick fires immediately; skip it so freshly created orders
    // get their initial dispatch attempt before any sweep.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        match state.store.unassigned().await {
            Ok(orders) => {
                if orders.is_empty() {
                    continue;
                }

                debug!(count = orders.len(), "re-enqueueing unassigned orders");
                for order in orders {
                    enqueue_dispatch(&state, order.id);
                }
            }
            Err(err) => warn!(error = %err, "redispatch sweep could not scan store"),
        }
    }
}
