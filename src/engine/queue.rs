use tracing::warn;
use uuid::Uuid;

use crate::state::AppState;

/// Best-effort hand-off to the dispatch worker. Order creation must never
/// fail because dispatch could not be queued; a dropped hand-off leaves the
/// order for the redispatch sweep.
pub fn enqueue_dispatch(state: &AppState, order_id: Uuid) {
    match state.dispatch_tx.try_send(order_id) {
        Ok(()) => state.metrics.orders_awaiting_dispatch.inc(),
        Err(err) => warn!(
            order_id = %order_id,
            error = %err,
            "dispatch enqueue failed; order left for redispatch sweep"
        ),
    }
}
