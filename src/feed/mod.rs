use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::LocationPing;
use crate::registry::DriverRegistry;
use crate::store::OrderStore;

const FEED_BUFFER_SIZE: usize = 32;

/// Bridges driver position updates to whoever is watching a specific
/// order. Resolves the order's assigned driver once, then relays that
/// driver's pings until the subscriber hangs up or the order reaches a
/// terminal state.
pub struct LocationFeed {
    store: Arc<dyn OrderStore>,
    registry: Arc<DriverRegistry>,
}

impl LocationFeed {
    pub fn new(store: Arc<dyn OrderStore>, registry: Arc<DriverRegistry>) -> Self {
        Self { store, registry }
    }

    /// The returned stream completes on order terminality. Dropping it
    /// tears down the forwarding task and its broadcast subscriptions.
    pub async fn subscribe(
        &self,
        order_id: Uuid,
    ) -> Result<ReceiverStream<LocationPing>, AppError> {
        let order = self.store.get(order_id).await?;
        let driver_id = order.driver_id.ok_or_else(|| {
            AppError::Conflict("order has no assigned driver yet".to_string())
        })?;

        let (tx, rx) = mpsc::channel(FEED_BUFFER_SIZE);
        if order.status.is_terminal() {
            // Completed stream: the sender is dropped immediately.
            return Ok(ReceiverStream::new(rx));
        }

        let mut pings = self.registry.subscribe_pings();
        let mut changes = self.store.watch(order_id);

        // The order may have gone terminal between the first read and the
        // watch subscription; re-check so the stream still completes.
        if self.store.get(order_id).await?.status.is_terminal() {
            return Ok(ReceiverStream::new(rx));
        }

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    ping = pings.recv() => match ping {
                        Ok(ping) if ping.driver_id == driver_id => {
                            if tx.send(ping).await.is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(missed)) => {
                            debug!(order_id = %order_id, missed, "feed lagged behind pings");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    change = changes.recv() => match change {
                        Ok(order) if order.status.is_terminal() => break,
                        Ok(_) => {}
                        Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => break,
                    },
                }
            }

            debug!(order_id = %order_id, "location feed closed");
        });

        Ok(ReceiverStream::new(rx))
    }
}
