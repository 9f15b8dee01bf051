use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::IdentityProvider;
use crate::config::Config;
use crate::feed::LocationFeed;
use crate::lifecycle::OrderLifecycle;
use crate::observability::metrics::Metrics;
use crate::registry::DriverRegistry;
use crate::store::{MemoryOrderStore, OrderStore};

/// Dependency container wired once at startup and shared behind an Arc.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn OrderStore>,
    pub registry: Arc<DriverRegistry>,
    pub lifecycle: OrderLifecycle,
    pub feed: LocationFeed,
    pub identities: IdentityProvider,
    pub dispatch_tx: mpsc::Sender<Uuid>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> (Self, mpsc::Receiver<Uuid>) {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(config.dispatch_queue_size);

        let metrics = Metrics::new();
        let store: Arc<dyn OrderStore> =
            Arc::new(MemoryOrderStore::new(config.event_buffer_size));
        let registry = Arc::new(DriverRegistry::new(
            config.max_concurrent_orders,
            config.event_buffer_size,
            metrics.clone(),
        ));

        (
            Self {
                lifecycle: OrderLifecycle::new(store.clone(), registry.clone()),
                feed: LocationFeed::new(store.clone(), registry.clone()),
                identities: IdentityProvider::new(),
                store,
                registry,
                config,
                dispatch_tx,
                metrics,
            },
            dispatch_rx,
        )
    }
}
