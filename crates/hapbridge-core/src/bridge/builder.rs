// ── Bridge construction ──

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::events::event_pump;
use super::topology::Topology;
use super::{Bridge, BridgeInner, PublishState};
use crate::coalescer::UpdateCoalescer;
use crate::config::BridgeConfig;
use crate::endpoint::EndpointServerFactory;
use crate::error::CoreError;
use crate::store::IdentityStore;

/// Finishes configuration before a [`Bridge`] exists. Once built, the
/// topology operations are the only way to change the bridge.
pub struct BridgeBuilder {
    config: BridgeConfig,
    store: Option<IdentityStore>,
    factory: Option<Arc<dyn EndpointServerFactory>>,
}

impl BridgeBuilder {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            store: None,
            factory: None,
        }
    }

    /// Use `store` instead of the one implied by `storage_path`.
    #[must_use]
    pub fn store(mut self, store: IdentityStore) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn endpoint_factory(mut self, factory: Arc<dyn EndpointServerFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Validate the configuration, load the previous run's topology record
    /// and start the bridge's event task. Must be called inside a tokio
    /// runtime.
    pub async fn build(self) -> Result<Bridge, CoreError> {
        let Self {
            config,
            store,
            factory,
        } = self;
        config.validate()?;

        let factory = factory.ok_or_else(|| {
            CoreError::validation("endpoint_factory", "an endpoint server factory is required")
        })?;
        let store = store.unwrap_or_else(|| match &config.storage_path {
            Some(path) => IdentityStore::file(path),
            None => IdentityStore::memory(),
        });

        let record = store.load_topology(&config.username).await?;
        if let Some(record) = &record {
            debug!(recorded = record.accessories.len(), "loaded topology record");
        }
        let topology = Topology::new(config.bridge_accessory(), record);

        let (coalescer, flush_rx) = UpdateCoalescer::new(config.update_window);
        let (publish_state, _) = watch::channel(PublishState::Unpublished);
        let (endpoint_tx, endpoint_rx) = mpsc::unbounded_channel();
        let (accessory_tx, accessory_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        info!(name = %config.display_name, username = %config.username, "bridge built");
        let inner = Arc::new(BridgeInner {
            config,
            store,
            factory,
            topology: Mutex::new(topology),
            coalescer,
            publish_state,
            endpoint_tx,
            accessory_tx,
            cancel: cancel.clone(),
        });

        tokio::spawn(event_pump(
            Arc::downgrade(&inner),
            endpoint_rx,
            accessory_rx,
            flush_rx,
            cancel,
        ));

        Ok(Bridge { inner })
    }
}
