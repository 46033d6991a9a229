//! Endpoint server that only logs what it would announce.
//!
//! Lets `hapbridge run` exercise the full bridge lifecycle (identity
//! derivation, persistence, coalesced re-advertisement) without a network
//! listener.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use hapbridge_core::{
    AccessoryId, Advertisement, CharacteristicChange, EndpointError, EndpointEvent,
    EndpointEventSender, EndpointId, EndpointServer, EndpointServerFactory, Username,
};

pub struct LoggingEndpointServer {
    endpoint: EndpointId,
    username: Username,
    events: Mutex<Option<EndpointEventSender>>,
}

impl LoggingEndpointServer {
    pub fn new(endpoint: EndpointId, username: Username) -> Self {
        Self {
            endpoint,
            username,
            events: Mutex::new(None),
        }
    }
}

#[async_trait]
impl EndpointServer for LoggingEndpointServer {
    async fn start(
        &self,
        advertisement: Advertisement,
        events: EndpointEventSender,
    ) -> Result<(), EndpointError> {
        info!(
            endpoint = %self.endpoint,
            username = %self.username,
            name = %advertisement.display_name,
            category = %advertisement.category,
            config_version = advertisement.config_version,
            accessories = advertisement.database.len(),
            "advertising endpoint"
        );
        events
            .send(EndpointEvent::Advertising {
                endpoint: self.endpoint.clone(),
            })
            .map_err(|e| EndpointError::Advertise(e.to_string()))?;
        *self.events.lock().await = Some(events);
        Ok(())
    }

    async fn stop(&self) -> Result<(), EndpointError> {
        if self.events.lock().await.take().is_none() {
            return Err(EndpointError::NotRunning);
        }
        info!(endpoint = %self.endpoint, "endpoint stopped");
        Ok(())
    }

    async fn update_advertisement(&self, advertisement: Advertisement) -> Result<(), EndpointError> {
        if self.events.lock().await.is_none() {
            return Err(EndpointError::NotRunning);
        }
        info!(
            endpoint = %self.endpoint,
            config_version = advertisement.config_version,
            accessories = advertisement.database.len(),
            "configuration changed"
        );
        Ok(())
    }

    async fn unsubscribe_all_events(&self, uuid: &AccessoryId) {
        debug!(endpoint = %self.endpoint, %uuid, "dropping subscriptions");
    }

    async fn notify_change(&self, change: CharacteristicChange) {
        debug!(
            endpoint = %self.endpoint,
            uuid = %change.uuid,
            characteristic = %change.characteristic,
            value = %change.value,
            "characteristic changed"
        );
    }
}

/// Creates a [`LoggingEndpointServer`] per endpoint.
#[derive(Debug, Default)]
pub struct LoggingServerFactory;

impl EndpointServerFactory for LoggingServerFactory {
    fn create(&self, endpoint: &EndpointId, username: &Username) -> Arc<dyn EndpointServer> {
        Arc::new(LoggingEndpointServer::new(endpoint.clone(), username.clone()))
    }
}
