// ── Endpoint server seam ──
//
// The protocol listener for one published endpoint lives outside this
// crate. The bridge drives it through `EndpointServer` and learns about
// advertising and pairing through `EndpointEvent`s on a channel it owns.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::model::{Accessory, AccessoryId, Category, Username};
use crate::serialize::AttributeDatabase;
use crate::store::IdentifierCache;

// ── EndpointId ──────────────────────────────────────────────────────

/// Identifies a published endpoint of a bridge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EndpointId {
    /// The bridge's own endpoint.
    Primary,
    /// The dedicated endpoint of one external accessory.
    External(AccessoryId),
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::External(uuid) => write!(f, "external:{uuid}"),
        }
    }
}

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("Failed to bind listener: {0}")]
    Bind(String),

    #[error("Failed to advertise: {0}")]
    Advertise(String),

    #[error("Endpoint is not running")]
    NotRunning,

    #[error("{0}")]
    Other(String),
}

// ── Messages ────────────────────────────────────────────────────────

/// Everything an endpoint server needs to announce itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    pub endpoint: EndpointId,
    pub username: Username,
    pub display_name: String,
    pub category: Category,
    pub setup_id: String,
    pub config_version: u16,
    pub paired: bool,
    pub database: AttributeDatabase,
}

/// Raised by endpoint servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointEvent {
    /// The endpoint is listening and announced on the network.
    Advertising { endpoint: EndpointId },
    Paired {
        endpoint: EndpointId,
        client: String,
        public_key: String,
        admin: bool,
    },
    Unpaired { endpoint: EndpointId, client: String },
}

pub type EndpointEventSender = mpsc::UnboundedSender<EndpointEvent>;

/// A characteristic value change forwarded to subscribed clients.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacteristicChange {
    pub uuid: AccessoryId,
    pub service: String,
    pub subtype: Option<String>,
    pub characteristic: String,
    pub value: Value,
}

// ── Traits ──────────────────────────────────────────────────────────

/// Protocol listener for one endpoint.
#[async_trait]
pub trait EndpointServer: Send + Sync {
    /// Start listening and advertising. Implementations report
    /// [`EndpointEvent::Advertising`] on `events` once announced.
    async fn start(&self, advertisement: Advertisement, events: EndpointEventSender) -> Result<(), EndpointError>;

    async fn stop(&self) -> Result<(), EndpointError>;

    /// Re-announce after a configuration change.
    async fn update_advertisement(&self, advertisement: Advertisement) -> Result<(), EndpointError>;

    /// Drop every client subscription to characteristics of `uuid`.
    async fn unsubscribe_all_events(&self, uuid: &AccessoryId);

    async fn notify_change(&self, _change: CharacteristicChange) {}

    /// Serialize an accessory graph, touching its identifiers.
    fn serialize(&self, accessories: &[&Accessory], cache: &mut IdentifierCache) -> AttributeDatabase {
        AttributeDatabase::build(accessories.iter().copied(), cache)
    }
}

/// Creates endpoint servers on demand.
pub trait EndpointServerFactory: Send + Sync {
    fn create(&self, endpoint: &EndpointId, username: &Username) -> Arc<dyn EndpointServer>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_id_display() {
        assert_eq!(EndpointId::Primary.to_string(), "primary");
        assert_eq!(
            EndpointId::External(AccessoryId::from("tv")).to_string(),
            "external:tv"
        );
    }

    #[test]
    fn primary_sorts_first() {
        let mut ids = vec![EndpointId::External(AccessoryId::from("a")), EndpointId::Primary];
        ids.sort();
        assert_eq!(ids[0], EndpointId::Primary);
    }
}
