// hapbridge-core: Accessory bridge topology between the plugin layer and
// the protocol endpoint servers.

pub mod bridge;
pub mod coalescer;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod identity;
pub mod model;
pub mod placement;
pub mod serialize;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::{
    AccessoryEvent, Bridge, BridgeBuilder, PatchFailure, PatchOperation, PatchOutcome,
    PublishState,
};
pub use coalescer::Enqueued;
pub use config::{BridgeConfig, validate_pincode};
pub use endpoint::{
    Advertisement, CharacteristicChange, EndpointError, EndpointEvent, EndpointEventSender,
    EndpointId, EndpointServer, EndpointServerFactory,
};
pub use error::CoreError;
pub use identity::derive_username;
pub use placement::{Placement, classify, infer_category};
pub use serialize::AttributeDatabase;
pub use store::{AccessoryInfo, CachedAccessory, IdentifierCache, IdentityStore, TopologyRecord};

// Re-export model types at the crate root for ergonomics.
pub use model::{Accessory, AccessoryId, Category, Characteristic, Service, ServiceKind, Username};
