// ── Domain model ──

pub mod accessory;
pub mod category;
pub mod identifiers;

pub use accessory::{Accessory, Characteristic, Service, VALVE_TYPE};
pub use category::{Category, ServiceKind};
pub use identifiers::{AccessoryId, Username};
