// ── Runtime bridge configuration ──
//
// Describes *what* the bridge publishes as. The CLI builds a
// `BridgeConfig` from its config file and hands it in; core never
// reads config files.

use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

use crate::error::CoreError;
use crate::model::{Accessory, AccessoryId, Category, Service, ServiceKind, Username};
use crate::store::EndpointProfile;

pub const DEFAULT_PINCODE: &str = "031-45-154";
pub const DEFAULT_UPDATE_WINDOW: Duration = Duration::from_secs(1);

/// Codes clients refuse as too easy to guess.
const BLOCKED_PINCODES: [&str; 12] = [
    "000-00-000",
    "111-11-111",
    "222-22-222",
    "333-33-333",
    "444-44-444",
    "555-55-555",
    "666-66-666",
    "777-77-777",
    "888-88-888",
    "999-99-999",
    "123-45-678",
    "876-54-321",
];

/// Configuration of a single bridge instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Stable UUID of the bridge accessory itself.
    pub uuid: AccessoryId,
    pub display_name: String,
    pub username: Username,
    /// Setup code in `DDD-DD-DDD` form.
    pub pincode: String,
    pub category: Category,
    /// Where identity records are kept. `None` keeps them in memory.
    pub storage_path: Option<PathBuf>,
    /// Quiescent window of the update coalescer.
    pub update_window: Duration,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub firmware_revision: String,
}

impl BridgeConfig {
    /// Defaults for everything but name and username. The bridge UUID is
    /// derived from the username so it survives restarts.
    pub fn new(display_name: impl Into<String>, username: Username) -> Self {
        let uuid = Uuid::new_v5(&Uuid::NAMESPACE_OID, username.as_str().as_bytes());
        Self {
            uuid: uuid.into(),
            display_name: display_name.into(),
            serial_number: username.to_string(),
            username,
            pincode: DEFAULT_PINCODE.into(),
            category: Category::Bridge,
            storage_path: None,
            update_window: DEFAULT_UPDATE_WINDOW,
            manufacturer: "hapbridge".into(),
            model: "hapbridge".into(),
            firmware_revision: env!("CARGO_PKG_VERSION").into(),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.display_name.trim().is_empty() {
            return Err(CoreError::validation("name", "bridge name must not be empty"));
        }
        validate_pincode(&self.pincode)?;
        if self.update_window.is_zero() {
            return Err(CoreError::validation("update_window", "must be greater than zero"));
        }
        Ok(())
    }

    /// The bridge's own accessory, published as aid 1 of the primary endpoint.
    pub fn bridge_accessory(&self) -> Accessory {
        let mut accessory = Accessory::new(self.uuid.clone(), self.display_name.clone())
            .with_category(self.category)
            .with_service(
                Service::new(ServiceKind::AccessoryInformation)
                    .with_characteristic("Identify", serde_json::Value::Null)
                    .with_characteristic("Manufacturer", self.manufacturer.as_str())
                    .with_characteristic("Model", self.model.as_str())
                    .with_characteristic("Name", self.display_name.as_str())
                    .with_characteristic("SerialNumber", self.serial_number.as_str())
                    .with_characteristic("FirmwareRevision", self.firmware_revision.as_str()),
            )
            .with_service(
                Service::new(ServiceKind::ProtocolInformation).with_characteristic("Version", "1.1.0"),
            );
        accessory.is_bridge = true;
        accessory
    }

    pub fn endpoint_profile(&self) -> EndpointProfile {
        EndpointProfile {
            display_name: self.display_name.clone(),
            category: self.category,
            pincode: self.pincode.clone(),
        }
    }
}

/// Check a setup code: `DDD-DD-DDD` and not trivially guessable.
pub fn validate_pincode(pincode: &str) -> Result<(), CoreError> {
    let well_formed = pincode.len() == 10
        && pincode.char_indices().all(|(i, c)| match i {
            3 | 6 => c == '-',
            _ => c.is_ascii_digit(),
        });
    if !well_formed {
        return Err(CoreError::validation(
            "pincode",
            format!("expected the form DDD-DD-DDD, got '{pincode}'"),
        ));
    }
    if BLOCKED_PINCODES.contains(&pincode) {
        return Err(CoreError::validation(
            "pincode",
            format!("'{pincode}' is too easy to guess"),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> BridgeConfig {
        BridgeConfig::new("Hub", "AA:BB:CC:DD:EE:FF".parse().unwrap())
    }

    #[test]
    fn defaults() {
        let config = config();
        assert_eq!(config.pincode, DEFAULT_PINCODE);
        assert_eq!(config.category, Category::Bridge);
        assert_eq!(config.update_window, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn uuid_is_stable_per_username() {
        assert_eq!(config().uuid, config().uuid);
        let other = BridgeConfig::new("Hub", "11:22:33:44:55:66".parse().unwrap());
        assert_ne!(config().uuid, other.uuid);
    }

    #[test]
    fn pincode_shape() {
        assert!(validate_pincode("031-45-154").is_ok());
        assert!(validate_pincode("03145154").is_err());
        assert!(validate_pincode("031-45-15a").is_err());
        assert!(validate_pincode("031-451-54").is_err());
    }

    #[test]
    fn trivial_pincodes_rejected() {
        assert!(validate_pincode("111-11-111").is_err());
        assert!(validate_pincode("123-45-678").is_err());
    }

    #[test]
    fn empty_name_rejected() {
        let mut config = config();
        config.display_name = "  ".into();
        assert!(matches!(config.validate(), Err(CoreError::Validation { .. })));
    }

    #[test]
    fn bridge_accessory_is_marked() {
        let accessory = config().bridge_accessory();
        assert!(accessory.is_bridge);
        assert_eq!(accessory.services[0].kind, ServiceKind::AccessoryInformation);
        assert_eq!(
            accessory.services[0].characteristic("Name").unwrap().value,
            serde_json::json!("Hub")
        );
    }
}
